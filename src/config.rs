//! Environment-variable-driven configuration (spec.md §6 "Inputs").
//!
//! Scalar tunables load through `init4_bin_base`'s `FromEnv` derive, exactly
//! as the donor `signet-filler` config did; the chain/gateway/confirmation-
//! policy tables are structurally richer than a single scalar env var can
//! hold, so they load as one JSON blob per list and are parsed with `serde`,
//! a pattern used elsewhere in the retrieved pack for structured
//! environment configuration.

use crate::chain::ChainConfig;
use crate::ingestion::GatewayConfig;
use crate::order::Opaque32;
use crate::pending::{ConfirmationBand, PendingConfig};
use crate::scheduler::SchedulerConfig;
use alloy::primitives::{Address, B256, U256};
use eyre::{Result, WrapErr};
use init4_bin_base::utils::from_env::FromEnv;
use itertools::Itertools;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BID_STORE_PATH: &str = ".filler-data/bids.db";
const DEFAULT_MAX_CONCURRENT_ORDERS: usize = 16;
const DEFAULT_MAX_RECHECKS: u32 = 10;
const DEFAULT_RECHECK_DELAY_MS: u64 = 15_000;
const DEFAULT_MIN_PROFIT_SCORE: f64 = 0.0;
const DEFAULT_SHUTDOWN_DRAIN_DEADLINE_MS: u64 = 30_000;
const DEFAULT_RPC_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_HEALTHCHECK_PORT: u16 = 8080;

/// One source chain's full configuration: its RPC endpoint, the gateway
/// contract to subscribe to, and its confirmation-policy band (spec.md §4.2,
/// §4.3).
///
/// `rpc_url` must be a `ws(s)://` endpoint: order ingestion subscribes to
/// `OrderPlaced` logs on it, and `eth_subscribe` has no HTTP transport.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceChainConfig {
    pub chain_id: String,
    pub rpc_url: String,
    pub gateway_address: Address,
    pub order_placed_topic: B256,
    pub confirmation_band: ConfirmationBand,
}

/// A destination-only chain: just enough to open a [`ChainClient`](crate::chain::ChainClient)
/// for it. `rpc_url` may be plain `http(s)://`, since a destination chain is
/// only ever read from or sent transactions, never subscribed to.
#[derive(Debug, Clone, Deserialize)]
pub struct DestChainConfig {
    pub chain_id: String,
    pub rpc_url: String,
}

/// A `(chain, token)` rate row for the static price table fallback (spec.md
/// §1 "a price oracle provided as a collaborator").
#[derive(Debug, Clone, Deserialize)]
pub struct PriceTableRow {
    pub chain_id: String,
    pub token_id: Opaque32,
    pub usd_rate: U256,
}

/// Which [`crate::pending::PriceOracle`] implementation to wire up.
#[derive(Debug, Clone)]
pub enum PriceOracleConfig {
    /// Query an external HTTP quote API.
    Http { base_url: String, bearer_token: String },
    /// A fixed `(chain, token) -> USD rate` table.
    Static(HashMap<(String, Opaque32), U256>),
}

/// Internal configuration loaded directly from environment variables.
#[derive(Debug, FromEnv)]
struct ConfigInner {
    #[from_env(
        var = "FILLER_SOURCE_CHAINS_JSON",
        desc = "JSON array of source chains: [{chain_id, rpc_url, gateway_address, \
        order_placed_topic, confirmation_band: {min_amount, max_amount, min_conf, max_conf}}]"
    )]
    source_chains_json: String,

    #[from_env(
        var = "FILLER_DEST_CHAINS_JSON",
        desc = "JSON array of destination chains: [{chain_id, rpc_url}]"
    )]
    dest_chains_json: String,

    #[from_env(
        var = "FILLER_COPROCESSOR_WS_URL",
        desc = "WebSocket URL for the coprocessor chain RPC"
    )]
    coprocessor_ws_url: String,

    #[from_env(
        var = "FILLER_COPROCESSOR_SEED",
        desc = "Sr25519 seed phrase or hex seed for the coprocessor signing key"
    )]
    coprocessor_seed: String,

    #[from_env(
        var = "FILLER_BID_STORE_PATH",
        desc = "Path to the bid store SQLite database [default: ./.filler-data/bids.db]",
        optional
    )]
    bid_store_path: Option<String>,

    #[from_env(
        var = "FILLER_MAX_CONCURRENT_ORDERS",
        desc = "Global evaluation queue concurrency bound [default: 16]",
        optional
    )]
    max_concurrent_orders: Option<usize>,

    #[from_env(
        var = "FILLER_MAX_RECHECKS",
        desc = "Maximum pending-confirmation recheck attempts per order [default: 10]",
        optional
    )]
    max_rechecks: Option<u32>,

    #[from_env(
        var = "FILLER_RECHECK_DELAY_MS",
        desc = "Delay between pending-confirmation rechecks, in milliseconds [default: 15000]",
        optional
    )]
    recheck_delay_ms: Option<u64>,

    #[from_env(
        var = "FILLER_MIN_PROFIT_SCORE",
        desc = "Minimum profitability score required to dispatch a fill [default: 0.0]",
        optional
    )]
    min_profit_score: Option<f64>,

    #[from_env(
        var = "FILLER_SHUTDOWN_DRAIN_DEADLINE_MS",
        desc = "How long to wait for in-flight work to drain on shutdown, in milliseconds \
        [default: 30000]",
        optional
    )]
    shutdown_drain_deadline_ms: Option<u64>,

    #[from_env(
        var = "FILLER_RPC_TIMEOUT_MS",
        desc = "Per-RPC-call deadline, in milliseconds [default: 30000]",
        optional
    )]
    rpc_timeout_ms: Option<u64>,

    #[from_env(
        var = "FILLER_HEALTHCHECK_PORT",
        desc = "Port for the healthcheck HTTP server [default: 8080]",
        optional
    )]
    healthcheck_port: Option<u16>,

    #[from_env(
        var = "FILLER_STATUS_API_URL",
        desc = "Base URL of the external order-status indexer, if configured",
        optional
    )]
    status_api_url: Option<String>,

    #[from_env(
        var = "FILLER_STATUS_API_BEARER_TOKEN",
        desc = "Bearer token for the order-status indexer, if it requires auth",
        optional
    )]
    status_api_bearer_token: Option<String>,

    #[from_env(
        var = "FILLER_PRICE_ORACLE_URL",
        desc = "Base URL of an external USD price quote API (mutually exclusive with \
        FILLER_PRICE_TABLE_JSON)",
        optional
    )]
    price_oracle_url: Option<String>,

    #[from_env(
        var = "FILLER_PRICE_ORACLE_BEARER_TOKEN",
        desc = "Bearer token for the price quote API, if it requires auth",
        optional
    )]
    price_oracle_bearer_token: Option<String>,

    #[from_env(
        var = "FILLER_PRICE_TABLE_JSON",
        desc = "JSON array of fixed USD rates: [{chain_id, token_id, usd_rate}] \
        (mutually exclusive with FILLER_PRICE_ORACLE_URL)",
        optional
    )]
    price_table_json: Option<String>,

    signer: init4_bin_base::utils::signer::LocalOrAwsConfig,
}

/// Configuration for the intent-filler core.
///
/// Load from environment variables using [`config_from_env`]. Use `--help`
/// to see the full list of supported environment variables.
#[derive(Debug)]
pub struct Config {
    source_chains: Vec<SourceChainConfig>,
    dest_chains: Vec<DestChainConfig>,
    coprocessor_ws_url: String,
    coprocessor_seed: String,
    bid_store_path: PathBuf,
    max_concurrent_orders: usize,
    max_rechecks: u32,
    recheck_delay: Duration,
    min_profit_score: f64,
    shutdown_drain_deadline: Duration,
    rpc_timeout: Duration,
    healthcheck_port: u16,
    status_api_url: Option<String>,
    status_api_bearer_token: Option<String>,
    price_oracle: PriceOracleConfig,
    signer: init4_bin_base::utils::signer::LocalOrAwsConfig,
}

impl Config {
    /// Every chain this filler needs a [`ChainClient`](crate::chain::ChainClient) for —
    /// sources and destinations, deduplicated by chain id.
    pub fn chain_configs(&self) -> Vec<ChainConfig> {
        let mut seen = HashMap::new();
        for source in &self.source_chains {
            seen.insert(
                source.chain_id.clone(),
                ChainConfig { chain_id: source.chain_id.clone(), rpc_url: source.rpc_url.clone() },
            );
        }
        for dest in &self.dest_chains {
            seen.entry(dest.chain_id.clone()).or_insert_with(|| ChainConfig {
                chain_id: dest.chain_id.clone(),
                rpc_url: dest.rpc_url.clone(),
            });
        }
        seen.into_values().collect()
    }

    /// Gateway subscriptions for Order Ingestion (spec.md §4.2).
    pub fn gateways(&self) -> Vec<GatewayConfig> {
        self.source_chains
            .iter()
            .map(|s| GatewayConfig {
                chain_id: s.chain_id.clone(),
                gateway_address: s.gateway_address,
                order_placed_topic: s.order_placed_topic,
            })
            .collect()
    }

    /// Confirmation-policy bands keyed by source chain id (spec.md §4.3).
    pub fn confirmation_bands(&self) -> HashMap<String, ConfirmationBand> {
        self.source_chains.iter().map(|s| (s.chain_id.clone(), s.confirmation_band)).collect()
    }

    pub const fn pending_config(&self) -> PendingConfig {
        PendingConfig { max_rechecks: self.max_rechecks, recheck_delay: self.recheck_delay }
    }

    pub const fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_orders: self.max_concurrent_orders,
            shutdown_drain_deadline: self.shutdown_drain_deadline,
        }
    }

    pub const fn min_profit_score(&self) -> f64 {
        self.min_profit_score
    }

    pub const fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn coprocessor_ws_url(&self) -> &str {
        &self.coprocessor_ws_url
    }

    pub fn coprocessor_seed(&self) -> &str {
        &self.coprocessor_seed
    }

    pub fn bid_store_path(&self) -> &PathBuf {
        &self.bid_store_path
    }

    pub const fn healthcheck_port(&self) -> u16 {
        self.healthcheck_port
    }

    pub fn status_api_url(&self) -> Option<&str> {
        self.status_api_url.as_deref()
    }

    pub fn status_api_bearer_token(&self) -> Option<&str> {
        self.status_api_bearer_token.as_deref()
    }

    /// Which [`crate::pending::PriceOracle`] implementation to construct.
    pub fn price_oracle(&self) -> &PriceOracleConfig {
        &self.price_oracle
    }

    /// Signer configuration for EVM chain clients.
    pub const fn signer(&self) -> &init4_bin_base::utils::signer::LocalOrAwsConfig {
        &self.signer
    }

    fn from_env() -> Result<Self> {
        let ConfigInner {
            source_chains_json,
            dest_chains_json,
            coprocessor_ws_url,
            coprocessor_seed,
            bid_store_path,
            max_concurrent_orders,
            max_rechecks,
            recheck_delay_ms,
            min_profit_score,
            shutdown_drain_deadline_ms,
            rpc_timeout_ms,
            healthcheck_port,
            status_api_url,
            status_api_bearer_token,
            price_oracle_url,
            price_oracle_bearer_token,
            price_table_json,
            signer,
        } = ConfigInner::from_env()?;

        let source_chains: Vec<SourceChainConfig> = serde_json::from_str(&source_chains_json)
            .wrap_err("failed to parse FILLER_SOURCE_CHAINS_JSON")?;
        if source_chains.is_empty() {
            eyre::bail!("FILLER_SOURCE_CHAINS_JSON must configure at least one source chain");
        }
        let dest_chains: Vec<DestChainConfig> = serde_json::from_str(&dest_chains_json)
            .wrap_err("failed to parse FILLER_DEST_CHAINS_JSON")?;
        if dest_chains.is_empty() {
            eyre::bail!("FILLER_DEST_CHAINS_JSON must configure at least one destination chain");
        }

        let bid_store_path = bid_store_path
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join(DEFAULT_BID_STORE_PATH));

        let price_oracle = Self::build_price_oracle_config(
            price_oracle_url,
            price_oracle_bearer_token,
            price_table_json,
        )?;

        Ok(Config {
            source_chains,
            dest_chains,
            coprocessor_ws_url,
            coprocessor_seed,
            bid_store_path,
            max_concurrent_orders: max_concurrent_orders.unwrap_or(DEFAULT_MAX_CONCURRENT_ORDERS),
            max_rechecks: max_rechecks.unwrap_or(DEFAULT_MAX_RECHECKS),
            recheck_delay: Duration::from_millis(recheck_delay_ms.unwrap_or(DEFAULT_RECHECK_DELAY_MS)),
            min_profit_score: min_profit_score.unwrap_or(DEFAULT_MIN_PROFIT_SCORE),
            shutdown_drain_deadline: Duration::from_millis(
                shutdown_drain_deadline_ms.unwrap_or(DEFAULT_SHUTDOWN_DRAIN_DEADLINE_MS),
            ),
            rpc_timeout: Duration::from_millis(rpc_timeout_ms.unwrap_or(DEFAULT_RPC_TIMEOUT_MS)),
            healthcheck_port: healthcheck_port.unwrap_or(DEFAULT_HEALTHCHECK_PORT),
            status_api_url,
            status_api_bearer_token,
            price_oracle,
            signer,
        })
    }

    /// Builds the one configured [`PriceOracleConfig`] variant from the three
    /// raw env inputs. Exactly one of "HTTP oracle" (`price_oracle_url`) or
    /// "static price table" (`price_table_json`) must be set (spec.md §6
    /// describes them as mutually exclusive collaborator inputs).
    fn build_price_oracle_config(
        price_oracle_url: Option<String>,
        price_oracle_bearer_token: Option<String>,
        price_table_json: Option<String>,
    ) -> Result<PriceOracleConfig> {
        match (price_oracle_url, price_table_json) {
            (Some(_), Some(_)) => eyre::bail!(
                "FILLER_PRICE_ORACLE_URL and FILLER_PRICE_TABLE_JSON are mutually exclusive"
            ),
            (Some(base_url), None) => Ok(PriceOracleConfig::Http {
                base_url,
                bearer_token: price_oracle_bearer_token.unwrap_or_default(),
            }),
            (None, Some(price_table_json)) => {
                let rows: Vec<PriceTableRow> = serde_json::from_str(&price_table_json)
                    .wrap_err("failed to parse FILLER_PRICE_TABLE_JSON")?;
                let table = rows.into_iter().map(|row| ((row.chain_id, row.token_id), row.usd_rate)).collect();
                Ok(PriceOracleConfig::Static(table))
            }
            (None, None) => eyre::bail!(
                "one of FILLER_PRICE_ORACLE_URL or FILLER_PRICE_TABLE_JSON must be configured"
            ),
        }
    }
}

/// Get a list of the env vars used to configure the app.
pub fn env_var_info() -> String {
    let inventory = ConfigInner::inventory();
    let max_width = inventory.iter().map(|env_item| env_item.var.len()).max().unwrap_or(0);
    inventory
        .iter()
        .map(|env_item| {
            format!(
                "  {:width$}  {}{}",
                env_item.var,
                env_item.description,
                if env_item.optional { " [optional]" } else { "" },
                width = max_width
            )
        })
        .join("\n")
}

/// Load configuration from environment variables.
pub fn config_from_env() -> Result<Config> {
    Config::from_env()
        .wrap_err("failed to configure filler (run with '--help' to see all required env vars)")
}
