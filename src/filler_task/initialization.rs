//! Startup wiring for [`super::FillerTask`]: connect the filler's signer,
//! the chain client registry, the coprocessor bid client, and the bid
//! store. Every connection attempt goes through the crate's one shared
//! backoff policy ([`crate::retry::backoff`]) — generalizes this file's
//! donor shape (`connect_signer`/`connect_to_host_provider`, one host, one
//! rollup) to an arbitrary chain list plus the coprocessor session.

use crate::bid::BidClient;
use crate::chain::ChainClientRegistry;
use crate::config::{Config, PriceOracleConfig};
use crate::pricing::{AnyPriceOracle, HttpPriceOracle, StaticPriceOracle};
use crate::store::BidStore;
use alloy::network::EthereumWallet;
use eyre::{Context, Result};
use init4_bin_base::deps::tracing::{debug, info, instrument};
use init4_bin_base::utils::signer::{LocalOrAws, LocalOrAwsConfig};
use subxt_signer::SecretUri;
use subxt_signer::sr25519::Keypair;

#[instrument(skip_all)]
pub(super) async fn connect_signer(config: &LocalOrAwsConfig) -> Result<LocalOrAws> {
    debug!("connecting to signer");
    let signer = config.connect().await?;
    info!(signer_address = %signer.address(), "connected to signer");
    Ok(signer)
}

/// Opens every configured chain's [`crate::chain::ChainClient`], sharing one
/// [`EthereumWallet`] across all of them (spec.md §3 `ChainClient`: "Created
/// at startup and closed at shutdown. Shared read-only by all strategies").
#[instrument(skip_all, fields(chains = config.chain_configs().len()))]
pub(super) async fn connect_chain_registry(
    config: &Config,
    signer: &LocalOrAws,
) -> Result<ChainClientRegistry> {
    let wallet = EthereumWallet::from(signer.clone());
    let account = signer.address();
    ChainClientRegistry::connect(&config.chain_configs(), wallet, account, config.rpc_timeout())
        .await
        .wrap_err("failed to connect chain client registry")
}

/// Connects the coprocessor bid client's WebSocket session using the
/// configured Sr25519 seed (spec.md §6: "must be encodable by the filler's
/// signing key (Sr25519)").
#[instrument(skip_all)]
pub(super) async fn connect_bid_client(config: &Config) -> Result<BidClient> {
    let uri: SecretUri = config
        .coprocessor_seed()
        .parse()
        .wrap_err("failed to parse FILLER_COPROCESSOR_SEED as an Sr25519 derivation URI")?;
    let keypair = Keypair::from_uri(&uri)
        .wrap_err("failed to derive Sr25519 keypair from FILLER_COPROCESSOR_SEED")?;

    BidClient::connect(config.coprocessor_ws_url().to_string(), keypair)
        .await
        .wrap_err("failed to connect coprocessor bid client")
}

/// Opens (creating if absent) the durable bid store at the configured path
/// (spec.md §6: "Must be created on first run").
#[instrument(skip_all, fields(path = %config.bid_store_path().display()))]
pub(super) async fn open_bid_store(config: &Config) -> Result<BidStore> {
    BidStore::open(config.bid_store_path()).await.wrap_err("failed to open bid store")
}

/// Builds whichever [`AnyPriceOracle`] the configuration selected (spec.md
/// §1: "a price oracle provided as a collaborator").
pub(super) fn build_price_oracle(config: &Config) -> AnyPriceOracle {
    match config.price_oracle().clone() {
        PriceOracleConfig::Http { base_url, bearer_token } => {
            AnyPriceOracle::Http(HttpPriceOracle::new(base_url, bearer_token))
        }
        PriceOracleConfig::Static(rates) => AnyPriceOracle::Static(StaticPriceOracle::new(rates)),
    }
}
