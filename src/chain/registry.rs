//! Chain Client Registry (spec.md §4.1): opens and multiplexes one RPC
//! client per configured chain.

use super::client::{ChainClient, ChainConfig};
use crate::retry::{backoff, is_transient_transport_error};
use alloy::{
    network::EthereumWallet,
    primitives::{Address, TxHash},
    providers::Provider,
    rpc::types::TransactionReceipt,
};
use backon::Retryable;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Errors surfaced by the registry. Per spec.md §4.1, the registry itself
/// does not retry transient RPC failures on the hot path — only on the
/// one-time connection setup at startup; everything here is surfaced to
/// the caller, who owns retry policy.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no chain client configured for chain '{0}'")]
    UnknownChain(String),
    #[error("transaction {tx} not found (or not yet mined) on chain '{chain}'")]
    ReceiptNotFound { chain: String, tx: TxHash },
    #[error("RPC error on chain '{chain}': {source}")]
    Rpc {
        chain: String,
        #[source]
        source: alloy::transports::RpcError<alloy::transports::TransportErrorKind>,
    },
    #[error("RPC call on chain '{chain}' did not complete within the configured deadline")]
    Timeout { chain: String },
}

/// Holds one long-lived [`ChainClient`] per configured chain id.
///
/// Created once at startup (§4.1) and passed around by borrowed handle
/// thereafter — generalizes the donor's ad hoc
/// `connect_to_host_provider`/`connect_to_rollup_provider` pair
/// (`filler_task/initialization.rs`) into a map over an arbitrary number of
/// source and destination chains.
pub struct ChainClientRegistry {
    clients: HashMap<String, ChainClient>,
    /// Per-RPC-call deadline (spec.md §5 "Every RPC call has a deadline").
    rpc_timeout: Duration,
}

impl ChainClientRegistry {
    /// Connect to every configured chain, retrying transient connection
    /// failures with the crate's shared backoff policy. Fails closed (the
    /// whole registry fails to come up) if any configured chain cannot be
    /// reached — a missing chain client is a fatal startup error per
    /// spec.md §7.
    ///
    /// `wallet`/`account` are constructed once by the caller (mirroring the
    /// donor's `FillerTask::initialize`, which builds one `EthereumWallet`
    /// from the connected signer and clones it into every provider) since
    /// every chain in this registry shares the same filler account.
    #[instrument(skip_all, fields(chains = configs.len()))]
    pub async fn connect(
        configs: &[ChainConfig],
        wallet: EthereumWallet,
        account: Address,
        rpc_timeout: Duration,
    ) -> eyre::Result<Self> {
        let mut clients = HashMap::with_capacity(configs.len());
        for config in configs {
            let client = Self::connect_one(config, wallet.clone(), account).await?;
            clients.insert(config.chain_id.clone(), client);
        }
        Ok(Self { clients, rpc_timeout })
    }

    /// Run `fut` under the registry's configured per-RPC-call deadline,
    /// surfacing expiry as [`RegistryError::Timeout`] — a transient failure
    /// the caller's retry policy decides what to do with (spec.md §5, §7).
    async fn with_deadline<T>(
        &self,
        chain: &str,
        fut: impl Future<Output = Result<T, RegistryError>>,
    ) -> Result<T, RegistryError> {
        tokio::time::timeout(self.rpc_timeout, fut)
            .await
            .unwrap_or_else(|_| Err(RegistryError::Timeout { chain: chain.to_string() }))
    }

    async fn connect_one(
        config: &ChainConfig,
        wallet: EthereumWallet,
        account: Address,
    ) -> eyre::Result<ChainClient> {
        debug!(chain = %config.chain_id, url = %config.rpc_url, "connecting chain client");
        let attempt = AtomicUsize::new(1);

        let client = (|| ChainClient::connect(&config.chain_id, &config.rpc_url, wallet.clone(), account))
            .retry(backoff())
            .when(is_transient_transport_error)
            .notify(|error, duration| {
                crate::metrics::record_connection_attempt(crate::metrics::ConnectionTarget::ChainClient);
                warn!(
                    chain = %config.chain_id,
                    error = ?error,
                    attempt = attempt.fetch_add(1, Ordering::Relaxed),
                    retry_in_ms = duration.as_millis(),
                    "transient error connecting chain client"
                );
            })
            .await
            .map_err(|e| eyre::eyre!("failed to connect chain client for '{}': {e}", config.chain_id))?;

        info!(chain = %config.chain_id, "connected chain client");
        Ok(client)
    }

    fn client(&self, chain: &str) -> Result<&ChainClient, RegistryError> {
        self.clients.get(chain).ok_or_else(|| RegistryError::UnknownChain(chain.to_string()))
    }

    /// The read-side provider for `chain`.
    pub fn get_public(&self, chain: &str) -> Result<&alloy::providers::DynProvider, RegistryError> {
        Ok(self.client(chain)?.public())
    }

    /// The write-side (signing) provider for `chain`.
    pub fn get_wallet(&self, chain: &str) -> Result<&alloy::providers::DynProvider, RegistryError> {
        Ok(self.client(chain)?.wallet())
    }

    /// The filler's account address on `chain`.
    pub fn account(&self, chain: &str) -> Result<Address, RegistryError> {
        Ok(self.client(chain)?.account())
    }

    /// Fetch the receipt for `tx` on `chain`. Not found is surfaced as
    /// [`RegistryError::ReceiptNotFound`] — a transient condition for
    /// not-yet-mined transactions, retried by the caller (the pending
    /// queue).
    pub async fn receipt(&self, chain: &str, tx: TxHash) -> Result<TransactionReceipt, RegistryError> {
        let client = self.client(chain)?;
        self.with_deadline(chain, async {
            client
                .public()
                .get_transaction_receipt(tx)
                .await
                .map_err(|source| RegistryError::Rpc { chain: chain.to_string(), source })?
                .ok_or_else(|| RegistryError::ReceiptNotFound { chain: chain.to_string(), tx })
        })
        .await
    }

    /// The chain's current tip block number.
    pub async fn chain_tip(&self, chain: &str) -> Result<u64, RegistryError> {
        let client = self.client(chain)?;
        self.with_deadline(chain, async {
            client
                .public()
                .get_block_number()
                .await
                .map_err(|source| RegistryError::Rpc { chain: chain.to_string(), source })
        })
        .await
    }

    /// Number of confirmations `receipt` has accrued on `chain`, i.e.
    /// `chain_tip - receipt.block_number + 1`.
    pub async fn confirmations_of(
        &self,
        chain: &str,
        receipt: &TransactionReceipt,
    ) -> Result<u64, RegistryError> {
        let tip = self.chain_tip(chain).await?;
        let Some(mined_at) = receipt.block_number else {
            return Ok(0);
        };
        Ok(tip.saturating_sub(mined_at).saturating_add(1))
    }
}
