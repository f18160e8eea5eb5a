//! A single chain's RPC surface: one [`ChainClient`] per configured chain
//! id, created once at startup and shared read-only by every strategy
//! (spec.md §3 "ChainClient", §5 "Shared-resource policy").

use alloy::{
    network::EthereumWallet,
    primitives::Address,
    providers::{DynProvider, Provider, ProviderBuilder},
};
use serde::Deserialize;

/// Static configuration for one chain, as loaded from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Canonical `<FAMILY>-<id>` chain identifier, e.g. `EVM-97`.
    pub chain_id: String,
    /// HTTP(S) or WS(S) RPC endpoint for this chain. Chains that Order
    /// Ingestion subscribes to (spec.md §4.2) must be configured with a
    /// WS(S) endpoint — `eth_subscribe` has no HTTP transport in `alloy`.
    pub rpc_url: String,
}

/// A long-lived, process-wide handle to one chain's RPC endpoint.
///
/// Holds both a read-only public provider and a wallet-bound provider that
/// carries the filler's signing account. Strategies borrow a `ChainClient`;
/// only the wallet client may sign, and the registry is the sole owner.
#[derive(Clone)]
pub struct ChainClient {
    chain_id: String,
    public: DynProvider,
    wallet: DynProvider,
    account: Address,
}

impl ChainClient {
    /// Connect a public and wallet-bound provider to `rpc_url` for
    /// `chain_id`, using `wallet` for transaction signing. Does not retry —
    /// callers (the [`super::registry::ChainClientRegistry`] at startup)
    /// apply the crate's shared retry policy around this call.
    ///
    /// Uses `alloy`'s scheme-detecting `connect`, not `connect_http`, so a
    /// `ws(s)://` endpoint yields a pubsub-capable provider — required for
    /// the public provider, since order ingestion (spec.md §4.2) calls
    /// `subscribe_logs` on it, which has no HTTP transport in `alloy`.
    pub async fn connect(
        chain_id: &str,
        rpc_url: &str,
        wallet: EthereumWallet,
        account: Address,
    ) -> Result<Self, alloy::transports::RpcError<alloy::transports::TransportErrorKind>> {
        let public = ProviderBuilder::new().connect(rpc_url).await?;
        public.get_chain_id().await?;
        let public = DynProvider::new(public);

        let wallet_provider = ProviderBuilder::new().wallet(wallet).connect(rpc_url).await?;
        let wallet_provider = DynProvider::new(wallet_provider);

        Ok(Self { chain_id: chain_id.to_string(), public, wallet: wallet_provider, account })
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// The read side: a provider suitable for queries, never for signing.
    pub fn public(&self) -> &DynProvider {
        &self.public
    }

    /// The write side: a provider bound to the filler's signing account.
    pub fn wallet(&self) -> &DynProvider {
        &self.wallet
    }

    /// The filler's account address on this chain.
    pub fn account(&self) -> Address {
        self.account
    }
}
