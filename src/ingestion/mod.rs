//! Order Ingestion (spec.md §4.2): chain-agnostic subscription to
//! `OrderPlaced` events on every source chain, producing a uniform
//! [`Order`] stream.
//!
//! The concrete gateway ABI is an external collaborator input (spec.md §1
//! "Explicitly out of scope") — this module only requires that the caller
//! supply a [`GatewayDecoder`] capable of turning a raw log into an
//! [`Order`]. Everything else (subscription lifecycle, reconnect-with-gap-
//! refill, dedup, canonical chain-id decoding) is this module's job.

mod gateway_abi;
pub use gateway_abi::GatewayAbiDecoder;

use crate::chain::ChainClientRegistry;
use crate::order::Order;
use crate::retry::{backoff, is_transient_ingestion_error};
use alloy::{
    primitives::{Address, B256},
    providers::Provider,
    rpc::types::{Filter, Log},
};
use backon::Retryable;
use futures_util::StreamExt;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// How many recently-seen commitment ids to remember, to drop duplicates
/// produced by the reconnect gap-refill (a log re-delivered both by the
/// gap-fill `get_logs` call and by the freshly (re)established
/// subscription).
const DEDUP_CACHE_SIZE: usize = 4_096;

/// Per-source-chain gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub chain_id: String,
    pub gateway_address: Address,
    /// keccak256 topic0 of the gateway's `OrderPlaced` event signature.
    pub order_placed_topic: B256,
}

/// Decodes a raw `OrderPlaced` log into an [`Order`]. The concrete ABI
/// layout is a collaborator concern (spec.md §1); this trait is the seam.
///
/// Implementations MUST be total decoders (spec.md §9 design notes:
/// "unknown fields are a decode error, not silently ignored").
pub trait GatewayDecoder: Send + Sync {
    fn decode(&self, chain_id: &str, log: &Log) -> Result<Order, DecodeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("log is missing a transaction hash")]
    MissingTxHash,
    #[error("log field '{0}' is malformed")]
    MalformedField(&'static str),
    #[error("order construction failed: {0}")]
    Order(#[from] crate::order::OrderError),
}

/// Subscribes to `OrderPlaced` on every configured source chain and emits a
/// single merged stream of decoded orders.
pub struct OrderIngestion {
    registry: Arc<ChainClientRegistry>,
    decoder: Arc<dyn GatewayDecoder>,
    gateways: Vec<GatewayConfig>,
}

impl OrderIngestion {
    pub fn new(
        registry: Arc<ChainClientRegistry>,
        decoder: Arc<dyn GatewayDecoder>,
        gateways: Vec<GatewayConfig>,
    ) -> Self {
        Self { registry, decoder, gateways }
    }

    /// Start one subscription task per configured chain, all forwarding
    /// into a single channel. Returns the receiving half; the channel
    /// closes only once every per-chain task has observed cancellation.
    #[instrument(skip_all, fields(chains = self.gateways.len()))]
    pub fn spawn(&self, cancellation_token: CancellationToken) -> mpsc::Receiver<Order> {
        let (tx, rx) = mpsc::channel(1_024);

        for gateway in self.gateways.clone() {
            let registry = self.registry.clone();
            let decoder = self.decoder.clone();
            let tx = tx.clone();
            let cancellation_token = cancellation_token.clone();
            tokio::spawn(async move {
                run_chain_ingestion(registry, decoder, gateway, tx, cancellation_token).await;
            });
        }

        rx
    }
}

/// Per-chain subscription loop: subscribe, stream logs, and on any error
/// reconnect with backoff — refilling the gap between the last log we saw
/// and the freshly reestablished subscription's first log, so no order is
/// silently dropped (spec.md §4.2 failure semantics).
async fn run_chain_ingestion(
    registry: Arc<ChainClientRegistry>,
    decoder: Arc<dyn GatewayDecoder>,
    gateway: GatewayConfig,
    tx: mpsc::Sender<Order>,
    cancellation_token: CancellationToken,
) {
    let mut seen = LruCache::<[u8; 32], ()>::new(NonZeroUsize::new(DEDUP_CACHE_SIZE).unwrap());
    let last_seen_block = AtomicU64::new(0);

    loop {
        if cancellation_token.is_cancelled() {
            debug!(chain = %gateway.chain_id, "ingestion cancelled");
            return;
        }

        let connect = || async {
            let provider = registry.get_public(&gateway.chain_id).map_err(|e| eyre::eyre!(e))?;
            let current_tip = provider.get_block_number().await?;

            // Gap-refill: fetch any logs between the last block we processed
            // and the current tip before resuming the live subscription.
            let from_block = last_seen_block.load(Ordering::Relaxed);
            if from_block > 0 && current_tip > from_block {
                let filter = Filter::new()
                    .address(gateway.gateway_address)
                    .event_signature(gateway.order_placed_topic)
                    .from_block(from_block + 1)
                    .to_block(current_tip);
                let gap_logs = provider.get_logs(&filter).await?;
                for log in gap_logs {
                    deliver(&decoder, &gateway, log, &mut seen, &last_seen_block, &tx).await;
                }
            }

            let filter = Filter::new()
                .address(gateway.gateway_address)
                .event_signature(gateway.order_placed_topic)
                .from_block(current_tip);
            let subscription = provider.subscribe_logs(&filter).await?;
            Ok::<_, eyre::Error>(subscription.into_stream())
        };

        let stream = match connect
            .retry(backoff())
            .when(is_transient_ingestion_error)
            .notify(|error, duration| {
                warn!(
                    chain = %gateway.chain_id,
                    %error,
                    retry_in_ms = duration.as_millis(),
                    "retrying order ingestion connect"
                );
            })
            .await
        {
            Ok(stream) => stream,
            Err(error) => {
                error!(chain = %gateway.chain_id, %error, "failed to (re)connect order ingestion; giving up for this chain");
                return;
            }
        };

        tokio::pin!(stream);
        loop {
            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => {
                    debug!(chain = %gateway.chain_id, "ingestion cancelled mid-stream");
                    return;
                }
                maybe_log = stream.next() => {
                    match maybe_log {
                        Some(log) => {
                            deliver(&decoder, &gateway, log, &mut seen, &last_seen_block, &tx).await;
                        }
                        None => {
                            warn!(chain = %gateway.chain_id, "order subscription closed; reconnecting");
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn deliver(
    decoder: &Arc<dyn GatewayDecoder>,
    gateway: &GatewayConfig,
    log: Log,
    seen: &mut LruCache<[u8; 32], ()>,
    last_seen_block: &AtomicU64,
    tx: &mpsc::Sender<Order>,
) {
    if let Some(block_number) = log.block_number {
        last_seen_block.fetch_max(block_number, Ordering::Relaxed);
    }

    match decoder.decode(&gateway.chain_id, &log) {
        Ok(order) => {
            if seen.put(order.id().0, ()).is_some() {
                debug!(chain = %gateway.chain_id, order_id = %order.id(), "duplicate order suppressed");
                return;
            }
            info!(chain = %gateway.chain_id, order_id = %order.id(), "order_received");
            crate::metrics::record_order_received(&gateway.chain_id);
            if tx.send(order).await.is_err() {
                debug!(chain = %gateway.chain_id, "ingestion receiver dropped");
            }
        }
        Err(error) => {
            warn!(chain = %gateway.chain_id, %error, "failed to decode OrderPlaced log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_cache_suppresses_repeat_commitment() {
        let mut seen = LruCache::<[u8; 32], ()>::new(NonZeroUsize::new(DEDUP_CACHE_SIZE).unwrap());
        let id = [7u8; 32];
        assert!(seen.put(id, ()).is_none(), "first sighting must not be a duplicate");
        assert!(seen.put(id, ()).is_some(), "second sighting of the same commitment must be a duplicate");
    }

    #[test]
    fn dedup_cache_distinguishes_commitments() {
        let mut seen = LruCache::<[u8; 32], ()>::new(NonZeroUsize::new(DEDUP_CACHE_SIZE).unwrap());
        assert!(seen.put([1u8; 32], ()).is_none());
        assert!(seen.put([2u8; 32], ()).is_none());
    }
}
