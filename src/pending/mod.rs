//! Pending-Confirmation Queue (spec.md §4.3): the first non-trivial state
//! machine in the engine. Holds each order until the source chain has
//! accrued enough confirmations relative to the order's value, with
//! bounded, cancellable rechecks.
//!
//! States: `NEW → WAITING_CONFIRMATIONS → {READY | EXHAUSTED}`. `NEW` is
//! implicit (the instant [`PendingQueue::submit`] is called); the rest is
//! driven by one spawned task per order.

mod policy;

pub use policy::ConfirmationBand;

use crate::chain::{ChainClientRegistry, RegistryError};
use crate::order::{Opaque32, Order, OrderId};
use alloy::primitives::{TxHash, U256};
use core::future::Future;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// USD-equivalent pricing for a token, supplied by the caller (spec.md §1:
/// "a price oracle provided as a collaborator"). Implementations are
/// expected to be cheap to call repeatedly — the pending queue calls this
/// once per input, per recheck.
pub trait PriceOracle: Send + Sync + 'static {
    type Error: core::error::Error + Send + Sync + 'static;

    /// USD-equivalent value of `amount` units of `token` on `chain`.
    fn usd_value(
        &self,
        chain: &str,
        token: Opaque32,
        amount: U256,
    ) -> impl Future<Output = Result<U256, Self::Error>> + Send;
}

/// Tunables for the pending queue, independent of any one chain's band.
#[derive(Debug, Clone, Copy)]
pub struct PendingConfig {
    pub max_rechecks: u32,
    pub recheck_delay: Duration,
}

/// Why an order left the pending queue without becoming `READY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Exhausted,
}

/// The pending-confirmation queue. Exclusively owned by the engine (spec.md
/// §4.1 "Ownership") — strategies never see this type.
pub struct PendingQueue<O: PriceOracle> {
    registry: Arc<ChainClientRegistry>,
    oracle: Arc<O>,
    bands: HashMap<String, ConfirmationBand>,
    config: PendingConfig,
    /// One cancellation handle per order currently owned by a timer.
    /// Resubmitting the same order id cancels the prior handle before
    /// installing a new one (spec.md §4.3 concurrency clause).
    handles: Mutex<HashMap<OrderId, CancellationToken>>,
    shutdown: CancellationToken,
    depth: AtomicUsize,
}

impl<O: PriceOracle> PendingQueue<O> {
    pub fn new(
        registry: Arc<ChainClientRegistry>,
        oracle: Arc<O>,
        bands: HashMap<String, ConfirmationBand>,
        config: PendingConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            oracle,
            bands,
            config,
            handles: Mutex::new(HashMap::new()),
            shutdown,
            depth: AtomicUsize::new(0),
        }
    }

    /// Number of orders currently held in the queue (spec.md §6 metrics
    /// surface; not part of the state machine itself).
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Submit an order to the queue. Orders that become `READY` are sent on
    /// `ready`; orders that exhaust their rechecks are logged and dropped.
    ///
    /// Re-submitting an order already in the queue cancels its previous
    /// timer and restarts the recheck budget — the spec leaves this
    /// unspecified beyond "cancel the prior timer", so the safer behavior
    /// (don't silently keep a stale budget) is chosen.
    #[instrument(skip_all, fields(order_id = %order.id(), source = %order.source_chain))]
    pub fn submit(self: &Arc<Self>, order: Order, ready: mpsc::Sender<Order>) {
        let order_id = order.id();
        let token = CancellationToken::new();

        {
            let mut handles = self.handles.lock().unwrap();
            match handles.insert(order_id, token.clone()) {
                Some(previous) => {
                    previous.cancel();
                    debug!(%order_id, "cancelled prior pending timer on resubmit");
                }
                None => {
                    self.depth.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let queue = self.clone();
        tokio::spawn(async move {
            queue.run(order, token, ready).await;
        });
    }

    async fn run(self: Arc<Self>, order: Order, token: CancellationToken, ready: mpsc::Sender<Order>) {
        let order_id = order.id();
        let mut remaining = self.config.max_rechecks;

        loop {
            match self.check(&order).await {
                Ok(true) => {
                    info!(%order_id, "order_ready");
                    self.remove_handle(&order_id);
                    let _ = ready.send(order).await;
                    return;
                }
                Ok(false) => {}
                Err(error) => {
                    warn!(%order_id, %error, "confirmation check failed, counts as a recheck attempt");
                }
            }

            if remaining == 0 {
                warn!(%order_id, "pending_exhausted");
                crate::metrics::record_pending_exhausted();
                self.remove_handle(&order_id);
                return;
            }
            remaining -= 1;

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(%order_id, "pending queue shutting down, abandoning order");
                    self.remove_handle(&order_id);
                    return;
                }
                _ = token.cancelled() => {
                    debug!(%order_id, "pending timer superseded by resubmit");
                    return;
                }
                _ = tokio::time::sleep(self.config.recheck_delay) => {}
            }
        }
    }

    /// Remove `order_id`'s timer handle, decrementing [`Self::depth`] only
    /// if an entry was actually present (a resubmit's superseded task must
    /// not double-decrement — its handle was already overwritten, not
    /// removed, by the resubmitting [`Self::submit`] call).
    fn remove_handle(&self, order_id: &OrderId) {
        if self.handles.lock().unwrap().remove(order_id).is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// One confirmation check: is `order` ready to be promoted?
    async fn check(&self, order: &Order) -> Result<bool, CheckError<O::Error>> {
        let tx_hash = TxHash::from(order.source_tx.0);
        let receipt = self
            .registry
            .receipt(&order.source_chain, tx_hash)
            .await
            .map_err(CheckError::Registry)?;
        let confirmations =
            self.registry.confirmations_of(&order.source_chain, &receipt).await.map_err(CheckError::Registry)?;

        let mut total_value = U256::ZERO;
        for input in &order.inputs {
            let value = self
                .oracle
                .usd_value(&order.source_chain, input.token_id, input.amount)
                .await
                .map_err(CheckError::Oracle)?;
            total_value += value;
        }

        let band = self.bands.get(&order.source_chain).ok_or_else(|| {
            CheckError::MissingBand(order.source_chain.clone())
        })?;
        let required = band.required(total_value);

        Ok(confirmations >= required)
    }
}

#[derive(Debug, thiserror::Error)]
enum CheckError<E: core::error::Error + 'static> {
    #[error("chain registry error: {0}")]
    Registry(#[source] RegistryError),
    #[error("price oracle error: {0}")]
    Oracle(#[source] E),
    #[error("no confirmation band configured for chain '{0}'")]
    MissingBand(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainConfig;
    use crate::order::{Input, Output};

    struct FixedOracle(U256);

    impl PriceOracle for FixedOracle {
        type Error = std::convert::Infallible;

        async fn usd_value(&self, _chain: &str, _token: Opaque32, amount: U256) -> Result<U256, Self::Error> {
            Ok(amount * self.0)
        }
    }

    fn sample_order() -> Order {
        Order::new(
            Opaque32([1; 32]),
            "EVM-97".into(),
            "EVM-10200".into(),
            1_000,
            0,
            U256::ZERO,
            vec![Input { token_id: Opaque32([2; 32]), amount: U256::from(10u64) }],
            vec![Output { token_id: Opaque32([3; 32]), amount: U256::from(10u64), beneficiary: Opaque32([4; 32]) }],
            None,
            Opaque32([9; 32]),
        )
        .unwrap()
    }

    #[test]
    fn resubmit_cancels_prior_handle() {
        // Exercise the bookkeeping in isolation, without needing a live
        // chain registry: two inserts for the same order id must observe
        // the first token getting cancelled.
        let handles: Mutex<HashMap<OrderId, CancellationToken>> = Mutex::new(HashMap::new());
        let order_id = sample_order().id();

        let first = CancellationToken::new();
        handles.lock().unwrap().insert(order_id, first.clone());
        assert!(!first.is_cancelled());

        let second = CancellationToken::new();
        let previous = handles.lock().unwrap().insert(order_id, second);
        if let Some(previous) = previous {
            previous.cancel();
        }
        assert!(first.is_cancelled());
    }

    #[allow(dead_code)]
    fn registry_stub_config() -> ChainConfig {
        ChainConfig { chain_id: "EVM-97".into(), rpc_url: "http://localhost:8545".into() }
    }
}
