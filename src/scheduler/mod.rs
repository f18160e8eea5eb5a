//! Execution Scheduler (spec.md §4.5): a bounded global evaluation queue
//! feeding per-destination-chain serial execution queues.
//!
//! The per-chain concurrency-1 property is load-bearing (spec.md §4.5):
//! it's what guarantees strictly monotonically-increasing nonces from the
//! filler account on any one chain, eliminating nonce-collision failures —
//! generalized from the `tokio::sync::Semaphore` + per-key `mpsc` worker
//! pattern used for comparable order-routing fan-out elsewhere in the
//! retrieved pack.

use crate::order::Order;
use crate::strategy::{BidSubmitter, EvaluationDropReason, ExecutionOutcome, StrategyRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

struct ExecutionJob {
    order: Order,
    strategy: Arc<dyn crate::strategy::FillStrategy>,
}

/// Tunables for the scheduler (spec.md §4.5).
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub max_concurrent_orders: usize,
    pub shutdown_drain_deadline: Duration,
}

/// Owns the global evaluation queue (a bounded semaphore) and one serial
/// worker per destination chain, created lazily on first use.
pub struct ExecutionScheduler {
    registry: Arc<StrategyRegistry>,
    bid_client: Option<Arc<dyn BidSubmitter>>,
    evaluation_permits: Arc<Semaphore>,
    chain_queues: Mutex<HashMap<String, mpsc::Sender<ExecutionJob>>>,
    workers: Mutex<JoinSet<()>>,
    evaluations: Mutex<JoinSet<()>>,
    shutdown: CancellationToken,
    config: SchedulerConfig,
}

impl ExecutionScheduler {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        bid_client: Option<Arc<dyn BidSubmitter>>,
        config: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            bid_client,
            evaluation_permits: Arc::new(Semaphore::new(config.max_concurrent_orders)),
            chain_queues: Mutex::new(HashMap::new()),
            workers: Mutex::new(JoinSet::new()),
            evaluations: Mutex::new(JoinSet::new()),
            shutdown,
            config,
        })
    }

    /// Submit an order to the global evaluation queue. Fire-and-forget: the
    /// evaluation (and, if viable, the dispatch to the per-chain execution
    /// queue) runs on a spawned task gated by the semaphore. A panic or
    /// error in one evaluation never poisons the queue for others.
    #[instrument(skip_all, fields(order_id = %order.id()))]
    pub fn evaluate(self: &Arc<Self>, order: Order) {
        if self.shutdown.is_cancelled() {
            warn!(order_id = %order.id(), "scheduler is shutting down, refusing new order");
            return;
        }

        let scheduler = self.clone();
        let permits = self.evaluation_permits.clone();
        self.evaluations.lock().unwrap().spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            scheduler.evaluate_and_dispatch(order).await;
        });
    }

    async fn evaluate_and_dispatch(self: Arc<Self>, order: Order) {
        let order_id = order.id();
        let started = std::time::Instant::now();
        let outcome = self.registry.evaluate(&order).await;
        crate::metrics::record_evaluation_duration(started.elapsed());
        match outcome {
            Ok((strategy, verdict)) => {
                info!(%order_id, strategy = %verdict.strategy_name, score = verdict.profit_score, "strategy_selected");
                self.dispatch(order, strategy).await;
            }
            Err(reason) => {
                info!(%order_id, reason = reason.as_str(), "order_dropped");
                crate::metrics::record_order_dropped(reason.as_str());
            }
        }
    }

    /// Enqueue `strategy.execute(order)` on the serial worker for
    /// `order.dest_chain`, creating that worker if this is its first job.
    async fn dispatch(self: Arc<Self>, order: Order, strategy: Arc<dyn crate::strategy::FillStrategy>) {
        let dest_chain = order.dest_chain.clone();
        let sender = self.chain_sender(&dest_chain);
        if sender.send(ExecutionJob { order, strategy }).await.is_err() {
            warn!(chain = %dest_chain, "execution worker for chain is gone; order lost at dispatch");
        }
    }

    fn chain_sender(self: &Arc<Self>, dest_chain: &str) -> mpsc::Sender<ExecutionJob> {
        let mut queues = self.chain_queues.lock().unwrap();
        if let Some(sender) = queues.get(dest_chain) {
            return sender.clone();
        }

        let (tx, rx) = mpsc::channel(256);
        let scheduler = self.clone();
        let chain = dest_chain.to_string();
        self.workers.lock().unwrap().spawn(async move {
            scheduler.run_chain_worker(chain, rx).await;
        });
        queues.insert(dest_chain.to_string(), tx.clone());
        tx
    }

    /// Concurrency-1 per chain: jobs are drained strictly in FIFO order,
    /// one at a time, so nonces on this chain never race (spec.md §4.5).
    async fn run_chain_worker(self: Arc<Self>, chain: String, mut rx: mpsc::Receiver<ExecutionJob>) {
        while let Some(job) = rx.recv().await {
            let order_id = job.order.id();
            let outcome = job.strategy.execute(&job.order, self.bid_client.as_deref()).await;
            match outcome {
                ExecutionOutcome::Filled { tx_hash } => {
                    info!(%order_id, chain = %chain, %tx_hash, "order_filled");
                    crate::metrics::record_order_filled(&chain, job.strategy.name());
                }
                ExecutionOutcome::BidSubmitted { tx_hash, block_hash } => {
                    info!(%order_id, chain = %chain, %tx_hash, %block_hash, "bid_submitted");
                    crate::metrics::record_order_filled(&chain, job.strategy.name());
                    crate::metrics::record_bid_submitted(true);
                }
                ExecutionOutcome::Failed(reason) => {
                    warn!(%order_id, chain = %chain, %reason, "strategy_error");
                    crate::metrics::record_strategy_error(job.strategy.name());
                }
            }
        }
    }

    /// Stop accepting new orders, then wait for in-flight evaluations and
    /// per-chain workers to drain, up to the configured deadline. Anything
    /// still running after the deadline is aborted.
    #[instrument(skip_all)]
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        // Dropping every chain sender closes each worker's channel once its
        // queued jobs are drained, letting the worker loops exit on their own.
        self.chain_queues.lock().unwrap().clear();

        let deadline = self.config.shutdown_drain_deadline;
        let mut evaluations = std::mem::replace(&mut *self.evaluations.lock().unwrap(), JoinSet::new());
        if tokio::time::timeout(deadline, async { while evaluations.join_next().await.is_some() {} })
            .await
            .is_err()
        {
            warn!("evaluation queue drain deadline exceeded; aborting remaining tasks");
            evaluations.abort_all();
        }

        let mut workers = std::mem::replace(&mut *self.workers.lock().unwrap(), JoinSet::new());
        if tokio::time::timeout(deadline, async { while workers.join_next().await.is_some() {} }).await.is_err() {
            warn!("execution queue drain deadline exceeded; aborting remaining tasks");
            workers.abort_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Input, Opaque32, Output};
    use crate::strategy::FillStrategy;
    use alloy::primitives::{TxHash, U256};
    use async_trait::async_trait;
    use tokio::sync::mpsc as tokio_mpsc;

    struct RecordingStrategy {
        executed: tokio_mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl FillStrategy for RecordingStrategy {
        fn name(&self) -> &str {
            "recording"
        }

        async fn can_fill(&self, _order: &Order) -> bool {
            true
        }

        async fn profitability(&self, _order: &Order) -> f64 {
            1.0
        }

        async fn execute(&self, order: &Order, _bid_client: Option<&dyn BidSubmitter>) -> ExecutionOutcome {
            let _ = self.executed.send(order.id().to_string());
            ExecutionOutcome::Filled { tx_hash: TxHash::ZERO }
        }
    }

    fn sample_order(nonce: u64, dest: &str) -> Order {
        Order::new(
            Opaque32([1; 32]),
            "EVM-97".into(),
            dest.into(),
            1_000,
            nonce,
            U256::ZERO,
            vec![Input { token_id: Opaque32([2; 32]), amount: U256::from(10u64) }],
            vec![Output { token_id: Opaque32([3; 32]), amount: U256::from(10u64), beneficiary: Opaque32([4; 32]) }],
            None,
            Opaque32([9; 32]),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn evaluated_orders_reach_execution() {
        let (tx, mut rx) = tokio_mpsc::unbounded_channel();
        let strategy: Arc<dyn FillStrategy> = Arc::new(RecordingStrategy { executed: tx });
        let registry = Arc::new(StrategyRegistry::new(vec![strategy], 0.0));
        let scheduler = ExecutionScheduler::new(
            registry,
            None,
            SchedulerConfig { max_concurrent_orders: 4, shutdown_drain_deadline: Duration::from_secs(1) },
            CancellationToken::new(),
        );

        scheduler.evaluate(sample_order(0, "EVM-10200"));
        let executed = rx.recv().await.expect("execution should run");
        assert!(!executed.is_empty());
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn distinct_destination_chains_get_distinct_workers() {
        let (tx, mut rx) = tokio_mpsc::unbounded_channel();
        let strategy: Arc<dyn FillStrategy> = Arc::new(RecordingStrategy { executed: tx });
        let registry = Arc::new(StrategyRegistry::new(vec![strategy], 0.0));
        let scheduler = ExecutionScheduler::new(
            registry,
            None,
            SchedulerConfig { max_concurrent_orders: 4, shutdown_drain_deadline: Duration::from_secs(1) },
            CancellationToken::new(),
        );

        scheduler.evaluate(sample_order(0, "EVM-10200"));
        scheduler.evaluate(sample_order(1, "EVM-84532"));
        rx.recv().await.expect("first order executes");
        rx.recv().await.expect("second order executes");

        assert_eq!(scheduler.chain_queues.lock().unwrap().len(), 2);
        scheduler.shutdown().await;
    }
}
