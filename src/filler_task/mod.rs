//! Orchestration wiring for the intent-filler core: connects every
//! collaborator module (the chain registry, order ingestion, the pending-
//! confirmation queue, the strategy registry, the execution scheduler, the
//! coprocessor bid client, and the bid store) and runs the engine's one
//! control loop.
//!
//! Concrete [`FillStrategy`](crate::strategy::FillStrategy) implementations
//! are a collaborator input, not something this core invents (its business
//! math — DEX routing, gas pricing, output sizing — is explicitly out of
//! scope per spec.md §1); [`FillerTask::initialize`] takes the registered
//! strategies as a constructor argument, left to the embedder to supply.

use crate::bid::PersistingBidClient;
use crate::chain::ChainClientRegistry;
use crate::ingestion::{GatewayAbiDecoder, OrderIngestion};
use crate::order::Order;
use crate::pending::PendingQueue;
use crate::pricing::AnyPriceOracle;
use crate::scheduler::ExecutionScheduler;
use crate::status::StatusClient;
use crate::strategy::{BidSubmitter, FillStrategy, StrategyRegistry};
use crate::{Config, service};
use eyre::{Report, Result, bail};
use init4_bin_base::deps::tracing::{debug, error, info, instrument};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod initialization;

/// The assembled intent-filler engine. Owns every long-lived collaborator
/// and the cancellation token that tears them all down together.
pub struct FillerTask {
    chain_registry: Arc<ChainClientRegistry>,
    ingestion: OrderIngestion,
    pending_queue: Arc<PendingQueue<AnyPriceOracle>>,
    scheduler: Arc<ExecutionScheduler>,
    status_client: Option<StatusClient>,
    healthcheck_port: u16,
    cancellation_token: CancellationToken,
}

impl FillerTask {
    /// Connect every collaborator and assemble the engine.
    ///
    /// `strategies` are registered in the order given (spec.md §4.4
    /// tie-break rule); this core ships with none built in.
    #[instrument(skip_all)]
    pub async fn initialize(
        config: &Config,
        strategies: Vec<Arc<dyn FillStrategy>>,
        cancellation_token: CancellationToken,
    ) -> Result<Self> {
        crate::metrics::init();

        let signer = initialization::connect_signer(config.signer()).await?;
        let chain_registry = Arc::new(initialization::connect_chain_registry(config, &signer).await?);

        let price_oracle = initialization::build_price_oracle(config);
        let pending_queue = Arc::new(PendingQueue::new(
            chain_registry.clone(),
            Arc::new(price_oracle),
            config.confirmation_bands(),
            config.pending_config(),
            cancellation_token.clone(),
        ));

        let bid_client = initialization::connect_bid_client(config).await?;
        let bid_store = initialization::open_bid_store(config).await?;
        let persisting_bid_client: Arc<dyn BidSubmitter> =
            Arc::new(PersistingBidClient::new(bid_client, bid_store));

        let strategy_registry = Arc::new(StrategyRegistry::new(strategies, config.min_profit_score()));
        let scheduler = ExecutionScheduler::new(
            strategy_registry,
            Some(persisting_bid_client),
            config.scheduler_config(),
            cancellation_token.clone(),
        );

        let decoder = Arc::new(GatewayAbiDecoder);
        let ingestion = OrderIngestion::new(chain_registry.clone(), decoder, config.gateways());

        let status_client = config
            .status_api_url()
            .map(|url| StatusClient::new(url.to_string(), config.status_api_bearer_token().map(String::from)));

        Ok(Self {
            chain_registry,
            ingestion,
            pending_queue,
            scheduler,
            status_client,
            healthcheck_port: config.healthcheck_port(),
            cancellation_token,
        })
    }

    /// The order-status client, if one was configured (spec.md §6) — exposed
    /// for strategies or embedders that want to avoid double-filling an
    /// order someone else already filled.
    pub fn status_client(&self) -> Option<&StatusClient> {
        self.status_client.as_ref()
    }

    /// Read-only access to the chain client registry, for embedders wiring
    /// up their own [`FillStrategy`](crate::strategy::FillStrategy)
    /// implementations.
    pub fn chain_registry(&self) -> &Arc<ChainClientRegistry> {
        &self.chain_registry
    }

    /// Run the engine to completion: the healthcheck server and the order
    /// pipeline (ingestion → pending-confirmation → evaluation →
    /// execution), supervised together. Returns `Ok(())` on graceful
    /// cancellation or an error if either side exits unexpectedly.
    pub async fn run(self) -> Result<()> {
        let cancellation_token = self.cancellation_token.clone();
        let healthcheck_port = self.healthcheck_port;

        let result = tokio::try_join!(
            service::serve_healthcheck(healthcheck_port, cancellation_token.clone()),
            tokio::spawn(self.run_loop()).map_panic_as_report(),
        );

        if cancellation_token.is_cancelled() {
            return Ok(());
        }
        cancellation_token.cancel();
        match result {
            Ok(_) => bail!("filler task exited without cancellation"),
            Err(error) => Err(error),
        }
    }

    #[instrument(parent = None, skip(self))]
    async fn run_loop(self) -> Result<()> {
        info!("starting filler task");
        let started_at = std::time::Instant::now();
        let mut ingestion_rx = self.ingestion.spawn(self.cancellation_token.clone());
        let (ready_tx, mut ready_rx) = mpsc::channel::<Order>(256);
        let mut metrics_tick = tokio::time::interval(std::time::Duration::from_secs(15));
        metrics_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    debug!("filler task cancelled");
                    break;
                }
                maybe_order = ingestion_rx.recv() => {
                    match maybe_order {
                        Some(order) => self.pending_queue.submit(order, ready_tx.clone()),
                        None => {
                            if self.cancellation_token.is_cancelled() {
                                break;
                            }
                            error!("order ingestion exited on every configured chain");
                            self.cancellation_token.cancel();
                            bail!("order ingestion exited on every configured chain");
                        }
                    }
                }
                Some(order) = ready_rx.recv() => {
                    self.scheduler.evaluate(order);
                }
                _ = metrics_tick.tick() => {
                    crate::metrics::record_uptime(started_at.elapsed());
                    crate::metrics::record_pending_queue_depth(self.pending_queue.depth());
                }
            }
        }

        self.scheduler.shutdown().await;
        Ok(())
    }
}

/// Adapts a [`tokio::task::JoinHandle<Result<()>>`] into a plain
/// `Future<Output = Result<()>>`, surfacing a panic as an [`eyre::Report`]
/// the same way [`service::serve_healthcheck`] already does for the
/// healthcheck server.
trait MapPanicAsReport {
    async fn map_panic_as_report(self) -> Result<()>;
}

impl MapPanicAsReport for tokio::task::JoinHandle<Result<()>> {
    async fn map_panic_as_report(self) -> Result<()> {
        match self.await {
            Ok(result) => result,
            Err(error) if error.is_panic() => Err(Report::new(error).wrap_err("panic in filler task")),
            Err(_) => bail!("filler task cancelled unexpectedly"),
        }
    }
}
