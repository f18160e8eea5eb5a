//! Strategy Registry & Evaluator (spec.md §4.4).
//!
//! Generalizes the donor's single hardcoded filling strategy (aggregate
//! escrowed inputs, submit via the tx cache) into a pluggable, ordered set
//! of [`FillStrategy`] implementations evaluated in parallel per order.

mod registry;

pub use registry::StrategyRegistry;

use crate::order::Order;
use alloy::primitives::{B256, TxHash};
use async_trait::async_trait;

/// What a strategy did with an order it was dispatched (spec.md §4.4
/// `execute(order, bid_client?) → ExecutionResult`).
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Filled directly on the destination chain.
    Filled { tx_hash: TxHash },
    /// Routed through the coprocessor bid client instead of a direct tx.
    BidSubmitted { tx_hash: TxHash, block_hash: B256 },
    /// Execution was attempted and failed; terminal for this order.
    Failed(String),
}

/// Read-only access to the coprocessor, handed to strategies that choose to
/// route through it. Strategies never touch the bid store or the raw
/// `subxt` session directly — see [`crate::bid::BidClient`], the sole
/// implementation.
#[async_trait]
pub trait BidSubmitter: Send + Sync {
    async fn submit_bid(&self, commitment: [u8; 32], user_op: Vec<u8>) -> Result<ExecutionOutcome, String>;
}

/// A pluggable fill strategy (spec.md §4.4).
///
/// `Vec<Arc<dyn FillStrategy>>` is evaluated in registration order;
/// `can_fill`/`profitability` run concurrently across the whole registry,
/// so implementations must be side-effect-free with respect to each other.
#[async_trait]
pub trait FillStrategy: Send + Sync {
    /// Human-readable strategy name, used for logging and the registration-
    /// order tie-break.
    fn name(&self) -> &str;

    /// Whether this strategy is capable of filling `order` at all (ignoring
    /// profitability).
    async fn can_fill(&self, order: &Order) -> bool;

    /// This strategy's profitability score for `order`. A real number;
    /// strictly positive means profitable. Only called for strategies whose
    /// `can_fill` returned `true`.
    async fn profitability(&self, order: &Order) -> f64;

    /// Execute the fill. `bid_client` is `Some` when a coprocessor session
    /// is configured; strategies that never bid may ignore it.
    async fn execute(
        &self,
        order: &Order,
        bid_client: Option<&dyn BidSubmitter>,
    ) -> ExecutionOutcome;
}

/// `{strategy_name, profit_score}` (spec.md §3) — transient, lives only
/// inside the evaluator.
#[derive(Debug, Clone)]
pub struct StrategyVerdict {
    pub strategy_name: String,
    pub profit_score: f64,
}

/// Why the evaluator dropped an order without dispatching it for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationDropReason {
    /// No registered strategy returned `can_fill == true`.
    NoViableStrategy,
    /// At least one strategy could fill, but its score was below the
    /// configured `min_profit_score` floor.
    BelowThreshold,
}

impl EvaluationDropReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            EvaluationDropReason::NoViableStrategy => "no_viable_strategy",
            EvaluationDropReason::BelowThreshold => "below_threshold",
        }
    }
}
