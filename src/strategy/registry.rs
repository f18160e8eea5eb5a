//! The evaluation algorithm (spec.md §4.4, steps 1–5).

use super::{EvaluationDropReason, FillStrategy, StrategyVerdict};
use crate::order::Order;
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, instrument};

/// An ordered, registration-order-preserving set of strategies.
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn FillStrategy>>,
    min_profit_score: f64,
}

impl StrategyRegistry {
    /// `strategies` are registered in the order given — this order is the
    /// tie-break for equally-profitable strategies (spec.md §4.4).
    pub fn new(strategies: Vec<Arc<dyn FillStrategy>>, min_profit_score: f64) -> Self {
        Self { strategies, min_profit_score }
    }

    /// Run the evaluation algorithm for `order`: `can_fill` on every
    /// strategy in parallel, `profitability` on the survivors, sort
    /// descending with a stable registration-order tie-break, and apply the
    /// profitability floor.
    #[instrument(skip_all, fields(order_id = %order.id(), candidates = self.strategies.len()))]
    pub async fn evaluate(
        &self,
        order: &Order,
    ) -> Result<(Arc<dyn FillStrategy>, StrategyVerdict), EvaluationDropReason> {
        let can_fill_results =
            join_all(self.strategies.iter().map(|strategy| strategy.can_fill(order))).await;

        let mut eligible: Vec<Arc<dyn FillStrategy>> = self
            .strategies
            .iter()
            .zip(can_fill_results)
            .filter_map(|(strategy, can_fill)| can_fill.then(|| strategy.clone()))
            .collect();

        if eligible.is_empty() {
            debug!(order_id = %order.id(), "no_viable_strategy");
            return Err(EvaluationDropReason::NoViableStrategy);
        }

        let scores = join_all(eligible.iter().map(|strategy| strategy.profitability(order))).await;
        let mut scored: Vec<(Arc<dyn FillStrategy>, f64)> = eligible.drain(..).zip(scores).collect();

        // Stable sort: ties keep the registration order already present in
        // `scored` (spec.md §4.4 "Tie-break: stable by registration order").
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (best_strategy, best_score) = scored.into_iter().next().expect("eligible is non-empty");

        if best_score < self.min_profit_score {
            debug!(order_id = %order.id(), score = best_score, floor = self.min_profit_score, "below_threshold");
            return Err(EvaluationDropReason::BelowThreshold);
        }

        let verdict = StrategyVerdict { strategy_name: best_strategy.name().to_string(), profit_score: best_score };
        Ok((best_strategy, verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Input, Opaque32, Output};
    use crate::strategy::{BidSubmitter, ExecutionOutcome};
    use alloy::primitives::U256;
    use async_trait::async_trait;

    struct FixedStrategy {
        name: &'static str,
        can_fill: bool,
        score: f64,
    }

    #[async_trait]
    impl FillStrategy for FixedStrategy {
        fn name(&self) -> &str {
            self.name
        }

        async fn can_fill(&self, _order: &Order) -> bool {
            self.can_fill
        }

        async fn profitability(&self, _order: &Order) -> f64 {
            self.score
        }

        async fn execute(&self, _order: &Order, _bid_client: Option<&dyn BidSubmitter>) -> ExecutionOutcome {
            ExecutionOutcome::Failed("unused in tests".into())
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

    #[tokio::test]
    async fn no_eligible_strategy_drops_with_no_viable_strategy() {
        let registry = StrategyRegistry::new(
            vec![Arc::new(FixedStrategy { name: "a", can_fill: false, score: 1.0 })],
            0.0,
        );
        let err = registry.evaluate(&sample_order()).await.unwrap_err();
        assert_eq!(err, EvaluationDropReason::NoViableStrategy);
    }

    #[tokio::test]
    async fn best_score_below_floor_drops_with_below_threshold() {
        let registry = StrategyRegistry::new(
            vec![Arc::new(FixedStrategy { name: "a", can_fill: true, score: 0.01 })],
            0.05,
        );
        let err = registry.evaluate(&sample_order()).await.unwrap_err();
        assert_eq!(err, EvaluationDropReason::BelowThreshold);
    }

    #[tokio::test]
    async fn highest_score_wins() {
        let registry = StrategyRegistry::new(
            vec![
                Arc::new(FixedStrategy { name: "low", can_fill: true, score: 0.1 }),
                Arc::new(FixedStrategy { name: "high", can_fill: true, score: 0.9 }),
            ],
            0.0,
        );
        let (strategy, verdict) = registry.evaluate(&sample_order()).await.unwrap();
        assert_eq!(strategy.name(), "high");
        assert_eq!(verdict.strategy_name, "high");
    }

    #[tokio::test]
    async fn tie_breaks_by_registration_order() {
        let registry = StrategyRegistry::new(
            vec![
                Arc::new(FixedStrategy { name: "first", can_fill: true, score: 0.5 }),
                Arc::new(FixedStrategy { name: "second", can_fill: true, score: 0.5 }),
            ],
            0.0,
        );
        let (strategy, _) = registry.evaluate(&sample_order()).await.unwrap();
        assert_eq!(strategy.name(), "first");
    }
}
