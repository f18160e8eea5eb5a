//! A fixed-price-table [`PriceOracle`] (spec.md §4.3's "a price oracle
//! provided as a collaborator"): looks up a configured USD-per-unit rate for
//! each `(chain, token)` pair.
//!
//! Grounded in the donor's `pricing::static_client::StaticPricingClient`,
//! which did the analogous thing for a different question (is this fill
//! profitable, a strategy concern out of scope for the core) — generalized
//! here to the core's actual need, a USD value lookup for the
//! confirmation-policy calculation.

use crate::order::Opaque32;
use crate::pending::PriceOracle;
use alloy::primitives::U256;
use std::collections::HashMap;

/// A `(chain, token)` → USD-per-unit rate table, read-only after
/// construction.
#[derive(Debug, Clone)]
pub struct StaticPriceOracle {
    rates: HashMap<(String, Opaque32), U256>,
}

impl StaticPriceOracle {
    pub fn new(rates: HashMap<(String, Opaque32), U256>) -> Self {
        Self { rates }
    }
}

impl PriceOracle for StaticPriceOracle {
    type Error = UnknownTokenError;

    async fn usd_value(&self, chain: &str, token: Opaque32, amount: U256) -> Result<U256, Self::Error> {
        let rate = self
            .rates
            .get(&(chain.to_string(), token))
            .copied()
            .ok_or_else(|| UnknownTokenError { chain: chain.to_string(), token })?;
        Ok(amount.saturating_mul(rate))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("no price configured for chain '{chain}' token {token}")]
pub struct UnknownTokenError {
    chain: String,
    token: Opaque32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_returns_scaled_value() {
        let token = Opaque32([1; 32]);
        let mut rates = HashMap::new();
        rates.insert(("EVM-97".to_string(), token), U256::from(2u64));
        let oracle = StaticPriceOracle::new(rates);

        let value = oracle.usd_value("EVM-97", token, U256::from(10u64)).await.unwrap();
        assert_eq!(value, U256::from(20u64));
    }

    #[tokio::test]
    async fn unknown_token_is_an_error() {
        let oracle = StaticPriceOracle::new(HashMap::new());
        let err = oracle.usd_value("EVM-97", Opaque32([9; 32]), U256::from(1u64)).await.unwrap_err();
        assert_eq!(err.chain, "EVM-97");
    }
}
