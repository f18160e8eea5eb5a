//! Concrete [`PriceOracle`](crate::pending::PriceOracle) implementations
//! used to compute an order's USD-equivalent input value for the
//! confirmation policy (spec.md §4.3).

mod http_oracle;
mod static_oracle;

pub use http_oracle::{HttpPriceOracle, HttpPriceOracleError};
pub use static_oracle::{StaticPriceOracle, UnknownTokenError};

use crate::order::Opaque32;
use crate::pending::PriceOracle;
use alloy::primitives::U256;

/// Whichever [`PriceOracle`] the configuration selected, erased behind one
/// concrete type so [`crate::pending::PendingQueue`] (generic over a single
/// oracle type) doesn't need to know which one is live. Mirrors the
/// donor's own per-deployment choice between a fixed-rate and a live-quote
/// pricing client (`fixed_pricing_client.rs` vs. `pricing/radius_client.rs`),
/// generalized into an enum rather than a compile-time feature choice
/// since this core picks the oracle from an environment variable.
#[derive(Debug, Clone)]
pub enum AnyPriceOracle {
    Http(HttpPriceOracle),
    Static(StaticPriceOracle),
}

#[derive(Debug, thiserror::Error)]
pub enum AnyPriceOracleError {
    #[error(transparent)]
    Http(#[from] HttpPriceOracleError),
    #[error(transparent)]
    Static(#[from] UnknownTokenError),
}

impl PriceOracle for AnyPriceOracle {
    type Error = AnyPriceOracleError;

    async fn usd_value(&self, chain: &str, token: Opaque32, amount: U256) -> Result<U256, Self::Error> {
        match self {
            AnyPriceOracle::Http(oracle) => Ok(oracle.usd_value(chain, token, amount).await?),
            AnyPriceOracle::Static(oracle) => Ok(oracle.usd_value(chain, token, amount).await?),
        }
    }
}
