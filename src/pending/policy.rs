//! The confirmation policy (spec.md §4.3): a pure, deterministic function
//! from a source chain and a USD-equivalent order value to a required
//! confirmation count.

use alloy::primitives::U256;
use serde::Deserialize;

/// One source chain's confirmation band. `required(value)` interpolates
/// linearly between `(min_amount, min_conf)` and `(max_amount, max_conf)`,
/// clamping outside that range — below `min_amount` always requires
/// `min_conf`; at or above `max_amount` always requires `max_conf` (spec.md
/// §8 P2).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ConfirmationBand {
    pub min_amount: U256,
    pub max_amount: U256,
    pub min_conf: u64,
    pub max_conf: u64,
}

impl ConfirmationBand {
    /// The number of confirmations required for an order whose total input
    /// value (USD-equivalent) is `value`.
    pub fn required(&self, value: U256) -> u64 {
        if value <= self.min_amount {
            return self.min_conf;
        }
        if value >= self.max_amount {
            return self.max_conf;
        }

        let span = self.max_amount - self.min_amount;
        let offset = value - self.min_amount;
        let conf_span = self.max_conf.saturating_sub(self.min_conf);

        // value is strictly between min_amount and max_amount here, so span
        // is nonzero; U256 division truncates, matching the "nondecreasing"
        // requirement of P2 without ever rounding above max_conf.
        let interpolated = (offset.saturating_mul(U256::from(conf_span))) / span;
        self.min_conf + interpolated.to::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band() -> ConfirmationBand {
        ConfirmationBand {
            min_amount: U256::from(100u64),
            max_amount: U256::from(1_000u64),
            min_conf: 1,
            max_conf: 12,
        }
    }

    #[test]
    fn below_min_amount_clamps_to_min_conf() {
        assert_eq!(band().required(U256::from(1u64)), 1);
        assert_eq!(band().required(U256::from(100u64)), 1);
    }

    #[test]
    fn at_or_above_max_amount_clamps_to_max_conf() {
        assert_eq!(band().required(U256::from(1_000u64)), 12);
        assert_eq!(band().required(U256::from(1_000_000u64)), 12);
    }

    #[test]
    fn midpoint_interpolates_between_bounds() {
        let required = band().required(U256::from(550u64));
        assert!(required > 1 && required < 12, "required={required} should sit strictly between bounds");
    }

    #[test]
    fn required_is_nondecreasing_in_value() {
        let band = band();
        let samples = [50u64, 100, 200, 400, 600, 800, 1_000, 2_000];
        let mut prev = 0;
        for sample in samples {
            let required = band.required(U256::from(sample));
            assert!(required >= prev, "required must be nondecreasing in value");
            prev = required;
        }
    }
}
