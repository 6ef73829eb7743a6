//! Constant product (x*y=k) curve math with exact integer rounding
//!
//! Instant swaps pay the pool fee; streaming sales executed by the virtual
//! order engine do not. Outputs always round down so the pool keeps the
//! remainder.

use crate::error::{MathError, Result, TwammError};
use crate::fixed_point::{mul_div, to_u128, U256};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tidal_config::PoolSettings;

/// Proportional instant swap fee: `numerator / denominator` of the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSchedule {
    numerator: u128,
    denominator: u128,
}

impl FeeSchedule {
    pub fn new(numerator: u32, denominator: u32) -> Result<Self> {
        if denominator == 0 || numerator >= denominator {
            return Err(TwammError::InvalidConfig(format!(
                "fee {}/{} must be a fraction below one",
                numerator, denominator
            )));
        }
        Ok(Self {
            numerator: numerator.into(),
            denominator: denominator.into(),
        })
    }

    pub fn from_settings(settings: &PoolSettings) -> Result<Self> {
        Self::new(settings.fee_numerator, settings.fee_denominator)
    }

    /// Part of each unit that reaches the curve (997 for a 3/1000 fee)
    pub fn retained(&self) -> u128 {
        self.denominator - self.numerator
    }

    pub fn denominator(&self) -> u128 {
        self.denominator
    }

    /// Fee as a fraction, for display
    pub fn as_decimal(&self) -> Decimal {
        Decimal::from_u128(self.numerator).unwrap_or_default()
            / Decimal::from_u128(self.denominator).unwrap_or(Decimal::ONE)
    }
}

/// Constant product math functions with floor rounding
pub struct ConstantProduct;

impl ConstantProduct {
    /// Exact output of an instant swap
    ///
    /// `out = reserve_out * in * (den - num) / (reserve_in * den + in * (den - num))`,
    /// which is `reserve_out * in_after_fee / (reserve_in + in_after_fee)` without
    /// rounding `in_after_fee` first.
    pub fn calculate_output_amount(
        amount_in: u128,
        reserve_in: u128,
        reserve_out: u128,
        fee: FeeSchedule,
    ) -> Result<u128> {
        if amount_in == 0 {
            return Err(TwammError::InvalidAmount {
                reason: "swap input must be positive",
            });
        }
        if reserve_in == 0 || reserve_out == 0 {
            return Err(TwammError::InsufficientLiquidity {
                reason: "pool has no reserves",
            });
        }

        let in_after_fee = U256::from(amount_in) * U256::from(fee.retained());
        let denominator = U256::from(reserve_in) * U256::from(fee.denominator()) + in_after_fee;
        let out = mul_div(U256::from(reserve_out), in_after_fee, denominator)?;
        Ok(to_u128(out)?)
    }

    /// Fee-free output for selling `amount_in` along the curve in one step
    pub fn streaming_output_amount(
        amount_in: u128,
        reserve_in: u128,
        reserve_out: u128,
    ) -> std::result::Result<u128, MathError> {
        let denominator = U256::from(reserve_in) + U256::from(amount_in);
        to_u128(mul_div(
            U256::from(reserve_out),
            U256::from(amount_in),
            denominator,
        )?)
    }

    /// Price of the input asset in units of the output asset
    ///
    /// `None` when a reserve is empty or too large for `Decimal`.
    pub fn spot_price(reserve_in: u128, reserve_out: u128) -> Option<Decimal> {
        let reserve_in = Decimal::from_u128(reserve_in)?;
        let reserve_out = Decimal::from_u128(reserve_out)?;
        reserve_out.checked_div(reserve_in)
    }

    /// Percentage move of the spot price caused by an instant swap
    pub fn calculate_price_impact(
        amount_in: u128,
        reserve_in: u128,
        reserve_out: u128,
        fee: FeeSchedule,
    ) -> Result<Option<Decimal>> {
        let amount_out = Self::calculate_output_amount(amount_in, reserve_in, reserve_out, fee)?;

        let price_before = Self::spot_price(reserve_in, reserve_out);
        let price_after = reserve_in
            .checked_add(amount_in)
            .and_then(|new_in| Self::spot_price(new_in, reserve_out - amount_out));

        Ok(match (price_before, price_after) {
            (Some(before), Some(after)) => (before - after)
                .checked_div(before)
                .and_then(|ratio| ratio.checked_mul(dec!(100))),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fee_30_bps() -> FeeSchedule {
        FeeSchedule::new(3, 1000).unwrap()
    }

    #[test]
    fn test_exact_instant_swap() {
        let out = ConstantProduct::calculate_output_amount(
            1_000_000,
            100_000_000,
            100_000_000,
            fee_30_bps(),
        )
        .unwrap();

        // floor(100000000 * 997000 / (100000000 + 997000))
        assert_eq!(out, 100_000_000u128 * 997_000 / 100_997_000);
        assert_eq!(out, 987_158);
    }

    #[test]
    fn test_small_swap_matches_reference_numbers() {
        // 100 in, 1000:2000 reserves, 0.3% fee -> ~181.32 out
        let out = ConstantProduct::calculate_output_amount(100, 1000, 2000, fee_30_bps()).unwrap();
        assert_eq!(out, 181);
    }

    #[test]
    fn test_swap_rejects_bad_inputs() {
        assert!(matches!(
            ConstantProduct::calculate_output_amount(0, 10, 10, fee_30_bps()),
            Err(TwammError::InvalidAmount { .. })
        ));
        assert!(matches!(
            ConstantProduct::calculate_output_amount(5, 0, 10, fee_30_bps()),
            Err(TwammError::InsufficientLiquidity { .. })
        ));
    }

    #[test]
    fn test_streaming_output_has_no_fee() {
        let streamed = ConstantProduct::streaming_output_amount(10_000, 100_000_000, 100_000_000)
            .unwrap();
        assert_eq!(streamed, 9_999);

        let instant = ConstantProduct::calculate_output_amount(
            10_000,
            100_000_000,
            100_000_000,
            fee_30_bps(),
        )
        .unwrap();
        assert!(instant < streamed);
    }

    #[test]
    fn test_fee_schedule_validation() {
        assert!(FeeSchedule::new(1000, 1000).is_err());
        assert!(FeeSchedule::new(0, 0).is_err());
        assert_eq!(fee_30_bps().retained(), 997);
        assert_eq!(fee_30_bps().as_decimal(), dec!(0.003));
    }

    #[test]
    fn test_spot_price_and_impact() {
        assert_eq!(ConstantProduct::spot_price(1000, 2000), Some(dec!(2)));
        assert_eq!(ConstantProduct::spot_price(0, 2000), None);

        let impact =
            ConstantProduct::calculate_price_impact(100, 1000, 2000, fee_30_bps())
                .unwrap()
                .unwrap();
        assert!(impact > dec!(0));
        assert!(impact < dec!(20));
    }
}
