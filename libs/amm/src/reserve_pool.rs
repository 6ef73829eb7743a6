//! Reserve Pool
//!
//! The two reserves available for instant trading and redemption, plus the
//! total LP share supply. Order proceeds and unsold streaming principal are
//! not part of the reserves; the engine moves value in and out of here only
//! as orders actually trade.

use crate::curve::{ConstantProduct, FeeSchedule};
use crate::error::{MathError, Result, TwammError};
use crate::fixed_point::{mul_div_ceil_u128, mul_div_u128, sqrt_product, U256};
use crate::order::{Asset, Direction};
use serde::Serialize;

/// Reserves and LP supply of one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReservePool {
    reserve_a: u128,
    reserve_b: u128,
    total_supply: u128,
}

/// Asset amounts moved by a liquidity change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiquidityAmounts {
    pub shares: u128,
    pub amount_a: u128,
    pub amount_b: u128,
}

impl ReservePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve_a(&self) -> u128 {
        self.reserve_a
    }

    pub fn reserve_b(&self) -> u128 {
        self.reserve_b
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn reserve_of(&self, asset: Asset) -> u128 {
        match asset {
            Asset::A => self.reserve_a,
            Asset::B => self.reserve_b,
        }
    }

    /// (reserve sold into, reserve bought from) for a trade direction
    pub fn in_out(&self, direction: Direction) -> (u128, u128) {
        (
            self.reserve_of(direction.sell_asset()),
            self.reserve_of(direction.buy_asset()),
        )
    }

    /// reserve_a * reserve_b, exact
    pub fn k(&self) -> U256 {
        U256::from(self.reserve_a) * U256::from(self.reserve_b)
    }

    pub fn is_empty(&self) -> bool {
        self.total_supply == 0
    }

    /// Replace the reserves after a committed virtualization pass
    pub(crate) fn set_reserves(&mut self, reserve_a: u128, reserve_b: u128) {
        self.reserve_a = reserve_a;
        self.reserve_b = reserve_b;
    }

    /// Seed an empty pool; mints floor(sqrt(amount_a * amount_b)) shares
    pub fn provide_initial_liquidity(
        &mut self,
        amount_a: u128,
        amount_b: u128,
    ) -> Result<LiquidityAmounts> {
        if self.total_supply != 0 {
            return Err(TwammError::InvalidAmount {
                reason: "pool already initialized",
            });
        }
        if amount_a == 0 || amount_b == 0 {
            return Err(TwammError::InvalidAmount {
                reason: "initial liquidity must include both assets",
            });
        }

        let shares = sqrt_product(amount_a, amount_b);
        if shares == 0 {
            return Err(TwammError::InvalidAmount {
                reason: "initial liquidity too small",
            });
        }

        self.reserve_a = amount_a;
        self.reserve_b = amount_b;
        self.total_supply = shares;

        Ok(LiquidityAmounts {
            shares,
            amount_a,
            amount_b,
        })
    }

    /// Assets needed to mint `shares`, rounded up
    pub fn quote_provide(&self, shares: u128) -> Result<LiquidityAmounts> {
        if shares == 0 {
            return Err(TwammError::InvalidAmount {
                reason: "shares to mint must be positive",
            });
        }
        if self.total_supply == 0 || self.reserve_a == 0 || self.reserve_b == 0 {
            return Err(TwammError::InvalidAmount {
                reason: "pool has no liquidity to match",
            });
        }

        let amount_a = mul_div_ceil_u128(shares, self.reserve_a, self.total_supply)?;
        let amount_b = mul_div_ceil_u128(shares, self.reserve_b, self.total_supply)?;

        // Reject now rather than half-way through the update
        self.reserve_a.checked_add(amount_a).ok_or(MathError::Overflow)?;
        self.reserve_b.checked_add(amount_b).ok_or(MathError::Overflow)?;
        self.total_supply.checked_add(shares).ok_or(MathError::Overflow)?;

        Ok(LiquidityAmounts {
            shares,
            amount_a,
            amount_b,
        })
    }

    /// Mint exactly `shares` against a proportional deposit
    pub fn provide_liquidity(&mut self, shares: u128) -> Result<LiquidityAmounts> {
        let amounts = self.quote_provide(shares)?;
        self.reserve_a += amounts.amount_a;
        self.reserve_b += amounts.amount_b;
        self.total_supply += shares;
        Ok(amounts)
    }

    /// Assets returned for burning `shares`, rounded down
    pub fn quote_remove(&self, shares: u128) -> Result<LiquidityAmounts> {
        if shares == 0 {
            return Err(TwammError::InvalidAmount {
                reason: "shares to burn must be positive",
            });
        }
        if shares > self.total_supply {
            return Err(TwammError::InsufficientShares {
                requested: shares,
                available: self.total_supply,
            });
        }

        Ok(LiquidityAmounts {
            shares,
            amount_a: mul_div_u128(shares, self.reserve_a, self.total_supply)?,
            amount_b: mul_div_u128(shares, self.reserve_b, self.total_supply)?,
        })
    }

    /// Burn `shares` and release the proportional reserves
    pub fn remove_liquidity(&mut self, shares: u128) -> Result<LiquidityAmounts> {
        let amounts = self.quote_remove(shares)?;
        self.reserve_a -= amounts.amount_a;
        self.reserve_b -= amounts.amount_b;
        self.total_supply -= shares;
        Ok(amounts)
    }

    /// Output of an instant swap against the current reserves
    pub fn quote_swap(&self, amount_in: u128, direction: Direction, fee: FeeSchedule) -> Result<u128> {
        let (reserve_in, reserve_out) = self.in_out(direction);
        let amount_out = ConstantProduct::calculate_output_amount(amount_in, reserve_in, reserve_out, fee)?;
        if amount_out == 0 {
            return Err(TwammError::InvalidAmount {
                reason: "swap output rounds to zero",
            });
        }
        reserve_in.checked_add(amount_in).ok_or(MathError::Overflow)?;
        Ok(amount_out)
    }

    /// Instant swap; the full input, fee included, stays in the reserves
    pub fn swap(&mut self, amount_in: u128, direction: Direction, fee: FeeSchedule) -> Result<u128> {
        let amount_out = self.quote_swap(amount_in, direction, fee)?;
        match direction {
            Direction::AToB => {
                self.reserve_a += amount_in;
                self.reserve_b -= amount_out;
            }
            Direction::BToA => {
                self.reserve_b += amount_in;
                self.reserve_a -= amount_out;
            }
        }
        Ok(amount_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> ReservePool {
        let mut pool = ReservePool::new();
        pool.provide_initial_liquidity(100_000_000, 100_000_000).unwrap();
        pool
    }

    fn fee() -> FeeSchedule {
        FeeSchedule::new(3, 1000).unwrap()
    }

    #[test]
    fn test_initial_liquidity_mints_geometric_mean() {
        let pool = seeded();
        assert_eq!(pool.total_supply(), 100_000_000);

        let mut skewed = ReservePool::new();
        let minted = skewed.provide_initial_liquidity(400, 100).unwrap();
        assert_eq!(minted.shares, 200);
    }

    #[test]
    fn test_initial_liquidity_only_once() {
        let mut pool = seeded();
        assert!(matches!(
            pool.provide_initial_liquidity(1, 1),
            Err(TwammError::InvalidAmount { .. })
        ));
        assert!(matches!(
            ReservePool::new().provide_initial_liquidity(0, 5),
            Err(TwammError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_provide_keeps_share_value() {
        let mut pool = seeded();
        let amounts = pool.provide_liquidity(10_000).unwrap();
        assert_eq!(amounts.amount_a, 10_000);
        assert_eq!(amounts.amount_b, 10_000);
        assert_eq!(pool.reserve_a(), 100_010_000);
        assert_eq!(pool.total_supply(), 100_010_000);
    }

    #[test]
    fn test_provide_rounds_deposit_up() {
        let mut pool = ReservePool::new();
        pool.provide_initial_liquidity(1_000, 3_000).unwrap();
        // supply = sqrt(3_000_000) = 1732
        let amounts = pool.provide_liquidity(7).unwrap();
        assert_eq!(amounts.amount_a, 5); // ceil(7 * 1000 / 1732) = ceil(4.04)
        assert_eq!(amounts.amount_b, 13); // ceil(7 * 3000 / 1732) = ceil(12.12)
    }

    #[test]
    fn test_remove_keeps_share_value() {
        let mut pool = seeded();
        let amounts = pool.remove_liquidity(50_000_000).unwrap();
        assert_eq!(amounts.amount_a, 50_000_000);
        assert_eq!(pool.reserve_a(), 50_000_000);
        assert_eq!(pool.reserve_b(), 50_000_000);
        assert_eq!(pool.total_supply(), 50_000_000);
    }

    #[test]
    fn test_remove_more_than_supply() {
        let mut pool = seeded();
        assert!(matches!(
            pool.remove_liquidity(100_000_001),
            Err(TwammError::InsufficientShares { .. })
        ));
        assert_eq!(pool, seeded());
    }

    #[test]
    fn test_swap_updates_reserves_and_grows_k() {
        let mut pool = seeded();
        let k_before = pool.k();
        let out = pool.swap(1_000_000, Direction::AToB, fee()).unwrap();
        assert_eq!(out, 987_158);
        assert_eq!(pool.reserve_a(), 101_000_000);
        assert_eq!(pool.reserve_b(), 100_000_000 - 987_158);
        assert!(pool.k() > k_before);

        let back = pool.swap(out, Direction::BToA, fee()).unwrap();
        assert!(back < 1_000_000);
    }

    #[test]
    fn test_swap_on_empty_pool() {
        let mut pool = ReservePool::new();
        assert!(matches!(
            pool.swap(10, Direction::AToB, fee()),
            Err(TwammError::InsufficientLiquidity { .. })
        ));
    }

    #[test]
    fn test_dust_swap_rejected() {
        let mut pool = seeded();
        assert!(matches!(
            pool.swap(1, Direction::AToB, fee()),
            Err(TwammError::InvalidAmount { .. })
        ));
    }
}
