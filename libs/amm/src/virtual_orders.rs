//! Virtual Order Execution Engine
//!
//! Advances both order pools and the reserves from the last virtualized step
//! to `now`, one interval segment at a time. Within a segment the two
//! directions trade against the curve simultaneously:
//!
//! - no selling: nothing happens
//! - one direction selling: a fee-free constant-product swap of the whole
//!   segment's sell amount
//! - both selling: the closed-form solution of the coupled flows, which
//!   settles the reserves toward the ratio of the two sell rates
//!
//! Expiry buckets are applied at each boundary after its segment trades.
//!
//! A pass is staged on copies of the scalar state and only committed once
//! every segment succeeded, so a failing pass leaves the pool untouched.

use crate::error::{MathError, Result, TwammError};
use crate::fixed_point::{div_ceil_u512, exp_neg_q64, mul_div, sqrt, to_u128, ONE_Q64, Q64_SHIFT, U256, U512};
use crate::curve::ConstantProduct;
use crate::order::Direction;
use crate::order_pool::{Accumulator, OrderPool};
use crate::reserve_pool::ReservePool;
use serde::Serialize;
use tidal_config::PoolSettings;
use tracing::debug;

/// Scheduling limits for virtualization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    pub interval_length: u64,
    pub max_intervals_per_call: u64,
}

impl EngineLimits {
    pub fn from_settings(settings: &PoolSettings) -> Self {
        Self {
            interval_length: settings.interval_length,
            max_intervals_per_call: settings.max_intervals_per_call,
        }
    }

    /// Most recent boundary at or before `step`
    pub fn last_boundary(&self, step: u64) -> u64 {
        step - step % self.interval_length
    }

    /// First boundary strictly after `step`
    pub fn next_boundary(&self, step: u64) -> Option<u64> {
        self.last_boundary(step).checked_add(self.interval_length)
    }
}

/// End state of one two-sided segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualBalances {
    pub reserve_a: u128,
    pub reserve_b: u128,
    /// Asset A bought by the B-selling pool
    pub a_out: u128,
    /// Asset B bought by the A-selling pool
    pub b_out: u128,
}

/// Closed-form end reserves when both directions sell during one segment
///
/// With `k = A*B`, `q = sqrt(A*sell_b)`, `p = sqrt(B*sell_a)` and
/// `x = 2*sqrt(sell_a*sell_b/k)`:
///
/// `A_end = A*p/q * (1 + c*e^-x) / (1 - c*e^-x)` with `c = (q - p)/(q + p)`
///
/// evaluated as one fraction and rounded up, then `B_end = ceil(k / A_end)`.
/// Rounding the ends up keeps the remainder in the reserves. Each end is
/// clamped to what its side could hold if nothing were bought.
pub fn compute_virtual_balances(
    reserve_a: u128,
    reserve_b: u128,
    sell_a: u128,
    sell_b: u128,
) -> Result<VirtualBalances> {
    let a = U256::from(reserve_a);
    let b = U256::from(reserve_b);
    let k = a * b;
    let max_a = reserve_a.checked_add(sell_a).ok_or(MathError::Overflow)?;
    let max_b = reserve_b.checked_add(sell_b).ok_or(MathError::Overflow)?;

    // p and q only matter as a ratio, so scale both radicands by the same
    // even power of two to keep precision in the roots
    let lhs = a * U256::from(sell_b);
    let rhs = b * U256::from(sell_a);
    let shift = (256 - lhs.bits().max(rhs.bits())) & !1;
    let q = sqrt(lhs << shift);
    let p = sqrt(rhs << shift);

    let exponent = match mul_div(U256::from(sell_a) * U256::from(sell_b), ONE_Q64 << Q64_SHIFT, k) {
        Ok(ratio) => Some(sqrt(ratio) << 1usize),
        Err(MathError::Overflow) => None,
        Err(e) => return Err(e.into()),
    };
    // Past the overflow point e^-x is far below Q64 resolution
    let decay = exponent.map(exp_neg_q64).unwrap_or_else(U256::zero);

    let sum = U512::from(p + q) << Q64_SHIFT;
    let (numerator, denominator) = if q >= p {
        let skew = U512::from(q - p) * U512::from(decay);
        (sum + skew, sum - skew)
    } else {
        let skew = U512::from(p - q) * U512::from(decay);
        (sum - skew, sum + skew)
    };

    let top = U512::from(a)
        .checked_mul(U512::from(p))
        .and_then(|v| v.checked_mul(numerator))
        .ok_or(MathError::Overflow)?;
    let bottom = U512::from(q)
        .checked_mul(denominator)
        .ok_or(MathError::Overflow)?;
    let a_end = div_ceil_u512(top, bottom)?;
    let mut a_end = if a_end > U512::from(max_a) {
        max_a
    } else {
        to_u128(U256::try_from(a_end).map_err(|_| MathError::Overflow)?)?
    };

    let b_end = to_u128(ceil_div_k(k, a_end)?.min(U256::from(max_b)))?;
    if b_end == max_b {
        // B could not absorb the rounding; let A keep enough to restore k
        let needed = to_u128(ceil_div_k(k, b_end)?.min(U256::from(max_a)))?;
        a_end = a_end.max(needed);
    }

    if U256::from(a_end) * U256::from(b_end) < k {
        return Err(TwammError::ArithmeticDomain(MathError::Underflow));
    }

    Ok(VirtualBalances {
        reserve_a: a_end,
        reserve_b: b_end,
        a_out: max_a - a_end,
        b_out: max_b - b_end,
    })
}

/// ceil(k / divisor)
fn ceil_div_k(k: U256, divisor: u128) -> Result<U256, MathError> {
    if divisor == 0 {
        return Err(MathError::DivisionByZero);
    }
    let divisor = U256::from(divisor);
    let quotient = k / divisor;
    Ok(if (k % divisor).is_zero() {
        quotient
    } else {
        quotient + U256::one()
    })
}

/// What a virtualization pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VirtualizationReport {
    pub from_step: u64,
    /// Step the pass reached
    pub to_step: u64,
    /// Step the pass was asked to reach
    pub target_step: u64,
    pub boundaries_crossed: u64,
    pub a_sold: u128,
    pub b_sold: u128,
    pub a_bought: u128,
    pub b_bought: u128,
    pub caught_up: bool,
}

impl VirtualizationReport {
    /// Steps still to virtualize after this pass
    pub fn remaining_steps(&self) -> u64 {
        self.target_step - self.to_step
    }
}

/// Uncommitted outcome of a pass over the engine state
#[derive(Debug, Clone)]
pub struct StagedPass {
    pub reserves: ReservePool,
    pub accumulators: [Accumulator; 2],
    /// (boundary, reward factor) for every expiry bucket retired in the pass
    pub expiries: [Vec<(u64, U256)>; 2],
    pub report: VirtualizationReport,
}

impl StagedPass {
    pub fn step(&self) -> u64 {
        self.report.to_step
    }

    pub fn caught_up(&self) -> bool {
        self.report.caught_up
    }

    pub fn sell_rate(&self, direction: Direction) -> u128 {
        self.accumulators[direction.index()].current_sell_rate
    }

    fn segment(
        &mut self,
        pools: &[OrderPool; 2],
        start: u64,
        end: u64,
        limits: &EngineLimits,
    ) -> Result<()> {
        let steps = u128::from(end - start);
        let sell_a = self.accumulators[0]
            .current_sell_rate
            .checked_mul(steps)
            .ok_or(MathError::Overflow)?;
        let sell_b = self.accumulators[1]
            .current_sell_rate
            .checked_mul(steps)
            .ok_or(MathError::Overflow)?;
        let (reserve_a, reserve_b) = (self.reserves.reserve_a(), self.reserves.reserve_b());

        if (sell_a > 0 || sell_b > 0) && (reserve_a == 0 || reserve_b == 0) {
            return Err(TwammError::ReserveExhausted {
                step: start,
                reserve_a,
                reserve_b,
            });
        }

        let (end_a, end_b, a_out, b_out) = match (sell_a, sell_b) {
            (0, 0) => (reserve_a, reserve_b, 0, 0),
            (_, 0) => {
                let b_out = ConstantProduct::streaming_output_amount(sell_a, reserve_a, reserve_b)?;
                let end_a = reserve_a.checked_add(sell_a).ok_or(MathError::Overflow)?;
                (end_a, reserve_b - b_out, 0, b_out)
            }
            (0, _) => {
                let a_out = ConstantProduct::streaming_output_amount(sell_b, reserve_b, reserve_a)?;
                let end_b = reserve_b.checked_add(sell_b).ok_or(MathError::Overflow)?;
                (reserve_a - a_out, end_b, a_out, 0)
            }
            _ => {
                let balances = compute_virtual_balances(reserve_a, reserve_b, sell_a, sell_b)?;
                (balances.reserve_a, balances.reserve_b, balances.a_out, balances.b_out)
            }
        };

        self.reserves.set_reserves(end_a, end_b);
        self.accumulators[0].advance_reward_factor(b_out)?;
        self.accumulators[1].advance_reward_factor(a_out)?;

        let report = &mut self.report;
        report.a_sold = report.a_sold.saturating_add(sell_a);
        report.b_sold = report.b_sold.saturating_add(sell_b);
        report.a_bought = report.a_bought.saturating_add(a_out);
        report.b_bought = report.b_bought.saturating_add(b_out);

        if sell_a > 0 || sell_b > 0 {
            debug!(
                start,
                end,
                sell_a = %sell_a,
                sell_b = %sell_b,
                a_out = %a_out,
                b_out = %b_out,
                "virtual segment executed"
            );
        }

        if end % limits.interval_length == 0 {
            for direction in Direction::ALL {
                let i = direction.index();
                if let Some(factor) = pools[i].retire_expiring(&mut self.accumulators[i], end)? {
                    self.expiries[i].push((end, factor));
                }
            }
        }
        Ok(())
    }
}

/// Reserves, both order pools and the virtualization cursor
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub reserves: ReservePool,
    pub order_pools: [OrderPool; 2],
    pub last_virtualized_step: u64,
}

impl EngineState {
    pub fn new(start_step: u64) -> Self {
        Self {
            last_virtualized_step: start_step,
            ..Self::default()
        }
    }

    pub fn order_pool(&self, direction: Direction) -> &OrderPool {
        &self.order_pools[direction.index()]
    }

    pub fn order_pool_mut(&mut self, direction: Direction) -> &mut OrderPool {
        &mut self.order_pools[direction.index()]
    }

    /// Run the pass toward `now` without touching the state
    ///
    /// Crosses at most `max_intervals_per_call` boundaries; check
    /// [`StagedPass::caught_up`] for whether `now` was reached.
    pub fn stage(&self, now: u64, limits: &EngineLimits) -> Result<StagedPass> {
        if now < self.last_virtualized_step {
            return Err(TwammError::StepRegression {
                requested: now,
                last_virtualized: self.last_virtualized_step,
            });
        }

        let mut pass = StagedPass {
            reserves: self.reserves,
            accumulators: [
                self.order_pools[0].accumulator(),
                self.order_pools[1].accumulator(),
            ],
            expiries: [Vec::new(), Vec::new()],
            report: VirtualizationReport {
                from_step: self.last_virtualized_step,
                to_step: self.last_virtualized_step,
                target_step: now,
                ..VirtualizationReport::default()
            },
        };

        let mut cursor = self.last_virtualized_step;
        while cursor < now {
            let boundary = limits.next_boundary(cursor).ok_or(MathError::Overflow)?;
            let end = boundary.min(now);
            if end == boundary {
                if pass.report.boundaries_crossed == limits.max_intervals_per_call {
                    break;
                }
                pass.report.boundaries_crossed += 1;
            }
            pass.segment(&self.order_pools, cursor, end, limits)?;
            cursor = end;
        }

        pass.report.to_step = cursor;
        pass.report.caught_up = cursor == now;
        Ok(pass)
    }

    /// Install a staged pass
    pub fn commit(&mut self, pass: StagedPass) {
        self.reserves = pass.reserves;
        for (i, pool) in self.order_pools.iter_mut().enumerate() {
            pool.commit(pass.accumulators[i], &pass.expiries[i]);
        }
        self.last_virtualized_step = pass.report.to_step;
    }

    /// Stage and commit in one go
    pub fn execute_virtual_orders(&mut self, now: u64, limits: &EngineLimits) -> Result<VirtualizationReport> {
        let pass = self.stage(now, limits)?;
        let report = pass.report;
        self.commit(pass);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderId;

    const LIMITS: EngineLimits = EngineLimits {
        interval_length: 10,
        max_intervals_per_call: 1_000,
    };

    fn seeded(a: u128, b: u128) -> EngineState {
        let mut state = EngineState::new(0);
        state.reserves.provide_initial_liquidity(a, b).unwrap();
        state
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(LIMITS.last_boundary(25), 20);
        assert_eq!(LIMITS.last_boundary(30), 30);
        assert_eq!(LIMITS.next_boundary(25), Some(30));
        assert_eq!(LIMITS.next_boundary(30), Some(40));
    }

    #[test]
    fn test_balanced_two_sided_trade_is_exact() {
        let out = compute_virtual_balances(1_000_000, 1_000_000, 5_000, 5_000).unwrap();
        assert_eq!(out.reserve_a, 1_000_000);
        assert_eq!(out.reserve_b, 1_000_000);
        assert_eq!(out.a_out, 5_000);
        assert_eq!(out.b_out, 5_000);
    }

    #[test]
    fn test_two_sided_trade_keeps_k() {
        let (a, b) = (50_000_000u128, 200_000_000u128);
        let out = compute_virtual_balances(a, b, 3_000_000, 1_000_000).unwrap();
        let k = U256::from(a) * U256::from(b);
        assert!(U256::from(out.reserve_a) * U256::from(out.reserve_b) >= k);
        assert_eq!(out.reserve_a + out.a_out, a + 3_000_000);
        assert_eq!(out.reserve_b + out.b_out, b + 1_000_000);
        // A sellers outweigh B sellers, so A piles up
        assert!(out.reserve_a > a);
        assert!(out.reserve_b < b);
    }

    #[test]
    fn test_tiny_flows_barely_move_reserves() {
        // exponent rounds to zero; A_end must come back as A
        let out = compute_virtual_balances(u128::MAX / 4, u128::MAX / 4, 1, 2).unwrap();
        assert!(out.reserve_a >= u128::MAX / 4);
        assert!(out.a_out <= 2);
    }

    #[test]
    fn test_two_sided_approaches_flow_ratio() {
        // Flows dwarf the reserves: the end ratio settles at sell_a / sell_b
        let out = compute_virtual_balances(1_000, 1_000, 4_000_000_000, 1_000_000_000).unwrap();
        let ratio = out.reserve_a as f64 / out.reserve_b as f64;
        assert!((ratio - 4.0).abs() < 0.01, "ratio {}", ratio);
    }

    #[test]
    fn test_virtualize_twice_is_noop() {
        let mut state = seeded(100_000_000, 100_000_000);
        state.order_pools[0].add_to_pool(OrderId(0), 400, 30).unwrap();
        state.execute_virtual_orders(17, &LIMITS).unwrap();
        let reserves = state.reserves;
        let acc = state.order_pools[0].accumulator();

        let report = state.execute_virtual_orders(17, &LIMITS).unwrap();
        assert_eq!(report.boundaries_crossed, 0);
        assert!(report.caught_up);
        assert_eq!(state.reserves, reserves);
        assert_eq!(state.order_pools[0].accumulator(), acc);
    }

    #[test]
    fn test_one_sided_stream_and_expiry() {
        let mut state = seeded(100_000_000, 100_000_000);
        state.last_virtualized_step = 5;
        state.order_pools[0].add_to_pool(OrderId(0), 400, 30).unwrap();

        let report = state.execute_virtual_orders(40, &LIMITS).unwrap();
        assert_eq!(report.boundaries_crossed, 4);
        assert_eq!(report.a_sold, 10_000);
        assert!(report.b_bought >= 9_995 && report.b_bought <= 9_999);
        assert_eq!(state.order_pools[0].current_sell_rate(), 0);
        assert!(state.order_pools[0].reward_factor_at_expiry(30).is_some());
        assert_eq!(state.reserves.reserve_a(), 100_010_000);
    }

    #[test]
    fn test_step_regression() {
        let mut state = seeded(1_000, 1_000);
        state.execute_virtual_orders(50, &LIMITS).unwrap();
        assert!(matches!(
            state.stage(49, &LIMITS),
            Err(TwammError::StepRegression { requested: 49, last_virtualized: 50 })
        ));
    }

    #[test]
    fn test_interval_guard_defers_and_resumes() {
        let limits = EngineLimits {
            interval_length: 10,
            max_intervals_per_call: 3,
        };
        let mut state = seeded(100_000_000, 100_000_000);
        state.order_pools[0].add_to_pool(OrderId(0), 10, 100).unwrap();
        let mut reference = state.clone();

        let first = state.execute_virtual_orders(75, &limits).unwrap();
        assert!(!first.caught_up);
        assert_eq!(first.to_step, 30);
        assert_eq!(first.remaining_steps(), 45);

        let mut passes = 1;
        while state.last_virtualized_step < 75 {
            state.execute_virtual_orders(75, &limits).unwrap();
            passes += 1;
        }
        assert_eq!(passes, 3);

        reference.execute_virtual_orders(75, &LIMITS).unwrap();
        assert_eq!(state.reserves, reference.reserves);
        assert_eq!(state.order_pools[0].accumulator(), reference.order_pools[0].accumulator());
    }

    #[test]
    fn test_staged_pass_matches_commit() {
        let mut state = seeded(80_000_000, 120_000_000);
        state.order_pools[0].add_to_pool(OrderId(0), 1_000, 40).unwrap();
        state.order_pools[1].add_to_pool(OrderId(1), 700, 60).unwrap();

        let staged = state.stage(55, &LIMITS).unwrap();
        let before = state.reserves;
        assert_eq!(state.reserves, before);

        state.execute_virtual_orders(55, &LIMITS).unwrap();
        assert_eq!(state.reserves, staged.reserves);
        assert_eq!(state.order_pools[0].accumulator(), staged.accumulators[0]);
        assert_eq!(state.order_pools[1].accumulator(), staged.accumulators[1]);
        assert_eq!(state.order_pools[0].sell_rate_expiring_at(40), 0);
        assert_eq!(state.order_pools[1].sell_rate_expiring_at(60), 700);
    }

    #[test]
    fn test_exhausted_reserve_fails_without_changes() {
        let mut state = EngineState::new(0);
        state.order_pools[0].add_to_pool(OrderId(0), 5, 20).unwrap();
        let err = state.execute_virtual_orders(15, &LIMITS).unwrap_err();
        assert!(matches!(err, TwammError::ReserveExhausted { step: 0, .. }));
        assert_eq!(state.last_virtualized_step, 0);
        assert_eq!(state.order_pools[0].current_sell_rate(), 5);
    }
}
