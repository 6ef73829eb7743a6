//! Order Pool: the aggregate ledger for one trade direction
//!
//! Orders are never simulated one by one. Each pool keeps the total sell
//! rate of its active orders and a reward factor, the cumulative proceeds
//! per unit of sell rate in Q64.64. An order's proceeds are the growth of the
//! reward factor since its snapshot times its own rate.
//!
//! Expiry is bucketed by boundary step so retiring orders costs one map
//! lookup per boundary, no matter how many orders expire there.

use crate::error::{MathError, Result, TwammError};
use crate::fixed_point::{mul_div, to_u128, ONE_Q64, Q64_SHIFT, U256};
use crate::order::{Order, OrderId};
use std::collections::{BTreeMap, HashMap};

/// The scalar part of an order pool, cheap to copy while staging a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Accumulator {
    pub current_sell_rate: u128,
    /// Cumulative proceeds per unit of sell rate, Q64.64
    pub reward_factor: U256,
}

impl Accumulator {
    /// Distribute `proceeds` over the active sell rate
    ///
    /// Rounds down; the remainder is never paid out. No-op with no active rate.
    pub fn advance_reward_factor(&mut self, proceeds: u128) -> Result<(), MathError> {
        if self.current_sell_rate == 0 || proceeds == 0 {
            return Ok(());
        }
        let delta = (U256::from(proceeds) << Q64_SHIFT) / U256::from(self.current_sell_rate);
        self.reward_factor = self
            .reward_factor
            .checked_add(delta)
            .ok_or(MathError::Overflow)?;
        Ok(())
    }

    /// Retire a bucket of sell rate
    pub fn expire(&mut self, sell_rate: u128) -> Result<(), MathError> {
        self.current_sell_rate = self
            .current_sell_rate
            .checked_sub(sell_rate)
            .ok_or(MathError::Underflow)?;
        Ok(())
    }
}

/// floor((reward_end - reward_start) * sell_rate)
pub fn proceeds_between(reward_start: U256, reward_end: U256, sell_rate: u128) -> Result<u128, MathError> {
    let growth = reward_end
        .checked_sub(reward_start)
        .ok_or(MathError::Underflow)?;
    to_u128(mul_div(growth, U256::from(sell_rate), ONE_Q64)?)
}

/// Aggregate state of every order selling in one direction
#[derive(Debug, Clone, Default)]
pub struct OrderPool {
    acc: Accumulator,
    expiring_sell_rate: BTreeMap<u64, u128>,
    reward_factor_at_submission: HashMap<OrderId, U256>,
    reward_factor_at_expiry: BTreeMap<u64, U256>,
}

impl OrderPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_sell_rate(&self) -> u128 {
        self.acc.current_sell_rate
    }

    pub fn reward_factor(&self) -> U256 {
        self.acc.reward_factor
    }

    pub fn accumulator(&self) -> Accumulator {
        self.acc
    }

    /// Sell rate still scheduled to expire at `step`
    pub fn sell_rate_expiring_at(&self, step: u64) -> u128 {
        self.expiring_sell_rate.get(&step).copied().unwrap_or(0)
    }

    pub fn reward_factor_at_expiry(&self, step: u64) -> Option<U256> {
        self.reward_factor_at_expiry.get(&step).copied()
    }

    pub fn has_snapshot(&self, order_id: OrderId) -> bool {
        self.reward_factor_at_submission.contains_key(&order_id)
    }

    /// Steps with pending expiries, in order
    pub fn pending_expiries(&self) -> impl Iterator<Item = (u64, u128)> + '_ {
        self.expiring_sell_rate.iter().map(|(step, rate)| (*step, *rate))
    }

    /// Start streaming a new order
    pub fn add_to_pool(&mut self, order_id: OrderId, sell_rate: u128, expires_at: u64) -> Result<(), MathError> {
        let current = self
            .acc
            .current_sell_rate
            .checked_add(sell_rate)
            .ok_or(MathError::Overflow)?;
        let bucket = self
            .sell_rate_expiring_at(expires_at)
            .checked_add(sell_rate)
            .ok_or(MathError::Overflow)?;

        self.acc.current_sell_rate = current;
        self.expiring_sell_rate.insert(expires_at, bucket);
        self.reward_factor_at_submission
            .insert(order_id, self.acc.reward_factor);
        Ok(())
    }

    /// Stop an order before it expires; returns the proceeds it earned so far
    pub fn remove_from_pool(&mut self, order: &Order) -> Result<u128> {
        let earned = self.earned_until(order, self.acc.reward_factor)?;

        let current = self
            .acc
            .current_sell_rate
            .checked_sub(order.sell_rate)
            .ok_or(MathError::Underflow)?;
        let bucket = self
            .sell_rate_expiring_at(order.expires_at)
            .checked_sub(order.sell_rate)
            .ok_or(MathError::Underflow)?;

        self.acc.current_sell_rate = current;
        if bucket == 0 {
            self.expiring_sell_rate.remove(&order.expires_at);
        } else {
            self.expiring_sell_rate.insert(order.expires_at, bucket);
        }
        self.reward_factor_at_submission.remove(&order.id);
        Ok(earned)
    }

    /// Pay out an order's proceeds
    ///
    /// After expiry the payout is measured up to the factor recorded at the
    /// expiry boundary and is final. Before expiry it is measured up to the
    /// current factor and the snapshot moves forward.
    pub fn withdraw_proceeds(&mut self, order: &Order, last_virtualized_step: u64) -> Result<u128> {
        let earned = self.earned(order, last_virtualized_step)?;
        if order.is_expired(last_virtualized_step) {
            self.reward_factor_at_submission.remove(&order.id);
        } else {
            self.reward_factor_at_submission
                .insert(order.id, self.acc.reward_factor);
        }
        Ok(earned)
    }

    /// Proceeds accrued since the order's snapshot, without paying them
    pub fn earned(&self, order: &Order, last_virtualized_step: u64) -> Result<u128> {
        self.earned_with(order, &self.acc, &[], last_virtualized_step)
    }

    /// Like [`OrderPool::earned`], against a staged accumulator and expiry marks
    /// that are not committed yet
    pub fn earned_with(
        &self,
        order: &Order,
        acc: &Accumulator,
        staged_expiries: &[(u64, U256)],
        last_virtualized_step: u64,
    ) -> Result<u128> {
        let reward_end = if order.is_expired(last_virtualized_step) {
            staged_expiries
                .iter()
                .find(|(step, _)| *step == order.expires_at)
                .map(|(_, factor)| *factor)
                .or_else(|| self.reward_factor_at_expiry(order.expires_at))
                .ok_or(TwammError::ExpiryNotRecorded {
                    order_id: order.id,
                    expires_at: order.expires_at,
                })?
        } else {
            acc.reward_factor
        };
        self.earned_until(order, reward_end)
    }

    fn earned_until(&self, order: &Order, reward_end: U256) -> Result<u128> {
        let start = self
            .reward_factor_at_submission
            .get(&order.id)
            .copied()
            .ok_or(TwammError::AlreadyWithdrawn { order_id: order.id })?;
        Ok(proceeds_between(start, reward_end, order.sell_rate)?)
    }

    /// Retire the bucket expiring at `step` from a staged accumulator
    ///
    /// Returns the reward factor to record at `step`, or `None` when nothing
    /// expires there. The pool itself only changes on commit.
    pub(crate) fn retire_expiring(&self, acc: &mut Accumulator, step: u64) -> Result<Option<U256>, MathError> {
        let bucket = self.sell_rate_expiring_at(step);
        if bucket == 0 {
            return Ok(None);
        }
        acc.expire(bucket)?;
        Ok(Some(acc.reward_factor))
    }

    /// Install the outcome of a staged virtualization pass
    pub(crate) fn commit(&mut self, acc: Accumulator, expiries: &[(u64, U256)]) {
        for (step, factor) in expiries {
            self.expiring_sell_rate.remove(step);
            self.reward_factor_at_expiry.insert(*step, *factor);
        }
        self.acc = acc;
    }
}
