//! Long-term order lifecycle: submit, cancel, withdraw
//!
//! An order sells `sell_rate` units per step from submission until its
//! expiry boundary. The principal is collected up front; the part that does
//! not divide evenly into the duration is never taken.

use crate::error::{MathError, Result, TwammError};
use crate::ledger::{AssetCustody, ShareLedger};
use crate::order::{AccountId, Direction, Order, OrderId};
use crate::pool::TwammPool;
use serde::Serialize;
use tracing::info;

/// Result of submitting a long-term order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub direction: Direction,
    pub sell_rate: u128,
    pub expires_at: u64,
    /// Principal collected: `sell_rate * (expires_at - now)`
    pub deposited: u128,
    /// Part of the requested amount left with the owner
    pub unspent: u128,
}

/// Result of cancelling a long-term order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CancelReceipt {
    pub order_id: OrderId,
    /// Bought asset earned up to the cancellation step
    pub proceeds: u128,
    /// Sold asset that was never streamed
    pub refund: u128,
}

/// Result of a proceeds withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WithdrawReceipt {
    pub order_id: OrderId,
    pub proceeds: u128,
    /// The order had expired, so nothing more will accrue
    pub is_final: bool,
}

impl<C: AssetCustody, S: ShareLedger> TwammPool<C, S> {
    /// Stream `amount` of the sold asset over `num_intervals` whole intervals
    ///
    /// The order runs from `now` to the boundary `num_intervals + 1` intervals
    /// after the last boundary at or before `now`, so the first, partial
    /// interval is never counted against the requested duration.
    pub fn submit_long_term_order(
        &mut self,
        owner: AccountId,
        direction: Direction,
        amount: u128,
        num_intervals: u64,
        now: u64,
    ) -> Result<OrderReceipt> {
        if amount == 0 {
            return Err(TwammError::InvalidAmount {
                reason: "order amount must be positive",
            });
        }
        let max = self.settings.max_order_intervals;
        if num_intervals == 0 || num_intervals > max {
            return Err(TwammError::InvalidDuration {
                intervals: num_intervals,
                max,
            });
        }

        let pass = self.stage_for_update(now)?;
        if pass.reserves.reserve_a() == 0 || pass.reserves.reserve_b() == 0 {
            return Err(TwammError::InsufficientLiquidity {
                reason: "long-term orders need a seeded pool",
            });
        }

        let expires_at = num_intervals
            .checked_add(1)
            .and_then(|n| n.checked_mul(self.limits.interval_length))
            .and_then(|span| span.checked_add(self.limits.last_boundary(now)))
            .ok_or(TwammError::InvalidDuration {
                intervals: num_intervals,
                max,
            })?;
        let duration = u128::from(expires_at - now);
        let sell_rate = amount / duration;
        if sell_rate == 0 {
            return Err(TwammError::InvalidAmount {
                reason: "amount is too small to stream over the order duration",
            });
        }
        let deposited = sell_rate * duration;

        // An expiry bucket never exceeds the pool's total rate, so this covers it too
        pass.sell_rate(direction)
            .checked_add(sell_rate)
            .ok_or(MathError::Overflow)?;

        self.custody.collect(owner, direction.sell_asset(), deposited)?;
        self.engine.commit(pass);

        let order_id = self.orders.insert(Order {
            id: self.orders.next_id(),
            owner,
            direction,
            sell_rate,
            submitted_at: now,
            expires_at,
            proceeds_withdrawn: false,
            cancelled_at: None,
        });
        self.engine
            .order_pool_mut(direction)
            .add_to_pool(order_id, sell_rate, expires_at)?;

        info!(%order_id, %owner, ?direction, sell_rate = %sell_rate, expires_at, "long-term order submitted");

        Ok(OrderReceipt {
            order_id,
            direction,
            sell_rate,
            expires_at,
            deposited,
            unspent: amount - deposited,
        })
    }

    /// Stop an order before it expires
    ///
    /// Pays the proceeds earned through `now` and refunds the principal that
    /// has not been streamed yet.
    pub fn cancel_long_term_order(&mut self, caller: AccountId, order_id: OrderId, now: u64) -> Result<CancelReceipt> {
        let order = self.owned_order(caller, order_id)?;
        let pass = self.stage_for_update(now)?;
        if order.expires_at <= now {
            return Err(TwammError::OrderExpired {
                order_id,
                expired_at: order.expires_at,
            });
        }

        self.engine.commit(pass);
        let proceeds = self
            .engine
            .order_pool_mut(order.direction)
            .remove_from_pool(&order)?;
        let refund = order.unsold_amount(now);
        if let Some(stored) = self.orders.get_mut(order_id) {
            stored.proceeds_withdrawn = true;
            stored.cancelled_at = Some(now);
        }

        self.custody.release(caller, order.direction.buy_asset(), proceeds)?;
        self.custody.release(caller, order.direction.sell_asset(), refund)?;

        info!(%order_id, proceeds = %proceeds, refund = %refund, step = now, "long-term order cancelled");
        Ok(CancelReceipt {
            order_id,
            proceeds,
            refund,
        })
    }

    /// Pay out the proceeds accrued since the last withdrawal
    ///
    /// Once the order has expired the withdrawal is final; calling again
    /// fails with `AlreadyWithdrawn`.
    pub fn withdraw_proceeds(&mut self, caller: AccountId, order_id: OrderId, now: u64) -> Result<WithdrawReceipt> {
        let order = self.owned_order(caller, order_id)?;
        let pass = self.stage_for_update(now)?;
        self.engine.commit(pass);

        let last = self.engine.last_virtualized_step;
        let proceeds = self
            .engine
            .order_pool_mut(order.direction)
            .withdraw_proceeds(&order, last)?;
        let is_final = order.is_expired(last);
        if is_final {
            if let Some(stored) = self.orders.get_mut(order_id) {
                stored.proceeds_withdrawn = true;
            }
        }

        self.custody.release(caller, order.direction.buy_asset(), proceeds)?;

        info!(%order_id, proceeds = %proceeds, is_final, "proceeds withdrawn");
        Ok(WithdrawReceipt {
            order_id,
            proceeds,
            is_final,
        })
    }

    /// Withdrawable proceeds as of the last mutation
    pub fn accrued_proceeds(&self, order_id: OrderId) -> Result<u128> {
        let order = self.orders.get(order_id).ok_or(TwammError::OrderNotFound { order_id })?;
        if order.proceeds_withdrawn {
            return Ok(0);
        }
        self.engine
            .order_pool(order.direction)
            .earned(order, self.engine.last_virtualized_step)
    }

    /// Withdrawable proceeds if virtual orders were executed up to `now`
    pub fn accrued_proceeds_at(&self, order_id: OrderId, now: u64) -> Result<u128> {
        let order = self.orders.get(order_id).ok_or(TwammError::OrderNotFound { order_id })?;
        if order.proceeds_withdrawn {
            return Ok(0);
        }
        let pass = self.stage_for_update(now)?;
        let i = order.direction.index();
        self.engine.order_pool(order.direction).earned_with(
            order,
            &pass.accumulators[i],
            &pass.expiries[i],
            pass.step(),
        )
    }

    /// The order, if `caller` owns it and it is not settled yet
    fn owned_order(&self, caller: AccountId, order_id: OrderId) -> Result<Order> {
        let order = self.orders.get(order_id).ok_or(TwammError::OrderNotFound { order_id })?;
        if order.owner != caller {
            return Err(TwammError::NotOrderOwner { order_id, caller });
        }
        if order.proceeds_withdrawn {
            return Err(TwammError::AlreadyWithdrawn { order_id });
        }
        Ok(order.clone())
    }
}
