//! Read-only views of a pool for reporting

use crate::curve::ConstantProduct;
use crate::error::{Result, TwammError};
use crate::ledger::{AssetCustody, ShareLedger};
use crate::order::{AccountId, Direction, OrderId};
use crate::pool::TwammPool;
use rust_decimal::Decimal;
use serde::Serialize;

/// Pool state at one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub step: u64,
    pub reserve_a: u128,
    pub reserve_b: u128,
    pub total_supply: u128,
    pub sell_rate_a_to_b: u128,
    pub sell_rate_b_to_a: u128,
    /// Units of B per unit of A
    pub spot_price: Option<Decimal>,
    /// False when the interval guard stopped before the requested step
    pub caught_up: bool,
}

/// One order and where it stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub owner: AccountId,
    pub direction: Direction,
    pub sell_rate: u128,
    pub submitted_at: u64,
    pub expires_at: u64,
    pub unsold: u128,
    pub accrued_proceeds: u128,
    /// Still selling into its order pool
    pub active: bool,
    pub settled: bool,
    pub cancelled_at: Option<u64>,
}

impl<C: AssetCustody, S: ShareLedger> TwammPool<C, S> {
    /// State as of the last mutation
    pub fn snapshot(&self) -> PoolSnapshot {
        let (sell_rate_a_to_b, sell_rate_b_to_a) = self.sell_rates();
        let reserves = self.reserve_pool();
        PoolSnapshot {
            step: self.last_virtualized_step(),
            reserve_a: reserves.reserve_a(),
            reserve_b: reserves.reserve_b(),
            total_supply: reserves.total_supply(),
            sell_rate_a_to_b,
            sell_rate_b_to_a,
            spot_price: ConstantProduct::spot_price(reserves.reserve_a(), reserves.reserve_b()),
            caught_up: true,
        }
    }

    /// State as if virtual orders were executed up to `now`; nothing is committed
    ///
    /// Subject to the interval guard like a real pass, so the view may stop
    /// short of `now`.
    pub fn snapshot_at(&self, now: u64) -> Result<PoolSnapshot> {
        let pass = self.engine.stage(now, &self.limits)?;
        let reserves = pass.reserves;
        Ok(PoolSnapshot {
            step: pass.step(),
            reserve_a: reserves.reserve_a(),
            reserve_b: reserves.reserve_b(),
            total_supply: reserves.total_supply(),
            sell_rate_a_to_b: pass.sell_rate(Direction::AToB),
            sell_rate_b_to_a: pass.sell_rate(Direction::BToA),
            spot_price: ConstantProduct::spot_price(reserves.reserve_a(), reserves.reserve_b()),
            caught_up: pass.caught_up(),
        })
    }

    /// An order as of the last mutation
    pub fn order_view(&self, order_id: OrderId) -> Result<OrderView> {
        let order = self
            .order(order_id)
            .ok_or(TwammError::OrderNotFound { order_id })?;
        let step = self.last_virtualized_step();
        let unsold = match order.cancelled_at {
            Some(_) => 0,
            None => order.unsold_amount(step.max(order.submitted_at)),
        };
        Ok(OrderView {
            order_id,
            owner: order.owner,
            direction: order.direction,
            sell_rate: order.sell_rate,
            submitted_at: order.submitted_at,
            expires_at: order.expires_at,
            unsold,
            accrued_proceeds: self.accrued_proceeds(order_id)?,
            active: order.is_active(step),
            settled: order.proceeds_withdrawn,
            cancelled_at: order.cancelled_at,
        })
    }
}
