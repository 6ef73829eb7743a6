//! TWAMM pool: the public entry points
//!
//! Every mutating call takes the caller's current step. It first stages
//! virtualization up to that step, validates against the staged state, moves
//! assets through the custody seam, then commits the pass together with its
//! own effect. Validation failures leave both the pool and custody untouched.
//!
//! Assets are collected before the commit and released after it, so the
//! only ledger call that may refuse a valid request is `collect`.

use crate::curve::FeeSchedule;
use crate::error::{Result, TwammError};
use crate::ledger::{AssetCustody, InMemoryCustody, InMemoryShares, ShareLedger};
use crate::order::{AccountId, Asset, Direction, Order, OrderBook, OrderId};
use crate::reserve_pool::{LiquidityAmounts, ReservePool};
use crate::virtual_orders::{EngineLimits, EngineState, StagedPass, VirtualizationReport};
use serde::Serialize;
use tidal_config::PoolSettings;
use tracing::{error, info, warn};

/// Result of an instant swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwapReceipt {
    pub direction: Direction,
    pub amount_in: u128,
    pub amount_out: u128,
}

fn log_engine_failure(err: TwammError) -> TwammError {
    if err.is_fatal() {
        error!(error = %err, "virtual order execution aborted");
    }
    err
}

/// Hybrid TWAMM pool over a custody and an LP-share ledger
#[derive(Debug)]
pub struct TwammPool<C = InMemoryCustody, S = InMemoryShares> {
    pub(crate) settings: PoolSettings,
    pub(crate) limits: EngineLimits,
    pub(crate) fee: FeeSchedule,
    pub(crate) engine: EngineState,
    pub(crate) orders: OrderBook,
    pub(crate) custody: C,
    pub(crate) shares: S,
}

impl TwammPool {
    /// Empty pool with in-memory ledgers, virtualized from `start_step`
    pub fn new(settings: PoolSettings, start_step: u64) -> Result<Self> {
        Self::with_ledgers(settings, start_step, InMemoryCustody::new(), InMemoryShares::new())
    }
}

impl<C: AssetCustody, S: ShareLedger> TwammPool<C, S> {
    pub fn with_ledgers(settings: PoolSettings, start_step: u64, custody: C, shares: S) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| TwammError::InvalidConfig(e.to_string()))?;
        let fee = FeeSchedule::from_settings(&settings)?;

        info!(
            interval_length = settings.interval_length,
            fee = %fee.as_decimal(),
            start_step,
            "TWAMM pool created"
        );

        Ok(Self {
            limits: EngineLimits::from_settings(&settings),
            settings,
            fee,
            engine: EngineState::new(start_step),
            orders: OrderBook::new(),
            custody,
            shares,
        })
    }

    /// Stage virtualization to `now`, refusing if the interval guard stops short
    pub(crate) fn stage_for_update(&self, now: u64) -> Result<StagedPass> {
        let pass = self
            .engine
            .stage(now, &self.limits)
            .map_err(log_engine_failure)?;
        if !pass.caught_up() {
            return Err(TwammError::CatchUpRequired {
                remaining_steps: pass.report.remaining_steps(),
            });
        }
        Ok(pass)
    }

    /// Advance virtual orders toward `now`
    ///
    /// Commits whatever progress the interval guard allows. When the report
    /// says `caught_up == false`, call again before any other mutation.
    pub fn execute_virtual_orders(&mut self, now: u64) -> Result<VirtualizationReport> {
        let report = self
            .engine
            .execute_virtual_orders(now, &self.limits)
            .map_err(log_engine_failure)?;
        if !report.caught_up {
            warn!(
                reached = report.to_step,
                target = report.target_step,
                remaining = report.remaining_steps(),
                "virtualization deferred by interval guard"
            );
        }
        Ok(report)
    }

    /// Seed the pool's price and mint the first LP shares
    pub fn provide_initial_liquidity(
        &mut self,
        provider: AccountId,
        amount_a: u128,
        amount_b: u128,
        now: u64,
    ) -> Result<LiquidityAmounts> {
        let mut pass = self.stage_for_update(now)?;
        let amounts = pass.reserves.provide_initial_liquidity(amount_a, amount_b)?;

        self.collect_pair(provider, amounts.amount_a, amounts.amount_b)?;
        self.engine.commit(pass);
        self.shares.mint(provider, amounts.shares)?;

        info!(%provider, amount_a, amount_b, shares = amounts.shares, "initial liquidity provided");
        Ok(amounts)
    }

    /// Mint exactly `shares` against a proportional deposit of both assets
    pub fn provide_liquidity(&mut self, provider: AccountId, shares: u128, now: u64) -> Result<LiquidityAmounts> {
        let mut pass = self.stage_for_update(now)?;
        let amounts = pass.reserves.provide_liquidity(shares)?;

        self.collect_pair(provider, amounts.amount_a, amounts.amount_b)?;
        self.engine.commit(pass);
        self.shares.mint(provider, shares)?;

        info!(%provider, shares, amount_a = amounts.amount_a, amount_b = amounts.amount_b, "liquidity provided");
        Ok(amounts)
    }

    /// Burn `shares` for their slice of both reserves
    pub fn remove_liquidity(&mut self, provider: AccountId, shares: u128, now: u64) -> Result<LiquidityAmounts> {
        let held = self.shares.balance_of(provider);
        if held < shares {
            return Err(TwammError::InsufficientShares {
                requested: shares,
                available: held,
            });
        }

        let mut pass = self.stage_for_update(now)?;
        let amounts = pass.reserves.remove_liquidity(shares)?;
        let streaming = Direction::ALL.iter().any(|d| pass.sell_rate(*d) > 0);
        if streaming && (pass.reserves.reserve_a() == 0 || pass.reserves.reserve_b() == 0) {
            return Err(TwammError::InsufficientLiquidity {
                reason: "cannot drain the pool while long-term orders are selling",
            });
        }

        self.shares.burn(provider, shares)?;
        self.engine.commit(pass);
        self.custody.release(provider, Asset::A, amounts.amount_a)?;
        self.custody.release(provider, Asset::B, amounts.amount_b)?;

        info!(%provider, shares, amount_a = amounts.amount_a, amount_b = amounts.amount_b, "liquidity removed");
        Ok(amounts)
    }

    /// Instant swap against the reserves, paying the pool fee
    pub fn swap(&mut self, trader: AccountId, direction: Direction, amount_in: u128, now: u64) -> Result<SwapReceipt> {
        let mut pass = self.stage_for_update(now)?;
        let amount_out = pass.reserves.swap(amount_in, direction, self.fee)?;

        self.custody.collect(trader, direction.sell_asset(), amount_in)?;
        self.engine.commit(pass);
        self.custody.release(trader, direction.buy_asset(), amount_out)?;

        info!(%trader, ?direction, amount_in, amount_out, "instant swap");
        Ok(SwapReceipt {
            direction,
            amount_in,
            amount_out,
        })
    }

    /// Collect both assets, or neither
    fn collect_pair(&mut self, account: AccountId, amount_a: u128, amount_b: u128) -> Result<()> {
        self.custody.collect(account, Asset::A, amount_a)?;
        if let Err(e) = self.custody.collect(account, Asset::B, amount_b) {
            self.custody.release(account, Asset::A, amount_a)?;
            return Err(e.into());
        }
        Ok(())
    }

    // Queries reflect the state as of the last mutation

    pub fn reserves(&self) -> (u128, u128) {
        (self.engine.reserves.reserve_a(), self.engine.reserves.reserve_b())
    }

    pub fn reserve_pool(&self) -> &ReservePool {
        &self.engine.reserves
    }

    pub fn total_supply(&self) -> u128 {
        self.engine.reserves.total_supply()
    }

    /// Active sell rates as (A to B, B to A)
    pub fn sell_rates(&self) -> (u128, u128) {
        (
            self.engine.order_pool(Direction::AToB).current_sell_rate(),
            self.engine.order_pool(Direction::BToA).current_sell_rate(),
        )
    }

    pub fn last_virtualized_step(&self) -> u64 {
        self.engine.last_virtualized_step
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn fee(&self) -> FeeSchedule {
        self.fee
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    pub fn shares(&self) -> &S {
        &self.shares
    }
}
