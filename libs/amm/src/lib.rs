//! # Tidal AMM - Hybrid TWAMM Engine
//!
//! ## Purpose
//!
//! Constant-product liquidity pool extended with long-term orders that
//! stream a principal into the pool over many time steps. The core is the
//! virtual order execution engine: given elapsed steps it advances the
//! reserves under the combined selling pressure of both directions and
//! credits every order its share of the proceeds, without touching orders
//! one by one.
//!
//! ## Integration Points
//!
//! - **Time**: callers pass the current step to every mutating call; steps
//!   never go backwards
//! - **Custody**: [`AssetCustody`] moves assets between users and the pool
//! - **LP shares**: [`ShareLedger`] mints and burns pool shares
//! - **Configuration**: [`tidal_config::PoolSettings`], fixed at construction
//!
//! ## Architecture Role
//!
//! ```text
//! TwammPool ──► virtualization gate ──► EngineState::stage ─┐
//!     │                                                      │ StagedPass
//!     │            ReservePool + OrderPool[A→B, B→A] ◄── commit
//!     ▼
//! AssetCustody / ShareLedger
//! ```
//!
//! Every entry point stages virtualization to `now`, validates against the
//! staged state, and commits only when nothing can fail anymore.
//!
//! ## Precision
//!
//! Amounts are `u128`. Reward factors and the exponential use Q64.64 in a
//! `U256`; products of amounts go through 512-bit intermediates. Every
//! rounding leaves the remainder with the pool.

pub mod curve;
pub mod error;
pub mod fixed_point;
pub mod ledger;
pub mod long_term_orders;
pub mod order;
pub mod order_pool;
pub mod pool;
pub mod reserve_pool;
pub mod shared;
pub mod snapshot;
pub mod virtual_orders;

pub use curve::{ConstantProduct, FeeSchedule};
pub use error::{LedgerError, MathError, Result, TwammError};
pub use ledger::{AssetCustody, InMemoryCustody, InMemoryShares, ShareLedger};
pub use long_term_orders::{CancelReceipt, OrderReceipt, WithdrawReceipt};
pub use order::{AccountId, Asset, Direction, Order, OrderId};
pub use order_pool::{Accumulator, OrderPool};
pub use pool::{SwapReceipt, TwammPool};
pub use reserve_pool::{LiquidityAmounts, ReservePool};
pub use shared::SharedTwammPool;
pub use snapshot::{OrderView, PoolSnapshot};
pub use virtual_orders::{compute_virtual_balances, EngineLimits, VirtualBalances, VirtualizationReport};

pub use tidal_config::PoolSettings;

/// Common types for display math
pub use rust_decimal::Decimal;
pub use rust_decimal_macros::dec;
