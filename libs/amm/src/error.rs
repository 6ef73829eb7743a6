//! Error types for the TWAMM engine
//!
//! User-facing variants are recoverable: the operation is rejected before any
//! state changes. `ReserveExhausted`, `ArithmeticDomain` and
//! `ExpiryNotRecorded` mean an invariant broke somewhere upstream; the call
//! that hit them is aborted as a whole.

use crate::order::{AccountId, OrderId};
use thiserror::Error;

/// Failures inside the fixed-point utility
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    /// Result does not fit the target width
    #[error("arithmetic overflow")]
    Overflow,

    /// Subtraction would go below zero
    #[error("arithmetic underflow")]
    Underflow,

    /// Division by zero in fixed-point arithmetic
    #[error("division by zero")]
    DivisionByZero,
}

/// Refusals from the custody or LP-share collaborators
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account {account} holds {available} but {requested} is required")]
    InsufficientBalance {
        account: AccountId,
        requested: u128,
        available: u128,
    },

    #[error("ledger balance overflow for account {account}")]
    BalanceOverflow { account: AccountId },
}

/// Every way a pool operation can fail
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TwammError {
    /// Zero or out-of-range user-supplied quantity
    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: &'static str },

    #[error("insufficient liquidity: {reason}")]
    InsufficientLiquidity { reason: &'static str },

    #[error("insufficient shares: requested {requested}, held {available}")]
    InsufficientShares { requested: u128, available: u128 },

    /// Order duration is zero or longer than the pool accepts
    #[error("invalid duration of {intervals} intervals (allowed 1..={max})")]
    InvalidDuration { intervals: u64, max: u64 },

    #[error("proceeds of order {order_id} were already withdrawn")]
    AlreadyWithdrawn { order_id: OrderId },

    /// A reserve is empty while streaming orders still need to trade against it
    #[error("reserve exhausted at step {step}: reserves ({reserve_a}, {reserve_b})")]
    ReserveExhausted {
        step: u64,
        reserve_a: u128,
        reserve_b: u128,
    },

    /// Internal invariant violation surfaced by the arithmetic
    #[error("arithmetic domain error: {0}")]
    ArithmeticDomain(#[from] MathError),

    /// Virtualization passed an order's expiry boundary without recording
    /// the reward factor there
    #[error("no reward factor recorded at step {expires_at} for expired order {order_id}")]
    ExpiryNotRecorded { order_id: OrderId, expires_at: u64 },

    #[error("order {order_id} not found")]
    OrderNotFound { order_id: OrderId },

    #[error("order {order_id} does not belong to {caller}")]
    NotOrderOwner { order_id: OrderId, caller: AccountId },

    /// Cancellation requested at or after the order's expiry step
    #[error("order {order_id} expired at step {expired_at}")]
    OrderExpired { order_id: OrderId, expired_at: u64 },

    #[error("step {requested} is before the last virtualized step {last_virtualized}")]
    StepRegression { requested: u64, last_virtualized: u64 },

    /// The per-call interval guard stopped short; call `execute_virtual_orders` again
    #[error("virtual orders are {remaining_steps} steps behind, execute virtual orders first")]
    CatchUpRequired { remaining_steps: u64 },

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl TwammError {
    /// True for errors that leave the pool unusable until the cause is fixed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TwammError::ReserveExhausted { .. }
                | TwammError::ArithmeticDomain(_)
                | TwammError::ExpiryNotRecorded { .. }
        )
    }
}

pub type Result<T, E = TwammError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_invariant_breaks_are_fatal() {
        assert!(TwammError::from(MathError::Overflow).is_fatal());
        assert!(TwammError::ExpiryNotRecorded {
            order_id: OrderId(3),
            expires_at: 40
        }
        .is_fatal());
        assert!(!TwammError::CatchUpRequired { remaining_steps: 10 }.is_fatal());
        assert!(!TwammError::AlreadyWithdrawn { order_id: OrderId(0) }.is_fatal());
    }
}
