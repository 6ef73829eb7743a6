//! Long-term order records and the identifiers around them

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Sequential order identifier, starting at 0 for each pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque account identifier supplied by the custody layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account:{}", self.0)
    }
}

/// One of the two pooled assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    A,
    B,
}

/// Trade direction, named by the asset being sold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    AToB,
    BToA,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::AToB, Direction::BToA];

    pub fn sell_asset(self) -> Asset {
        match self {
            Direction::AToB => Asset::A,
            Direction::BToA => Asset::B,
        }
    }

    pub fn buy_asset(self) -> Asset {
        match self {
            Direction::AToB => Asset::B,
            Direction::BToA => Asset::A,
        }
    }

    /// Slot in per-direction arrays
    pub(crate) fn index(self) -> usize {
        match self {
            Direction::AToB => 0,
            Direction::BToA => 1,
        }
    }
}

/// A streaming order: sells `sell_rate` units every step until `expires_at`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: AccountId,
    pub direction: Direction,
    pub sell_rate: u128,
    pub submitted_at: u64,
    pub expires_at: u64,
    /// Set once the final (post-expiry or cancellation) proceeds are paid
    pub proceeds_withdrawn: bool,
    pub cancelled_at: Option<u64>,
}

impl Order {
    /// Expired once virtualization has reached the expiry boundary
    pub fn is_expired(&self, last_virtualized_step: u64) -> bool {
        self.expires_at <= last_virtualized_step
    }

    /// Still contributing sell rate to its order pool
    pub fn is_active(&self, last_virtualized_step: u64) -> bool {
        !self.proceeds_withdrawn && !self.is_expired(last_virtualized_step)
    }

    /// Principal not yet sold into the pool as of `step`
    pub fn unsold_amount(&self, step: u64) -> u128 {
        if self.proceeds_withdrawn {
            return 0;
        }
        // expires_at - step < expires_at - submitted_at, and the rate was
        // derived by dividing the principal by the latter
        u128::from(self.expires_at.saturating_sub(step)) * self.sell_rate
    }
}

/// All orders ever submitted to a pool, by id
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: HashMap<OrderId, Order>,
    next_id: u64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next inserted order will receive
    pub fn next_id(&self) -> OrderId {
        OrderId(self.next_id)
    }

    /// Store a new order, assigning it the next id
    pub fn insert(&mut self, mut order: Order) -> OrderId {
        let id = OrderId(self.next_id);
        self.next_id += 1;
        order.id = id;
        self.orders.insert(id, order);
        id
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }
}
