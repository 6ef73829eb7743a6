//! Seams to the external custody and LP-share ledgers
//!
//! The engine never keeps user balances. It asks [`AssetCustody`] to move
//! assets in and out of the pool and [`ShareLedger`] to mint and burn LP
//! shares; both are authoritative for what they hold.

use crate::error::LedgerError;
use crate::order::{AccountId, Asset};
use std::collections::HashMap;

/// Moves pooled assets between users and the pool
pub trait AssetCustody {
    /// Debit `account` and hold the amount in the pool
    fn collect(&mut self, account: AccountId, asset: Asset, amount: u128) -> Result<(), LedgerError>;

    /// Pay `amount` out of the pool to `account`
    fn release(&mut self, account: AccountId, asset: Asset, amount: u128) -> Result<(), LedgerError>;
}

/// Ownership record for LP shares
pub trait ShareLedger {
    fn balance_of(&self, holder: AccountId) -> u128;

    fn mint(&mut self, to: AccountId, shares: u128) -> Result<(), LedgerError>;

    fn burn(&mut self, from: AccountId, shares: u128) -> Result<(), LedgerError>;
}

/// Wallet balances kept in memory; the default custody for tests and simulations
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustody {
    wallets: HashMap<(AccountId, Asset), u128>,
    /// Assets the pool currently holds on behalf of everyone
    held: HashMap<Asset, u128>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a wallet from outside the pool
    pub fn fund(&mut self, account: AccountId, asset: Asset, amount: u128) {
        *self.wallets.entry((account, asset)).or_default() += amount;
    }

    pub fn balance(&self, account: AccountId, asset: Asset) -> u128 {
        self.wallets.get(&(account, asset)).copied().unwrap_or(0)
    }

    /// Total the pool holds of `asset`: reserves, unsold principal, unpaid proceeds
    pub fn held(&self, asset: Asset) -> u128 {
        self.held.get(&asset).copied().unwrap_or(0)
    }
}

impl AssetCustody for InMemoryCustody {
    fn collect(&mut self, account: AccountId, asset: Asset, amount: u128) -> Result<(), LedgerError> {
        let available = self.balance(account, asset);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account,
                requested: amount,
                available,
            });
        }
        let held = self.held(asset);
        let new_held = held
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { account })?;

        self.wallets.insert((account, asset), available - amount);
        self.held.insert(asset, new_held);
        Ok(())
    }

    fn release(&mut self, account: AccountId, asset: Asset, amount: u128) -> Result<(), LedgerError> {
        let held = self.held(asset);
        if held < amount {
            return Err(LedgerError::InsufficientBalance {
                account,
                requested: amount,
                available: held,
            });
        }
        let balance = self
            .balance(account, asset)
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { account })?;

        self.held.insert(asset, held - amount);
        self.wallets.insert((account, asset), balance);
        Ok(())
    }
}

/// LP share balances kept in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryShares {
    balances: HashMap<AccountId, u128>,
}

impl InMemoryShares {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u128 {
        self.balances.values().sum()
    }
}

impl ShareLedger for InMemoryShares {
    fn balance_of(&self, holder: AccountId) -> u128 {
        self.balances.get(&holder).copied().unwrap_or(0)
    }

    fn mint(&mut self, to: AccountId, shares: u128) -> Result<(), LedgerError> {
        let balance = self
            .balance_of(to)
            .checked_add(shares)
            .ok_or(LedgerError::BalanceOverflow { account: to })?;
        self.balances.insert(to, balance);
        Ok(())
    }

    fn burn(&mut self, from: AccountId, shares: u128) -> Result<(), LedgerError> {
        let available = self.balance_of(from);
        if available < shares {
            return Err(LedgerError::InsufficientBalance {
                account: from,
                requested: shares,
                available,
            });
        }
        self.balances.insert(from, available - shares);
        Ok(())
    }
}
