//! Thread-safe handle to one pool
//!
//! Every operation runs under a single lock, so concurrent callers observe
//! the same serialized order of steps a single-threaded caller would.

use crate::error::Result;
use crate::ledger::{AssetCustody, InMemoryCustody, InMemoryShares, ShareLedger};
use crate::pool::TwammPool;
use crate::snapshot::PoolSnapshot;
use crate::virtual_orders::VirtualizationReport;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Cloneable, lock-protected pool
#[derive(Debug)]
pub struct SharedTwammPool<C = InMemoryCustody, S = InMemoryShares> {
    inner: Arc<Mutex<TwammPool<C, S>>>,
}

impl<C, S> Clone for SharedTwammPool<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: AssetCustody, S: ShareLedger> SharedTwammPool<C, S> {
    pub fn new(pool: TwammPool<C, S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pool)),
        }
    }

    /// Hold the lock for several operations in a row
    pub fn lock(&self) -> MutexGuard<'_, TwammPool<C, S>> {
        self.inner.lock()
    }

    /// Run one closure under the lock
    pub fn with<R>(&self, f: impl FnOnce(&mut TwammPool<C, S>) -> R) -> R {
        let mut pool = self.inner.lock();
        f(&mut pool)
    }

    pub fn execute_virtual_orders(&self, now: u64) -> Result<VirtualizationReport> {
        self.inner.lock().execute_virtual_orders(now)
    }

    pub fn snapshot_at(&self, now: u64) -> Result<PoolSnapshot> {
        self.inner.lock().snapshot_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{AccountId, Asset, Direction};
    use std::thread;
    use tidal_config::PoolSettings;

    #[test]
    fn test_concurrent_swaps_are_serialized() {
        let mut pool = TwammPool::new(PoolSettings::default(), 0).unwrap();
        let lp = AccountId(0);
        pool.custody_mut().fund(lp, Asset::A, 1_000_000_000);
        pool.custody_mut().fund(lp, Asset::B, 1_000_000_000);
        pool.provide_initial_liquidity(lp, 1_000_000_000, 1_000_000_000, 0).unwrap();
        for trader in 1..=4 {
            pool.custody_mut().fund(AccountId(trader), Asset::A, 100_000);
        }

        let shared = SharedTwammPool::new(pool);
        let k_before = shared.lock().reserve_pool().k();

        let handles: Vec<_> = (1..=4u64)
            .map(|trader| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        // All threads trade at step 0; no time passes
                        shared
                            .with(|p| p.swap(AccountId(trader), Direction::AToB, 10_000, 0))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let pool = shared.lock();
        assert_eq!(pool.reserves().0, 1_000_000_000 + 400_000);
        assert!(pool.reserve_pool().k() > k_before);
        for trader in 1..=4 {
            assert_eq!(pool.custody().balance(AccountId(trader), Asset::A), 0);
        }
    }
}
