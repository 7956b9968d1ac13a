//! Exclusive per-key locks for ledger state.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use ledgerbridge_common::{LedgerPair, PartyId};

use crate::config::LockConfig;

/// What a lock serializes access to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// One customer's balance in one party's ledger.
    Account { ledger: PartyId, customer: String },
    /// The obligation record of one ledger pair.
    Obligation(LedgerPair),
}

impl LockKey {
    /// Key for a customer account.
    pub fn account(ledger: &PartyId, customer: &str) -> Self {
        LockKey::Account {
            ledger: ledger.clone(),
            customer: customer.to_string(),
        }
    }

    /// Key for a pair's obligation.
    pub fn obligation(pair: &LedgerPair) -> Self {
        LockKey::Obligation(pair.clone())
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Account { ledger, customer } => write!(f, "account:{ledger}:{customer}"),
            LockKey::Obligation(pair) => write!(f, "obligation:{pair}"),
        }
    }
}

/// A held lock. Dropping it releases the key, on every exit path.
pub struct KeyLock {
    key: LockKey,
    acquired_at: Instant,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLock {
    /// The key this lock holds.
    pub fn key(&self) -> &LockKey {
        &self.key
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        debug!(
            key = %self.key,
            held_us = self.acquired_at.elapsed().as_micros() as u64,
            "Lock released"
        );
    }
}

/// Hands out exclusive async locks keyed by [`LockKey`].
///
/// Holders of different keys never wait on each other.
pub struct KeyedLockManager {
    /// One mutex per key seen so far.
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
    /// Configuration.
    config: LockConfig,
}

impl KeyedLockManager {
    /// Create a new lock manager.
    pub fn new(config: LockConfig) -> Self {
        Self {
            locks: DashMap::new(),
            config,
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: LockKey) -> KeyLock {
        // Clone the mutex out so the map shard is not held across the await.
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = mutex.lock_owned().await;
        debug!(key = %key, "Lock acquired");

        KeyLock {
            key,
            acquired_at: Instant::now(),
            _guard: guard,
        }
    }

    /// Check whether `key` is currently held.
    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.locks
            .get(key)
            .map(|m| m.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of keys with a tracked mutex.
    pub fn tracked_keys(&self) -> usize {
        self.locks.len()
    }

    /// Drop mutexes nobody holds or waits on.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        // The map's own Arc is the only reference left once a key is idle.
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        let pruned = before.saturating_sub(self.locks.len());
        if pruned > 0 {
            info!(pruned, "Idle locks pruned");
        }
        pruned
    }

    /// Run cleanup loop to prune idle locks.
    pub async fn run_cleanup_loop(&self) {
        loop {
            tokio::time::sleep(self.config.cleanup_interval).await;
            self.prune_idle();
        }
    }

    /// Spawn the cleanup loop on the current runtime.
    pub fn start_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_cleanup_loop().await;
        })
    }
}

impl Default for KeyedLockManager {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}
