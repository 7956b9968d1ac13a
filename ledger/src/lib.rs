//! LedgerBridge Ledger
//!
//! Party-local account ledger over an injected key-value store. Balance
//! check-then-mutate sequences run under exclusive per-key locks.

pub mod store;
pub mod config;
pub mod lock_manager;
pub mod account;
pub mod account_ledger;

pub use store::{KvStore, MemoryStore};
pub use config::LockConfig;
pub use lock_manager::{KeyLock, KeyedLockManager, LockKey};
pub use account::Account;
pub use account_ledger::AccountLedger;
