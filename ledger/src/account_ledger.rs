//! Customer balance ledger.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use ledgerbridge_common::{decode, encode, Amount, LedgerBridgeError, PartyId, Result};

use crate::account::Account;
use crate::lock_manager::{KeyedLockManager, LockKey};
use crate::store::KvStore;

/// Per-customer balances for one party, persisted through a [`KvStore`].
///
/// Every mutation reads, checks and writes under the customer's lock, so a
/// balance is never observed or written half-way through another call.
pub struct AccountLedger {
    /// Party owning this ledger.
    party: PartyId,
    /// Backing key-value store.
    store: Arc<dyn KvStore>,
    /// Per-customer locks.
    locks: Arc<KeyedLockManager>,
}

impl AccountLedger {
    /// Create a new account ledger.
    pub fn new(party: PartyId, store: Arc<dyn KvStore>, locks: Arc<KeyedLockManager>) -> Self {
        Self {
            party,
            store,
            locks,
        }
    }

    /// Party owning this ledger.
    pub fn party(&self) -> &PartyId {
        &self.party
    }

    /// Create an account, or reseed an existing one, with `balance`.
    #[instrument(skip(self), fields(party = %self.party))]
    pub async fn open_account(&self, customer: &str, balance: Amount) -> Result<Account> {
        if customer.trim().is_empty() {
            return Err(LedgerBridgeError::InvalidArguments(
                "customer name cannot be empty".to_string(),
            ));
        }

        let _lock = self.locks.acquire(LockKey::account(&self.party, customer)).await;
        let account = Account::new(customer, balance);
        self.save(&account).await?;

        info!(customer, balance, "Account opened");
        Ok(account)
    }

    /// Get a customer's current balance.
    #[instrument(skip(self), fields(party = %self.party))]
    pub async fn get_balance(&self, customer: &str) -> Result<Amount> {
        let account = self.account(customer).await?;
        Ok(account.balance)
    }

    /// Load a customer's account.
    pub async fn account(&self, customer: &str) -> Result<Account> {
        let result = self.load(customer).await;
        if let Err(e) = &result {
            warn!(customer, error = %e, "Account lookup failed");
        }
        result
    }

    /// Add `amount` to a customer's balance.
    #[instrument(skip(self), fields(party = %self.party))]
    pub async fn deposit(&self, customer: &str, amount: i128) -> Result<Account> {
        info!(customer, amount, "Depositing funds");

        let result = self.apply(customer, amount, Account::credit).await;
        match &result {
            Ok(account) => info!(customer, balance = account.balance, "Deposit applied"),
            Err(e) => warn!(customer, amount, error = %e, "Deposit rejected"),
        }
        result
    }

    /// Take `amount` from a customer's balance.
    ///
    /// Fails with `InsufficientFunds`, and writes nothing, if the balance
    /// cannot cover it.
    #[instrument(skip(self), fields(party = %self.party))]
    pub async fn withdraw(&self, customer: &str, amount: i128) -> Result<Account> {
        info!(customer, amount, "Withdrawing funds");

        let result = self.apply(customer, amount, Account::debit).await;
        match &result {
            Ok(account) => info!(customer, balance = account.balance, "Withdrawal applied"),
            Err(e) => warn!(customer, amount, error = %e, "Withdrawal rejected"),
        }
        result
    }

    // --- Private methods ---

    async fn apply(
        &self,
        customer: &str,
        amount: i128,
        change: fn(&mut Account, Amount) -> Result<()>,
    ) -> Result<Account> {
        if amount < 0 {
            return Err(LedgerBridgeError::InvalidAmount(format!(
                "amount must not be negative, got {amount}"
            )));
        }
        let amount = Amount::try_from(amount).map_err(|_| {
            LedgerBridgeError::InvalidAmount(format!("amount {amount} is out of range"))
        })?;

        let _lock = self.locks.acquire(LockKey::account(&self.party, customer)).await;

        let mut account = self.load(customer).await?;
        change(&mut account, amount)?;
        self.save(&account).await?;

        Ok(account)
    }

    async fn load(&self, customer: &str) -> Result<Account> {
        let bytes = self
            .store
            .get(&Account::key_for(customer))
            .await?
            .ok_or_else(|| LedgerBridgeError::NotFound(format!("customer {customer}")))?;
        decode(&bytes)
    }

    async fn save(&self, account: &Account) -> Result<()> {
        self.store.put(&account.key(), encode(account)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use proptest::prelude::*;
    use tokio_test::{assert_err, assert_ok};

    fn ledger_with_store() -> (AccountLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ledger = AccountLedger::new(
            PartyId::new("IBI"),
            store.clone(),
            Arc::new(KeyedLockManager::default()),
        );
        (ledger, store)
    }

    #[tokio::test]
    async fn test_open_and_get_balance() {
        let (ledger, _) = ledger_with_store();

        assert_ok!(ledger.open_account("alice", 100).await);
        assert_eq!(ledger.get_balance("alice").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_unknown_customer_is_not_found() {
        let (ledger, _) = ledger_with_store();

        let err = ledger.get_balance("mallory").await.unwrap_err();
        assert!(matches!(err, LedgerBridgeError::NotFound(_)));
        assert!(matches!(
            ledger.withdraw("mallory", 1).await,
            Err(LedgerBridgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_withdraw_subtracts() {
        let (ledger, _) = ledger_with_store();
        ledger.open_account("alice", 100).await.unwrap();

        let account = ledger.withdraw("alice", 30).await.unwrap();
        assert_eq!(account.balance, 70);
        assert_eq!(ledger.get_balance("alice").await.unwrap(), 70);

        let account = ledger.withdraw("alice", 70).await.unwrap();
        assert_eq!(account.balance, 0);
    }

    #[tokio::test]
    async fn test_deposit_adds() {
        let (ledger, _) = ledger_with_store();
        ledger.open_account("alice", 100).await.unwrap();

        let account = ledger.deposit("alice", 25).await.unwrap();
        assert_eq!(account.balance, 125);
    }

    #[tokio::test]
    async fn test_overdraw_rejected_without_write() {
        let (ledger, store) = ledger_with_store();
        ledger.open_account("alice", 100).await.unwrap();
        let writes = store.write_count();

        let err = ledger.withdraw("alice", 200).await.unwrap_err();
        assert!(matches!(err, LedgerBridgeError::InsufficientFunds(_)));
        assert_eq!(ledger.get_balance("alice").await.unwrap(), 100);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_negative_amounts_rejected() {
        let (ledger, _) = ledger_with_store();
        ledger.open_account("alice", 100).await.unwrap();

        assert!(matches!(
            ledger.deposit("alice", -1).await,
            Err(LedgerBridgeError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.withdraw("alice", -1).await,
            Err(LedgerBridgeError::InvalidAmount(_))
        ));
        assert_eq!(ledger.get_balance("alice").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_amounts_past_i64_reach_the_balance_check() {
        let (ledger, _) = ledger_with_store();
        ledger.open_account("alice", 100).await.unwrap();

        assert!(matches!(
            ledger.withdraw("alice", u64::MAX as i128).await,
            Err(LedgerBridgeError::InsufficientFunds(_))
        ));
        assert!(matches!(
            ledger.withdraw("alice", u64::MAX as i128 + 1).await,
            Err(LedgerBridgeError::InvalidAmount(_))
        ));
        assert_eq!(ledger.get_balance("alice").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_balance() {
        let (ledger, store) = ledger_with_store();
        ledger.open_account("alice", 100).await.unwrap();

        store.set_fail_writes(true);
        let err = ledger.withdraw("alice", 30).await.unwrap_err();
        assert!(matches!(err, LedgerBridgeError::StorageFailure(_)));

        store.set_fail_writes(false);
        assert_eq!(ledger.get_balance("alice").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_blank_customer_rejected() {
        let (ledger, _) = ledger_with_store();
        assert_err!(ledger.open_account("  ", 10).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_withdrawals_serialize() {
        let (ledger, _) = ledger_with_store();
        let ledger = Arc::new(ledger);
        ledger.open_account("alice", 100).await.unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.withdraw("alice", 60).await })
            })
            .collect();

        let mut succeeded = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerBridgeError::InsufficientFunds(_)) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(insufficient, 1);
        assert_eq!(ledger.get_balance("alice").await.unwrap(), 40);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Deposit(i128),
        Withdraw(i128),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-50i128..500).prop_map(Op::Deposit),
            (-50i128..500).prop_map(Op::Withdraw),
        ]
    }

    proptest! {
        #[test]
        fn balance_never_goes_negative(seed in 0u64..1_000, ops in prop::collection::vec(op(), 1..40)) {
            tokio_test::block_on(async {
                let (ledger, _) = ledger_with_store();
                ledger.open_account("alice", seed).await.unwrap();
                let mut expected = seed;

                for op in ops {
                    match op {
                        Op::Deposit(v) => {
                            let result = ledger.deposit("alice", v).await;
                            if v >= 0 {
                                expected += v as u64;
                                prop_assert!(result.is_ok());
                            } else {
                                prop_assert!(result.is_err());
                            }
                        }
                        Op::Withdraw(v) => {
                            let result = ledger.withdraw("alice", v).await;
                            if v >= 0 && (v as u64) <= expected {
                                expected -= v as u64;
                                prop_assert!(result.is_ok());
                            } else {
                                prop_assert!(result.is_err());
                            }
                        }
                    }
                    prop_assert_eq!(ledger.get_balance("alice").await.unwrap(), expected);
                }
                Ok(())
            })?;
        }
    }
}
