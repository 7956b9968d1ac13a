//! Customer account record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerbridge_common::{Amount, LedgerBridgeError, Result};

/// A customer balance as persisted in the key-value ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Customer name, unique within a ledger.
    pub customer_name: String,
    /// Current balance. Never negative.
    pub balance: Amount,
    /// When the balance last changed.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account holding `balance`.
    pub fn new(customer_name: impl Into<String>, balance: Amount) -> Self {
        Self {
            customer_name: customer_name.into(),
            balance,
            updated_at: Utc::now(),
        }
    }

    /// Storage key for a customer's account.
    pub fn key_for(customer_name: &str) -> String {
        format!("account/{customer_name}")
    }

    /// Storage key for this account.
    pub fn key(&self) -> String {
        Self::key_for(&self.customer_name)
    }

    /// Check if the account can cover a withdrawal.
    pub fn has_sufficient_funds(&self, amount: Amount) -> bool {
        self.balance >= amount
    }

    /// Increase the balance.
    pub fn credit(&mut self, amount: Amount) -> Result<()> {
        self.balance = self.balance.checked_add(amount).ok_or_else(|| {
            LedgerBridgeError::InvalidAmount(format!(
                "deposit of {amount} overflows balance of {}",
                self.customer_name
            ))
        })?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Decrease the balance, refusing to go below zero.
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        if !self.has_sufficient_funds(amount) {
            return Err(LedgerBridgeError::insufficient_funds(
                &self.customer_name,
                amount,
                self.balance,
            ));
        }
        self.balance -= amount;
        self.updated_at = Utc::now();
        Ok(())
    }
}
