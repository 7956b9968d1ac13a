//! Running obligation between the two parties of a ledger pair.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use ledgerbridge_common::{decode, encode, Amount, LedgerBridgeError, LedgerPair, PartyId, Result};
use ledgerbridge_ledger::{KeyedLockManager, KvStore, LockKey};

/// The single persisted amount one party owes the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    /// Party that owes.
    pub owing_party: PartyId,
    /// Party that is owed.
    pub owed_party: PartyId,
    /// Amount owed.
    pub amount: Amount,
    /// When the amount last changed.
    pub updated_at: DateTime<Utc>,
}

impl Obligation {
    /// A zero obligation for `pair`.
    pub fn zero(pair: &LedgerPair) -> Self {
        Self {
            owing_party: pair.debtor.clone(),
            owed_party: pair.creditor.clone(),
            amount: 0,
            updated_at: Utc::now(),
        }
    }

    /// Where the record sits in its cycle.
    pub fn state(&self) -> ObligationState {
        if self.amount == 0 {
            ObligationState::Zero
        } else {
            ObligationState::Accumulating
        }
    }
}

/// Obligation lifecycle: `Zero -> Accumulating -> Zero`, repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObligationState {
    /// Nothing owed.
    Zero,
    /// One or more withdrawals accumulated since the last clear.
    Accumulating,
}

/// Result of a settlement-clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClearOutcome {
    /// Nothing was owed; nothing was written.
    NoDues,
    /// `amount` was owed and the record is now zero.
    Cleared { amount: Amount },
}

/// Accumulates and clears the obligation of one ledger pair.
///
/// Every read-modify-write of the record runs under the pair's lock, so
/// accumulations and clears never interleave.
pub struct SettlementLedger {
    /// Pair whose obligation this ledger tracks.
    pair: LedgerPair,
    /// Backing key-value store.
    store: Arc<dyn KvStore>,
    /// Lock manager.
    locks: Arc<KeyedLockManager>,
    /// Fee added to every accumulated withdrawal.
    service_charge: Amount,
}

impl SettlementLedger {
    /// Create a new settlement ledger.
    pub fn new(
        pair: LedgerPair,
        store: Arc<dyn KvStore>,
        locks: Arc<KeyedLockManager>,
        service_charge: Amount,
    ) -> Self {
        Self {
            pair,
            store,
            locks,
            service_charge,
        }
    }

    /// Pair this ledger tracks.
    pub fn pair(&self) -> &LedgerPair {
        &self.pair
    }

    /// Fee added per withdrawal.
    pub fn service_charge(&self) -> Amount {
        self.service_charge
    }

    /// Amount a withdrawal of `withdrawn` adds to the obligation.
    pub fn settlement_amount(&self, withdrawn: Amount) -> Result<Amount> {
        withdrawn.checked_add(self.service_charge).ok_or_else(|| {
            LedgerBridgeError::InvalidAmount(format!(
                "withdrawal of {withdrawn} plus charge {} overflows",
                self.service_charge
            ))
        })
    }

    /// Write a zero record unless one already exists.
    #[instrument(skip(self), fields(pair = %self.pair))]
    pub async fn initialize(&self) -> Result<Obligation> {
        let _lock = self.locks.acquire(LockKey::obligation(&self.pair)).await;

        if let Some(existing) = self.load().await? {
            info!(amount = existing.amount, "Obligation already initialized");
            return Ok(existing);
        }

        let obligation = Obligation::zero(&self.pair);
        self.save(&obligation).await?;
        info!("Obligation initialized");
        Ok(obligation)
    }

    /// Current obligation. An absent record reads as zero.
    pub async fn current(&self) -> Result<Obligation> {
        let result = self.load().await.map(|o| o.unwrap_or_else(|| Obligation::zero(&self.pair)));
        if let Err(e) = &result {
            warn!(pair = %self.pair, error = %e, "Obligation lookup failed");
        }
        result
    }

    /// Add a completed withdrawal of `withdrawn` plus the service charge.
    ///
    /// Returns the new obligation.
    #[instrument(skip(self), fields(pair = %self.pair))]
    pub async fn accumulate(&self, withdrawn: Amount) -> Result<Obligation> {
        let result = self.accumulate_locked(withdrawn).await;
        match &result {
            Ok(obligation) => info!(
                withdrawn,
                charge = self.service_charge,
                amount = obligation.amount,
                "Obligation accumulated"
            ),
            Err(e) => warn!(withdrawn, error = %e, "Obligation accumulation failed"),
        }
        result
    }

    /// Report the current obligation and reset it to zero.
    ///
    /// A zero obligation reports `NoDues` and writes nothing.
    #[instrument(skip(self), fields(pair = %self.pair))]
    pub async fn clear(&self) -> Result<ClearOutcome> {
        let result = self.clear_locked().await;
        match &result {
            Ok(ClearOutcome::NoDues) => info!("No dues to clear"),
            Ok(ClearOutcome::Cleared { amount }) => info!(amount, "Obligation cleared"),
            Err(e) => warn!(error = %e, "Obligation clear failed"),
        }
        result
    }

    // --- Private methods ---

    async fn accumulate_locked(&self, withdrawn: Amount) -> Result<Obligation> {
        let increment = self.settlement_amount(withdrawn)?;

        let _lock = self.locks.acquire(LockKey::obligation(&self.pair)).await;

        let mut obligation = self
            .load()
            .await?
            .unwrap_or_else(|| Obligation::zero(&self.pair));

        obligation.amount = obligation.amount.checked_add(increment).ok_or_else(|| {
            LedgerBridgeError::InvalidAmount(format!(
                "obligation {} plus {increment} overflows",
                obligation.amount
            ))
        })?;
        obligation.updated_at = Utc::now();

        self.save(&obligation).await?;
        Ok(obligation)
    }

    async fn clear_locked(&self) -> Result<ClearOutcome> {
        let _lock = self.locks.acquire(LockKey::obligation(&self.pair)).await;

        let Some(mut obligation) = self.load().await? else {
            return Ok(ClearOutcome::NoDues);
        };
        if obligation.state() == ObligationState::Zero {
            return Ok(ClearOutcome::NoDues);
        }

        let amount = obligation.amount;
        obligation.amount = 0;
        obligation.updated_at = Utc::now();
        self.save(&obligation).await?;

        Ok(ClearOutcome::Cleared { amount })
    }

    async fn load(&self) -> Result<Option<Obligation>> {
        match self.store.get(&self.pair.obligation_key()).await? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, obligation: &Obligation) -> Result<()> {
        self.store
            .put(&self.pair.obligation_key(), encode(obligation)?)
            .await
    }
}
