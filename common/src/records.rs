//! Bookkeeping records written alongside ledger state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LedgerBridgeError, PartyId, Result};

/// Marker written each time a ledger is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRecord {
    /// Party whose ledger was initialized.
    pub party: PartyId,
    /// Free-form note, e.g. the seeded customer.
    pub note: String,
    /// When initialization happened.
    pub initialized_at: DateTime<Utc>,
}

impl InitRecord {
    /// Create a new init record stamped with the current time.
    pub fn new(party: PartyId, note: impl Into<String>) -> Self {
        Self {
            party,
            note: note.into(),
            initialized_at: Utc::now(),
        }
    }

    /// Storage key the record is written under.
    pub fn key(&self) -> String {
        format!("init/{}", self.party)
    }

    /// Encode for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(self)
    }
}

/// Serialize a record as JSON for storage or the wire.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| LedgerBridgeError::StorageFailure(format!("encode failed: {e}")))
}

/// Deserialize a JSON record read from storage.
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| LedgerBridgeError::StorageFailure(format!("corrupt record: {e}")))
}
