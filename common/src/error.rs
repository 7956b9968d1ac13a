//! Error types for LedgerBridge operations.

use crate::Endpoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for LedgerBridge operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerBridgeError {
    /// Call shape is wrong: argument count, missing separator, blank field.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Operation name is not part of the dispatch table.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Customer account does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Amount is negative or would overflow a balance.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Withdrawal exceeds the available balance.
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Counterparty could not be reached or did not answer in time.
    #[error("Remote ledger {endpoint} unreachable: {reason}")]
    RemoteUnreachable { endpoint: Endpoint, reason: String },

    /// Counterparty answered with an application error.
    #[error("Remote ledger {endpoint} rejected call [{code}]: {message}")]
    RemoteRejected {
        endpoint: Endpoint,
        code: String,
        message: String,
    },

    /// Numeric argument could not be parsed as a non-negative integer.
    #[error("Malformed amount: {0}")]
    MalformedAmount(String),

    /// Key-value read or write failed.
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl LedgerBridgeError {
    /// Build an insufficient funds error with the figures that caused it.
    pub fn insufficient_funds(customer: &str, requested: u64, available: u64) -> Self {
        LedgerBridgeError::InsufficientFunds(format!(
            "customer {customer} requested {requested}, available {available}"
        ))
    }

    /// Check if this error is retryable by the caller.
    ///
    /// Only transport failures qualify; a retry is always a new invocation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerBridgeError::RemoteUnreachable { .. })
    }

    /// Get error code for the wire.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerBridgeError::InvalidArguments(_) => "INVALID_ARGUMENTS",
            LedgerBridgeError::UnknownOperation(_) => "UNKNOWN_OPERATION",
            LedgerBridgeError::NotFound(_) => "NOT_FOUND",
            LedgerBridgeError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerBridgeError::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            LedgerBridgeError::RemoteUnreachable { .. } => "REMOTE_UNREACHABLE",
            LedgerBridgeError::RemoteRejected { .. } => "REMOTE_REJECTED",
            LedgerBridgeError::MalformedAmount(_) => "MALFORMED_AMOUNT",
            LedgerBridgeError::StorageFailure(_) => "STORAGE_FAILURE",
            LedgerBridgeError::ConfigurationError(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Message without the kind prefix, as carried on the wire.
    pub fn detail(&self) -> String {
        match self {
            LedgerBridgeError::InvalidArguments(m)
            | LedgerBridgeError::UnknownOperation(m)
            | LedgerBridgeError::NotFound(m)
            | LedgerBridgeError::InvalidAmount(m)
            | LedgerBridgeError::InsufficientFunds(m)
            | LedgerBridgeError::MalformedAmount(m)
            | LedgerBridgeError::StorageFailure(m)
            | LedgerBridgeError::ConfigurationError(m) => m.clone(),
            LedgerBridgeError::RemoteRejected { message, .. } => message.clone(),
            LedgerBridgeError::RemoteUnreachable { .. } => self.to_string(),
        }
    }

    /// Turn a counterparty rejection into a local error.
    ///
    /// Business-rule codes are lifted into the matching local kind so callers
    /// can match on them; anything else stays a `RemoteRejected`. The
    /// counterparty's message is kept verbatim either way.
    pub fn from_rejection(endpoint: &Endpoint, reason: RejectionReason) -> Self {
        match reason.code.as_str() {
            "NOT_FOUND" => LedgerBridgeError::NotFound(reason.message),
            "INSUFFICIENT_FUNDS" => LedgerBridgeError::InsufficientFunds(reason.message),
            "INVALID_AMOUNT" => LedgerBridgeError::InvalidAmount(reason.message),
            "MALFORMED_AMOUNT" => LedgerBridgeError::MalformedAmount(reason.message),
            _ => LedgerBridgeError::RemoteRejected {
                endpoint: endpoint.clone(),
                code: reason.code,
                message: reason.message,
            },
        }
    }
}

/// Result type alias for LedgerBridge operations.
pub type Result<T> = std::result::Result<T, LedgerBridgeError>;

/// Application error as it crosses the wire between ledgers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionReason {
    /// Error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl RejectionReason {
    /// Create a new rejection reason.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&LedgerBridgeError> for RejectionReason {
    fn from(err: &LedgerBridgeError) -> Self {
        Self::new(err.error_code(), err.detail())
    }
}
