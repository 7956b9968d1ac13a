//! LedgerBridge Acquirer
//!
//! The acquiring side of a bilateral settlement. Customers of the issuer
//! withdraw through the acquirer; every confirmed withdrawal adds the
//! withdrawn amount plus a service charge to the obligation the issuer owes,
//! until a settlement clears it.

pub mod chaincode;
pub mod config;
pub mod metrics;
pub mod operation;
pub mod router;
pub mod settlement_ledger;

pub use chaincode::{AcquirerChaincode, QUERY_FUNCTION};
pub use config::{AcquirerConfig, DEFAULT_SERVICE_CHARGE};
pub use metrics::{Metrics, MetricsSnapshot};
pub use operation::{Command, Operation, WithdrawRequest};
pub use router::{CommandRouter, RouterResponse, SettlementReport, WithdrawReceipt};
pub use settlement_ledger::{ClearOutcome, Obligation, ObligationState, SettlementLedger};
