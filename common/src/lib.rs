//! LedgerBridge Common Types
//!
//! Shared types used by both sides of a bilateral settlement: party and
//! endpoint identifiers, amount parsing, persisted bookkeeping records and the
//! error taxonomy that crosses ledger boundaries.

pub mod identifiers;
pub mod amount;
pub mod records;
pub mod error;

pub use identifiers::*;
pub use amount::*;
pub use records::*;
pub use error::*;
