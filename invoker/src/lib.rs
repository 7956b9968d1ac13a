//! LedgerBridge Invoker
//!
//! The single integration surface between two ledgers. Each ledger exposes a
//! [`Chaincode`]; a counterparty reaches it through a [`LedgerTransport`]
//! driven by the [`RemoteLedgerInvoker`].

pub mod chaincode;
pub mod config;
pub mod invoker;
pub mod network;

pub use chaincode::{CallMode, Chaincode, Invocation};
pub use config::InvokerConfig;
pub use invoker::RemoteLedgerInvoker;
pub use network::{LedgerTransport, LocalNetwork, TransportError};
