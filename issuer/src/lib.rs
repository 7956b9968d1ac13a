//! LedgerBridge Issuer
//!
//! The issuing party's ledger of named customer balances, exposed to its
//! hosting runtime and to counterparties through the chaincode surface.

pub mod chaincode;

pub use chaincode::{BalanceResponse, IssuerChaincode, IssuerOperation};
