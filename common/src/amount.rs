//! Amount parsing for balances and obligations.
//!
//! All amounts are whole units held as `u64`; arguments arrive as strings on
//! the wire and are parsed here once.

use crate::{LedgerBridgeError, Result};

/// A whole-unit amount. Balances and obligations are never negative.
pub type Amount = u64;

/// Parse a signed integer argument, leaving the sign and range checks to the
/// ledger. Wide enough for every `Amount` and its negation.
pub fn parse_signed(raw: &str) -> Result<i128> {
    raw.trim().parse().map_err(|_| {
        LedgerBridgeError::MalformedAmount(format!("expected an integer, got {raw:?}"))
    })
}

/// Parse a non-negative amount argument such as a seed balance.
///
/// Text that is not an integer is `MalformedAmount`; an integer below zero
/// (or past `u64::MAX`) is `InvalidAmount`.
pub fn parse_amount(raw: &str) -> Result<Amount> {
    let trimmed = raw.trim();
    let value: i128 = trimmed.parse().map_err(|_| {
        LedgerBridgeError::MalformedAmount(format!("expected an integer, got {raw:?}"))
    })?;

    if value < 0 {
        return Err(LedgerBridgeError::InvalidAmount(format!(
            "amount must not be negative, got {value}"
        )));
    }

    Amount::try_from(value)
        .map_err(|_| LedgerBridgeError::InvalidAmount(format!("amount {value} is out of range")))
}

/// Parse the withdrawn amount a settlement is computed from.
///
/// Anything that is not a non-negative integer is `MalformedAmount`.
pub fn parse_settlement_amount(raw: &str) -> Result<Amount> {
    parse_amount(raw).map_err(|err| match err {
        LedgerBridgeError::InvalidAmount(message) => LedgerBridgeError::MalformedAmount(message),
        other => other,
    })
}
