//! Operations the router dispatches, and their validated arguments.

use std::fmt;
use std::str::FromStr;

use ledgerbridge_common::{parse_settlement_amount, Amount, Endpoint, LedgerBridgeError, Result};

/// Closed set of router operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read a customer's balance at the counterparty.
    GetAccountBalance,
    /// Withdraw at the counterparty and accumulate the obligation.
    WithdrawFund,
    /// Peek at the current obligation.
    GetSettlement,
    /// Report and clear the current obligation.
    Settlement,
}

impl Operation {
    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetAccountBalance => "GetAccountBalance",
            Operation::WithdrawFund => "WithdrawFund",
            Operation::GetSettlement => "GetSettlement",
            Operation::Settlement => "Settlement",
        }
    }

    /// Check if the operation can run on the query path.
    pub fn is_read_only(&self) -> bool {
        match self {
            Operation::GetAccountBalance | Operation::GetSettlement => true,
            Operation::WithdrawFund | Operation::Settlement => false,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = LedgerBridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GetAccountBalance" => Ok(Operation::GetAccountBalance),
            "WithdrawFund" => Ok(Operation::WithdrawFund),
            "GetSettlement" => Ok(Operation::GetSettlement),
            "Settlement" => Ok(Operation::Settlement),
            other => Err(LedgerBridgeError::UnknownOperation(other.to_string())),
        }
    }
}

/// A withdrawal as the router receives it: `"customerName,amount"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawRequest {
    /// Customer to withdraw from.
    pub customer_name: String,
    /// Amount to withdraw.
    pub amount: Amount,
}

impl WithdrawRequest {
    /// Create a new withdraw request.
    pub fn new(customer_name: impl Into<String>, amount: Amount) -> Self {
        Self {
            customer_name: customer_name.into(),
            amount,
        }
    }

    /// Parse the comma-joined payload.
    ///
    /// A payload without exactly one comma, or with a blank name, is
    /// `InvalidArguments`; an amount that is not a non-negative integer is
    /// `MalformedAmount`.
    pub fn parse(payload: &str) -> Result<Self> {
        let Some((name, amount)) = payload.split_once(',') else {
            return Err(LedgerBridgeError::InvalidArguments(format!(
                "WithdrawFund expects \"customerName,amount\", got {payload:?}"
            )));
        };

        if amount.contains(',') {
            return Err(LedgerBridgeError::InvalidArguments(format!(
                "WithdrawFund expects exactly one comma, got {payload:?}"
            )));
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerBridgeError::InvalidArguments(
                "WithdrawFund customer name cannot be empty".to_string(),
            ));
        }

        Ok(Self::new(name, parse_settlement_amount(amount)?))
    }

    /// Parameters of the counterparty's `Withdraw` call.
    pub fn to_params(&self) -> Vec<String> {
        vec![self.customer_name.clone(), self.amount.to_string()]
    }
}

/// A parsed, validated router request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read a customer's balance.
    GetAccountBalance { customer_name: String },
    /// Withdraw and accumulate.
    WithdrawFund(WithdrawRequest),
    /// Peek at the obligation owed by `endpoint`'s party.
    GetSettlement { endpoint: Endpoint },
    /// Clear the obligation owed by `endpoint`'s party.
    Settlement { endpoint: Endpoint },
}

impl Command {
    /// Parse an operation name and its payload.
    pub fn parse(operation: &str, payload: &str) -> Result<Self> {
        let operation: Operation = operation.parse()?;
        Self::for_operation(operation, payload)
    }

    /// Validate `payload` for an already-matched operation.
    pub fn for_operation(operation: Operation, payload: &str) -> Result<Self> {
        match operation {
            Operation::GetAccountBalance => {
                let customer_name = payload.trim();
                if customer_name.is_empty() || customer_name.contains(',') {
                    return Err(LedgerBridgeError::InvalidArguments(format!(
                        "GetAccountBalance expects a customer name, got {payload:?}"
                    )));
                }
                Ok(Command::GetAccountBalance {
                    customer_name: customer_name.to_string(),
                })
            }
            Operation::WithdrawFund => Ok(Command::WithdrawFund(WithdrawRequest::parse(payload)?)),
            Operation::GetSettlement => Ok(Command::GetSettlement {
                endpoint: endpoint_arg(operation, payload)?,
            }),
            Operation::Settlement => Ok(Command::Settlement {
                endpoint: endpoint_arg(operation, payload)?,
            }),
        }
    }

    /// Operation this command runs.
    pub fn operation(&self) -> Operation {
        match self {
            Command::GetAccountBalance { .. } => Operation::GetAccountBalance,
            Command::WithdrawFund(_) => Operation::WithdrawFund,
            Command::GetSettlement { .. } => Operation::GetSettlement,
            Command::Settlement { .. } => Operation::Settlement,
        }
    }
}

fn endpoint_arg(operation: Operation, payload: &str) -> Result<Endpoint> {
    let endpoint = Endpoint::new(payload.trim());
    if !endpoint.is_valid() {
        return Err(LedgerBridgeError::InvalidArguments(format!(
            "{operation} expects a counterparty endpoint"
        )));
    }
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdraw_request_parse() {
        assert_eq!(
            WithdrawRequest::parse("alice,30").unwrap(),
            WithdrawRequest::new("alice", 30)
        );
        assert_eq!(
            WithdrawRequest::parse(" alice , 30 ").unwrap(),
            WithdrawRequest::new("alice", 30)
        );
    }

    #[test]
    fn test_withdraw_request_shape_errors() {
        for payload in ["alice30", "alice,30,1", ",30", ""] {
            assert!(
                matches!(
                    WithdrawRequest::parse(payload),
                    Err(LedgerBridgeError::InvalidArguments(_))
                ),
                "payload {payload:?}"
            );
        }
    }

    #[test]
    fn test_withdraw_request_amount_errors() {
        for payload in ["alice,thirty", "alice,-30", "alice,", "alice,3.5"] {
            assert!(
                matches!(
                    WithdrawRequest::parse(payload),
                    Err(LedgerBridgeError::MalformedAmount(_))
                ),
                "payload {payload:?}"
            );
        }
    }

    #[test]
    fn test_unknown_operation() {
        assert!(matches!(
            Command::parse("Transfer", "alice,30"),
            Err(LedgerBridgeError::UnknownOperation(_))
        ));
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(
            Command::parse("GetAccountBalance", "alice").unwrap(),
            Command::GetAccountBalance {
                customer_name: "alice".to_string()
            }
        );
        assert_eq!(
            Command::parse("Settlement", "issuer").unwrap().operation(),
            Operation::Settlement
        );
        assert!(matches!(
            Command::parse("Settlement", " "),
            Err(LedgerBridgeError::InvalidArguments(_))
        ));
        assert!(matches!(
            Command::parse("GetAccountBalance", "alice,30"),
            Err(LedgerBridgeError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_read_only_operations() {
        assert!(Operation::GetAccountBalance.is_read_only());
        assert!(Operation::GetSettlement.is_read_only());
        assert!(!Operation::WithdrawFund.is_read_only());
        assert!(!Operation::Settlement.is_read_only());
    }
}
