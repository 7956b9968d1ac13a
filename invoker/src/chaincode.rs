//! The entry points every ledger exposes, and the invocation value that
//! reaches them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ledgerbridge_common::{Endpoint, LedgerBridgeError, Result, TxId};

/// How a cross-party call treats the target's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallMode {
    /// Read-only at the target; a caller may safely repeat it.
    Query,
    /// State-changing at the target; issued at most once per invocation.
    Invoke,
}

impl CallMode {
    /// Check if the call leaves the target untouched.
    pub fn is_read_only(&self) -> bool {
        matches!(self, CallMode::Query)
    }
}

/// A single cross-party call, alive only while it is in flight.
///
/// `args` follows the wire contract `[operationName, ...params]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Identifier for log correlation.
    pub tx_id: TxId,
    /// Counterparty the call is addressed to.
    pub target: Endpoint,
    /// Read-only or state-changing.
    pub mode: CallMode,
    /// Operation name followed by its parameters.
    pub args: Vec<String>,
}

impl Invocation {
    /// Create a new invocation.
    pub fn new(
        target: Endpoint,
        mode: CallMode,
        operation: impl Into<String>,
        params: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut args = vec![operation.into()];
        args.extend(params);
        Self {
            tx_id: TxId::new(),
            target,
            mode,
            args,
        }
    }

    /// Read-only call.
    pub fn query(
        target: Endpoint,
        operation: impl Into<String>,
        params: impl IntoIterator<Item = String>,
    ) -> Self {
        Self::new(target, CallMode::Query, operation, params)
    }

    /// State-changing call.
    pub fn invoke(
        target: Endpoint,
        operation: impl Into<String>,
        params: impl IntoIterator<Item = String>,
    ) -> Self {
        Self::new(target, CallMode::Invoke, operation, params)
    }

    /// Operation name, if the argument list is not empty.
    pub fn operation(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Parameters after the operation name.
    pub fn params(&self) -> &[String] {
        self.args.get(1..).unwrap_or(&[])
    }
}

/// Entry points a ledger exposes to its hosting runtime and to counterparties.
#[async_trait]
pub trait Chaincode: Send + Sync {
    /// Seed the ledger's initial state.
    async fn init(&self, args: &[String]) -> Result<Vec<u8>>;

    /// Run a state-changing operation.
    async fn invoke(&self, function: &str, args: &[String]) -> Result<Vec<u8>>;

    /// Run a read-only operation.
    async fn query(&self, function: &str, args: &[String]) -> Result<Vec<u8>>;
}

/// Hand an invocation to the entry point its mode selects.
pub async fn deliver(chaincode: &dyn Chaincode, invocation: &Invocation) -> Result<Vec<u8>> {
    let operation = invocation.operation().ok_or_else(|| {
        LedgerBridgeError::InvalidArguments("invocation carries no operation name".to_string())
    })?;

    match invocation.mode {
        CallMode::Query => chaincode.query(operation, invocation.params()).await,
        CallMode::Invoke => chaincode.invoke(operation, invocation.params()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoChaincode;

    #[async_trait]
    impl Chaincode for EchoChaincode {
        async fn init(&self, _args: &[String]) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn invoke(&self, function: &str, args: &[String]) -> Result<Vec<u8>> {
            Ok(format!("invoke:{function}:{}", args.join("|")).into_bytes())
        }

        async fn query(&self, function: &str, args: &[String]) -> Result<Vec<u8>> {
            Ok(format!("query:{function}:{}", args.join("|")).into_bytes())
        }
    }

    #[test]
    fn test_invocation_layout() {
        let invocation = Invocation::invoke(
            Endpoint::new("issuer"),
            "Withdraw",
            ["alice".to_string(), "30".to_string()],
        );

        assert_eq!(invocation.args, vec!["Withdraw", "alice", "30"]);
        assert_eq!(invocation.operation(), Some("Withdraw"));
        assert_eq!(invocation.params(), ["alice", "30"]);
        assert!(!invocation.mode.is_read_only());
    }

    #[tokio::test]
    async fn test_deliver_routes_by_mode() {
        let query = Invocation::query(Endpoint::new("issuer"), "GetAccountBalance", ["alice".to_string()]);
        let invoke = Invocation::invoke(Endpoint::new("issuer"), "Deposit", ["alice".to_string(), "5".to_string()]);

        assert_eq!(
            deliver(&EchoChaincode, &query).await.unwrap(),
            b"query:GetAccountBalance:alice".to_vec()
        );
        assert_eq!(
            deliver(&EchoChaincode, &invoke).await.unwrap(),
            b"invoke:Deposit:alice|5".to_vec()
        );
    }

    #[tokio::test]
    async fn test_deliver_rejects_empty_args() {
        let mut invocation = Invocation::query(Endpoint::new("issuer"), "x", Vec::new());
        invocation.args.clear();

        assert!(matches!(
            deliver(&EchoChaincode, &invocation).await,
            Err(LedgerBridgeError::InvalidArguments(_))
        ));
    }
}
