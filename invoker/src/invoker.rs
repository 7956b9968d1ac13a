//! Remote ledger invoker.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use ledgerbridge_common::{Endpoint, LedgerBridgeError, Result};

use crate::chaincode::{CallMode, Invocation};
use crate::config::InvokerConfig;
use crate::network::{LedgerTransport, TransportError};

/// Issues calls to a named counterparty ledger.
///
/// The calling task waits for the answer or the request timeout. Failures are
/// reported once and never retried here: a retry is a fresh invocation made by
/// the caller.
pub struct RemoteLedgerInvoker {
    /// Configuration.
    config: InvokerConfig,
    /// Transport to counterparties.
    transport: Arc<dyn LedgerTransport>,
}

impl RemoteLedgerInvoker {
    /// Create a new invoker.
    pub fn new(config: InvokerConfig, transport: Arc<dyn LedgerTransport>) -> Self {
        Self { config, transport }
    }

    /// Read-only call to `endpoint`.
    pub async fn query(
        &self,
        endpoint: &Endpoint,
        operation: &str,
        params: Vec<String>,
    ) -> Result<Vec<u8>> {
        self.call(Invocation::new(endpoint.clone(), CallMode::Query, operation, params))
            .await
    }

    /// State-changing call to `endpoint`.
    pub async fn invoke(
        &self,
        endpoint: &Endpoint,
        operation: &str,
        params: Vec<String>,
    ) -> Result<Vec<u8>> {
        self.call(Invocation::new(endpoint.clone(), CallMode::Invoke, operation, params))
            .await
    }

    /// Deliver `invocation` and return the counterparty's raw response.
    ///
    /// `RemoteUnreachable` if the target cannot be reached in time,
    /// `RemoteRejected` with the target's code and message if it refused.
    #[instrument(
        skip(self, invocation),
        fields(tx_id = %invocation.tx_id, target = %invocation.target, mode = ?invocation.mode)
    )]
    pub async fn call(&self, invocation: Invocation) -> Result<Vec<u8>> {
        info!(args = ?invocation.args, "Calling remote ledger");

        let delivery =
            tokio::time::timeout(self.config.request_timeout, self.transport.deliver(&invocation))
                .await;

        let result = match delivery {
            Err(_) => Err(LedgerBridgeError::RemoteUnreachable {
                endpoint: invocation.target.clone(),
                reason: format!("no response within {:?}", self.config.request_timeout),
            }),
            Ok(Err(TransportError::Unreachable(reason))) => {
                Err(LedgerBridgeError::RemoteUnreachable {
                    endpoint: invocation.target.clone(),
                    reason,
                })
            }
            Ok(Err(TransportError::Rejected(reason))) => Err(LedgerBridgeError::RemoteRejected {
                endpoint: invocation.target.clone(),
                code: reason.code,
                message: reason.message,
            }),
            Ok(Ok(response)) => Ok(response),
        };

        match &result {
            Ok(response) => info!(bytes = response.len(), "Remote ledger responded"),
            Err(e) => warn!(error = %e, "Remote ledger call failed"),
        }
        result
    }
}
