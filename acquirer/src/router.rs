//! Command router: the acquirer's single dispatch point.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use ledgerbridge_common::{
    encode, Amount, Endpoint, LedgerBridgeError, RejectionReason, Result,
};
use ledgerbridge_invoker::RemoteLedgerInvoker;

use crate::metrics::{Metrics, SharedMetrics};
use crate::operation::{Command, Operation, WithdrawRequest};
use crate::settlement_ledger::{ClearOutcome, Obligation, SettlementLedger};

/// Counterparty operation that debits a customer.
const REMOTE_WITHDRAW: &str = "Withdraw";
/// Counterparty operation that reads a customer's balance.
const REMOTE_BALANCE: &str = "GetAccountBalance";

/// Answer to a completed withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawReceipt {
    /// Customer debited at the counterparty.
    pub customer_name: String,
    /// Amount withdrawn.
    pub amount: Amount,
    /// Service charge added to the obligation.
    pub charge: Amount,
    /// Obligation after this withdrawal.
    pub obligation: Amount,
}

/// Answer to a settlement-clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    /// Counterparty the obligation was owed by.
    pub endpoint: Endpoint,
    /// What the clear did.
    #[serde(flatten)]
    pub outcome: ClearOutcome,
}

/// Result of a routed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterResponse {
    /// The counterparty's balance response, verbatim.
    Balance(Vec<u8>),
    /// Withdrawal debited and accumulated.
    Withdrawn(WithdrawReceipt),
    /// Current obligation.
    Obligation(Obligation),
    /// Settlement-clear result.
    Settlement(SettlementReport),
}

impl RouterResponse {
    /// Wire form of the response.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            RouterResponse::Balance(raw) => Ok(raw.clone()),
            RouterResponse::Withdrawn(receipt) => encode(receipt),
            RouterResponse::Obligation(obligation) => encode(obligation),
            RouterResponse::Settlement(report) => encode(report),
        }
    }
}

/// Routes `(endpoint, operation, payload)` requests to the balance query,
/// withdraw-and-settle, settlement-query and settlement-clear paths.
///
/// Requests are validated in full before any side effect. A withdrawal only
/// touches the obligation after the counterparty confirmed the debit.
pub struct CommandRouter {
    /// The one counterparty this router brokers for.
    counterparty: Endpoint,
    /// Remote ledger invoker.
    invoker: Arc<RemoteLedgerInvoker>,
    /// Obligation owed by the counterparty.
    settlement: Arc<SettlementLedger>,
    /// Router counters.
    metrics: SharedMetrics,
}

impl CommandRouter {
    /// Create a new router.
    pub fn new(
        counterparty: Endpoint,
        invoker: Arc<RemoteLedgerInvoker>,
        settlement: Arc<SettlementLedger>,
    ) -> Self {
        Self {
            counterparty,
            invoker,
            settlement,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Counterparty endpoint.
    pub fn counterparty(&self) -> &Endpoint {
        &self.counterparty
    }

    /// Settlement ledger behind the router.
    pub fn settlement(&self) -> &SettlementLedger {
        &self.settlement
    }

    /// Router counters.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Parse and run any operation.
    #[instrument(skip(self, endpoint, payload), fields(endpoint = %endpoint))]
    pub async fn route(
        &self,
        endpoint: &Endpoint,
        operation: &str,
        payload: &str,
    ) -> Result<RouterResponse> {
        self.metrics.command_received();
        let command = self.admit(endpoint, Command::parse(operation, payload))?;
        self.dispatch(endpoint, command).await
    }

    /// Parse and run a read-only operation.
    ///
    /// Operations that change state are `UnknownOperation` here.
    #[instrument(skip(self, endpoint, payload), fields(endpoint = %endpoint))]
    pub async fn route_query(
        &self,
        endpoint: &Endpoint,
        operation: &str,
        payload: &str,
    ) -> Result<RouterResponse> {
        self.metrics.command_received();
        let command = operation
            .parse::<Operation>()
            .and_then(|op| {
                if op.is_read_only() {
                    Ok(op)
                } else {
                    Err(LedgerBridgeError::UnknownOperation(format!(
                        "{op} changes state and cannot be queried"
                    )))
                }
            })
            .and_then(|op| Command::for_operation(op, payload));
        let command = self.admit(endpoint, command)?;
        self.dispatch(endpoint, command).await
    }

    /// Run an already validated command against `endpoint`.
    pub async fn dispatch(&self, endpoint: &Endpoint, command: Command) -> Result<RouterResponse> {
        match command {
            Command::GetAccountBalance { customer_name } => {
                self.account_balance(endpoint, customer_name).await
            }
            Command::WithdrawFund(request) => self.withdraw_fund(endpoint, request).await,
            Command::GetSettlement { .. } => {
                Ok(RouterResponse::Obligation(self.settlement.current().await?))
            }
            Command::Settlement { endpoint: owing } => self.settle(owing).await,
        }
    }

    // --- Private methods ---

    /// Check the parsed command and its endpoints before dispatch.
    fn admit(&self, endpoint: &Endpoint, parsed: Result<Command>) -> Result<Command> {
        let result = parsed.and_then(|command| {
            self.check_counterparty(endpoint)?;
            if let Command::GetSettlement { endpoint: owing } | Command::Settlement { endpoint: owing } =
                &command
            {
                self.check_counterparty(owing)?;
            }
            Ok(command)
        });

        match &result {
            Ok(command) => info!(operation = %command.operation(), "Command accepted"),
            Err(e) => {
                self.metrics.command_invalid();
                warn!(error = %e, code = e.error_code(), "Command refused");
            }
        }
        result
    }

    fn check_counterparty(&self, endpoint: &Endpoint) -> Result<()> {
        if endpoint != &self.counterparty {
            return Err(LedgerBridgeError::InvalidArguments(format!(
                "unknown counterparty endpoint {endpoint}, expected {}",
                self.counterparty
            )));
        }
        Ok(())
    }

    async fn account_balance(
        &self,
        endpoint: &Endpoint,
        customer_name: String,
    ) -> Result<RouterResponse> {
        let result = self
            .invoker
            .query(endpoint, REMOTE_BALANCE, vec![customer_name.clone()])
            .await
            .map_err(lift_rejection);

        match result {
            Ok(raw) => {
                info!(customer = %customer_name, "Balance retrieved");
                Ok(RouterResponse::Balance(raw))
            }
            Err(e) => {
                warn!(customer = %customer_name, error = %e, "Balance query failed");
                Err(e)
            }
        }
    }

    async fn withdraw_fund(
        &self,
        endpoint: &Endpoint,
        request: WithdrawRequest,
    ) -> Result<RouterResponse> {
        if let Err(e) = self
            .invoker
            .invoke(endpoint, REMOTE_WITHDRAW, request.to_params())
            .await
            .map_err(lift_rejection)
        {
            self.metrics.withdrawal_failed(&e);
            warn!(
                customer = %request.customer_name,
                amount = request.amount,
                error = %e,
                "Withdrawal refused, obligation unchanged"
            );
            return Err(e);
        }

        match self.settlement.accumulate(request.amount).await {
            Ok(obligation) => {
                self.metrics.withdrawal_success(request.amount);
                info!(
                    customer = %request.customer_name,
                    amount = request.amount,
                    obligation = obligation.amount,
                    "Withdrawal settled"
                );
                Ok(RouterResponse::Withdrawn(WithdrawReceipt {
                    customer_name: request.customer_name,
                    amount: request.amount,
                    charge: self.settlement.service_charge(),
                    obligation: obligation.amount,
                }))
            }
            Err(e) => {
                // The debit is already committed at the counterparty.
                self.metrics.withdrawal_unrecorded(request.amount);
                error!(
                    customer = %request.customer_name,
                    amount = request.amount,
                    error = %e,
                    "Withdrawal debited but obligation not recorded; needs reconciliation"
                );
                Err(e)
            }
        }
    }

    async fn settle(&self, owing: Endpoint) -> Result<RouterResponse> {
        let outcome = self.settlement.clear().await?;
        match outcome {
            ClearOutcome::NoDues => self.metrics.settlement_no_dues(),
            ClearOutcome::Cleared { .. } => self.metrics.settlement_cleared(),
        }
        Ok(RouterResponse::Settlement(SettlementReport {
            endpoint: owing,
            outcome,
        }))
    }
}

/// Lift business-rule rejections into local error kinds.
fn lift_rejection(err: LedgerBridgeError) -> LedgerBridgeError {
    match err {
        LedgerBridgeError::RemoteRejected {
            endpoint,
            code,
            message,
        } => LedgerBridgeError::from_rejection(&endpoint, RejectionReason::new(code, message)),
        other => other,
    }
}
