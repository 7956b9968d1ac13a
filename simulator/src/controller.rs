//! Simulation controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use ledgerbridge_acquirer::{AcquirerChaincode, AcquirerConfig, MetricsSnapshot, QUERY_FUNCTION};
use ledgerbridge_common::{Endpoint, LedgerBridgeError};
use ledgerbridge_invoker::{Chaincode, LocalNetwork};
use ledgerbridge_issuer::IssuerChaincode;
use ledgerbridge_ledger::{KeyedLockManager, MemoryStore};

use crate::metrics::SimulationMetrics;
use crate::scenario::{AssertCondition, Scenario, ScenarioParams, ScenarioStep};

type Outcome = Result<Vec<u8>, LedgerBridgeError>;

/// Controls the simulation: one issuer and one acquirer on a local network.
pub struct SimulationController {
    /// Scenario parameters.
    params: ScenarioParams,
    /// Network both ledgers are reachable on.
    network: Arc<LocalNetwork>,
    /// Where the issuer is registered.
    issuer_endpoint: Endpoint,
    /// Issuer ledger.
    issuer: Arc<IssuerChaincode>,
    /// Acquirer ledger.
    acquirer: Arc<AcquirerChaincode>,
    /// Simulation metrics.
    metrics: Arc<RwLock<SimulationMetrics>>,
    /// Outcomes of the most recent acting step.
    last_outcomes: Arc<RwLock<Vec<Outcome>>>,
    /// Lock cleanup tasks, aborted on drop.
    background: Vec<JoinHandle<()>>,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(config: AcquirerConfig, params: ScenarioParams) -> anyhow::Result<Self> {
        let network = Arc::new(LocalNetwork::new());

        let issuer_locks = Arc::new(KeyedLockManager::new(config.lock_config.clone()));
        let issuer = Arc::new(IssuerChaincode::new(
            config.counterparty.clone(),
            Arc::new(MemoryStore::new()),
            issuer_locks.clone(),
        ));
        network.register(config.counterparty_endpoint.clone(), issuer.clone());

        let acquirer = Arc::new(AcquirerChaincode::from_config(
            &config,
            Arc::new(MemoryStore::new()),
            network.clone(),
        )?);

        let background = vec![issuer_locks.start_cleanup(), acquirer.start_background_tasks()];

        Ok(Self {
            params,
            network,
            issuer_endpoint: config.counterparty_endpoint,
            issuer,
            acquirer,
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
            last_outcomes: Arc::new(RwLock::new(Vec::new())),
            background,
        })
    }

    /// Initialize both ledgers.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        info!(
            customer = %self.params.customer,
            balance = self.params.balance,
            "Initializing simulation"
        );

        self.issuer
            .init(&[self.params.customer.clone(), self.params.balance.to_string()])
            .await?;
        self.acquirer.init(&[]).await?;

        Ok(())
    }

    /// Run a scenario. Fails on the first unmet assertion.
    pub async fn run_scenario(&self, scenario: &Scenario) -> anyhow::Result<()> {
        info!(
            scenario = %scenario.name,
            description = %scenario.description,
            steps = scenario.steps.len(),
            "Running scenario"
        );

        for (index, step) in scenario.steps.iter().enumerate() {
            self.execute_step(step)
                .await
                .map_err(|e| anyhow::anyhow!("step {} ({:?}): {}", index + 1, step, e))?;
        }

        info!(scenario = %scenario.name, "Scenario passed");
        Ok(())
    }

    /// Get simulation metrics.
    pub async fn metrics(&self) -> SimulationMetrics {
        self.metrics.read().await.clone()
    }

    /// Counters kept by the acquirer's router.
    pub fn router_metrics(&self) -> MetricsSnapshot {
        self.acquirer.router().metrics().snapshot()
    }

    // --- Private methods ---

    /// Execute a single scenario step.
    async fn execute_step(&self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Deposit { customer, amount } => {
                info!(customer = %customer, amount, "Depositing at issuer");
                let args = vec![customer.clone(), amount.to_string()];
                let started = Instant::now();
                let outcome = self.issuer.invoke("Deposit", &args).await;
                self.record(vec![(outcome, started.elapsed())]).await;
            }
            ScenarioStep::WithdrawFund {
                customer,
                amount,
                parallel,
            } => {
                info!(customer = %customer, amount = %amount, parallel, "Withdrawing through acquirer");
                let args = self.acquirer_args("WithdrawFund", format!("{customer},{amount}"));
                let calls = (0..*parallel).map(|_| {
                    let acquirer = self.acquirer.clone();
                    let args = args.clone();
                    async move {
                        let started = Instant::now();
                        let outcome = acquirer.invoke("invoke", &args).await;
                        (outcome, started.elapsed())
                    }
                });
                let results = futures::future::join_all(calls).await;
                self.record(results).await;
            }
            ScenarioStep::Settlement => {
                info!("Settling");
                let args =
                    self.acquirer_args("Settlement", self.issuer_endpoint.as_str().to_string());
                let started = Instant::now();
                let outcome = self.acquirer.invoke("invoke", &args).await;
                self.record(vec![(outcome, started.elapsed())]).await;
            }
            ScenarioStep::Balance { customer } => {
                let args = self.acquirer_args("GetAccountBalance", customer.clone());
                let started = Instant::now();
                let outcome = self.acquirer.query(QUERY_FUNCTION, &args).await;
                self.record(vec![(outcome, started.elapsed())]).await;
            }
            ScenarioStep::TakeOffline => {
                info!(endpoint = %self.issuer_endpoint, "Taking issuer offline");
                self.network.set_offline(&self.issuer_endpoint, true);
            }
            ScenarioStep::BringOnline => {
                info!(endpoint = %self.issuer_endpoint, "Bringing issuer online");
                self.network.set_offline(&self.issuer_endpoint, false);
            }
            ScenarioStep::SetLatency { millis } => {
                info!(millis, "Setting network latency");
                let latency = (*millis > 0).then(|| Duration::from_millis(*millis));
                self.network.set_latency(latency);
            }
            ScenarioStep::Assert { condition } => {
                self.check(condition).await?;
                info!(condition = ?condition, "Assertion held");
            }
        }

        Ok(())
    }

    fn acquirer_args(&self, operation: &str, payload: String) -> Vec<String> {
        vec![
            self.issuer_endpoint.as_str().to_string(),
            operation.to_string(),
            payload,
        ]
    }

    async fn record(&self, results: Vec<(Outcome, Duration)>) {
        let mut metrics = self.metrics.write().await;
        let mut outcomes = Vec::with_capacity(results.len());

        for (outcome, elapsed) in results {
            match &outcome {
                Ok(response) => {
                    metrics.record_success(elapsed.as_millis() as u64);
                    info!(
                        response = %String::from_utf8_lossy(response),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Operation succeeded"
                    );
                }
                Err(e) => {
                    metrics.record_failure(e.error_code());
                    warn!(error = %e, code = e.error_code(), "Operation failed");
                }
            }
            outcomes.push(outcome);
        }

        *self.last_outcomes.write().await = outcomes;
    }

    async fn check(&self, condition: &AssertCondition) -> anyhow::Result<()> {
        match condition {
            AssertCondition::BalanceEquals { customer, amount } => {
                let actual = self.issuer.ledger().get_balance(customer).await?;
                expect_eq("balance", *amount, actual)
            }
            AssertCondition::ObligationEquals { amount } => {
                let actual = self.acquirer.router().settlement().current().await?.amount;
                expect_eq("obligation", *amount, actual)
            }
            AssertCondition::LastSucceeded { count } => {
                let actual = self
                    .last_outcomes
                    .read()
                    .await
                    .iter()
                    .filter(|o| o.is_ok())
                    .count();
                expect_eq("successful operations", *count, actual)
            }
            AssertCondition::LastFailedWith { code } => {
                let outcomes = self.last_outcomes.read().await;
                let codes: Vec<&str> = outcomes
                    .iter()
                    .filter_map(|o| o.as_ref().err())
                    .map(|e| e.error_code())
                    .collect();
                if codes.is_empty() || codes.iter().any(|c| c != code) {
                    anyhow::bail!("expected failures with {code}, got {codes:?}");
                }
                Ok(())
            }
        }
    }
}

impl Drop for SimulationController {
    fn drop(&mut self) {
        for task in &self.background {
            task.abort();
        }
    }
}

fn expect_eq<T: PartialEq + std::fmt::Debug>(what: &str, expected: T, actual: T) -> anyhow::Result<()> {
    if expected != actual {
        anyhow::bail!("expected {what} {expected:?}, got {actual:?}");
    }
    Ok(())
}
