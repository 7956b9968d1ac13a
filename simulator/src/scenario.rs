//! Simulation scenarios.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Values the built-in scenarios are parameterized over.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    /// Customer seeded at the issuer.
    pub customer: String,
    /// Customer's starting balance.
    pub balance: u64,
    /// Acquirer service charge.
    pub service_charge: u64,
}

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Credit a customer directly at the issuer.
    Deposit { customer: String, amount: u64 },
    /// Withdraw through the acquirer, `parallel` times at once.
    WithdrawFund {
        customer: String,
        amount: String,
        #[serde(default = "one")]
        parallel: usize,
    },
    /// Clear the obligation.
    Settlement,
    /// Read a customer's balance through the acquirer.
    Balance { customer: String },
    /// Take the issuer offline.
    TakeOffline,
    /// Bring the issuer back.
    BringOnline,
    /// Delay every delivery to the issuer; `0` removes the delay.
    SetLatency { millis: u64 },
    /// Assert a condition.
    Assert { condition: AssertCondition },
}

fn one() -> usize {
    1
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssertCondition {
    /// Customer balance at the issuer equals.
    BalanceEquals { customer: String, amount: u64 },
    /// Obligation owed by the issuer equals.
    ObligationEquals { amount: u64 },
    /// Exactly this many operations of the last step succeeded.
    LastSucceeded { count: usize },
    /// Every failure of the last step carried this error code.
    LastFailedWith { code: String },
}

impl Scenario {
    /// Load a built-in scenario by name, or a JSON scenario file.
    pub fn load(name: &str, params: &ScenarioParams) -> anyhow::Result<Self> {
        match name {
            "withdraw-and-settle" => Ok(Self::withdraw_and_settle(params)),
            "insufficient-funds" => Ok(Self::insufficient_funds(params)),
            "concurrent-withdraw" => Ok(Self::concurrent_withdraw(params)),
            "issuer-offline" => Ok(Self::issuer_offline(params)),
            path if path.ends_with(".json") && Path::new(path).exists() => {
                let raw = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&raw)?)
            }
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Names of the built-in scenarios.
    pub fn builtin() -> &'static [&'static str] {
        &[
            "withdraw-and-settle",
            "insufficient-funds",
            "concurrent-withdraw",
            "issuer-offline",
        ]
    }

    /// Withdraw, then settle twice: the second settlement finds no dues.
    /// The customer is repaid at the end.
    fn withdraw_and_settle(params: &ScenarioParams) -> Self {
        let amount = params.balance.min(30);
        Self {
            name: "withdraw-and-settle".to_string(),
            description: "Withdrawal through the acquirer, then settlement".to_string(),
            steps: vec![
                withdraw(&params.customer, amount, 1),
                assert_succeeded(1),
                ScenarioStep::Balance {
                    customer: params.customer.clone(),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::BalanceEquals {
                        customer: params.customer.clone(),
                        amount: params.balance - amount,
                    },
                },
                assert_obligation(amount.saturating_add(params.service_charge)),
                ScenarioStep::Settlement,
                assert_obligation(0),
                ScenarioStep::Settlement,
                assert_obligation(0),
                ScenarioStep::Deposit {
                    customer: params.customer.clone(),
                    amount,
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::BalanceEquals {
                        customer: params.customer.clone(),
                        amount: params.balance,
                    },
                },
            ],
        }
    }

    /// Overdraw: refused, nothing moves.
    fn insufficient_funds(params: &ScenarioParams) -> Self {
        Self {
            name: "insufficient-funds".to_string(),
            description: "Withdrawal larger than the balance".to_string(),
            steps: vec![
                withdraw(&params.customer, params.balance.saturating_add(100), 1),
                assert_succeeded(0),
                ScenarioStep::Assert {
                    condition: AssertCondition::LastFailedWith {
                        code: "INSUFFICIENT_FUNDS".to_string(),
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::BalanceEquals {
                        customer: params.customer.clone(),
                        amount: params.balance,
                    },
                },
                assert_obligation(0),
            ],
        }
    }

    /// Two withdrawals racing for more than the balance: one wins.
    fn concurrent_withdraw(params: &ScenarioParams) -> Self {
        let amount = params.balance / 2 + 1;
        let wins = usize::from(amount <= params.balance);
        Self {
            name: "concurrent-withdraw".to_string(),
            description: "Concurrent withdrawals exceeding the balance together".to_string(),
            steps: vec![
                withdraw(&params.customer, amount, 2),
                assert_succeeded(wins),
                ScenarioStep::Assert {
                    condition: AssertCondition::BalanceEquals {
                        customer: params.customer.clone(),
                        amount: params.balance - amount * wins as u64,
                    },
                },
                assert_obligation(amount.saturating_add(params.service_charge) * wins as u64),
            ],
        }
    }

    /// Issuer offline: unreachable, nothing moves; back online: succeeds.
    fn issuer_offline(params: &ScenarioParams) -> Self {
        let amount = params.balance.min(10);
        Self {
            name: "issuer-offline".to_string(),
            description: "Withdrawal while the issuer is unreachable, then recovery".to_string(),
            steps: vec![
                ScenarioStep::TakeOffline,
                withdraw(&params.customer, amount, 1),
                assert_succeeded(0),
                ScenarioStep::Assert {
                    condition: AssertCondition::LastFailedWith {
                        code: "REMOTE_UNREACHABLE".to_string(),
                    },
                },
                assert_obligation(0),
                ScenarioStep::BringOnline,
                withdraw(&params.customer, amount, 1),
                assert_succeeded(1),
                assert_obligation(amount.saturating_add(params.service_charge)),
            ],
        }
    }
}

fn withdraw(customer: &str, amount: u64, parallel: usize) -> ScenarioStep {
    ScenarioStep::WithdrawFund {
        customer: customer.to_string(),
        amount: amount.to_string(),
        parallel,
    }
}

fn assert_succeeded(count: usize) -> ScenarioStep {
    ScenarioStep::Assert {
        condition: AssertCondition::LastSucceeded { count },
    }
}

fn assert_obligation(amount: u64) -> ScenarioStep {
    ScenarioStep::Assert {
        condition: AssertCondition::ObligationEquals { amount },
    }
}
