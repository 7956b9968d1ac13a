//! LedgerBridge Simulator
//!
//! Runs an issuer and an acquirer on an in-process network and drives
//! withdraw-and-settle scenarios between them.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod scenario;

use ledgerbridge_acquirer::AcquirerConfig;

use controller::SimulationController;
use scenario::{Scenario, ScenarioParams};

/// LedgerBridge Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Bilateral withdraw-and-settle simulation")]
struct Args {
    /// Scenario to run: a built-in name or a JSON scenario file
    #[arg(short, long, default_value = "withdraw-and-settle")]
    scenario: String,

    /// Customer seeded at the issuer
    #[arg(short, long, default_value = "alice")]
    customer: String,

    /// Customer's starting balance
    #[arg(short, long, default_value = "100")]
    balance: u64,

    /// Service charge per withdrawal (overrides SERVICE_CHARGE)
    #[arg(long)]
    service_charge: Option<u64>,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,

    /// List built-in scenarios and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.list {
        for name in Scenario::builtin() {
            println!("{name}");
        }
        return Ok(());
    }

    // Load configuration
    let mut config = AcquirerConfig::from_env();

    // Initialize logging; RUST_LOG wins over LOG_LEVEL
    let (json, plain) = if args.json_logs {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(json)
        .with(plain)
        .init();

    if let Some(charge) = args.service_charge {
        config.service_charge = charge;
    }
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let params = ScenarioParams {
        customer: args.customer.clone(),
        balance: args.balance,
        service_charge: config.service_charge,
    };

    info!("Starting LedgerBridge Simulator");
    info!(
        acquirer = %config.party,
        issuer = %config.counterparty,
        service_charge = config.service_charge,
        "Parties configured"
    );

    let scenario = Scenario::load(&args.scenario, &params)?;

    let controller = SimulationController::new(config, params)?;
    controller.initialize().await?;

    let result = controller.run_scenario(&scenario).await;

    // Print metrics
    let metrics = controller.metrics().await;
    let router = controller.router_metrics();
    info!("Simulation complete");
    info!("Total operations: {}", metrics.total_operations);
    info!("Successful: {}", metrics.successful_operations);
    info!("Failed: {}", metrics.failed_operations);
    for (code, count) in &metrics.failures_by_code {
        info!("  {}: {}", code, count);
    }
    info!("Success rate: {:.2}", metrics.success_rate());
    info!("Average latency: {}ms", metrics.average_latency_ms());
    info!(
        withdrawn = router.withdrawn_amount,
        settlements_cleared = router.settlements_cleared,
        settlements_no_dues = router.settlements_no_dues,
        "Router totals"
    );

    if let Err(e) = &result {
        error!(error = %e, scenario = %scenario.name, "Scenario failed");
    }
    result
}
