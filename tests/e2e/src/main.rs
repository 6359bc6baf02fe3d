//! End-to-End Scenario Runner for the Actor Runtime

use actor_runtime::Scheduler;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use runtime_e2e_tests::{run_dining, DiningConfig, DiningReport};
use runtime_config::{DispatcherPolicyKind, RuntimeConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    Single,
    Elastic,
}

impl From<Policy> for DispatcherPolicyKind {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Single => DispatcherPolicyKind::Single,
            Policy::Elastic => DispatcherPolicyKind::Elastic,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Runtime configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the dispatcher placement policy
    #[arg(short, long, value_enum)]
    policy: Option<Policy>,

    /// Philosophers at the table
    #[arg(long, default_value_t = 5)]
    philosophers: usize,

    /// Meals to serve in total
    #[arg(short, long, default_value_t = 100_000)]
    rounds: u64,

    /// Seconds before the table counts as deadlocked
    #[arg(short, long, default_value_t = 120)]
    timeout: u64,

    /// Output results to file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("runtime_e2e_tests={}", log_level).parse()?)
                .add_directive(format!("actor_runtime={}", log_level).parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting actor runtime E2E scenarios");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut runtime = RuntimeConfig::load(args.config.as_deref())?;
    if let Some(policy) = args.policy {
        runtime.dispatcher.policy = policy.into();
    }
    let scenario = DiningConfig {
        philosophers: args.philosophers,
        rounds: args.rounds,
        timeout: Duration::from_secs(args.timeout),
        ..DiningConfig::default()
    };

    let scheduler = Scheduler::new(runtime);
    let outcome = run_dining(&scheduler, &scenario);
    scheduler.shutdown();

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            error!("Dining philosophers failed: {:#}", e);
            std::process::exit(1);
        }
    };

    print_report(&report);

    if let Some(path) = args.output {
        let json = serde_json::json!({
            "scenario": "dining_philosophers",
            "version": env!("CARGO_PKG_VERSION"),
            "passed": report.passed(),
            "validation": report.validate(),
            "report": report,
        });
        std::fs::write(&path, serde_json::to_string_pretty(&json)?)?;
        info!("Results saved to: {}", path.display());
    }

    if !report.passed() {
        error!("Validation failed");
        std::process::exit(1);
    }
    info!("All checks passed");
    Ok(())
}

fn print_report(report: &DiningReport) {
    println!("\n═══════════════════════════════════════");
    println!("        DINING PHILOSOPHERS");
    println!("═══════════════════════════════════════");
    println!(
        "Meals: {} in {} ms ({:.0} meals/s)",
        report.total_meals(),
        report.duration.as_millis(),
        report.meals_per_sec()
    );
    println!(
        "Average: {:.1} | Floor: {:.1}",
        report.average_meals(),
        report.fairness_floor()
    );
    for seat in &report.seats {
        println!("  philosopher-{}: {} meals ({:?})", seat.seat, seat.meals, seat.state);
    }
    println!(
        "Dispatchers started: {} | Rebalances: {} | Messages: {}",
        report.stats.dispatchers_started, report.stats.rebalances, report.stats.messages_processed
    );
    println!();
    for check in report.validate() {
        let status = if check.passed { "✓ PASS" } else { "✗ FAIL" };
        println!("{} {}: {}", status, check.validator, check.message);
    }
    println!("═══════════════════════════════════════");
}
