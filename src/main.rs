//! callwatch - call instrumentation toolkit
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │                  callwatch                   │
//!                 │                                              │
//!   caller ──────▶│  web_endpoint ──▶ data_access ──▶ store      │
//!                 │  (controller)     (repository)               │
//!                 │       │                │                     │
//!                 │       └──────┬─────────┘                     │
//!                 │              ▼                               │
//!                 │       CallInterceptor                        │
//!                 │  (duration, outcome, error kind, slow flag)  │
//!                 │              │                               │
//!                 │              ▼                               │
//!                 │   MetricsRegistry (memory | prometheus)      │
//!                 └──────────────────────────────────────────────┘
//! ```
//!
//! # Commands
//! - `check`: load and validate a config, print the resolved settings
//! - `simulate`: drive the demo workload and print the collected metrics

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use callwatch::config::{load_or_default, CallwatchConfig};
use callwatch::demo::{run_simulation, InstrumentedOwners, LatencyProfile, OwnerController, OwnerStore};
use callwatch::instrument::{CallInterceptor, Layer};
use callwatch::observability::{init_logging, install_prometheus};
use callwatch::registry::{InMemoryRegistry, MetricsFacadeRegistry, MetricsRegistry};

#[derive(Parser)]
#[command(name = "callwatch")]
#[command(about = "Latency and outcome metrics for layered services", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print the resolved settings
    Check,
    /// Run the demo owner workload through the interceptor
    Simulate {
        /// Number of requests to send
        #[arg(long, default_value_t = 1_000)]
        calls: usize,

        /// Concurrent workers
        #[arg(long, default_value_t = 16)]
        concurrency: usize,

        /// Where metrics are recorded (`prometheus` requires exporter.enabled)
        #[arg(long, value_enum, default_value_t = Sink::Memory)]
        sink: Sink,

        /// Print the in-memory report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Sink {
    Memory,
    Prometheus,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;

    init_logging(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        application = %config.application,
        "callwatch starting"
    );

    match cli.command {
        Commands::Check => print_settings(&config),
        Commands::Simulate {
            calls,
            concurrency,
            sink,
            json,
        } => simulate(&config, calls, concurrency, sink, json).await?,
    }

    Ok(())
}

fn print_settings(config: &CallwatchConfig) {
    let resolved = config.to_interceptor_config();
    println!("application: {}", config.application);
    for layer in Layer::ALL {
        let names = resolved.names.get(layer);
        println!("[{}]", layer);
        println!("  slow_call_threshold: {:?}", resolved.thresholds.slow_call_threshold(layer));
        println!("  duration:   {}", names.execution);
        println!("  calls:      {}", names.calls);
        println!("  errors:     {}", names.errors);
        println!("  slow calls: {}", names.slow_calls);
    }
    let buckets: Vec<String> = resolved.buckets.iter().map(|b| format!("{:?}", b)).collect();
    println!("buckets: [{}]", buckets.join(", "));
    println!("max_series: {}", config.registry.max_series);
}

async fn simulate(
    config: &CallwatchConfig,
    calls: usize,
    concurrency: usize,
    sink: Sink,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match sink {
        Sink::Memory => {
            let registry = Arc::new(InMemoryRegistry::with_capacity(config.registry.max_series));
            let interceptor = drive(config, registry.clone(), calls, concurrency).await;
            let snapshot = registry.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print!("{}", snapshot.format_report());
            }
            report_failures(&interceptor);
        }
        Sink::Prometheus => {
            let handle = install_prometheus(config)?;
            let interceptor = drive(config, Arc::new(MetricsFacadeRegistry::new()), calls, concurrency).await;
            print!("{}", handle.render());
            report_failures(&interceptor);
        }
    }
    Ok(())
}

async fn drive(
    config: &CallwatchConfig,
    registry: Arc<dyn MetricsRegistry>,
    calls: usize,
    concurrency: usize,
) -> Arc<CallInterceptor> {
    let interceptor = Arc::new(CallInterceptor::new(registry, config.to_interceptor_config()));
    let store = Arc::new(OwnerStore::seeded(10, LatencyProfile::default()));
    let controller = OwnerController::new(InstrumentedOwners::new(store, &interceptor), &interceptor);

    tracing::info!(calls, concurrency, "Running simulation");
    run_simulation(controller, calls, concurrency).await;
    interceptor
}

fn report_failures(interceptor: &CallInterceptor) {
    let failures = interceptor.instrumentation_failures();
    if failures > 0 {
        tracing::warn!(failures, "Some metric updates were dropped");
    }
}
