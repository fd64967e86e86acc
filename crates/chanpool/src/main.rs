//! chanpool soak driver
//!
//! Runs many concurrent acquire/release workers against a simulated
//! service and checks that lease accounting settles back to zero.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chanpool::soak::{run_soak, SimulatedFactory, SoakOptions};
use chanpool::PoolRegistry;
use chanpool_core::config::{self, LiveChannelCount, PoolConfig};

#[derive(Parser)]
#[command(name = "chanpool-soak")]
#[command(about = "Soak test the chanpool client pool against a simulated service")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channels per identity (overrides config)
    #[arg(long)]
    channels: Option<usize>,

    /// Channel count to switch to halfway through the run
    #[arg(long)]
    resize_to: Option<usize>,

    /// Number of distinct identities
    #[arg(long, default_value_t = 3)]
    identities: usize,

    /// Concurrent workers
    #[arg(short, long, default_value_t = 16)]
    workers: usize,

    /// Acquire/release cycles per worker
    #[arg(short, long, default_value_t = 100)]
    iterations: usize,

    /// Simulated handle creation latency in milliseconds
    #[arg(long, default_value_t = 20)]
    latency_ms: u64,

    /// How long each worker holds a handle, in milliseconds
    #[arg(long, default_value_t = 5)]
    hold_ms: u64,

    /// Probability that a creation attempt fails (0.0 to 1.0)
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "CHANPOOL_LOG")]
    log_level: String,
}

/// `RUST_LOG` takes precedence over `--log-level`
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level);

    let config = PoolConfig::resolve(
        args.config.as_deref(),
        &config::default_config_path(),
        args.channels,
    )
    .context("Failed to load pool configuration")?;
    tracing::info!("Running with {} channels per identity", config.channel_count);

    let channels = Arc::new(LiveChannelCount::from_config(&config));
    let factory = Arc::new(SimulatedFactory::new(
        Duration::from_millis(args.latency_ms),
        args.failure_rate,
    ));
    let registry = Arc::new(PoolRegistry::with_shared(
        Arc::clone(&factory),
        channels.clone(),
    ));

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, stopping workers...");
            cancel_clone.cancel();
        }
    });

    let options = SoakOptions {
        identities: args.identities,
        workers: args.workers,
        iterations: args.iterations,
        hold: Duration::from_millis(args.hold_ms),
        resize_to: args.resize_to,
    };
    let report = run_soak(Arc::clone(&registry), channels, options, cancel).await;

    println!("{}", registry.dump().await);
    println!(
        "{} (handles created={}, creation failures={})",
        report,
        factory.created(),
        factory.failed()
    );

    let outstanding = registry.total_active_leases().await;
    if outstanding != 0 {
        anyhow::bail!("{} leases still active after all releases", outstanding);
    }

    Ok(())
}
