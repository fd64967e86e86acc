//! Concurrent acquire/release workers

use std::fmt;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use chanpool_core::config::LiveChannelCount;
use chanpool_core::traits::HandleFactory;
use chanpool_core::types::{ConnectionParams, Credentials, Endpoint};

use crate::registry::PoolRegistry;

/// Shape of a soak run
#[derive(Debug, Clone)]
pub struct SoakOptions {
    /// Distinct identities to spread load over
    pub identities: usize,
    /// Concurrent workers
    pub workers: usize,
    /// Acquire/release cycles per worker
    pub iterations: usize,
    /// How long each worker holds a handle
    pub hold: Duration,
    /// Channel count to switch to halfway through the run
    pub resize_to: Option<usize>,
}

impl Default for SoakOptions {
    fn default() -> Self {
        Self {
            identities: 3,
            workers: 16,
            iterations: 100,
            hold: Duration::from_millis(5),
            resize_to: None,
        }
    }
}

/// Totals from a soak run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SoakReport {
    /// Successful acquires
    pub acquired: u64,
    /// Acquires that surfaced a creation failure
    pub failed: u64,
    /// Releases issued
    pub released: u64,
}

impl AddAssign for SoakReport {
    fn add_assign(&mut self, other: Self) {
        self.acquired += other.acquired;
        self.failed += other.failed;
        self.released += other.released;
    }
}

impl fmt::Display for SoakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "acquired={} failed={} released={}",
            self.acquired, self.failed, self.released
        )
    }
}

/// Connection parameters for the `index`-th simulated identity
pub fn identity_params(index: usize) -> ConnectionParams {
    ConnectionParams::new(
        Endpoint::new(format!("sim-{}.local", index), 443),
        Credentials::Default,
    )
    .with_option("soak.identity", index.to_string())
}

/// Run workers until they finish their iterations or `cancel` fires.
///
/// Every successful acquire is released before a worker moves on, so at
/// the end the registry should report no active leases.
pub async fn run_soak<F: HandleFactory>(
    registry: Arc<PoolRegistry<F>>,
    channels: Arc<LiveChannelCount>,
    options: SoakOptions,
    cancel: CancellationToken,
) -> SoakReport {
    let identities = options.identities.max(1);
    let total = options.workers * options.iterations;
    let completed = Arc::new(AtomicUsize::new(0));

    tracing::info!(
        "Starting soak: {} workers x {} iterations over {} identities",
        options.workers,
        options.iterations,
        identities
    );

    let mut handles = Vec::with_capacity(options.workers);
    for worker in 0..options.workers {
        let registry = Arc::clone(&registry);
        let channels = Arc::clone(&channels);
        let completed = Arc::clone(&completed);
        let cancel = cancel.clone();
        let options = options.clone();

        handles.push(tokio::spawn(async move {
            let mut report = SoakReport::default();

            for iteration in 0..options.iterations {
                if cancel.is_cancelled() {
                    break;
                }

                let params = identity_params((worker + iteration) % identities);
                match registry.acquire(&params).await {
                    Ok(handle) => {
                        report.acquired += 1;
                        tokio::select! {
                            _ = tokio::time::sleep(options.hold) => {}
                            _ = cancel.cancelled() => {}
                        }
                        registry.release(&handle, &params).await;
                        report.released += 1;
                    }
                    Err(e) => {
                        tracing::debug!("Worker {} acquire failed: {}", worker, e);
                        report.failed += 1;
                    }
                }

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(target) = options.resize_to {
                    if done == total / 2 {
                        channels.set(target);
                    }
                }
            }

            report
        }));
    }

    let mut report = SoakReport::default();
    for handle in handles {
        match handle.await {
            Ok(worker_report) => report += worker_report,
            Err(e) => tracing::error!("Soak worker panicked: {}", e),
        }
    }

    tracing::info!("Soak finished: {}", report);
    report
}
