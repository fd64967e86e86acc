//! Simulated handle factory

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use chanpool_core::error::CreationError;
use chanpool_core::traits::HandleFactory;
use chanpool_core::types::{ConnectionOptions, Credentials, Endpoint};

/// Handle produced by [`SimulatedFactory`]
#[derive(Debug)]
pub struct SimulatedHandle {
    /// Creation sequence number
    pub id: u64,
    /// Endpoint the handle was opened against
    pub endpoint: String,
}

/// Factory that sleeps for a fixed latency and fails at a given rate
#[derive(Debug)]
pub struct SimulatedFactory {
    latency: Duration,
    failure_rate: f64,
    created: AtomicU64,
    failed: AtomicU64,
}

impl SimulatedFactory {
    /// Create a factory. `failure_rate` is clamped to `0.0..=1.0`.
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        Self {
            latency,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            created: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Handles created so far
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// Attempts that failed so far
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedFactory {
    fn default() -> Self {
        Self::new(Duration::from_millis(20), 0.0)
    }
}

#[async_trait]
impl HandleFactory for SimulatedFactory {
    type Handle = SimulatedHandle;

    async fn create(
        &self,
        endpoint: &Endpoint,
        _credentials: &Credentials,
        _options: &ConnectionOptions,
    ) -> Result<SimulatedHandle, CreationError> {
        tokio::time::sleep(self.latency).await;

        if rand::random::<f64>() < self.failure_rate {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(CreationError::Unavailable(format!(
                "simulated failure connecting to {}",
                endpoint
            )));
        }

        let id = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SimulatedHandle {
            id,
            endpoint: endpoint.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("sim.local", 443)
    }

    #[tokio::test]
    async fn test_always_succeeds_at_zero_rate() {
        let factory = SimulatedFactory::new(Duration::ZERO, 0.0);
        let handle = factory
            .create(&endpoint(), &Credentials::Default, &ConnectionOptions::new())
            .await
            .unwrap();

        assert_eq!(handle.id, 1);
        assert_eq!(handle.endpoint, "sim.local:443");
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn test_always_fails_at_full_rate() {
        let factory = SimulatedFactory::new(Duration::ZERO, 2.0);
        let result = factory
            .create(&endpoint(), &Credentials::Default, &ConnectionOptions::new())
            .await;

        assert!(matches!(result, Err(CreationError::Unavailable(_))));
        assert_eq!(factory.failed(), 1);
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let factory = SimulatedFactory::new(Duration::from_secs(5), 0.0);
        let start = tokio::time::Instant::now();
        factory
            .create(&endpoint(), &Credentials::Default, &ConnectionOptions::new())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
