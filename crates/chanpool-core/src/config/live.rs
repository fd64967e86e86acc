//! Live-updatable channel count

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{load_config, PoolConfig};
use crate::error::ConfigError;
use crate::traits::ChannelCountSource;

/// Channel count that can be changed while the pool is serving.
///
/// Pools pick up a new value on their next acquire; outstanding leases are
/// not affected.
#[derive(Debug)]
pub struct LiveChannelCount {
    count: AtomicUsize,
}

impl LiveChannelCount {
    /// Create with an initial count
    pub fn new(count: usize) -> Self {
        Self {
            count: AtomicUsize::new(count),
        }
    }

    /// Create from a loaded configuration
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.channel_count)
    }

    /// Current value
    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Replace the count, returning the previous value
    pub fn set(&self, count: usize) -> usize {
        let previous = self.count.swap(count, Ordering::AcqRel);
        if previous != count {
            tracing::info!("Channel count changed from {} to {}", previous, count);
        }
        previous
    }

    /// Re-read the count from a config file.
    ///
    /// On error the current value is kept.
    pub fn reload(&self, path: &Path) -> Result<usize, ConfigError> {
        let config: PoolConfig = load_config(path)?;
        config.validate()?;
        self.set(config.channel_count);
        Ok(config.channel_count)
    }
}

impl Default for LiveChannelCount {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default())
    }
}

impl ChannelCountSource for LiveChannelCount {
    fn target_channel_count(&self) -> usize {
        self.get()
    }
}
