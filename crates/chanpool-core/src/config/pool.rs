//! Pool configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::load_config;
use crate::error::ConfigError;

/// Channels kept per identity when nothing else is configured
pub const DEFAULT_CHANNEL_COUNT: usize = 4;

/// Configuration for the client pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of channels (leases) each identity keeps.
    ///
    /// Zero is treated as one; an identity always keeps a lease to serve from.
    pub channel_count: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            channel_count: DEFAULT_CHANNEL_COUNT,
        }
    }
}

impl PoolConfig {
    /// Build the startup configuration.
    ///
    /// An `explicit` path must load. Without one, `fallback` is read if it
    /// exists; a fallback that fails to parse is logged and replaced by
    /// defaults. `channel_count` overrides whatever the file says, and the
    /// result is validated.
    pub fn resolve(
        explicit: Option<&Path>,
        fallback: &Path,
        channel_count: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => load_config(path)?,
            None => match load_config(fallback) {
                Ok(config) => config,
                Err(ConfigError::NotFound(_)) => {
                    tracing::info!("No config at {}; using defaults", fallback.display());
                    Self::default()
                }
                Err(e) => {
                    tracing::warn!("Ignoring config at {}: {}", fallback.display(), e);
                    Self::default()
                }
            },
        };

        if let Some(count) = channel_count {
            config.channel_count = count;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pool cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_count > u16::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "channel_count {} exceeds maximum of {}",
                self.channel_count,
                u16::MAX
            )));
        }
        Ok(())
    }
}
