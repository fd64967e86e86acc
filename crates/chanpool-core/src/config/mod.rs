//! Configuration management for chanpool

mod live;
mod pool;

pub use live::LiveChannelCount;
pub use pool::{PoolConfig, DEFAULT_CHANNEL_COUNT};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ConfigError;

/// `config.toml` under the platform config directory, or under `./chanpool`
/// when the platform has none
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chanpool")
        .join("config.toml")
}

/// Read and parse a TOML configuration file
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()))
        }
        Err(e) => {
            return Err(ConfigError::Invalid(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )))
        }
    };

    Ok(toml::from_str(&content)?)
}

/// Write a configuration file, creating its directory.
///
/// The file is written beside the target and renamed over it, so a
/// concurrent [`LiveChannelCount::reload`] sees either the old or the new
/// contents.
pub fn save_config<T: Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    let io_err = |what: &str, e: io::Error| {
        ConfigError::Invalid(format!("cannot {} {}: {}", what, path.display(), e))
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err("create directory for", e))?;
    }

    let staged = path.with_extension("toml.tmp");
    fs::write(&staged, content).map_err(|e| io_err("write", e))?;
    fs::rename(&staged, path).map_err(|e| io_err("replace", e))
}
