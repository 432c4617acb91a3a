//! Configuration for the transaction cache

use makerspace_error::{config_error, ensure_config, TransactionResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub store: StoreConfig,
    pub tracing: TracingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Buffer size of the store update channel. Slow subscribers past this
    /// many updates observe a lag and re-read state.
    pub notify_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            notify_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// EnvFilter directive, `RUST_LOG` takes precedence
    pub level: String,
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl CacheConfig {
    pub fn from_toml_str(contents: &str) -> TransactionResult<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| config_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> TransactionResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> TransactionResult<()> {
        ensure_config!(
            self.store.notify_capacity > 0,
            "store.notify_capacity must be positive"
        );
        ensure_config!(
            !self.tracing.level.trim().is_empty(),
            "tracing.level must not be empty"
        );
        Ok(())
    }
}
