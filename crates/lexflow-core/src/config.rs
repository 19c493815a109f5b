use crate::{LexflowError, LexflowResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunable knobs for the coordinator and its subsystems.
///
/// Every field has a default, so a partial (or empty) TOML file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Maximum number of tasks executing at any instant (worker pool size).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,
    /// Base delay for workflow step retry backoff, doubled per attempt.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Default time-to-live for memory store entries.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Interval between memory store sweep passes.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// When true, memory store values are packed to compact JSON text.
    #[serde(default)]
    pub pack_values: bool,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent(),
            retry_base_ms: default_retry_base_ms(),
            default_ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval(),
            pack_values: false,
        }
    }
}

impl CoordinatorConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> LexflowResult<Self> {
        toml::from_str(text).map_err(|e| LexflowError::Config(format!("invalid TOML: {e}")))
    }

    /// Load a config from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> LexflowResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LexflowError::Config(format!(
                "cannot read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&text)
    }
}
