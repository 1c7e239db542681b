pub mod runtime;
pub use runtime::{new_runtime_config, RuntimeConfig, SharedRuntimeConfig};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// Re-export the lane section from where it lives
pub use crate::lane::LaneConfig;

/// Complete Trellis configuration, loaded from TOML with env overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrellisConfig {
    #[serde(default)]
    pub lane: LaneConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl TrellisConfig {
    /// Loads configuration from a TOML file, then applies env overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(&path).with_context(|| {
            format!("Failed to read config file '{}'", path.as_ref().display())
        })?;
        let mut config: TrellisConfig =
            toml::from_str(&raw).context("Failed to parse config file")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus env overrides; used when no config file is given.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TRELLIS_BIND_ADDR") {
            self.api.bind_addr = v;
        }
        if let Ok(v) = std::env::var("TRELLIS_LANE_WORKERS") {
            if let Ok(n) = v.parse::<usize>() {
                self.lane.workers = n;
            }
        }
        if let Ok(v) = std::env::var("TRELLIS_LANE_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse::<u32>() {
                self.lane.max_attempts = n;
            }
        }
        if let Ok(v) = std::env::var("TRELLIS_LANE_BASE_DELAY_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.lane.base_delay_ms = n;
            }
        }
    }
}
