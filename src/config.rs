//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::SweepConfig;

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to the rate limit rules file; built-in rules are used if unset
    pub rules_path: Option<String>,

    /// Idle window sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds an empty window must go unchecked before it is evicted
    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            sweep_interval_secs: default_sweep_interval(),
            idle_eviction_secs: default_idle_eviction(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_eviction() -> u64 {
    300
}

impl RateLimitingConfig {
    /// Sweeper timing derived from this configuration.
    pub fn sweep_config(&self) -> Result<SweepConfig> {
        if self.sweep_interval_secs == 0 {
            return Err(TurnstileError::InvalidConfiguration(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(SweepConfig {
            interval: Duration::from_secs(self.sweep_interval_secs),
            idle_after: Duration::from_secs(self.idle_eviction_secs),
        })
    }
}

impl TurnstileConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TurnstileError::InvalidConfiguration(e.to_string()))
    }
}
