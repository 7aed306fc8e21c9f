//! Configuration
//!
//! `bulletin_config.json` selects the gateway and tunes synchronization.
//! `BULLETIN_GATEWAY_URL` and `BULLETIN_API_KEY` override the HTTP gateway.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

pub const CONFIG_FILE: &str = "bulletin_config.json";
pub const ENV_GATEWAY_URL: &str = "BULLETIN_GATEWAY_URL";
pub const ENV_API_KEY: &str = "BULLETIN_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which store backs the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayConfig {
    Sqlite {
        path: PathBuf,
    },
    Rest {
        url: String,
        api_key: String,
        #[serde(default)]
        access_token: Option<String>,
    },
}

/// Timing of remote calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub max_retries: u32,
    pub attempt_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub refresh_cooldown_secs: u64,
    pub stall_after_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            attempt_timeout_ms: 10_000,
            retry_delay_ms: 1_000,
            refresh_cooldown_secs: 30,
            stall_after_secs: 12,
        }
    }
}

impl SyncSettings {
    /// Policy for reads
    pub fn load_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.attempt_timeout_ms),
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    /// Policy for writes: same time box, never retried
    pub fn write_policy(&self) -> RetryPolicy {
        RetryPolicy::single_attempt(Duration::from_millis(self.attempt_timeout_ms))
    }

    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.refresh_cooldown_secs)
    }

    pub fn stall_after(&self) -> Duration {
        Duration::from_secs(self.stall_after_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletinConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl BulletinConfig {
    /// Apply overrides from the process environment
    pub fn apply_env(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`. A URL alone retargets an HTTP gateway;
    /// URL plus key replaces any gateway.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let url = lookup(ENV_GATEWAY_URL).filter(|v| !v.is_empty());
        let key = lookup(ENV_API_KEY).filter(|v| !v.is_empty());

        self.gateway = match (self.gateway, url, key) {
            (GatewayConfig::Rest { url, api_key, access_token }, new_url, new_key) => {
                GatewayConfig::Rest {
                    url: new_url.unwrap_or(url),
                    api_key: new_key.unwrap_or(api_key),
                    access_token,
                }
            }
            (_, Some(url), Some(api_key)) => GatewayConfig::Rest {
                url,
                api_key,
                access_token: None,
            },
            (other, _, _) => other,
        };
        self
    }
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Read the config file; `None` when it does not exist
pub fn load_config(path: &Path) -> Result<Option<BulletinConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let config = serde_json::from_str(&content)?;
    Ok(Some(config))
}

pub fn save_config(path: &Path, config: &BulletinConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
