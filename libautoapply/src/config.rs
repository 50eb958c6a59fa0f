//! Configuration management for AutoApply

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Submission quota settings. `platforms` overrides the defaults for a
/// named platform; anything not listed uses the default limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub hourly_limit: i64,
    pub daily_limit: i64,
    #[serde(default)]
    pub platforms: HashMap<String, PlatformLimits>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlatformLimits {
    pub hourly_limit: i64,
    pub daily_limit: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            hourly_limit: 5,
            daily_limit: 50,
            platforms: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Limits for a platform, falling back to the configured defaults.
    pub fn limits_for(&self, platform: &str) -> PlatformLimits {
        self.platforms
            .get(platform)
            .copied()
            .unwrap_or(PlatformLimits {
                hourly_limit: self.hourly_limit,
                daily_limit: self.daily_limit,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of captured login cookies, in days.
    pub ttl_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_days: 7 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Seconds between poll-loop ticks.
    pub poll_interval_secs: u64,
    /// Per-dispatch timeout; a timed-out dispatch is retried next tick.
    pub dispatch_timeout_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3600,
            dispatch_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Seconds between automation passes in daemon mode.
    pub interval_secs: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
        }
    }
}

/// Which collaborator implementations the binaries wire up. Only the
/// in-repo mock driver ships today; real drivers register new kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: "mock".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/autoapply/autoapply.db".to_string(),
            },
            rate_limits: RateLimitConfig::default(),
            sessions: SessionConfig::default(),
            reminders: ReminderConfig::default(),
            cycle: CycleConfig::default(),
            providers: ProviderConfig::default(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("AUTOAPPLY_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("autoapply").join("config.toml"))
}
