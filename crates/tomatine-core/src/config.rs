//! TOML-based application configuration.
//!
//! Stores worker settings:
//! - Sweep interval
//! - Escalation policy (cap, delays)
//! - Telegram bot token
//! - Decision oracle endpoint
//!
//! Configuration is stored at `~/.config/tomatine/config.toml`; every
//! field has a serde default so a missing or partial file still yields
//! a working config.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::storage::data_dir;

/// Sweep loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweep passes.
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SweepConfig {
    /// Sweep period, clamped to at least one second. `tokio::time::interval`
    /// rejects a zero period.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Escalation policy constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Nudges beyond this count hit the "pause for today" branch.
    #[serde(default = "default_max_escalations")]
    pub max_escalations: u32,
    /// Minutes after a completed session before the first probe.
    #[serde(default = "default_follow_up_delay_min")]
    pub follow_up_delay_min: u64,
    /// Minutes until the next check-in after a message action.
    #[serde(default = "default_next_check_delay_min")]
    pub next_check_delay_min: u64,
    /// Minutes used when a delay expression cannot be parsed.
    #[serde(default = "default_fallback_delay_min")]
    pub fallback_delay_min: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_escalations: default_max_escalations(),
            follow_up_delay_min: default_follow_up_delay_min(),
            next_check_delay_min: default_next_check_delay_min(),
            fallback_delay_min: default_fallback_delay_min(),
        }
    }
}

impl EscalationConfig {
    pub fn follow_up_delay(&self) -> Duration {
        minutes_or(self.follow_up_delay_min, default_follow_up_delay_min())
    }

    pub fn next_check_delay(&self) -> Duration {
        minutes_or(self.next_check_delay_min, default_next_check_delay_min())
    }

    pub fn fallback_delay(&self) -> Duration {
        minutes_or(self.fallback_delay_min, default_fallback_delay_min())
    }
}

// Config values are user-editable; an absurd minute count must not
// panic the worker, it reverts to the default.
fn minutes_or(minutes: u64, default: u64) -> Duration {
    i64::try_from(minutes)
        .ok()
        .and_then(Duration::try_minutes)
        .unwrap_or_else(|| Duration::minutes(default as i64))
}

/// Telegram delivery configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
}

/// Decision oracle configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleConfig {
    /// HTTP endpoint that receives the nudge context and answers with
    /// an action. When absent the worker falls back to a static oracle.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
}

impl Config {
    /// Load from `~/.config/tomatine/config.toml`, falling back to
    /// defaults if the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = data_dir()
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?
            .join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Save to `~/.config/tomatine/config.toml`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = data_dir()
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?
            .join("config.toml");
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, raw).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }
}

fn default_sweep_interval_secs() -> u64 {
    5
}

fn default_max_escalations() -> u32 {
    3
}

fn default_follow_up_delay_min() -> u64 {
    5
}

fn default_next_check_delay_min() -> u64 {
    10
}

fn default_fallback_delay_min() -> u64 {
    15
}
