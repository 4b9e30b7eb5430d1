//! Configuration types for the sphere engine.
//!
//! This module defines the tunables for the pull-to-refresh recognizer, the
//! simulated delivery timings of the chat pipeline, and toast lifetimes.
//! Every field has a default, so a partial (or empty) JSON file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::clock::millis;

/// Main configuration for the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pull-to-refresh tunables.
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Simulated delivery timings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Toast notification settings.
    #[serde(default)]
    pub toast: ToastConfig,
}

/// Pull-to-refresh tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Damped distance that must be exceeded on release to trigger a refresh.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Multiplier applied to the raw pull distance.
    #[serde(default = "default_damping_factor")]
    pub damping_factor: f64,

    /// Scale applied to the damped distance when translating the spinner.
    #[serde(default = "default_indicator_scale")]
    pub indicator_scale: f64,

    /// Maximum spinner translation.
    #[serde(default = "default_indicator_max")]
    pub indicator_max: f64,

    /// Toast shown after a successful refresh, if any.
    #[serde(default = "default_success_message")]
    pub success_message: Option<String>,
}

fn default_threshold() -> f64 {
    60.0
}

fn default_damping_factor() -> f64 {
    0.5
}

fn default_indicator_scale() -> f64 {
    0.5
}

fn default_indicator_max() -> f64 {
    60.0
}

#[allow(clippy::unnecessary_wraps)]
fn default_success_message() -> Option<String> {
    Some("Feed refreshed!".into())
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            damping_factor: default_damping_factor(),
            indicator_scale: default_indicator_scale(),
            indicator_max: default_indicator_max(),
            success_message: default_success_message(),
        }
    }
}

/// Timings for the simulated delivery lifecycle, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Delay before a local message becomes `Sent`.
    #[serde(default = "default_sent_after_ms")]
    pub sent_after_ms: u64,

    /// Delay before a local message becomes `Delivered`.
    #[serde(default = "default_delivered_after_ms")]
    pub delivered_after_ms: u64,

    /// Delay before the typing indicator appears for a requested reply.
    #[serde(default)]
    pub typing_after_ms: u64,

    /// Delay before the simulated reply lands.
    #[serde(default = "default_reply_after_ms")]
    pub reply_after_ms: u64,

    /// Body of the simulated reply.
    #[serde(default = "default_reply_text")]
    pub reply_text: String,
}

fn default_sent_after_ms() -> u64 {
    500
}

fn default_delivered_after_ms() -> u64 {
    1000
}

fn default_reply_after_ms() -> u64 {
    2000
}

fn default_reply_text() -> String {
    "Thanks for sharing! \u{1f44d}".into()
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            sent_after_ms: default_sent_after_ms(),
            delivered_after_ms: default_delivered_after_ms(),
            typing_after_ms: 0,
            reply_after_ms: default_reply_after_ms(),
            reply_text: default_reply_text(),
        }
    }
}

impl DeliveryConfig {
    /// Delay before `Sent`.
    pub fn sent_after(&self) -> Duration {
        millis(self.sent_after_ms)
    }

    /// Delay before `Delivered`.
    pub fn delivered_after(&self) -> Duration {
        millis(self.delivered_after_ms)
    }

    /// Delay before the typing indicator appears.
    pub fn typing_after(&self) -> Duration {
        millis(self.typing_after_ms)
    }

    /// Delay before the simulated reply lands.
    pub fn reply_after(&self) -> Duration {
        millis(self.reply_after_ms)
    }
}

/// Toast notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastConfig {
    /// How long a toast stays visible before it is dismissed.
    #[serde(default = "default_dismiss_after_ms")]
    pub dismiss_after_ms: u64,
}

fn default_dismiss_after_ms() -> u64 {
    3000
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self {
            dismiss_after_ms: default_dismiss_after_ms(),
        }
    }
}

impl ToastConfig {
    /// Toast lifetime.
    pub fn dismiss_after(&self) -> Duration {
        millis(self.dismiss_after_ms)
    }
}

impl EngineConfig {
    /// Load configuration from a file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Self = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        std::fs::write(path, content).map_err(ConfigError::Io)
    }

    /// Check that the values describe a usable engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let refresh = &self.refresh;
        if !(refresh.damping_factor > 0.0 && refresh.damping_factor <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "refresh.damping_factor must be in (0, 1], got {}",
                refresh.damping_factor
            )));
        }
        if !refresh.threshold.is_finite() || refresh.threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "refresh.threshold must be a non-negative number, got {}",
                refresh.threshold
            )));
        }
        if refresh.indicator_max < 0.0 || refresh.indicator_scale < 0.0 {
            return Err(ConfigError::Invalid(
                "refresh indicator scale and max must be non-negative".into(),
            ));
        }

        let delivery = &self.delivery;
        if delivery.delivered_after_ms <= delivery.sent_after_ms {
            return Err(ConfigError::Invalid(format!(
                "delivery.delivered_after_ms ({}) must be greater than sent_after_ms ({})",
                delivery.delivered_after_ms, delivery.sent_after_ms
            )));
        }
        if delivery.reply_after_ms < delivery.typing_after_ms {
            return Err(ConfigError::Invalid(format!(
                "delivery.reply_after_ms ({}) must not precede typing_after_ms ({})",
                delivery.reply_after_ms, delivery.typing_after_ms
            )));
        }
        Ok(())
    }
}

/// Errors that can occur when working with configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading or writing config.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing config JSON.
    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    /// Error serializing config to JSON.
    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Values that parse but cannot drive the engine.
    #[error("Invalid config: {0}")]
    Invalid(String),
}
