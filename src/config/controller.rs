//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_var_opt_str, env_var_or_default};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Base delay of the per-component rate limiter (microseconds)
    pub rate_limit_base_delay_us: u64,
    /// Ceiling of the per-component rate limiter (seconds)
    pub rate_limit_max_delay_secs: u64,
    /// Exponential backoff starting value for watch errors (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value for watch errors (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Restrict the component watch to one namespace; `None` watches all namespaces
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            rate_limit_base_delay_us: DEFAULT_RATE_LIMIT_BASE_DELAY_US,
            rate_limit_max_delay_secs: DEFAULT_RATE_LIMIT_MAX_DELAY_SECS,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            rate_limit_base_delay_us: env_var_or_default(
                "RATE_LIMIT_BASE_DELAY_US",
                DEFAULT_RATE_LIMIT_BASE_DELAY_US,
            ),
            rate_limit_max_delay_secs: env_var_or_default(
                "RATE_LIMIT_MAX_DELAY_SECS",
                DEFAULT_RATE_LIMIT_MAX_DELAY_SECS,
            ),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            watch_namespace: env_var_opt_str("WATCH_NAMESPACE"),
        }
    }

    /// Get rate limiter base delay
    pub fn rate_limit_base_delay(&self) -> Duration {
        Duration::from_micros(self.rate_limit_base_delay_us)
    }

    /// Get rate limiter max delay
    pub fn rate_limit_max_delay(&self) -> Duration {
        Duration::from_secs(self.rate_limit_max_delay_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Get backoff start duration
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}
