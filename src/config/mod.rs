//! # Configuration
//!
//! Environment-driven settings for the controller and its HTTP server.
//!
//! Both structs are read once at startup and shared behind an `Arc`;
//! changing a value requires a restart.

mod controller;
mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

use std::sync::Arc;

pub type SharedControllerConfig = Arc<ControllerConfig>;
pub type SharedServerConfig = Arc<ServerConfig>;

/// Load both configurations from the environment
pub fn load_shared_config() -> (SharedControllerConfig, SharedServerConfig) {
    (
        Arc::new(ControllerConfig::from_env()),
        Arc::new(ServerConfig::from_env()),
    )
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as an optional non-empty string
pub(crate) fn env_var_opt_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
