//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default base delay of the per-component rate limiter (microseconds)
pub const DEFAULT_RATE_LIMIT_BASE_DELAY_US: u64 = 5;

/// Default ceiling of the per-component rate limiter (seconds)
pub const DEFAULT_RATE_LIMIT_MAX_DELAY_SECS: u64 = 300;

/// Default exponential backoff starting value for watch errors (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value for watch errors (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Field manager recorded on objects written by the controller
pub const FIELD_MANAGER: &str = "component-controller";

/// Condition messages written by the phase engine
pub const MSG_PHASE_COMPLETE: &str = "Successfully Completed Phase";
pub const MSG_PHASE_PENDING: &str = "Pending Execution of Phase";
pub const MSG_PHASE_FAILED_PREFIX: &str = "Failed Phase with Error; ";
pub const MSG_RESOURCE_CREATED: &str = "resource created successfully";
