//! # Runtime
//!
//! Process-level wiring: initialization, the controller watch loop, the child
//! triggers that feed it and its error policy.

pub mod child_triggers;
pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use initialization::{initialize, InitializationResult};
pub use watch_loop::run_watch_loop;
