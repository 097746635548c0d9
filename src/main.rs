//! # Component Controller
//!
//! Runs the phase engine for `WebStore` components.
//!
//! ## Usage
//!
//! ```text
//! RUST_LOG=component_controller=debug component-controller
//! ```
//!
//! Configuration is read from the environment; see `config` for the variables.

use anyhow::Result;
use component_controller::controller::reconciler::WebStoreReconciler;
use component_controller::runtime::{initialize, run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop::<WebStoreReconciler>(init.client, init.context, init.server_state).await
}
