//! # Reconciler
//!
//! Reconciliation of components through the phase engine.
//!
//! The reconciler:
//! - Builds a request-scoped [`ComponentReconciler`] for every reconcile request
//! - Runs the component phases, persisting one condition per phase
//! - Creates or updates every child resource under the component's ownership
//! - Maps the outcome to a requeue decision through the controller's rate limiter
//!
//! ## Module Structure
//!
//! - `traits.rs` - The `ComponentReconciler` capability trait
//! - `types.rs` - Contexts, outcomes and errors
//! - `persist.rs` - Create-or-update of children and conditional status writes
//! - `reconcile.rs` - Entry point used by the runtime
//! - `webstore.rs` - Reconciler for the sample `WebStore` component

pub mod persist;
pub mod reconcile;
pub mod traits;
pub mod types;
pub mod webstore;

// Re-export public API
pub use reconcile::{action_for, reconcile, reconcile_component};
pub use traits::{ComponentReconciler, Mutation};
pub use types::{ControllerContext, ReconcileContext, ReconcileOutcome, ReconcilerError};
pub use webstore::WebStoreReconciler;
