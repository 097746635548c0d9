//! # Custom Resource Definitions
//!
//! Types persisted by the controller.
//!
//! ## Module Structure
//!
//! - `status.rs` - Phase conditions and child resource records
//! - `component.rs` - The `Component` trait the phase engine reconciles
//! - `webstore.rs` - The sample `WebStore` component

mod component;
mod status;
mod webstore;

pub use component::Component;
pub use status::{
    split_api_version, ComponentStatus, PhaseCondition, PhaseState, Resource, ResourceCondition,
    ResourceIdentity,
};
pub use webstore::{
    default_service_name, default_webstore_image, default_webstore_replicas, WebStore,
    WebStoreSpec,
};

pub(crate) use status::now_rfc3339;
