//! # Custom Resource Definitions
//!
//! CRD types for the GitOps controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The `Application` resource and its specification
//! - `source.rs` - Repository location of the desired manifests
//! - `status.rs` - Managed-resource tracking and sync status

mod source;
mod spec;
mod status;

// Re-export all public types
pub use source::ApplicationSource;
pub use spec::{Application, ApplicationSpec};
pub use status::{ApplicationStatus, ManagedResource, SyncInfo, SyncStatusCode};
