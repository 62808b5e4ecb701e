//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use gitops_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Engine seams, needed to plug in another source, store or tracker
pub use crate::controller::reconciler::StatusTracker;
pub use crate::controller::source::ManifestSource;
pub use crate::controller::store::ResourceStore;

// Reconciler types
pub use crate::controller::reconciler::{
    reconcile, BackoffState, PassOutcome, Reconciler, ReconcilerError, TriggerSource,
};

// Manifest types
pub use crate::controller::manifest::{decode, ResourceRef, TargetResource};

// Config types
pub use crate::config::{ControllerConfig, Credentials};
