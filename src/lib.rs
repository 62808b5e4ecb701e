//! GitOps Controller Library
//!
//! This library provides the core functionality for the GitOps controller:
//! the `Application` custom resource and the reconciliation engine that
//! converges cluster resources toward the manifests stored in a repository.
//!
//! ## Quick Start
//!
//! ```rust
//! use gitops_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
