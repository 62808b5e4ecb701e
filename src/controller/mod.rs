//! # Controller
//!
//! Core controller modules for the GitOps controller.
//!
//! - `backoff`: Fibonacci backoff for retries after recoverable failures
//! - `manifest`: decoding of manifest files into target resources
//! - `reconciler`: the reconciliation engine
//! - `server`: HTTP server for metrics and health checks
//! - `source`: fetching manifest files from a repository
//! - `store`: create/read/update/delete against the cluster

pub mod backoff;
pub mod manifest;
pub mod reconciler;
pub mod server;
pub mod source;
pub mod store;
