//! # Resource Store Client
//!
//! Kind-agnostic CRUD against live cluster resources, addressed by
//! (group, version, kind, namespace, name).
//!
//! - `get` distinguishes "absent" (`Ok(None)`) from failures
//! - `delete` absorbs `NotFound`, so deleting twice is not an error
//! - kind to collection mapping goes through API discovery (`dynamic.rs`)

pub mod dynamic;

pub use dynamic::DynamicStore;

use crate::controller::manifest::ResourceRef;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors raised by the resource store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to discover {kind} in {api_version}: {source}")]
    Discovery {
        api_version: String,
        kind: String,
        #[source]
        source: kube::Error,
    },
    #[error("failed to {operation} {resource}: {source}")]
    Api {
        operation: &'static str,
        resource: String,
        #[source]
        source: kube::Error,
    },
    #[error("invalid body for {resource}: {source}")]
    Serialization {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Generic store operations keyed by resource identity
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Live resource, or `None` if it does not exist
    async fn get(&self, reference: &ResourceRef) -> Result<Option<Value>, StoreError>;

    /// Create the resource from `body`
    async fn create(&self, reference: &ResourceRef, body: &Value) -> Result<(), StoreError>;

    /// Replace the live resource with `body`
    async fn update(&self, reference: &ResourceRef, body: &Value) -> Result<(), StoreError>;

    /// Delete the resource. Returns `false` when it was already absent.
    async fn delete(&self, reference: &ResourceRef) -> Result<bool, StoreError>;
}
