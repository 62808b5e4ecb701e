//! # Application Status
//!
//! The persisted record of what the engine manages on behalf of an Application.
//! The managed-resource list of the last committed pass is the prior state used
//! for orphan detection on the next one.

use serde::{Deserialize, Serialize};

/// Status of the Application resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    /// Resources applied to the cluster by this Application
    #[serde(default)]
    pub resources: Vec<ManagedResource>,
    /// Last time the Application was reconciled (RFC3339)
    #[serde(default)]
    pub reconciled_at: Option<String>,
    /// Last time the Application was synced with its source (RFC3339)
    #[serde(default)]
    pub synced_at: Option<String>,
    /// Outcome of the last sync
    #[serde(default)]
    pub sync: SyncInfo,
    /// Generation of the spec the last commit was computed from
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Next scheduled sync pass (RFC3339)
    /// Persists the schedule across controller restarts
    #[serde(default)]
    pub next_sync_at: Option<String>,
    /// Value of the `requested-at` annotation handled by the last commit
    #[serde(default)]
    pub last_handled_requested_at: Option<String>,
}

/// Sync outcome and the source it was computed from
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    /// Sync status of the Application as a whole
    #[serde(default)]
    pub sync_status: SyncStatusCode,
    /// Source used for the last successful sync
    #[serde(default)]
    pub source: Option<crate::crd::ApplicationSource>,
}

/// Comparison state between the cluster and the repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum SyncStatusCode {
    /// Status could not be determined
    #[default]
    Unknown,
    /// In sync with the repository
    Synced,
    /// Differs from the repository
    OutOfSync,
}

/// A live resource the controller created or updated on behalf of an Application.
/// Identified by (group, version, kind, namespace, name).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResource {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Per-resource comparison state
    #[serde(default)]
    pub status: SyncStatusCode,
}
