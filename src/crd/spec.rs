//! # Application Spec
//!
//! Main CRD specification type.

use serde::{Deserialize, Serialize};

/// Application Custom Resource Definition
///
/// An Application binds a repository location to a cluster: the controller
/// applies every manifest found at `source`, prunes resources that disappear
/// from it, and repeats every `syncPeriod` minutes.
///
/// # Example
///
/// ```yaml
/// apiVersion: gitops.octopilot.io/v1
/// kind: Application
/// metadata:
///   name: foo
///   namespace: default
/// spec:
///   source:
///     repoURL: https://github.com/acme/deploy
///     path: apps/foo
///     targetRevision: main
///   syncPeriod: 3
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Application",
    group = "gitops.octopilot.io",
    version = "v1",
    namespaced,
    status = "crate::crd::ApplicationStatus",
    shortname = "gapp",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.sync.syncStatus"}, {"name":"Synced", "type":"date", "jsonPath":".status.syncedAt"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Location of the application manifests
    pub source: crate::crd::ApplicationSource,
    /// Minutes between sync passes. Required; an Application without it is
    /// never scheduled until the field is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub sync_period: Option<u32>,
}

impl Application {
    /// `namespace/name` key used for logs, backoff tracking and ownership annotations
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.metadata
                .namespace
                .as_deref()
                .unwrap_or(crate::constants::DEFAULT_NAMESPACE),
            self.metadata.name.as_deref().unwrap_or("unknown")
        )
    }

    /// Managed resources recorded by the last committed pass
    #[must_use]
    pub fn managed_resources(&self) -> &[crate::crd::ManagedResource] {
        self.status
            .as_ref()
            .map_or(&[], |status| status.resources.as_slice())
    }
}
