//! # Status Tracker
//!
//! Persists the cleanup marker and the managed-resource record on the
//! Application. The tracker is the only writer of Application state.

use crate::constants::{DEFAULT_NAMESPACE, FIELD_MANAGER};
use crate::controller::reconciler::lifecycle::{requested_at, with_marker, without_marker};
use crate::crd::{Application, ApplicationStatus, ManagedResource, SyncInfo, SyncStatusCode};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to patch {operation} on Application {resource}: {source}")]
    Api {
        operation: &'static str,
        resource: String,
        #[source]
        source: kube::Error,
    },
    #[error("failed to serialize status of Application {resource}: {source}")]
    Serialization {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistence of Application marker and status
#[async_trait]
pub trait StatusTracker: Send + Sync {
    /// Attach the cleanup marker and record `reconciledAt`
    async fn attach_marker(&self, app: &Application, reconciled_at: &str) -> Result<(), TrackerError>;

    /// Release the cleanup marker, allowing the record to be removed
    async fn detach_marker(&self, app: &Application) -> Result<(), TrackerError>;

    /// Replace the status with the outcome of a pass
    async fn commit(&self, app: &Application, status: &ApplicationStatus) -> Result<(), TrackerError>;
}

/// RFC3339 timestamp at second precision
#[must_use]
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Status committed after a sync pass
///
/// `applied` lists the identities of this pass, `retained` the orphans whose
/// deletion failed. Any retained entry makes the Application `OutOfSync`.
#[must_use]
pub fn build_status(
    app: &Application,
    applied: Vec<ManagedResource>,
    retained: Vec<ManagedResource>,
    now: DateTime<Utc>,
    sync_period_minutes: u32,
) -> ApplicationStatus {
    let sync_status = if retained.is_empty() {
        SyncStatusCode::Synced
    } else {
        SyncStatusCode::OutOfSync
    };
    let mut resources = applied;
    resources.extend(retained);
    let now_str = timestamp(now);
    ApplicationStatus {
        resources,
        reconciled_at: Some(now_str.clone()),
        synced_at: Some(now_str),
        sync: SyncInfo {
            sync_status,
            source: Some(app.spec.source.clone()),
        },
        observed_generation: app.metadata.generation,
        next_sync_at: Some(timestamp(
            now + chrono::Duration::minutes(i64::from(sync_period_minutes)),
        )),
        last_handled_requested_at: requested_at(app).map(ToString::to_string),
    }
}

/// Tracker backed by the Application API
#[derive(Clone)]
pub struct KubeStatusTracker {
    client: Client,
}

impl std::fmt::Debug for KubeStatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStatusTracker").finish_non_exhaustive()
    }
}

impl KubeStatusTracker {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, app: &Application) -> Api<Application> {
        let namespace = app.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Merge-patch the finalizer list, guarded by the observed resourceVersion
    async fn patch_finalizers(
        &self,
        app: &Application,
        finalizers: Vec<String>,
        operation: &'static str,
    ) -> Result<(), TrackerError> {
        let name = app.metadata.name.as_deref().unwrap_or_default();
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": app.metadata.resource_version,
            }
        });
        match self
            .api(app)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 && operation == "detach-marker" => {
                debug!("Application {} already removed", app.key());
                Ok(())
            }
            Err(source) => Err(TrackerError::Api {
                operation,
                resource: app.key(),
                source,
            }),
        }
    }

    async fn patch_status(
        &self,
        app: &Application,
        status: serde_json::Value,
        operation: &'static str,
    ) -> Result<(), TrackerError> {
        let name = app.metadata.name.as_deref().unwrap_or_default();
        self.api(app)
            .patch_status(
                name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(json!({ "status": status })),
            )
            .await
            .map(|_| ())
            .map_err(|source| TrackerError::Api {
                operation,
                resource: app.key(),
                source,
            })
    }
}

#[async_trait]
impl StatusTracker for KubeStatusTracker {
    async fn attach_marker(&self, app: &Application, reconciled_at: &str) -> Result<(), TrackerError> {
        let current = app.metadata.finalizers.clone().unwrap_or_default();
        self.patch_finalizers(app, with_marker(&current), "attach-marker")
            .await?;
        self.patch_status(app, json!({ "reconciledAt": reconciled_at }), "record-reconciled-at")
            .await?;
        debug!("Attached cleanup marker to {}", app.key());
        Ok(())
    }

    async fn detach_marker(&self, app: &Application) -> Result<(), TrackerError> {
        let current = app.metadata.finalizers.clone().unwrap_or_default();
        self.patch_finalizers(app, without_marker(&current), "detach-marker")
            .await?;
        debug!("Released cleanup marker on {}", app.key());
        Ok(())
    }

    async fn commit(&self, app: &Application, status: &ApplicationStatus) -> Result<(), TrackerError> {
        let status =
            serde_json::to_value(status).map_err(|source| TrackerError::Serialization {
                resource: app.key(),
                source,
            })?;
        self.patch_status(app, status, "commit-status").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::REQUESTED_AT_ANNOTATION;
    use crate::crd::{ApplicationSource, ApplicationSpec};
    use chrono::TimeZone;

    fn app() -> Application {
        let mut app = Application::new(
            "foo",
            ApplicationSpec {
                source: ApplicationSource {
                    repo_url: "https://github.com/acme/deploy".to_string(),
                    path: "apps/foo".to_string(),
                    target_revision: "main".to_string(),
                },
                sync_period: Some(3),
            },
        );
        app.metadata.generation = Some(4);
        app
    }

    fn managed(name: &str, status: SyncStatusCode) -> ManagedResource {
        ManagedResource {
            group: String::new(),
            version: "v1".to_string(),
            kind: "Service".to_string(),
            name: name.to_string(),
            namespace: "default".to_string(),
            status,
        }
    }

    #[test]
    fn test_build_status_synced() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let status = build_status(&app(), vec![managed("a", SyncStatusCode::Synced)], vec![], now, 3);

        assert_eq!(status.resources.len(), 1);
        assert_eq!(status.sync.sync_status, SyncStatusCode::Synced);
        assert_eq!(status.sync.source, Some(app().spec.source));
        assert_eq!(status.reconciled_at.as_deref(), Some("2026-03-01T08:00:00Z"));
        assert_eq!(status.synced_at.as_deref(), Some("2026-03-01T08:00:00Z"));
        assert_eq!(status.next_sync_at.as_deref(), Some("2026-03-01T08:03:00Z"));
        assert_eq!(status.observed_generation, Some(4));
        assert_eq!(status.last_handled_requested_at, None);
    }

    #[test]
    fn test_build_status_with_retained_orphans_is_out_of_sync() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let status = build_status(
            &app(),
            vec![managed("a", SyncStatusCode::Synced)],
            vec![managed("stale", SyncStatusCode::OutOfSync)],
            now,
            3,
        );
        assert_eq!(status.sync.sync_status, SyncStatusCode::OutOfSync);
        assert_eq!(status.resources.len(), 2);
        assert_eq!(status.resources[1].name, "stale");
    }

    #[test]
    fn test_build_status_records_handled_request() {
        let mut app = app();
        app.metadata.annotations = Some(
            [(REQUESTED_AT_ANNOTATION.to_string(), "2026-03-01T07:59:00Z".to_string())]
                .into_iter()
                .collect(),
        );
        let status = build_status(&app, vec![], vec![], Utc::now(), 1);
        assert_eq!(
            status.last_handled_requested_at.as_deref(),
            Some("2026-03-01T07:59:00Z")
        );
    }
}
