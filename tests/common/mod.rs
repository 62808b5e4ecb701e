//! Common test utilities
//!
//! In-memory stand-ins for the three engine seams (`ManifestSource`,
//! `ResourceStore`, `StatusTracker`) plus builders for Applications and
//! manifests. Store and tracker share a `Journal` so tests can assert the
//! order in which the engine touched them.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use gitops_controller::config::ControllerConfig;
use gitops_controller::constants::CLEANUP_MARKER;
use gitops_controller::controller::manifest::ResourceRef;
use gitops_controller::controller::reconciler::{Reconciler, StatusTracker, TrackerError};
use gitops_controller::controller::source::{ManifestFile, ManifestSource, SourceError};
use gitops_controller::controller::store::{ResourceStore, StoreError};
use gitops_controller::crd::{
    Application, ApplicationSource, ApplicationSpec, ApplicationStatus, ManagedResource,
    SyncStatusCode,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, Once};
use tokio_util::sync::CancellationToken;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

fn injected(resource: &str) -> serde_json::Error {
    serde_json::from_str::<Value>(&format!("injected failure for {resource}"))
        .expect_err("not JSON")
}

/// Ordered record of store and tracker calls, e.g. `delete apps/v1/Deployment default/web`
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    /// Entries whose operation is `op`
    pub fn of(&self, op: &str) -> Vec<String> {
        let prefix = format!("{op} ");
        self.entries()
            .into_iter()
            .filter(|entry| entry.starts_with(&prefix))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Source serving a mutable file list, optionally failing
#[derive(Debug, Default)]
pub struct FakeSource {
    files: Mutex<Vec<ManifestFile>>,
    failure: Mutex<Option<fn() -> SourceError>>,
    pub fetches: Mutex<usize>,
}

impl FakeSource {
    pub fn with_files(files: Vec<ManifestFile>) -> Arc<Self> {
        let source = Self::default();
        *source.files.lock().unwrap() = files;
        Arc::new(source)
    }

    pub fn set_files(&self, files: Vec<ManifestFile>) {
        *self.files.lock().unwrap() = files;
    }

    /// Make every fetch fail with the error built by `failure` until cleared
    pub fn fail_with(&self, failure: Option<fn() -> SourceError>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl ManifestSource for FakeSource {
    async fn fetch(&self, _source: &ApplicationSource) -> Result<Vec<ManifestFile>, SourceError> {
        *self.fetches.lock().unwrap() += 1;
        if let Some(failure) = *self.failure.lock().unwrap() {
            return Err(failure());
        }
        Ok(self.files.lock().unwrap().clone())
    }
}

/// Source whose fetch never completes
#[derive(Debug, Default)]
pub struct HangingSource;

#[async_trait]
impl ManifestSource for HangingSource {
    async fn fetch(&self, _source: &ApplicationSource) -> Result<Vec<ManifestFile>, SourceError> {
        std::future::pending().await
    }
}

pub fn unavailable() -> SourceError {
    SourceError::Http {
        status: 503,
        url: "https://api.github.com/repos/acme/deploy/contents/apps/foo".to_string(),
        message: "Service Unavailable".to_string(),
    }
}

pub fn bad_credentials() -> SourceError {
    SourceError::Credential(gitops_controller::config::CredentialError::MalformedToken {
        namespace: "gitops-system".to_string(),
        name: "github-token".to_string(),
    })
}

/// Reading the token secret failed on the API side, not because of its content
pub fn secret_read_failed() -> SourceError {
    SourceError::Credential(gitops_controller::config::CredentialError::Api {
        namespace: "gitops-system".to_string(),
        name: "github-token".to_string(),
        source: kube::Error::Service(Box::new(std::io::Error::other("connection reset by peer"))),
    })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory cluster keyed by resource identity
#[derive(Debug, Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<ResourceRef, Value>>,
    failing: Mutex<HashSet<(&'static str, String)>>,
    journal: Journal,
}

impl FakeStore {
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            journal,
            ..Self::default()
        })
    }

    /// Fail `op` ("get", "create", "update", "delete") for resources named `name`
    pub fn fail(&self, op: &'static str, name: &str) {
        self.failing.lock().unwrap().insert((op, name.to_string()));
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn insert(&self, reference: ResourceRef, body: Value) {
        self.objects.lock().unwrap().insert(reference, body);
    }

    pub fn contains(&self, reference: &ResourceRef) -> bool {
        self.objects.lock().unwrap().contains_key(reference)
    }

    pub fn object(&self, reference: &ResourceRef) -> Option<Value> {
        self.objects.lock().unwrap().get(reference).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .map(|reference| reference.name.clone())
            .collect()
    }

    fn check(&self, op: &'static str, reference: &ResourceRef) -> Result<(), StoreError> {
        self.journal.push(format!("{op} {reference}"));
        if self
            .failing
            .lock()
            .unwrap()
            .contains(&(op, reference.name.clone()))
        {
            return Err(StoreError::Serialization {
                resource: reference.to_string(),
                source: injected(&reference.name),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn get(&self, reference: &ResourceRef) -> Result<Option<Value>, StoreError> {
        self.check("get", reference)?;
        Ok(self.objects.lock().unwrap().get(reference).cloned())
    }

    async fn create(&self, reference: &ResourceRef, body: &Value) -> Result<(), StoreError> {
        self.check("create", reference)?;
        self.objects
            .lock()
            .unwrap()
            .insert(reference.clone(), body.clone());
        Ok(())
    }

    async fn update(&self, reference: &ResourceRef, body: &Value) -> Result<(), StoreError> {
        self.check("update", reference)?;
        self.objects
            .lock()
            .unwrap()
            .insert(reference.clone(), body.clone());
        Ok(())
    }

    async fn delete(&self, reference: &ResourceRef) -> Result<bool, StoreError> {
        self.check("delete", reference)?;
        Ok(self.objects.lock().unwrap().remove(reference).is_some())
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Tracker keeping the persisted Application in memory
///
/// `current()` is what the next watch event would deliver.
#[derive(Debug)]
pub struct FakeTracker {
    record: Mutex<Application>,
    fail_commit: Mutex<bool>,
    pub commits: Mutex<Vec<ApplicationStatus>>,
    journal: Journal,
}

impl FakeTracker {
    pub fn new(app: &Application, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            record: Mutex::new(app.clone()),
            fail_commit: Mutex::new(false),
            commits: Mutex::new(Vec::new()),
            journal,
        })
    }

    pub fn current(&self) -> Application {
        self.record.lock().unwrap().clone()
    }

    /// Replace the persisted record, e.g. after a user edit
    pub fn replace(&self, app: Application) {
        *self.record.lock().unwrap() = app;
    }

    pub fn fail_commits(&self, fail: bool) {
        *self.fail_commit.lock().unwrap() = fail;
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    pub fn has_marker(&self) -> bool {
        has_marker(&self.current())
    }
}

#[async_trait]
impl StatusTracker for FakeTracker {
    async fn attach_marker(
        &self,
        _app: &Application,
        reconciled_at: &str,
    ) -> Result<(), TrackerError> {
        self.journal.push("attach-marker".to_string());
        let mut record = self.record.lock().unwrap();
        let finalizers = record.metadata.finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == CLEANUP_MARKER) {
            finalizers.push(CLEANUP_MARKER.to_string());
        }
        record
            .status
            .get_or_insert_with(ApplicationStatus::default)
            .reconciled_at = Some(reconciled_at.to_string());
        Ok(())
    }

    async fn detach_marker(&self, _app: &Application) -> Result<(), TrackerError> {
        self.journal.push("detach-marker".to_string());
        let mut record = self.record.lock().unwrap();
        if let Some(finalizers) = record.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != CLEANUP_MARKER);
        }
        Ok(())
    }

    async fn commit(&self, app: &Application, status: &ApplicationStatus) -> Result<(), TrackerError> {
        self.journal.push("commit".to_string());
        if *self.fail_commit.lock().unwrap() {
            return Err(TrackerError::Serialization {
                resource: app.metadata.name.clone().unwrap_or_default(),
                source: injected("status"),
            });
        }
        self.commits.lock().unwrap().push(status.clone());
        self.record.lock().unwrap().status = Some(status.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Fakes wired into a reconciler
pub struct Harness {
    pub source: Arc<FakeSource>,
    pub store: Arc<FakeStore>,
    pub tracker: Arc<FakeTracker>,
    pub journal: Journal,
    pub ctx: Arc<Reconciler>,
}

impl Harness {
    pub fn new(app: &Application, files: Vec<ManifestFile>) -> Self {
        Self::with_config(app, files, ControllerConfig::default())
    }

    pub fn with_config(app: &Application, files: Vec<ManifestFile>, config: ControllerConfig) -> Self {
        let journal = Journal::default();
        let source = FakeSource::with_files(files);
        let store = FakeStore::new(journal.clone());
        let tracker = FakeTracker::new(app, journal.clone());
        let ctx = Arc::new(Reconciler::new(
            Arc::clone(&source) as Arc<dyn ManifestSource>,
            Arc::clone(&store) as Arc<dyn ResourceStore>,
            Arc::clone(&tracker) as Arc<dyn StatusTracker>,
            config,
            CancellationToken::new(),
        ));
        Self {
            source,
            store,
            tracker,
            journal,
            ctx,
        }
    }
}

/// Application `default/<name>` with a 3 minute sync period and no marker yet
pub fn application(name: &str) -> Application {
    let mut app = Application::new(
        name,
        ApplicationSpec {
            source: ApplicationSource {
                repo_url: "https://github.com/acme/deploy".to_string(),
                path: format!("apps/{name}"),
                target_revision: String::new(),
            },
            sync_period: Some(3),
        },
    );
    app.metadata.namespace = Some("default".to_string());
    app.metadata.generation = Some(1);
    app.metadata.uid = Some(format!("uid-{name}"));
    app
}

pub fn with_marker(mut app: Application) -> Application {
    app.metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(CLEANUP_MARKER.to_string());
    app
}

/// Mark the Application as deletion-requested
pub fn deleting(mut app: Application) -> Application {
    let meta: ObjectMeta =
        serde_json::from_value(serde_json::json!({"deletionTimestamp": "2026-01-01T00:00:00Z"}))
            .expect("valid ObjectMeta");
    app.metadata.deletion_timestamp = meta.deletion_timestamp;
    app
}

pub fn with_managed(mut app: Application, resources: Vec<ManagedResource>) -> Application {
    app.status.get_or_insert_with(ApplicationStatus::default).resources = resources;
    app
}

pub fn has_marker(app: &Application) -> bool {
    app.metadata
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == CLEANUP_MARKER))
}

pub fn file(path: &str, content: &str) -> ManifestFile {
    ManifestFile {
        path: path.to_string(),
        content: content.as_bytes().to_vec(),
    }
}

pub fn deployment_yaml(name: &str) -> String {
    format!(
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {name}\nspec:\n  replicas: 1\n"
    )
}

pub fn service_yaml(name: &str) -> String {
    format!(
        "apiVersion: v1\nkind: Service\nmetadata:\n  name: {name}\n  namespace: default\nspec:\n  ports:\n  - port: 80\n"
    )
}

pub fn config_map_yaml(name: &str, value: &str) -> String {
    format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {name}\ndata:\n  key: \"{value}\"\n")
}

pub fn reference(api_version: &str, kind: &str, name: &str) -> ResourceRef {
    let (group, version) = ResourceRef::split_api_version(api_version);
    ResourceRef {
        group,
        version,
        kind: kind.to_string(),
        namespace: "default".to_string(),
        name: name.to_string(),
    }
}

pub fn managed(api_version: &str, kind: &str, name: &str) -> ManagedResource {
    reference(api_version, kind, name).to_managed(SyncStatusCode::Synced)
}

/// `(kind, name)` of each recorded resource, in recorded order
pub fn recorded(status: &ApplicationStatus) -> Vec<(String, String)> {
    status
        .resources
        .iter()
        .map(|r| (r.kind.clone(), r.name.clone()))
        .collect()
}
