//! End-to-end passes against a local `file://` checkout
//!
//! Uses the real source router and filesystem source with an in-memory store,
//! so the directory policy and the engine are exercised together.

mod common;

use common::*;
use gitops_controller::config::{ControllerConfig, Credentials};
use gitops_controller::controller::reconciler::{run_pass, Reconciler, ReconcilerError, StatusTracker};
use gitops_controller::controller::source::{
    FilesystemSource, GithubSource, ManifestSource, SourceRouter,
};
use gitops_controller::controller::store::ResourceStore;
use gitops_controller::crd::Application;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn local_application(root: &std::path::Path, path: &str) -> Application {
    let mut app = application("foo");
    app.spec.source.repo_url = format!("file://{}", root.display());
    app.spec.source.path = path.to_string();
    app
}

fn context(app: &Application) -> (Arc<Reconciler>, Arc<FakeStore>, Arc<FakeTracker>) {
    let journal = Journal::default();
    let store = FakeStore::new(journal.clone());
    let tracker = FakeTracker::new(app, journal);
    let github = GithubSource::new("https://api.github.com", Arc::new(Credentials::Anonymous))
        .expect("valid base URL");
    let router = SourceRouter::new(Arc::new(github), Arc::new(FilesystemSource::new()));
    let ctx = Arc::new(Reconciler::new(
        Arc::new(router) as Arc<dyn ManifestSource>,
        Arc::clone(&store) as Arc<dyn ResourceStore>,
        Arc::clone(&tracker) as Arc<dyn StatusTracker>,
        ControllerConfig::default(),
        CancellationToken::new(),
    ));
    (ctx, store, tracker)
}

#[tokio::test]
async fn test_local_directory_scenario() {
    init_rustls();
    let checkout = tempfile::tempdir().unwrap();
    let dir = checkout.path().join("apps/foo");
    std::fs::create_dir_all(dir.join("nested")).unwrap();
    std::fs::write(dir.join("a.yaml"), deployment_yaml("web")).unwrap();
    std::fs::write(dir.join("b.yaml"), service_yaml("web-svc")).unwrap();
    std::fs::write(dir.join("README.md"), "# not a manifest").unwrap();
    std::fs::write(dir.join("nested/c.yaml"), config_map_yaml("ignored", "1")).unwrap();

    let app = local_application(checkout.path(), "apps/foo");
    let (ctx, store, tracker) = context(&app);
    let cancel = CancellationToken::new();

    run_pass(&app, &ctx, &cancel).await.unwrap();
    let status = tracker.current().status.unwrap();
    assert_eq!(
        recorded(&status),
        vec![
            ("Deployment".to_string(), "web".to_string()),
            ("Service".to_string(), "web-svc".to_string()),
        ]
    );
    assert!(!store.contains(&reference("v1", "ConfigMap", "ignored")));

    std::fs::remove_file(dir.join("b.yaml")).unwrap();
    run_pass(&tracker.current(), &ctx, &cancel).await.unwrap();

    let status = tracker.current().status.unwrap();
    assert_eq!(
        recorded(&status),
        vec![("Deployment".to_string(), "web".to_string())]
    );
    assert!(!store.contains(&reference("v1", "Service", "web-svc")));
}

#[tokio::test]
async fn test_local_missing_path_is_recoverable() {
    init_rustls();
    let checkout = tempfile::tempdir().unwrap();
    let app = with_marker(local_application(checkout.path(), "apps/missing"));
    let (ctx, _store, tracker) = context(&app);

    let err = run_pass(&app, &ctx, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcilerError::SourceUnavailable(_)), "{err:?}");
    assert!(!err.is_permanent());
    assert_eq!(tracker.commit_count(), 0);
}

#[tokio::test]
async fn test_path_escaping_checkout_is_a_config_error() {
    init_rustls();
    let checkout = tempfile::tempdir().unwrap();
    let app = with_marker(local_application(checkout.path(), "../outside"));
    let (ctx, _store, _tracker) = context(&app);

    let err = run_pass(&app, &ctx, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcilerError::Config(_)), "{err:?}");
}
