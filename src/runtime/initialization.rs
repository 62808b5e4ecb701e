//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, Kubernetes client setup and wiring of the reconciler.

use crate::config::{ControllerConfig, Credentials};
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::reconciler::{KubeStatusTracker, Reconciler};
use crate::controller::server::{start_server, ServerState};
use crate::controller::source::{
    filesystem::FilesystemSource, github::GithubSource, SourceRouter,
};
use crate::controller::store::dynamic::DynamicStore;
use crate::crd::Application;
use crate::observability;
use anyhow::{Context, Result};
use kube::{api::Api, api::ListParams, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for the watched `Application` resources
    pub applications: Api<Application>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Source, store and status tracker wiring
///
/// # Errors
///
/// Fails when logging, metrics or the HTTP server cannot start, when no
/// Kubernetes client can be built, or when `GITHUB_API_URL` is not a URL.
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed, keeping the existing one");
    }

    let config = ControllerConfig::from_env();
    observability::init_logging(&config).context("Failed to initialize logging")?;

    info!("Starting GitOps controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());

    // Start server in background task
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let applications: Api<Application> = match config.watch_namespace.as_deref() {
        Some(namespace) => {
            info!("Watching Applications in namespace '{}'", namespace);
            Api::namespaced(client.clone(), namespace)
        }
        None => {
            info!("Watching Applications in all namespaces");
            Api::all(client.clone())
        }
    };

    let credentials = Arc::new(Credentials::resolve(
        std::env::var("GITHUB_TOKEN").ok(),
        &config,
        &client,
    ));
    info!("Source credentials: {:?}", credentials);

    let github = GithubSource::new(&config.github_api_url, credentials)
        .context("Failed to configure GitHub source")?;
    let source = Arc::new(SourceRouter::new(
        Arc::new(github),
        Arc::new(FilesystemSource::new()),
    ));
    let store = Arc::new(DynamicStore::new(client.clone()));
    let tracker = Arc::new(KubeStatusTracker::new(client.clone()));

    let reconciler = Arc::new(Reconciler::new(
        source,
        store,
        tracker,
        config,
        CancellationToken::new(),
    ));

    check_crd_queryable(&applications).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        applications,
        reconciler,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Log whether the Application CRD answers before the watch starts
///
/// Existing Applications are reconciled by the initial watch listing.
async fn check_crd_queryable(applications: &Api<Application>) {
    match applications.list(&ListParams::default().limit(1)).await {
        Ok(list) => {
            let more = list
                .metadata
                .remaining_item_count
                .map_or(String::new(), |remaining| format!(" (+{remaining} more)"));
            info!(
                "Application CRD is queryable, found {} resource(s){} to reconcile on start",
                list.items.len(),
                more
            );
        }
        Err(e) => {
            warn!(
                "Application CRD is not queryable yet, the watch will retry: {}",
                e
            );
        }
    }
}
