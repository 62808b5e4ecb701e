//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module turns reconciliation errors into requeue decisions and
//! classifies watch stream errors.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::Application;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Permanent errors (invalid configuration, unusable credentials) wait for the
/// Application to change instead of retrying. A pass cancelled by shutdown is
/// not retried either. Everything else is retried after the next Fibonacci
/// delay for that Application.
pub fn handle_reconciliation_error(
    app: Arc<Application>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = app.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = app.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        application.name = name,
        application.namespace = namespace,
        error.kind = error.kind(),
        error = %error
    );
    let _error_guard = error_span.enter();

    if error.is_permanent() {
        warn!(
            "{}/{} cannot be reconciled until its spec or credentials change: {}",
            namespace, name, error
        );
        observability::metrics::increment_requeues_total("await-change");
        return Action::await_change();
    }

    if matches!(error, ReconcilerError::Cancelled) && ctx.shutdown.is_cancelled() {
        info!("Pass for {}/{} stopped by shutdown", namespace, name);
        return Action::await_change();
    }

    let key = app.key();
    let delay = ctx.next_retry_delay(&key);
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

    info!(
        "🔄 Retrying {} with Fibonacci backoff: {}s (trigger source: retry-after-error)",
        key,
        delay.as_secs()
    );
    info!(
        "📅 Next retry scheduled: {} (in {}s)",
        next_trigger_time.to_rfc3339(),
        delay.as_secs()
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// How the watch loop reacts to a stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// 401: RBAC revoked or token expired
    Unauthorized,
    /// 410: resource version too old, the watch relists
    Expired,
    /// 429: API server storage is reinitializing
    Throttled,
    /// 404: CRD missing or object gone
    NotFound,
    Other,
}

impl WatchErrorClass {
    /// Classify a watch error by its rendered message
    ///
    /// 404 is checked before 401 since a plain-text 404 body surfaces as a
    /// serde error mentioning `WatchFailed`.
    #[must_use]
    pub fn classify(error_string: &str) -> Self {
        let is_not_found = error_string.contains("ObjectNotFound")
            || error_string.contains("404")
            || error_string.contains("not found");
        if is_not_found {
            return Self::NotFound;
        }
        if error_string.contains("401") || error_string.contains("Unauthorized") {
            return Self::Unauthorized;
        }
        if error_string.contains("410")
            || error_string.contains("too old resource version")
            || error_string.contains("Expired")
            || error_string.contains("Gone")
        {
            return Self::Expired;
        }
        if error_string.contains("429")
            || error_string.contains("storage is (re)initializing")
            || error_string.contains("TooManyRequests")
        {
            return Self::Throttled;
        }
        Self::Other
    }
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Sleeps where the class calls for it, doubling `backoff` (capped at
/// `max_backoff_ms`) on throttling.
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match WatchErrorClass::classify(error_string) {
        WatchErrorClass::Unauthorized => {
            error!("❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
            error!("🔍 SRE Diagnostics:");
            error!("   1. Verify the ClusterRole still grants list/watch on applications.gitops.octopilot.io");
            error!("   2. Verify the ClusterRoleBinding still binds the controller ServiceAccount");
            error!("   3. If RBAC was recently changed, restart the controller pod");
            warn!(
                "⏳ Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
        WatchErrorClass::Expired => {
            warn!("Watch resource version expired (410) - this is normal during pod restarts, watch will restart");
            None
        }
        WatchErrorClass::Throttled => {
            let current_backoff = backoff.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms before restart...",
                current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            let new_backoff = current_backoff.saturating_mul(2).min(max_backoff_ms);
            backoff.store(new_backoff, Ordering::Relaxed);
            None
        }
        WatchErrorClass::NotFound => {
            let resource_info = if error_string.contains("integer `404`") {
                "CRD or resource may have been deleted (404 returned as plain text)"
            } else if error_string.contains("Application") {
                "Application resource"
            } else {
                "Resource"
            };
            warn!(
                "{} not found (404) - this may be normal if the resource was deleted or the CRD is missing. Error: {}",
                resource_info, error_string
            );
            Some(())
        }
        WatchErrorClass::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
    }
}
