//! # Types
//!
//! Core types for the reconciler.

use crate::config::{ControllerConfig, CredentialError};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::manifest::DecodeError;
use crate::controller::reconciler::status::{StatusTracker, TrackerError};
use crate::controller::source::{ManifestSource, SourceError};
use crate::controller::store::{ResourceStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Repository, path or network failure while fetching manifests
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),
    /// A manifest document could not be decoded
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },
    /// Reading, creating or replacing a target resource failed
    #[error("failed to apply {resource}: {source}")]
    Apply {
        resource: String,
        #[source]
        source: StoreError,
    },
    /// Managed resources could not all be deleted; the cleanup marker is kept
    #[error("failed to delete {failed} of {total} managed resource(s), cleanup marker kept")]
    Cleanup { failed: usize, total: usize },
    /// Invalid Application spec, never retried until the spec changes
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Missing or malformed source credential
    #[error("credential error: {0}")]
    Credential(#[source] CredentialError),
    /// Recording the outcome on the Application failed
    #[error("failed to record status: {0}")]
    Persist(#[source] TrackerError),
    /// Pass aborted by shutdown or timeout before committing
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ReconcilerError {
    /// Permanent errors are not retried until the Application changes
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Credential(_))
    }

    /// Metric label
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "source-unavailable",
            Self::Decode { .. } => "decode",
            Self::Apply { .. } => "apply",
            Self::Cleanup { .. } => "cleanup",
            Self::Config(_) => "config",
            Self::Credential(_) => "credential",
            Self::Persist(_) => "persist",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<SourceError> for ReconcilerError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::InvalidLocator(locator) => {
                Self::Config(format!("invalid repository locator `{locator}`"))
            }
            SourceError::Credential(e) if e.is_transient() => {
                Self::SourceUnavailable(SourceError::Credential(e))
            }
            SourceError::Credential(e) => Self::Credential(e),
            other => Self::SourceUnavailable(other),
        }
    }
}

impl From<TrackerError> for ReconcilerError {
    fn from(error: TrackerError) -> Self {
        Self::Persist(error)
    }
}

/// Trigger source for reconciliation
/// Tracks why a pass was started, for logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Deletion requested on the Application
    Deletion,
    /// First pass: the cleanup marker is not attached yet
    Initial,
    /// `metadata.generation` differs from the last committed one
    SpecChange,
    /// Manual trigger via CLI annotation (gitopsctl reconcile)
    ManualCli,
    /// Scheduled pass after `syncPeriod`
    TimerBased,
    /// Retry after a recoverable error
    RetryAfterError,
}

impl TriggerSource {
    /// Get human-readable string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Deletion => "deletion",
            TriggerSource::Initial => "initial",
            TriggerSource::SpecChange => "spec-change",
            TriggerSource::ManualCli => "manual-cli",
            TriggerSource::TimerBased => "timer-based",
            TriggerSource::RetryAfterError => "retry-after-error",
        }
    }
}

/// Counts from one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub pruned: usize,
    pub prune_failures: usize,
}

/// Result of a successful pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Target state applied and committed; run again after `requeue_after`
    Synced {
        report: SyncReport,
        requeue_after: Duration,
    },
    /// Managed resources deleted and the cleanup marker released
    CleanedUp { deleted: usize },
    /// Deleting without a marker: nothing left to do
    Terminal,
}

/// Backoff state for a specific Application
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_seconds, max_seconds),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared reconciliation context
#[derive(Clone)]
pub struct Reconciler {
    pub source: Arc<dyn ManifestSource>,
    pub store: Arc<dyn ResourceStore>,
    pub tracker: Arc<dyn StatusTracker>,
    pub config: ControllerConfig,
    // Backoff state per Application (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    // Cancelled on shutdown; every pass runs under a child token
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        source: Arc<dyn ManifestSource>,
        store: Arc<dyn ResourceStore>,
        tracker: Arc<dyn StatusTracker>,
        config: ControllerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            store,
            tracker,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    /// Whether the Application failed its last pass and awaits a retry
    #[must_use]
    pub fn is_retrying(&self, key: &str) -> bool {
        self.backoff_states
            .lock()
            .ok()
            .and_then(|states| states.get(key).map(|state| state.error_count > 0))
            .unwrap_or(false)
    }

    /// Record a failure and return the delay before the next attempt
    pub fn next_retry_delay(&self, key: &str) -> Duration {
        let min = self.config.retry_backoff_min_secs;
        let max = self.config.retry_backoff_max_secs;
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(key.to_string())
                    .or_insert_with(|| BackoffState::new(min, max));
                state.increment_error();
                state.backoff.next_backoff()
            }
            Err(_) => Duration::from_secs(min.max(1)),
        }
    }

    /// Clear the failure streak; returns whether there was one
    pub fn reset_backoff(&self, key: &str) -> bool {
        self.backoff_states
            .lock()
            .ok()
            .and_then(|mut states| states.remove(key))
            .is_some_and(|state| state.error_count > 0)
    }
}
