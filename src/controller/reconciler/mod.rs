//! # Reconciler
//!
//! Core reconciliation logic for `Application` resources.
//!
//! The reconciler:
//! - Guards every Application with a cleanup marker (finalizer)
//! - Fetches and decodes the desired manifests from the Application source
//! - Creates or replaces each target resource in the cluster
//! - Prunes resources that disappeared from the source since the last pass
//! - Records what it manages in the Application status
//! - On deletion, removes every managed resource before releasing the marker
//!
//! ## Reconciliation Flow
//!
//! 1. Decide whether a pass is due (`lifecycle::due`)
//! 2. Pick the lifecycle step from phase and marker (`lifecycle::next_step`)
//! 3. Sync: fetch, decode, apply, prune, commit
//! 4. Requeue after `syncPeriod` minutes, or back off after a recoverable error

pub mod apply;
pub mod cleanup;
pub mod lifecycle;
pub mod prune;
pub mod reconcile;
pub mod status;
pub mod types;

// Re-export public API
pub use apply::{apply_target, applied_hash, ApplyOperation};
pub use cleanup::delete_managed;
pub use lifecycle::{due, next_step, CleanupMarker, Due, LifecycleStep, Phase};
pub use prune::{find_orphans, prune_orphans, PruneOutcome};
pub use reconcile::{reconcile, run_pass};
pub use status::{build_status, KubeStatusTracker, StatusTracker, TrackerError};
pub use types::{
    BackoffState, PassOutcome, Reconciler, ReconcilerError, SyncReport, TriggerSource,
};

use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run `future` unless `cancel` fires first
///
/// Dropping the future aborts the in-flight request.
pub(crate) async fn cancellable<F>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, ReconcilerError>
where
    F: Future,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ReconcilerError::Cancelled),
        output = future => Ok(output),
    }
}
