//! # Orphan Pruning
//!
//! An orphan is a resource recorded by the previous committed pass whose
//! identity is absent from the current pass. Pruning runs after apply and
//! before commit. A failed delete does not fail the pass: the entry is kept
//! in status, marked `OutOfSync`, and pruning is retried next pass.

use crate::controller::manifest::ResourceRef;
use crate::controller::reconciler::{cancellable, ReconcilerError};
use crate::controller::store::ResourceStore;
use crate::crd::{ManagedResource, SyncStatusCode};
use crate::observability;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Previous entries whose identity does not occur in `current` (P \ T)
#[must_use]
pub fn find_orphans(previous: &[ManagedResource], current: &[ManagedResource]) -> Vec<ManagedResource> {
    let current: HashSet<ResourceRef> = current.iter().map(ResourceRef::from).collect();
    let mut seen = HashSet::new();
    previous
        .iter()
        .filter(|resource| {
            let reference = ResourceRef::from(*resource);
            !current.contains(&reference) && seen.insert(reference)
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub deleted: usize,
    /// Orphans whose deletion failed, to be kept in status
    pub retained: Vec<ManagedResource>,
}

/// Delete every orphan, keeping the ones that could not be deleted
///
/// # Errors
///
/// Only `ReconcilerError::Cancelled`; store failures are retained, not returned.
pub async fn prune_orphans(
    store: &dyn ResourceStore,
    orphans: &[ManagedResource],
    cancel: &CancellationToken,
) -> Result<PruneOutcome, ReconcilerError> {
    let mut outcome = PruneOutcome::default();
    for orphan in orphans {
        let reference = ResourceRef::from(orphan);
        match cancellable(cancel, store.delete(&reference)).await? {
            Ok(existed) => {
                info!(resource = %reference, existed, "Pruned orphaned resource");
                observability::metrics::increment_resources_pruned();
                outcome.deleted += 1;
            }
            Err(e) => {
                warn!(resource = %reference, error = %e, "Failed to prune orphaned resource, keeping it for retry");
                observability::metrics::increment_prune_errors();
                outcome.retained.push(ManagedResource {
                    status: SyncStatusCode::OutOfSync,
                    ..orphan.clone()
                });
            }
        }
    }
    Ok(outcome)
}
