//! # Cleanup
//!
//! Deletion path: remove every managed resource before the cleanup marker
//! may be released. Already-absent resources count as deleted.

use crate::controller::manifest::ResourceRef;
use crate::controller::reconciler::{cancellable, ReconcilerError};
use crate::controller::store::ResourceStore;
use crate::crd::ManagedResource;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Delete every managed resource, attempting all of them even after a failure
///
/// # Errors
///
/// Returns `ReconcilerError::Cleanup` if any delete failed; the caller must
/// then keep the marker so the whole set is retried.
pub async fn delete_managed(
    store: &dyn ResourceStore,
    resources: &[ManagedResource],
    cancel: &CancellationToken,
) -> Result<usize, ReconcilerError> {
    let mut deleted = 0;
    let mut failed = 0;
    for resource in resources {
        let reference = ResourceRef::from(resource);
        match cancellable(cancel, store.delete(&reference)).await? {
            Ok(existed) => {
                info!(resource = %reference, existed, "Deleted managed resource");
                deleted += 1;
            }
            Err(e) => {
                error!(resource = %reference, error = %e, "Failed to delete managed resource");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(ReconcilerError::Cleanup {
            failed,
            total: resources.len(),
        });
    }
    Ok(deleted)
}
