//! # Apply
//!
//! Create-or-replace of one target resource.
//!
//! Each applied object is stamped with a SHA-256 of its desired body. When the
//! live object already carries the same hash and still holds every desired
//! field, nothing is written, so a pass over an unchanged source only issues
//! reads. A live object edited in place is replaced with the desired body.

use crate::constants::{APPLICATION_ANNOTATION, APPLIED_HASH_ANNOTATION};
use crate::controller::manifest::TargetResource;
use crate::controller::reconciler::{cancellable, ReconcilerError};
use crate::controller::store::ResourceStore;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOperation {
    Created,
    Updated,
    Unchanged,
}

impl ApplyOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Hex SHA-256 of the desired body
#[must_use]
pub fn applied_hash(body: &Value) -> String {
    format!("{:x}", Sha256::digest(body.to_string().as_bytes()))
}

fn annotation<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object
        .pointer("/metadata/annotations")
        .and_then(|annotations| annotations.get(key))
        .and_then(Value::as_str)
}

/// Desired body with ownership and hash annotations added
fn annotated(target: &TargetResource, owner: &str, hash: &str) -> Value {
    let mut body = target.body.clone();
    if let Some(metadata) = body.get_mut("metadata").and_then(Value::as_object_mut) {
        let annotations = metadata
            .entry("annotations")
            .or_insert_with(|| Value::Object(Map::new()));
        if !annotations.is_object() {
            *annotations = Value::Object(Map::new());
        }
        if let Some(annotations) = annotations.as_object_mut() {
            annotations.insert(
                APPLIED_HASH_ANNOTATION.to_string(),
                Value::String(hash.to_string()),
            );
            annotations.insert(
                APPLICATION_ANNOTATION.to_string(),
                Value::String(owner.to_string()),
            );
        }
    }
    body
}

/// Metadata the API server owns; never part of the comparison
const SERVER_MANAGED_METADATA: &[&str] = &[
    "resourceVersion",
    "uid",
    "creationTimestamp",
    "generation",
    "managedFields",
    "selfLink",
];

/// Whether `live` holds every field of `desired`
///
/// Fields only present on the live object (defaults, server metadata) are
/// ignored. `status` is written through its own subresource and is skipped.
fn converged(desired: &Value, live: &Value) -> bool {
    let mut desired = desired.clone();
    if let Some(fields) = desired.as_object_mut() {
        fields.remove("status");
        if let Some(metadata) = fields.get_mut("metadata").and_then(Value::as_object_mut) {
            for key in SERVER_MANAGED_METADATA {
                metadata.remove(*key);
            }
        }
    }
    contains(&desired, live)
}

fn contains(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Object(desired), Value::Object(live)) => desired
            .iter()
            .all(|(key, value)| live.get(key).is_some_and(|live| contains(value, live))),
        (Value::Array(desired), Value::Array(live)) => {
            desired.len() == live.len()
                && desired.iter().zip(live).all(|(value, live)| contains(value, live))
        }
        (desired, live) => desired == live,
    }
}

/// Carry the live `resourceVersion` so the replace is rejected on a concurrent write
fn with_resource_version(mut body: Value, live: &Value) -> Value {
    if let (Some(version), Some(metadata)) = (
        live.pointer("/metadata/resourceVersion").cloned(),
        body.get_mut("metadata").and_then(Value::as_object_mut),
    ) {
        metadata.insert("resourceVersion".to_string(), version);
    }
    body
}

/// Apply one target: create if absent, replace if changed, otherwise leave it
///
/// # Errors
///
/// Returns `ReconcilerError::Apply` when the store rejects a read or write,
/// or `ReconcilerError::Cancelled` if `cancel` fires first.
pub async fn apply_target(
    store: &dyn ResourceStore,
    target: &TargetResource,
    owner: &str,
    cancel: &CancellationToken,
) -> Result<ApplyOperation, ReconcilerError> {
    let reference = &target.reference;
    let apply_error = |source| ReconcilerError::Apply {
        resource: reference.to_string(),
        source,
    };
    let hash = applied_hash(&target.body);
    let desired = annotated(target, owner, &hash);

    let live = cancellable(cancel, store.get(reference))
        .await?
        .map_err(apply_error)?;

    let operation = match live {
        None => {
            cancellable(cancel, store.create(reference, &desired))
                .await?
                .map_err(apply_error)?;
            ApplyOperation::Created
        }
        Some(live)
            if annotation(&live, APPLIED_HASH_ANNOTATION) == Some(hash.as_str())
                && converged(&desired, &live) =>
        {
            ApplyOperation::Unchanged
        }
        Some(live) => {
            if annotation(&live, APPLIED_HASH_ANNOTATION) == Some(hash.as_str()) {
                info!(resource = %reference, "Live object drifted from source, reverting");
            }
            let desired = with_resource_version(desired, &live);
            cancellable(cancel, store.update(reference, &desired))
                .await?
                .map_err(apply_error)?;
            ApplyOperation::Updated
        }
    };

    match operation {
        ApplyOperation::Unchanged => debug!(resource = %reference, "Resource unchanged"),
        op => info!(resource = %reference, operation = op.as_str(), "Applied resource"),
    }
    crate::observability::metrics::increment_resources_applied(operation.as_str());
    Ok(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::manifest::decode;
    use serde_json::json;

    fn target() -> TargetResource {
        decode(b"apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n  annotations:\n    team: web\ndata:\n  a: b\n")
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_hash_is_stable_and_content_sensitive() {
        let a = target();
        let mut b = target();
        assert_eq!(applied_hash(&a.body), applied_hash(&b.body));
        assert_eq!(applied_hash(&a.body).len(), 64);
        b.body["data"]["a"] = json!("c");
        assert_ne!(applied_hash(&a.body), applied_hash(&b.body));
    }

    #[test]
    fn test_annotations_are_merged() {
        let body = annotated(&target(), "default/foo", "abc");
        assert_eq!(annotation(&body, "team"), Some("web"));
        assert_eq!(annotation(&body, APPLIED_HASH_ANNOTATION), Some("abc"));
        assert_eq!(annotation(&body, APPLICATION_ANNOTATION), Some("default/foo"));
    }

    #[test]
    fn test_live_defaults_and_server_metadata_still_converge() {
        let desired = annotated(&target(), "default/foo", "abc");
        let mut live = desired.clone();
        live["metadata"]["uid"] = json!("6f1c");
        live["metadata"]["resourceVersion"] = json!("42");
        live["metadata"]["annotations"]["kubectl.kubernetes.io/last-applied-configuration"] =
            json!("{}");
        live["immutable"] = json!(false);
        assert!(converged(&desired, &live));

        let mut with_status = desired.clone();
        with_status["status"] = json!({"phase": "Ready"});
        assert!(converged(&with_status, &live));
    }

    #[test]
    fn test_edited_or_removed_fields_do_not_converge() {
        let desired = annotated(&target(), "default/foo", "abc");

        let mut edited = desired.clone();
        edited["data"]["a"] = json!("edited-by-hand");
        assert!(!converged(&desired, &edited));

        let mut removed = desired.clone();
        removed["metadata"]["annotations"]
            .as_object_mut()
            .unwrap()
            .remove("team");
        assert!(!converged(&desired, &removed));
    }

    #[test]
    fn test_arrays_must_match_element_for_element() {
        let desired = json!({"spec": {"ports": [{"port": 80}, {"port": 443}]}});
        let defaulted = json!({"spec": {"ports": [
            {"port": 80, "protocol": "TCP"},
            {"port": 443, "protocol": "TCP"}
        ]}});
        assert!(converged(&desired, &defaulted));

        let extra = json!({"spec": {"ports": [{"port": 80}, {"port": 443}, {"port": 8080}]}});
        assert!(!converged(&desired, &extra));
    }

    #[test]
    fn test_resource_version_is_carried_forward() {
        let live = json!({"metadata": {"name": "cfg", "resourceVersion": "42"}});
        let body = with_resource_version(annotated(&target(), "default/foo", "abc"), &live);
        assert_eq!(body["metadata"]["resourceVersion"], "42");

        let body = with_resource_version(annotated(&target(), "default/foo", "abc"), &json!({}));
        assert!(body["metadata"].get("resourceVersion").is_none());
    }
}
