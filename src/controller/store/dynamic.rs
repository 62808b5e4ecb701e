//! # Dynamic Store
//!
//! `ResourceStore` over `kube::Api<DynamicObject>`.
//!
//! Each (group, version, kind) is resolved once through API discovery and the
//! result is cached for the life of the process. Discovery also tells us the
//! scope: cluster-scoped kinds are addressed without a namespace.

use crate::constants::FIELD_MANAGER;
use crate::controller::manifest::ResourceRef;
use crate::controller::store::{ResourceStore, StoreError};
use async_trait::async_trait;
use kube::{
    api::{Api, ApiResource, DeleteParams, PostParams},
    core::{DynamicObject, GroupVersionKind},
    discovery::{pinned_kind, ApiCapabilities, Scope},
    Client,
};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KindKey {
    group: String,
    version: String,
    kind: String,
}

impl From<&ResourceRef> for KindKey {
    fn from(reference: &ResourceRef) -> Self {
        Self {
            group: reference.group.clone(),
            version: reference.version.clone(),
            kind: reference.kind.clone(),
        }
    }
}

/// Discovered collection of a kind
#[derive(Debug, Clone)]
struct Collection {
    resource: ApiResource,
    cluster_scoped: bool,
}

/// Cluster-backed resource store
pub struct DynamicStore {
    client: Client,
    discovery: RwLock<HashMap<KindKey, Collection>>,
}

impl std::fmt::Debug for DynamicStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicStore").finish_non_exhaustive()
    }
}

impl DynamicStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            discovery: RwLock::new(HashMap::new()),
        }
    }

    async fn collection(&self, reference: &ResourceRef) -> Result<Collection, StoreError> {
        let key = KindKey::from(reference);
        if let Some(collection) = self.discovery.read().await.get(&key) {
            return Ok(collection.clone());
        }

        let gvk = GroupVersionKind::gvk(&key.group, &key.version, &key.kind);
        let (resource, capabilities): (ApiResource, ApiCapabilities) =
            pinned_kind(&self.client, &gvk)
                .await
                .map_err(|source| StoreError::Discovery {
                    api_version: reference.api_version(),
                    kind: reference.kind.clone(),
                    source,
                })?;
        let collection = Collection {
            cluster_scoped: matches!(capabilities.scope, Scope::Cluster),
            resource,
        };
        info!(
            "Discovered {}/{} as collection '{}' ({})",
            reference.api_version(),
            reference.kind,
            collection.resource.plural,
            if collection.cluster_scoped {
                "cluster-scoped"
            } else {
                "namespaced"
            }
        );
        self.discovery
            .write()
            .await
            .insert(key, collection.clone());
        Ok(collection)
    }

    async fn api(&self, reference: &ResourceRef) -> Result<(Api<DynamicObject>, bool), StoreError> {
        let collection = self.collection(reference).await?;
        let api = if collection.cluster_scoped {
            Api::all_with(self.client.clone(), &collection.resource)
        } else {
            Api::namespaced_with(self.client.clone(), &reference.namespace, &collection.resource)
        };
        Ok((api, collection.cluster_scoped))
    }
}

/// Convert a manifest body into a `DynamicObject` for the collection's scope
fn to_object(
    reference: &ResourceRef,
    body: &Value,
    cluster_scoped: bool,
) -> Result<DynamicObject, StoreError> {
    let mut object: DynamicObject =
        serde_json::from_value(body.clone()).map_err(|source| StoreError::Serialization {
            resource: reference.to_string(),
            source,
        })?;
    if cluster_scoped {
        object.metadata.namespace = None;
    }
    Ok(object)
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(api_err) if api_err.code == 404)
}

/// The group/version or the kind is no longer served, e.g. its CRD was removed
fn is_unserved_kind(error: &StoreError) -> bool {
    match error {
        StoreError::Discovery { source, .. } => {
            is_not_found(source) || matches!(source, kube::Error::Discovery(_))
        }
        _ => false,
    }
}

fn post_params() -> PostParams {
    PostParams {
        dry_run: false,
        field_manager: Some(FIELD_MANAGER.to_string()),
    }
}

#[async_trait]
impl ResourceStore for DynamicStore {
    async fn get(&self, reference: &ResourceRef) -> Result<Option<Value>, StoreError> {
        let (api, _) = self.api(reference).await?;
        let live = api
            .get_opt(&reference.name)
            .await
            .map_err(|source| StoreError::Api {
                operation: "get",
                resource: reference.to_string(),
                source,
            })?;
        live.map(|object| {
            serde_json::to_value(object).map_err(|source| StoreError::Serialization {
                resource: reference.to_string(),
                source,
            })
        })
        .transpose()
    }

    async fn create(&self, reference: &ResourceRef, body: &Value) -> Result<(), StoreError> {
        let (api, cluster_scoped) = self.api(reference).await?;
        let object = to_object(reference, body, cluster_scoped)?;
        api.create(&post_params(), &object)
            .await
            .map_err(|source| StoreError::Api {
                operation: "create",
                resource: reference.to_string(),
                source,
            })?;
        debug!("Created {}", reference);
        Ok(())
    }

    async fn update(&self, reference: &ResourceRef, body: &Value) -> Result<(), StoreError> {
        let (api, cluster_scoped) = self.api(reference).await?;
        let object = to_object(reference, body, cluster_scoped)?;
        api.replace(&reference.name, &post_params(), &object)
            .await
            .map_err(|source| StoreError::Api {
                operation: "update",
                resource: reference.to_string(),
                source,
            })?;
        debug!("Updated {}", reference);
        Ok(())
    }

    async fn delete(&self, reference: &ResourceRef) -> Result<bool, StoreError> {
        let api = match self.api(reference).await {
            Ok((api, _)) => api,
            Err(e) if is_unserved_kind(&e) => {
                debug!("{} no longer served, treating {} as absent", reference.kind, reference);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        match api
            .delete(&reference.name, &DeleteParams::background())
            .await
        {
            Ok(_) => {
                debug!("Deleted {}", reference);
                Ok(true)
            }
            Err(e) if is_not_found(&e) => {
                debug!("{} already absent", reference);
                Ok(false)
            }
            Err(source) => Err(StoreError::Api {
                operation: "delete",
                resource: reference.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference(kind: &str) -> ResourceRef {
        ResourceRef {
            group: "rbac.authorization.k8s.io".to_string(),
            version: "v1".to_string(),
            kind: kind.to_string(),
            namespace: "default".to_string(),
            name: "reader".to_string(),
        }
    }

    fn body() -> Value {
        json!({
            "apiVersion": "rbac.authorization.k8s.io/v1",
            "kind": "ClusterRole",
            "metadata": {"name": "reader", "namespace": "default"},
            "rules": []
        })
    }

    #[test]
    fn test_cluster_scoped_objects_drop_namespace() {
        let object = to_object(&reference("ClusterRole"), &body(), true).unwrap();
        assert_eq!(object.metadata.namespace, None);
        assert_eq!(object.data["rules"], json!([]));
    }

    #[test]
    fn test_namespaced_objects_keep_namespace() {
        let object = to_object(&reference("Role"), &body(), false).unwrap();
        assert_eq!(object.metadata.namespace.as_deref(), Some("default"));
    }

    #[test]
    fn test_kind_key_ignores_namespace_and_name() {
        let mut other = reference("Role");
        other.namespace = "apps".to_string();
        other.name = "writer".to_string();
        assert_eq!(KindKey::from(&reference("Role")), KindKey::from(&other));
    }
}
