//! # Manifest Types
//!
//! Generic resource identity and the decoded target documents.

use crate::constants::DEFAULT_NAMESPACE;
use crate::crd::{ManagedResource, SyncStatusCode};
use serde_json::Value;

/// Identity of a resource in the cluster: (group, version, kind, namespace, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    /// Split an `apiVersion` into group and version; the core group is empty
    #[must_use]
    pub fn split_api_version(api_version: &str) -> (String, String) {
        match api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), api_version.to_string()),
        }
    }

    /// `apiVersion` as written in manifests
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Managed-resource entry for this identity
    #[must_use]
    pub fn to_managed(&self, status: SyncStatusCode) -> ManagedResource {
        ManagedResource {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            status,
        }
    }
}

impl From<&ManagedResource> for ResourceRef {
    fn from(resource: &ManagedResource) -> Self {
        Self {
            group: resource.group.clone(),
            version: resource.version.clone(),
            kind: resource.kind.clone(),
            namespace: if resource.namespace.is_empty() {
                DEFAULT_NAMESPACE.to_string()
            } else {
                resource.namespace.clone()
            },
            name: resource.name.clone(),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} {}/{}",
            self.api_version(),
            self.kind,
            self.namespace,
            self.name
        )
    }
}

/// One resource document decoded from the source for the current pass
///
/// `body` is the full document, with `metadata.namespace` filled in when the
/// manifest omitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetResource {
    pub reference: ResourceRef,
    pub body: Value,
}

impl TargetResource {
    /// Build a target from a decoded document, defaulting the namespace
    ///
    /// Returns the name of the first missing required field on failure.
    pub(crate) fn from_document(mut body: Value) -> Result<Self, MissingField> {
        let Some(object) = body.as_object_mut() else {
            return Err(MissingField::NotAnObject);
        };
        let api_version = string_field(object.get("apiVersion")).ok_or(MissingField::ApiVersion)?;
        let kind = string_field(object.get("kind")).ok_or(MissingField::Kind)?;
        let metadata = object
            .get_mut("metadata")
            .and_then(Value::as_object_mut)
            .ok_or(MissingField::Name)?;
        let name = string_field(metadata.get("name")).ok_or(MissingField::Name)?;
        let namespace = match string_field(metadata.get("namespace")) {
            Some(namespace) => namespace,
            None => {
                metadata.insert(
                    "namespace".to_string(),
                    Value::String(DEFAULT_NAMESPACE.to_string()),
                );
                DEFAULT_NAMESPACE.to_string()
            }
        };
        let (group, version) = ResourceRef::split_api_version(&api_version);
        Ok(Self {
            reference: ResourceRef {
                group,
                version,
                kind,
                namespace,
                name,
            },
            body,
        })
    }
}

/// Required field absent from a decoded document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MissingField {
    NotAnObject,
    ApiVersion,
    Kind,
    Name,
}

impl MissingField {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::NotAnObject => "<object>",
            Self::ApiVersion => "apiVersion",
            Self::Kind => "kind",
            Self::Name => "metadata.name",
        }
    }
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_api_version() {
        assert_eq!(
            ResourceRef::split_api_version("apps/v1"),
            ("apps".to_string(), "v1".to_string())
        );
        assert_eq!(
            ResourceRef::split_api_version("v1"),
            (String::new(), "v1".to_string())
        );
    }

    #[test]
    fn test_namespace_defaults_into_identity_and_body() {
        let target = TargetResource::from_document(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web"}
        }))
        .unwrap();
        assert_eq!(target.reference.namespace, "default");
        assert_eq!(target.body["metadata"]["namespace"], "default");
        assert_eq!(target.reference.api_version(), "apps/v1");
    }

    #[test]
    fn test_missing_fields_are_reported() {
        assert_eq!(
            TargetResource::from_document(json!({"kind": "Service", "metadata": {"name": "a"}})),
            Err(MissingField::ApiVersion)
        );
        assert_eq!(
            TargetResource::from_document(json!({"apiVersion": "v1", "kind": "Service"})),
            Err(MissingField::Name)
        );
        assert_eq!(
            TargetResource::from_document(json!(["not", "an", "object"])),
            Err(MissingField::NotAnObject)
        );
    }

    #[test]
    fn test_managed_resource_round_trip_keeps_identity() {
        let reference = ResourceRef {
            group: String::new(),
            version: "v1".to_string(),
            kind: "Service".to_string(),
            namespace: "apps".to_string(),
            name: "web-svc".to_string(),
        };
        let managed = reference.to_managed(SyncStatusCode::Synced);
        assert_eq!(ResourceRef::from(&managed), reference);
        assert_eq!(reference.to_string(), "v1/Service apps/web-svc");
    }
}
