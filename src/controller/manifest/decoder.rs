//! # Decoder
//!
//! Sequential decoding of a manifest byte stream.
//!
//! Streams go through the YAML deserializer, which also reads JSON documents
//! wherever they appear between `---` separators. Concatenated JSON with no
//! separators is not valid YAML and falls back to the JSON stream reader.

use crate::controller::manifest::types::TargetResource;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// A manifest document could not be decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid YAML in document {index}: {source}")]
    Yaml {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid JSON in document {index}: {source}")]
    Json {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("document {index} is not a mapping")]
    NotAnObject { index: usize },
    #[error("document {index} has no `{field}`")]
    MissingField { index: usize, field: &'static str },
}

/// Decode every resource document in `bytes`, in stream order
///
/// # Errors
///
/// Returns the first `DecodeError`; no documents are returned in that case.
pub fn decode(bytes: &[u8]) -> Result<Vec<TargetResource>, DecodeError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let documents = match yaml_documents(bytes) {
        Ok(documents) => documents,
        Err(yaml_error) if starts_with_json_object(bytes) => {
            json_documents(bytes).map_err(|json_error| {
                tracing::debug!("Stream is neither YAML ({}) nor JSON", yaml_error);
                json_error
            })?
        }
        Err(yaml_error) => return Err(yaml_error),
    };

    documents
        .into_iter()
        .enumerate()
        .filter(|(_, document)| !is_empty_document(document))
        .map(|(index, document)| {
            TargetResource::from_document(document).map_err(|missing| match missing {
                super::types::MissingField::NotAnObject => DecodeError::NotAnObject { index },
                field => DecodeError::MissingField {
                    index,
                    field: field.as_str(),
                },
            })
        })
        .collect()
}

fn starts_with_json_object(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{')
}

fn json_documents(bytes: &[u8]) -> Result<Vec<Value>, DecodeError> {
    serde_json::Deserializer::from_slice(bytes)
        .into_iter::<Value>()
        .enumerate()
        .map(|(index, document)| document.map_err(|source| DecodeError::Json { index, source }))
        .collect()
}

fn yaml_documents(bytes: &[u8]) -> Result<Vec<Value>, DecodeError> {
    serde_yaml::Deserializer::from_slice(bytes)
        .enumerate()
        .map(|(index, document)| {
            Value::deserialize(document).map_err(|source| DecodeError::Yaml { index, source })
        })
        .collect()
}

fn is_empty_document(document: &Value) -> bool {
    match document {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_document_yaml_in_order() {
        let manifest = br"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: apps
---
apiVersion: v1
kind: Service
metadata:
  name: web-svc
";
        let targets = decode(manifest).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].reference.kind, "Deployment");
        assert_eq!(targets[0].reference.group, "apps");
        assert_eq!(targets[0].reference.namespace, "apps");
        assert_eq!(targets[1].reference.kind, "Service");
        assert_eq!(targets[1].reference.group, "");
        assert_eq!(targets[1].reference.namespace, "default");
    }

    #[test]
    fn test_empty_documents_are_skipped() {
        let manifest = b"---\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n---\n# only a comment\n";
        let targets = decode(manifest).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].reference.name, "cfg");
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        assert!(decode(b"").unwrap().is_empty());
        assert!(decode(b"   \n").unwrap().is_empty());
    }

    #[test]
    fn test_single_json_document() {
        let manifest = br#"{"apiVersion":"v1","kind":"Service","metadata":{"name":"api"}}"#;
        let targets = decode(manifest).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].reference.name, "api");
        assert_eq!(targets[0].body["metadata"]["namespace"], "default");
    }

    #[test]
    fn test_concatenated_json_documents() {
        let manifest = br#"
{"apiVersion":"v1","kind":"Service","metadata":{"name":"a"}}
{"apiVersion":"v1","kind":"Service","metadata":{"name":"b"}}
"#;
        let names: Vec<_> = decode(manifest)
            .unwrap()
            .into_iter()
            .map(|t| t.reference.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_json_inside_yaml_stream() {
        let manifest = b"apiVersion: v1\nkind: Service\nmetadata:\n  name: a\n---\n{\"apiVersion\": \"v1\", \"kind\": \"Service\", \"metadata\": {\"name\": \"b\"}}\n";
        assert_eq!(decode(manifest).unwrap().len(), 2);
    }

    #[test]
    fn test_json_document_before_yaml_documents() {
        let manifest = b"{\"apiVersion\": \"v1\", \"kind\": \"ConfigMap\", \"metadata\": {\"name\": \"a\"}}\n---\napiVersion: v1\nkind: Service\nmetadata:\n  name: b\n";
        let targets = decode(manifest).unwrap();
        let names: Vec<_> = targets.iter().map(|t| t.reference.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(targets[0].reference.kind, "ConfigMap");
        assert_eq!(targets[1].reference.kind, "Service");
    }

    #[test]
    fn test_pretty_printed_json_document() {
        let manifest = b"{\n  \"apiVersion\": \"apps/v1\",\n  \"kind\": \"Deployment\",\n  \"metadata\": {\n    \"name\": \"web\",\n    \"namespace\": \"apps\"\n  }\n}\n";
        let targets = decode(manifest).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].reference.group, "apps");
        assert_eq!(targets[0].reference.namespace, "apps");
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let manifest = b"\xEF\xBB\xBFapiVersion: v1\nkind: Service\nmetadata:\n  name: a\n";
        assert_eq!(decode(manifest).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_document_fails_whole_call() {
        let manifest = b"apiVersion: v1\nkind: Service\nmetadata:\n  name: a\n---\nkind: [unclosed\n";
        assert!(matches!(
            decode(manifest),
            Err(DecodeError::Yaml { .. })
        ));
    }

    #[test]
    fn test_malformed_json_fails() {
        assert!(matches!(
            decode(br#"{"apiVersion": "v1", "kind": "#),
            Err(DecodeError::Json { .. })
        ));
    }

    #[test]
    fn test_scalar_document_is_rejected() {
        assert!(matches!(
            decode(b"just a string\n"),
            Err(DecodeError::NotAnObject { index: 0 })
        ));
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        assert!(matches!(
            decode(b"apiVersion: v1\nmetadata:\n  name: a\n"),
            Err(DecodeError::MissingField { index: 0, field: "kind" })
        ));
    }
}
