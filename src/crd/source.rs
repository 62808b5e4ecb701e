//! # Application Source
//!
//! Location of the manifests that make up an Application's desired state.

use serde::{Deserialize, Serialize};

/// Reference to the location of the application manifests
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSource {
    /// URL of the repository holding the manifests
    /// Examples: "https://github.com/acme/deploy", "https://github.com/acme/deploy.git",
    /// "file:///var/lib/checkouts/deploy" (local checkout, revision ignored)
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    /// Path inside the repository: a single manifest file or a directory of manifests.
    /// Directories are read non-recursively; only `.yaml`, `.yml` and `.json` files are used.
    pub path: String,
    /// Commit, tag or branch to sync. Empty means the head of the default branch.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_revision: String,
}

impl ApplicationSource {
    /// Revision to request from the repository, `None` for the default branch head
    #[must_use]
    pub fn revision(&self) -> Option<&str> {
        let revision = self.target_revision.trim();
        if revision.is_empty() || revision.eq_ignore_ascii_case("HEAD") {
            None
        } else {
            Some(revision)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(revision: &str) -> ApplicationSource {
        ApplicationSource {
            repo_url: "https://github.com/acme/deploy".to_string(),
            path: "app".to_string(),
            target_revision: revision.to_string(),
        }
    }

    #[test]
    fn test_empty_revision_means_default_branch() {
        assert_eq!(source("").revision(), None);
        assert_eq!(source("  ").revision(), None);
        assert_eq!(source("HEAD").revision(), None);
    }

    #[test]
    fn test_explicit_revision_is_kept() {
        assert_eq!(source("v1.2.0").revision(), Some("v1.2.0"));
        assert_eq!(source("main").revision(), Some("main"));
    }
}
