//! # Source Fetcher
//!
//! Retrieves the raw manifest files addressed by an Application's source.
//!
//! - `github.rs` - GitHub contents API (`https://github.com/<owner>/<repo>` locators)
//! - `filesystem.rs` - Local directories (`file://` locators)
//!
//! A path naming a single file yields that file. A path naming a directory
//! yields its `.yaml`, `.yml` and `.json` files, non-recursively, in listing
//! order. Failures are surfaced as-is; retrying is the engine's business.

pub mod filesystem;
pub mod github;

pub use filesystem::FilesystemSource;
pub use github::GithubSource;

use crate::config::CredentialError;
use crate::crd::ApplicationSource;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Raw content of one manifest file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    /// Path of the file inside the repository
    pub path: String,
    pub content: Vec<u8>,
}

/// Errors raised while fetching manifests
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid repository locator `{0}`")]
    InvalidLocator(String),
    #[error("path `{path}` not found in {repository}")]
    NotFound { repository: String, path: String },
    #[error("`{path}` in {repository} is neither a file nor a directory")]
    UnsupportedEntry { repository: String, path: String },
    #[error("repository API returned HTTP {status} for {url}: {message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("malformed content for `{path}`: {message}")]
    Content { path: String, message: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Provider of manifest files for an Application source
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch every manifest file addressed by `source`, in enumeration order
    async fn fetch(&self, source: &ApplicationSource) -> Result<Vec<ManifestFile>, SourceError>;
}

/// Dispatches to the local source for `file://` locators and to GitHub otherwise
pub struct SourceRouter {
    remote: Arc<dyn ManifestSource>,
    local: Arc<dyn ManifestSource>,
}

impl std::fmt::Debug for SourceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRouter").finish_non_exhaustive()
    }
}

impl SourceRouter {
    #[must_use]
    pub fn new(remote: Arc<dyn ManifestSource>, local: Arc<dyn ManifestSource>) -> Self {
        Self { remote, local }
    }
}

#[async_trait]
impl ManifestSource for SourceRouter {
    async fn fetch(&self, source: &ApplicationSource) -> Result<Vec<ManifestFile>, SourceError> {
        if is_local_locator(&source.repo_url) {
            self.local.fetch(source).await
        } else {
            self.remote.fetch(source).await
        }
    }
}

pub(crate) fn is_local_locator(repo_url: &str) -> bool {
    repo_url.trim_start().starts_with("file://")
}

/// Extensions accepted when enumerating a directory
pub(crate) fn is_manifest_file_name(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            crate::constants::MANIFEST_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Reject paths that climb out of the repository root
pub(crate) fn normalize_repo_path(path: &str) -> Result<Vec<&str>, SourceError> {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.contains(&"..") {
        return Err(SourceError::InvalidLocator(path.to_string()));
    }
    Ok(segments)
}
