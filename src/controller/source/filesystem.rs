//! # Filesystem Source
//!
//! Reads manifests from a local directory named by a `file://` locator,
//! e.g. a checkout mounted into the controller pod. The revision is ignored.

use crate::controller::source::{
    is_manifest_file_name, normalize_repo_path, ManifestFile, ManifestSource, SourceError,
};
use crate::crd::ApplicationSource;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Local directory source
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemSource;

impl FilesystemSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ManifestSource for FilesystemSource {
    async fn fetch(&self, source: &ApplicationSource) -> Result<Vec<ManifestFile>, SourceError> {
        let root = local_root(&source.repo_url)?;
        let target = normalize_repo_path(&source.path)?
            .into_iter()
            .fold(root.clone(), |path, segment| path.join(segment));
        debug!("Reading manifests from {}", target.display());

        let repository = source.repo_url.clone();
        let relative_to = root;
        tokio::task::spawn_blocking(move || read_manifests(&repository, &relative_to, &target))
            .await
            .map_err(|e| SourceError::Io {
                path: source.path.clone(),
                source: std::io::Error::other(e),
            })?
    }
}

fn local_root(repo_url: &str) -> Result<PathBuf, SourceError> {
    let path = repo_url
        .trim()
        .strip_prefix("file://")
        .filter(|p| !p.is_empty())
        .ok_or_else(|| SourceError::InvalidLocator(repo_url.to_string()))?;
    Ok(PathBuf::from(path))
}

fn read_manifests(
    repository: &str,
    root: &Path,
    target: &Path,
) -> Result<Vec<ManifestFile>, SourceError> {
    let io_error = |path: &Path, source: std::io::Error| SourceError::Io {
        path: path.display().to_string(),
        source,
    };

    let metadata = match std::fs::metadata(target) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SourceError::NotFound {
                repository: repository.to_string(),
                path: relative(root, target),
            });
        }
        Err(e) => return Err(io_error(target, e)),
    };

    if metadata.is_file() {
        let content = std::fs::read(target).map_err(|e| io_error(target, e))?;
        return Ok(vec![ManifestFile {
            path: relative(root, target),
            content,
        }]);
    }
    if !metadata.is_dir() {
        return Err(SourceError::UnsupportedEntry {
            repository: repository.to_string(),
            path: relative(root, target),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(target)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| SourceError::Io {
            path: target.display().to_string(),
            source: e.into(),
        })?;
        let name = entry.file_name().to_string_lossy();
        if !entry.file_type().is_file() || !is_manifest_file_name(&name) {
            continue;
        }
        let content = std::fs::read(entry.path()).map_err(|e| io_error(entry.path(), e))?;
        files.push(ManifestFile {
            path: relative(root, entry.path()),
            content,
        });
    }
    Ok(files)
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
