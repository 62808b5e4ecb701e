//! # GitHub Source
//!
//! Reads manifests through the GitHub repository contents API.
//!
//! A file path returns one object with base64 `content`. A directory path
//! returns a listing without content, so each accepted file is requested
//! individually at the same revision. Files too large for the contents API
//! come back with an empty payload and are fetched from `download_url`.
//!
//! References:
//! - [Repository contents](https://docs.github.com/en/rest/repos/contents#get-repository-content)

use crate::config::Credentials;
use crate::controller::source::{
    is_manifest_file_name, normalize_repo_path, ManifestFile, ManifestSource, SourceError,
};
use crate::crd::ApplicationSource;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info_span, Instrument};
use zeroize::Zeroizing;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("gitops-controller/", env!("CARGO_PKG_VERSION"));

static LOCATOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://[^/]+/|git@[^:]+:)([^/]+)/([^/]+?)(?:\.git)?/?$")
        .expect("Failed to compile repository locator pattern - this should never happen")
});

/// Owner and name of a hosted repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinates {
    /// Parse `https://host/owner/repo[.git]` or `git@host:owner/repo[.git]`
    ///
    /// # Errors
    ///
    /// Returns `SourceError::InvalidLocator` for anything else.
    pub fn parse(repo_url: &str) -> Result<Self, SourceError> {
        let captures = LOCATOR_PATTERN
            .captures(repo_url.trim())
            .ok_or_else(|| SourceError::InvalidLocator(repo_url.to_string()))?;
        Ok(Self {
            owner: captures[1].to_string(),
            name: captures[2].to_string(),
        })
    }
}

impl std::fmt::Display for RepoCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Body of a contents API response: a directory listing or a single entry
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Contents {
    Listing(Vec<ContentEntry>),
    Single(ContentEntry),
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

/// GitHub contents API client
pub struct GithubSource {
    http_client: Client,
    base_url: Url,
    credentials: Arc<Credentials>,
}

impl std::fmt::Debug for GithubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubSource")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl GithubSource {
    /// Create a client for the API at `base_url` (e.g. `https://api.github.com`)
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, credentials: Arc<Credentials>) -> Result<Self, SourceError> {
        let base_url =
            Url::parse(base_url).map_err(|e| SourceError::InvalidLocator(format!("{base_url}: {e}")))?;
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| SourceError::Transport {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            http_client,
            base_url,
            credentials,
        })
    }

    /// `GET /repos/{owner}/{repo}/contents/{path}?ref={revision}`
    fn contents_url(
        &self,
        repo: &RepoCoordinates,
        path: &str,
        revision: Option<&str>,
    ) -> Result<Url, SourceError> {
        let segments = normalize_repo_path(path)?;
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SourceError::InvalidLocator(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.name.as_str(), "contents"])
            .extend(segments);
        if let Some(revision) = revision {
            url.query_pairs_mut().append_pair("ref", revision);
        }
        Ok(url)
    }

    async fn send(&self, url: Url, token: Option<&Zeroizing<String>>) -> Result<reqwest::Response, SourceError> {
        let mut request = self
            .http_client
            .get(url.clone())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = token {
            request = request.bearer_auth(token.as_str());
        }
        request.send().await.map_err(|source| SourceError::Transport {
            url: url.to_string(),
            source,
        })
    }

    async fn get_contents(
        &self,
        repo: &RepoCoordinates,
        path: &str,
        revision: Option<&str>,
        token: Option<&Zeroizing<String>>,
    ) -> Result<Contents, SourceError> {
        let url = self.contents_url(repo, path, revision)?;
        debug!("GET {}", url);
        let response = self.send(url.clone(), token).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound {
                repository: repo.to_string(),
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                message,
            });
        }
        response.json::<Contents>().await.map_err(|e| SourceError::Content {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Bytes of a file entry, from inline content or `download_url`
    async fn file_bytes(
        &self,
        entry: ContentEntry,
        token: Option<&Zeroizing<String>>,
    ) -> Result<ManifestFile, SourceError> {
        let inline = entry
            .content
            .as_deref()
            .filter(|c| !c.is_empty() && entry.encoding.as_deref() == Some("base64"));
        if let Some(encoded) = inline {
            let content = decode_base64(encoded).map_err(|message| SourceError::Content {
                path: entry.path.clone(),
                message,
            })?;
            return Ok(ManifestFile {
                path: entry.path,
                content,
            });
        }

        let download_url = entry.download_url.as_deref().ok_or_else(|| SourceError::Content {
            path: entry.path.clone(),
            message: "no inline content and no download_url".to_string(),
        })?;
        let url = Url::parse(download_url).map_err(|e| SourceError::Content {
            path: entry.path.clone(),
            message: e.to_string(),
        })?;
        debug!("Downloading {} from {}", entry.path, url);
        let response = self.send(url.clone(), token).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let content = response
            .bytes()
            .await
            .map_err(|source| SourceError::Transport {
                url: url.to_string(),
                source,
            })?
            .to_vec();
        Ok(ManifestFile {
            path: entry.path,
            content,
        })
    }
}

impl GithubSource {
    async fn fetch_files(
        &self,
        repo: &RepoCoordinates,
        path: &str,
        revision: Option<&str>,
    ) -> Result<Vec<ManifestFile>, SourceError> {
        let token = self.credentials.token().await?;
        let entries = match self.get_contents(repo, path, revision, token.as_ref()).await? {
            Contents::Single(entry) if entry.entry_type == "file" => {
                return Ok(vec![self.file_bytes(entry, token.as_ref()).await?]);
            }
            Contents::Single(entry) => {
                return Err(SourceError::UnsupportedEntry {
                    repository: repo.to_string(),
                    path: entry.path,
                });
            }
            Contents::Listing(entries) => entries,
        };

        let mut files = Vec::new();
        for entry in entries {
            if entry.entry_type != "file" || !is_manifest_file_name(&entry.name) {
                debug!("Skipping {} ({})", entry.path, entry.entry_type);
                continue;
            }
            match self
                .get_contents(repo, &entry.path, revision, token.as_ref())
                .await?
            {
                Contents::Single(file) => files.push(self.file_bytes(file, token.as_ref()).await?),
                Contents::Listing(_) => {
                    return Err(SourceError::UnsupportedEntry {
                        repository: repo.to_string(),
                        path: entry.path,
                    });
                }
            }
        }
        debug!("Fetched {} manifest file(s)", files.len());
        Ok(files)
    }
}

#[async_trait]
impl ManifestSource for GithubSource {
    async fn fetch(&self, source: &ApplicationSource) -> Result<Vec<ManifestFile>, SourceError> {
        let repo = RepoCoordinates::parse(&source.repo_url)?;
        let revision = source.revision();
        let span = info_span!(
            "source.fetch",
            repository = %repo,
            path = %source.path,
            revision = revision.unwrap_or("HEAD")
        );
        self.fetch_files(&repo, &source.path, revision)
            .instrument(span)
            .await
    }
}

/// GitHub wraps base64 payloads at 60 columns
fn decode_base64(encoded: &str) -> Result<Vec<u8>, String> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact).map_err(|e| e.to_string())
}
