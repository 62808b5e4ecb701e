//! # Source Credentials
//!
//! Resolves the access token used against the manifest repository.
//!
//! Precedence: a token supplied through the process environment wins; otherwise,
//! when a secret is configured, its `token` key is read on every fetch so that
//! rotation takes effect without a restart; otherwise access is anonymous.

use crate::config::ControllerConfig;
use crate::constants::TOKEN_SECRET_KEY;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

/// Credential lookup failures. A missing secret or bad token is permanent until
/// the secret is corrected; API failures while reading it are transient.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("token secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },
    #[error("token secret {namespace}/{name} has no `{key}` key")]
    MissingKey {
        namespace: String,
        name: String,
        key: String,
    },
    #[error("token secret {namespace}/{name} holds an empty or non-UTF-8 token")]
    MalformedToken { namespace: String, name: String },
    #[error("failed to read token secret {namespace}/{name}: {source}")]
    Api {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
}

impl CredentialError {
    /// API failures while reading the secret are retried; a missing or bad token is not
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Api { .. })
    }
}

/// Where the source access token comes from
pub enum Credentials {
    /// No token, unauthenticated requests
    Anonymous,
    /// Token fixed at startup
    Token(Zeroizing<String>),
    /// Token read from a Kubernetes secret on every use
    Secret {
        client: Client,
        namespace: String,
        name: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Token(_) => f.write_str("Token(<redacted>)"),
            Self::Secret {
                namespace, name, ..
            } => f
                .debug_struct("Secret")
                .field("namespace", namespace)
                .field("name", name)
                .finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    /// Pick the credential source from an environment token and the controller configuration
    #[must_use]
    pub fn resolve(env_token: Option<String>, config: &ControllerConfig, client: &Client) -> Self {
        if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
            debug!("Using source access token from environment");
            return Self::Token(Zeroizing::new(token.trim().to_string()));
        }
        match &config.github_token_secret_name {
            Some(name) => {
                debug!(
                    "Using source access token from secret {}/{}",
                    config.github_token_secret_namespace, name
                );
                Self::Secret {
                    client: client.clone(),
                    namespace: config.github_token_secret_namespace.clone(),
                    name: name.clone(),
                }
            }
            None => {
                debug!("No source access token configured, using anonymous access");
                Self::Anonymous
            }
        }
    }

    /// Current token, `None` for anonymous access
    ///
    /// # Errors
    ///
    /// Returns a `CredentialError` if the referenced secret is missing or malformed.
    pub async fn token(&self) -> Result<Option<Zeroizing<String>>, CredentialError> {
        match self {
            Self::Anonymous => Ok(None),
            Self::Token(token) => Ok(Some(token.clone())),
            Self::Secret {
                client,
                namespace,
                name,
            } => {
                let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
                let secret = secrets
                    .get_opt(name)
                    .await
                    .map_err(|source| CredentialError::Api {
                        namespace: namespace.clone(),
                        name: name.clone(),
                        source,
                    })?
                    .ok_or_else(|| CredentialError::SecretNotFound {
                        namespace: namespace.clone(),
                        name: name.clone(),
                    })?;
                token_from_secret(&secret, namespace, name).map(Some)
            }
        }
    }
}

/// Extract the token from the secret's `token` key
fn token_from_secret(
    secret: &Secret,
    namespace: &str,
    name: &str,
) -> Result<Zeroizing<String>, CredentialError> {
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(TOKEN_SECRET_KEY))
        .ok_or_else(|| CredentialError::MissingKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
            key: TOKEN_SECRET_KEY.to_string(),
        })?;
    let malformed = || CredentialError::MalformedToken {
        namespace: namespace.to_string(),
        name: name.to_string(),
    };
    let token = std::str::from_utf8(&bytes.0).map_err(|_e| malformed())?.trim();
    if token.is_empty() {
        return Err(malformed());
    }
    Ok(Zeroizing::new(token.to_string()))
}
