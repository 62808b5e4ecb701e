//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Port for the metrics and probe HTTP server
    pub metrics_port: u16,
    /// Lower bound of the retry delay after a recoverable failure (seconds)
    pub retry_backoff_min_secs: u64,
    /// Upper bound of the retry delay after a recoverable failure (seconds)
    pub retry_backoff_max_secs: u64,
    /// Maximum wall time of one reconciliation pass (seconds)
    /// The pass is cancelled, without committing status, when it runs longer
    pub reconcile_timeout_secs: u64,
    /// Maximum concurrent reconciliations
    /// Limits how many Applications can be reconciled simultaneously
    pub max_concurrent_reconciliations: u16,
    /// Namespace to watch for Applications, `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Watch stream backoff starting value (milliseconds)
    pub watch_backoff_start_ms: u64,
    /// Watch stream backoff maximum value (milliseconds)
    pub watch_backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after the stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Namespace where the controller is deployed
    pub controller_namespace: String,
    /// Base URL of the GitHub REST API
    pub github_api_url: String,
    /// Name of the secret holding the source access token under the `token` key
    pub github_token_secret_name: Option<String>,
    /// Namespace of the token secret (defaults to the controller namespace)
    pub github_token_secret_namespace: String,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable color in text format logs
    pub log_enable_color: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            retry_backoff_min_secs: DEFAULT_RETRY_BACKOFF_MIN_SECS,
            retry_backoff_max_secs: DEFAULT_RETRY_BACKOFF_MAX_SECS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            watch_namespace: None,
            watch_backoff_start_ms: DEFAULT_WATCH_BACKOFF_START_MS,
            watch_backoff_max_ms: DEFAULT_WATCH_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            github_token_secret_name: None,
            github_token_secret_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            log_enable_color: false,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;
        let controller_namespace =
            var_or_default_str(&lookup, "POD_NAMESPACE", DEFAULT_CONTROLLER_NAMESPACE);
        let retry_backoff_min_secs = var_or_default(
            &lookup,
            "RETRY_BACKOFF_MIN_SECS",
            DEFAULT_RETRY_BACKOFF_MIN_SECS,
        )
        .max(1);
        Self {
            metrics_port: var_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            retry_backoff_min_secs,
            retry_backoff_max_secs: var_or_default(
                &lookup,
                "RETRY_BACKOFF_MAX_SECS",
                DEFAULT_RETRY_BACKOFF_MAX_SECS,
            )
            .max(retry_backoff_min_secs),
            reconcile_timeout_secs: var_or_default(
                &lookup,
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            max_concurrent_reconciliations: var_or_default(
                &lookup,
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            watch_namespace: var_non_empty(&lookup, "WATCH_NAMESPACE"),
            watch_backoff_start_ms: var_or_default(
                &lookup,
                "WATCH_BACKOFF_START_MS",
                DEFAULT_WATCH_BACKOFF_START_MS,
            ),
            watch_backoff_max_ms: var_or_default(
                &lookup,
                "WATCH_BACKOFF_MAX_MS",
                DEFAULT_WATCH_BACKOFF_MAX_MS,
            ),
            watch_restart_delay_secs: var_or_default(
                &lookup,
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: var_or_default(
                &lookup,
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            github_api_url: var_or_default_str(&lookup, "GITHUB_API_URL", DEFAULT_GITHUB_API_URL),
            github_token_secret_name: var_non_empty(&lookup, "GITHUB_TOKEN_SECRET_NAME"),
            github_token_secret_namespace: var_non_empty(&lookup, "GITHUB_TOKEN_SECRET_NAMESPACE")
                .unwrap_or_else(|| controller_namespace.clone()),
            controller_namespace,
            log_level: var_or_default_str(&lookup, "LOG_LEVEL", "INFO"),
            log_format: var_or_default_str(&lookup, "LOG_FORMAT", "json"),
            log_enable_color: var_or_default_bool(&lookup, "LOG_ENABLE_COLOR", false),
        }
    }

    /// Get reconcile timeout duration
    #[must_use]
    pub fn reconcile_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    #[must_use]
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Get watch backoff start duration
    #[must_use]
    pub fn watch_backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.watch_backoff_start_ms)
    }

    /// Get watch backoff max duration
    #[must_use]
    pub fn watch_backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.watch_backoff_max_ms)
    }
}

/// Read variable or return default value
fn var_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read variable as boolean or return default
fn var_or_default_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(default, |v| {
        let v_lower = v.to_lowercase();
        v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
    })
}

/// Read variable as string or return default
fn var_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Read variable, treating an empty value as unset
fn var_non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}
