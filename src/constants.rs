//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of the `Application` custom resource
pub const API_GROUP: &str = "gitops.octopilot.io";

/// Cleanup marker (finalizer) attached to every active `Application`.
/// Guarantees managed resources are deleted before the record is purged.
pub const CLEANUP_MARKER: &str = "gitops.octopilot.io/cleanup";

/// Annotation holding the SHA-256 fingerprint of the last applied manifest body
pub const APPLIED_HASH_ANNOTATION: &str = "gitops.octopilot.io/applied-hash";

/// Annotation naming the owning `Application` (`namespace/name`) on applied objects
pub const APPLICATION_ANNOTATION: &str = "gitops.octopilot.io/application";

/// Annotation set by `gitopsctl reconcile` to request an immediate pass
pub const REQUESTED_AT_ANNOTATION: &str = "gitops.octopilot.io/requested-at";

/// Namespace applied to target resources that do not declare one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Field manager name used for patches against the Kubernetes API
pub const FIELD_MANAGER: &str = "gitops-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Smallest delay before retrying a failed pass (seconds).
/// Kept well below any `syncPeriod`, which is expressed in minutes.
pub const DEFAULT_RETRY_BACKOFF_MIN_SECS: u64 = 5;

/// Largest delay before retrying a failed pass (seconds)
pub const DEFAULT_RETRY_BACKOFF_MAX_SECS: u64 = 300;

/// Upper bound on a single reconciliation pass (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 300;

/// Default exponential backoff starting value for watch stream errors (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value for watch stream errors (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default maximum number of Applications reconciled at the same time
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Namespace the controller runs in when `POD_NAMESPACE` is not set
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "gitops-system";

/// GitHub REST API endpoint
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Key inside the credential secret that holds the repository access token
pub const TOKEN_SECRET_KEY: &str = "token";

/// File extensions picked up when a source path addresses a directory
pub const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Scheduled passes are considered due this many seconds early
pub const SCHEDULE_TOLERANCE_SECS: i64 = 2;
