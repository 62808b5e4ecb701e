//! # Lifecycle
//!
//! Pure transition logic. No store access happens here, so every branch is
//! testable from an `Application` value alone.
//!
//! | phase    | marker  | step          |
//! |----------|---------|---------------|
//! | Active   | Absent  | AttachMarker, then sync |
//! | Active   | Present | Sync          |
//! | Deleting | Present | Cleanup       |
//! | Deleting | Absent  | Terminal      |

use crate::constants::{CLEANUP_MARKER, REQUESTED_AT_ANNOTATION, SCHEDULE_TOLERANCE_SECS};
use crate::controller::reconciler::types::TriggerSource;
use crate::crd::Application;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Whether deletion of the Application has been requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Deleting,
}

impl Phase {
    #[must_use]
    pub fn of(app: &Application) -> Self {
        if app.metadata.deletion_timestamp.is_some() {
            Self::Deleting
        } else {
            Self::Active
        }
    }
}

/// Whether the cleanup marker is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMarker {
    Present,
    Absent,
}

impl CleanupMarker {
    #[must_use]
    pub fn of(app: &Application) -> Self {
        let attached = app
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|finalizers| finalizers.iter().any(|f| f == CLEANUP_MARKER));
        if attached {
            Self::Present
        } else {
            Self::Absent
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    /// Attach the marker and record `reconciledAt`, then sync
    AttachMarker,
    Sync,
    /// Delete every managed resource, then release the marker
    Cleanup,
    Terminal,
}

#[must_use]
pub const fn next_step(phase: Phase, marker: CleanupMarker) -> LifecycleStep {
    match (phase, marker) {
        (Phase::Active, CleanupMarker::Absent) => LifecycleStep::AttachMarker,
        (Phase::Active, CleanupMarker::Present) => LifecycleStep::Sync,
        (Phase::Deleting, CleanupMarker::Present) => LifecycleStep::Cleanup,
        (Phase::Deleting, CleanupMarker::Absent) => LifecycleStep::Terminal,
    }
}

/// Finalizer list with the marker added once
#[must_use]
pub fn with_marker(finalizers: &[String]) -> Vec<String> {
    let mut updated = finalizers.to_vec();
    if !updated.iter().any(|f| f == CLEANUP_MARKER) {
        updated.push(CLEANUP_MARKER.to_string());
    }
    updated
}

/// Finalizer list with every occurrence of the marker removed
#[must_use]
pub fn without_marker(finalizers: &[String]) -> Vec<String> {
    finalizers
        .iter()
        .filter(|f| *f != CLEANUP_MARKER)
        .cloned()
        .collect()
}

/// Outcome of the due check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    Now(TriggerSource),
    /// Nothing to do before this much time has passed
    Later(Duration),
}

/// Decide whether a pass should run now
///
/// Committing status produces a watch event of its own; this check keeps
/// such events from starting a pass before the schedule says so.
#[must_use]
pub fn due(app: &Application, now: DateTime<Utc>, retrying: bool) -> Due {
    if Phase::of(app) == Phase::Deleting {
        return Due::Now(TriggerSource::Deletion);
    }
    if CleanupMarker::of(app) == CleanupMarker::Absent {
        return Due::Now(TriggerSource::Initial);
    }
    if retrying {
        return Due::Now(TriggerSource::RetryAfterError);
    }
    let Some(status) = app.status.as_ref() else {
        return Due::Now(TriggerSource::SpecChange);
    };
    if status.observed_generation.is_none() || status.observed_generation != app.metadata.generation
    {
        return Due::Now(TriggerSource::SpecChange);
    }
    if let Some(requested_at) = requested_at(app) {
        if status.last_handled_requested_at.as_deref() != Some(requested_at) {
            return Due::Now(TriggerSource::ManualCli);
        }
    }
    let next_sync_at = status
        .next_sync_at
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));
    match next_sync_at {
        Some(next) => {
            let remaining = next - now;
            if remaining.num_seconds() <= SCHEDULE_TOLERANCE_SECS {
                Due::Now(TriggerSource::TimerBased)
            } else {
                Due::Later(remaining.to_std().unwrap_or(Duration::ZERO))
            }
        }
        None => Due::Now(TriggerSource::TimerBased),
    }
}

/// Value of the manual trigger annotation, if set
#[must_use]
pub fn requested_at(app: &Application) -> Option<&str> {
    app.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(REQUESTED_AT_ANNOTATION))
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}
