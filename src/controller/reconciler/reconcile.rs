//! # Reconcile
//!
//! Pass entrypoint invoked by the controller runtime, and the pass itself.

use crate::controller::manifest::{decode, ResourceRef};
use crate::controller::reconciler::apply::{apply_target, ApplyOperation};
use crate::controller::reconciler::cleanup::delete_managed;
use crate::controller::reconciler::lifecycle::{due, next_step, CleanupMarker, Due, LifecycleStep, Phase};
use crate::controller::reconciler::prune::{find_orphans, prune_orphans};
use crate::controller::reconciler::status::{build_status, timestamp};
use crate::controller::reconciler::types::{
    PassOutcome, Reconciler, ReconcilerError, SyncReport, TriggerSource,
};
use crate::controller::reconciler::cancellable;
use crate::crd::{Application, SyncStatusCode};
use crate::observability;
use chrono::Utc;
use kube_runtime::controller::Action;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Reconcile one Application
///
/// Runs a pass when one is due, under a child of the shutdown token that is
/// also cancelled after `RECONCILE_TIMEOUT_SECS`.
///
/// # Errors
///
/// Returns the pass error; `runtime::error_policy` turns it into a requeue decision.
pub async fn reconcile(
    app: Arc<Application>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let key = app.key();
    let span = info_span!(
        "reconcile",
        application.name = app.metadata.name.as_deref().unwrap_or("unknown"),
        application.namespace = app.metadata.namespace.as_deref().unwrap_or("default"),
    );

    async move {
        let trigger = match due(&app, Utc::now(), ctx.is_retrying(&key)) {
            Due::Now(trigger) => trigger,
            Due::Later(wait) => {
                debug!("Not due, next pass in {}s", wait.as_secs());
                observability::metrics::increment_requeues_total("not-due");
                return Ok(Action::requeue(wait));
            }
        };

        info!("Reconciling {} (trigger source: {})", key, trigger.as_str());
        observability::metrics::increment_reconciliations();
        let start = Instant::now();

        let pass_token = ctx.shutdown.child_token();
        let timeout = ctx.config.reconcile_timeout_duration();
        let result = tokio::select! {
            biased;
            result = run_pass(&app, &ctx, &pass_token) => result,
            () = tokio::time::sleep(timeout) => {
                pass_token.cancel();
                warn!("Pass for {} exceeded {}s, cancelled", key, timeout.as_secs());
                Err(ReconcilerError::Cancelled)
            }
        };
        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => Ok(finalize(&key, &ctx, trigger, outcome, start)),
            Err(e) => {
                observability::metrics::increment_reconciliation_errors(e.kind());
                error!("Reconciliation failed for {}: {}", key, e);
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

fn finalize(
    key: &str,
    ctx: &Reconciler,
    trigger: TriggerSource,
    outcome: PassOutcome,
    start: Instant,
) -> Action {
    let was_in_backoff = ctx.reset_backoff(key);
    if was_in_backoff {
        info!("Backoff reset for {}, returning to normal schedule", key);
    }

    match outcome {
        PassOutcome::Synced {
            report,
            requeue_after,
        } => {
            info!(
                "Reconciliation complete for {} (created {}, updated {}, unchanged {}, pruned {}, prune failures {}, duration: {:.2}s, trigger source: {})",
                key,
                report.created,
                report.updated,
                report.unchanged,
                report.pruned,
                report.prune_failures,
                start.elapsed().as_secs_f64(),
                trigger.as_str()
            );
            let next = Utc::now()
                + chrono::Duration::from_std(requeue_after).unwrap_or(chrono::Duration::zero());
            info!(
                "Next scheduled reconciliation: {} (in {}s, trigger source: timer-based)",
                timestamp(next),
                requeue_after.as_secs()
            );
            observability::metrics::increment_requeues_total("timer-based");
            Action::requeue(requeue_after)
        }
        PassOutcome::CleanedUp { deleted } => {
            info!(
                "Cleanup complete for {}: deleted {} managed resource(s), marker released",
                key, deleted
            );
            Action::await_change()
        }
        PassOutcome::Terminal => {
            debug!("{} is being deleted and holds no marker, nothing to do", key);
            Action::await_change()
        }
    }
}

/// Run one pass for `app`
///
/// No status is committed when this returns an error, and nothing is
/// committed once `cancel` fires.
///
/// # Errors
///
/// Any `ReconcilerError` except `Cleanup` aborts the pass before commit;
/// `Cleanup` is returned after every delete was attempted, with the marker kept.
pub async fn run_pass(
    app: &Application,
    ctx: &Reconciler,
    cancel: &CancellationToken,
) -> Result<PassOutcome, ReconcilerError> {
    match next_step(Phase::of(app), CleanupMarker::of(app)) {
        LifecycleStep::Terminal => Ok(PassOutcome::Terminal),
        LifecycleStep::Cleanup => {
            let resources = app.managed_resources();
            info!("Deleting {} managed resource(s) of {}", resources.len(), app.key());
            let deleted = delete_managed(ctx.store.as_ref(), resources, cancel).await?;
            cancellable(cancel, ctx.tracker.detach_marker(app)).await??;
            Ok(PassOutcome::CleanedUp { deleted })
        }
        LifecycleStep::AttachMarker => {
            let reconciled_at = timestamp(Utc::now());
            cancellable(cancel, ctx.tracker.attach_marker(app, &reconciled_at)).await??;
            info!("Attached cleanup marker to {}", app.key());
            sync(app, ctx, cancel).await
        }
        LifecycleStep::Sync => sync(app, ctx, cancel).await,
    }
}

/// Fetch, apply, prune, commit
async fn sync(
    app: &Application,
    ctx: &Reconciler,
    cancel: &CancellationToken,
) -> Result<PassOutcome, ReconcilerError> {
    let sync_period = app
        .spec
        .sync_period
        .filter(|minutes| *minutes > 0)
        .ok_or_else(|| ReconcilerError::Config("spec.syncPeriod is required".to_string()))?;

    let fetch_start = Instant::now();
    observability::metrics::increment_source_fetch_total();
    let fetched = cancellable(cancel, ctx.source.fetch(&app.spec.source)).await?;
    observability::metrics::observe_source_fetch_duration(fetch_start.elapsed().as_secs_f64());
    let files = fetched.inspect_err(|e| {
        observability::metrics::increment_source_fetch_errors_total();
        warn!("Failed to fetch manifests for {}: {}", app.key(), e);
    })?;

    let mut targets = Vec::new();
    for file in &files {
        let decoded = decode(&file.content).map_err(|source| ReconcilerError::Decode {
            path: file.path.clone(),
            source,
        })?;
        debug!("Decoded {} document(s) from {}", decoded.len(), file.path);
        targets.extend(decoded);
    }
    info!(
        "Fetched {} target resource(s) from {} file(s)",
        targets.len(),
        files.len()
    );

    let owner = app.key();
    let mut report = SyncReport::default();
    let mut applied = Vec::with_capacity(targets.len());
    let mut seen: HashSet<ResourceRef> = HashSet::new();
    for target in &targets {
        match apply_target(ctx.store.as_ref(), target, &owner, cancel).await? {
            ApplyOperation::Created => report.created += 1,
            ApplyOperation::Updated => report.updated += 1,
            ApplyOperation::Unchanged => report.unchanged += 1,
        }
        if seen.insert(target.reference.clone()) {
            applied.push(target.reference.to_managed(SyncStatusCode::Synced));
        } else {
            debug!(resource = %target.reference, "Duplicate target identity, recorded once");
        }
    }

    let orphans = find_orphans(app.managed_resources(), &applied);
    let pruned = prune_orphans(ctx.store.as_ref(), &orphans, cancel).await?;
    report.pruned = pruned.deleted;
    report.prune_failures = pruned.retained.len();

    let status = build_status(app, applied, pruned.retained, Utc::now(), sync_period);
    cancellable(cancel, ctx.tracker.commit(app, &status)).await??;

    Ok(PassOutcome::Synced {
        report,
        requeue_after: Duration::from_secs(u64::from(sync_period) * 60),
    })
}
