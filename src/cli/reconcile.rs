//! # Reconcile Command
//!
//! Requests an immediate pass by stamping the `requested-at` annotation.
//! The controller runs a pass whenever that value differs from
//! `status.lastHandledRequestedAt`.

use anyhow::{Context, Result};
use gitops_controller::constants::REQUESTED_AT_ANNOTATION;
use gitops_controller::controller::reconciler::status::timestamp;
use gitops_controller::crd::Application;
use kube::{api::Api, api::Patch, api::PatchParams, Client};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Trigger reconciliation by updating the request annotation
pub async fn reconcile_command(
    client: Client,
    name: String,
    namespace: Option<String>,
    wait: bool,
    timeout_secs: u64,
) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let api: Api<Application> = Api::namespaced(client, ns);

    println!("🔄 Triggering reconciliation for Application '{ns}/{name}'...");

    let app = api
        .get(&name)
        .await
        .with_context(|| format!("Failed to get Application '{ns}/{name}'"))?;

    if app.spec.sync_period.is_none() {
        println!("   ⚠️  Warning: syncPeriod is not set. The request will be rejected as a configuration error.");
    }

    let requested_at = timestamp(chrono::Utc::now());
    let patch = json!({
        "metadata": {
            "annotations": {
                (REQUESTED_AT_ANNOTATION): requested_at
            }
        }
    });

    api.patch(&name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to trigger reconciliation for Application '{ns}/{name}'"))?;

    println!("✅ Reconciliation requested");
    println!("   Annotation: {REQUESTED_AT_ANNOTATION}={requested_at}");

    if !wait {
        println!("\nThe controller will reconcile this Application shortly.");
        return Ok(());
    }

    println!("⏳ Waiting for the controller to handle the request...");
    let timeout = Duration::from_secs(timeout_secs);
    let start = Instant::now();
    loop {
        let app = api
            .get(&name)
            .await
            .with_context(|| format!("Failed to get Application '{ns}/{name}'"))?;
        let handled = app
            .status
            .as_ref()
            .and_then(|s| s.last_handled_requested_at.as_deref())
            == Some(requested_at.as_str());
        if handled {
            let sync_status = app
                .status
                .as_ref()
                .map(|s| format!("{:?}", s.sync.sync_status))
                .unwrap_or_default();
            println!("✅ Reconciled ({sync_status}) after {}s", start.elapsed().as_secs());
            return Ok(());
        }

        if start.elapsed() > timeout {
            return Err(anyhow::anyhow!(
                "Timeout waiting for Application '{ns}/{name}' to be reconciled. Check the controller logs."
            ));
        }
        sleep(Duration::from_secs(2)).await;
    }
}
