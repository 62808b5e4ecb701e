//! # Status Command
//!
//! Command to show detailed status of an Application.

use anyhow::{Context, Result};
use gitops_controller::crd::Application;
use kube::{api::Api, Client};

/// Show detailed status of an Application
pub async fn status_command(client: Client, name: String, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");

    println!("📊 Status for Application '{ns}/{name}'");
    println!();

    let api: Api<Application> = Api::namespaced(client, ns);

    let app = api
        .get(&name)
        .await
        .with_context(|| format!("Failed to get Application '{ns}/{name}'"))?;

    println!("Spec:");
    println!("  Repository: {}", app.spec.source.repo_url);
    println!("  Path: {}", app.spec.source.path);
    println!(
        "  Target Revision: {}",
        app.spec.source.revision().unwrap_or("HEAD")
    );
    match app.spec.sync_period {
        Some(minutes) => println!("  Sync Period: {minutes}m"),
        None => println!("  Sync Period: <unset> (Application will not be scheduled)"),
    }

    if app.metadata.deletion_timestamp.is_some() {
        println!();
        println!("⚠️  Application is being deleted");
    }

    let Some(status) = &app.status else {
        println!();
        println!("Status: No status available (resource may not have been reconciled yet)");
        return Ok(());
    };

    println!();
    println!("Status:");
    println!("  Sync Status: {:?}", status.sync.sync_status);
    if let Some(reconciled_at) = &status.reconciled_at {
        println!("  Reconciled At: {reconciled_at}");
    }
    if let Some(synced_at) = &status.synced_at {
        println!("  Synced At: {synced_at}");
    }
    if let Some(next_sync_at) = &status.next_sync_at {
        println!("  Next Sync At: {next_sync_at}");
    }
    if let Some(observed_generation) = status.observed_generation {
        println!("  Observed Generation: {observed_generation}");
    }

    if !status.resources.is_empty() {
        println!();
        println!("Managed Resources:");
        for resource in &status.resources {
            let api_version = if resource.group.is_empty() {
                resource.version.clone()
            } else {
                format!("{}/{}", resource.group, resource.version)
            };
            println!(
                "  {:<10} {}/{} {}/{}",
                format!("{:?}", resource.status),
                api_version,
                resource.kind,
                resource.namespace,
                resource.name
            );
        }
    }

    Ok(())
}
