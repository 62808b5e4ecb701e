//! # List Command

use anyhow::{Context, Result};
use gitops_controller::crd::Application;
use kube::{api::Api, Client};

/// List Applications in one namespace or all of them
pub async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<Application> = if let Some(ns) = &namespace {
        println!("Listing Applications in namespace '{ns}'...");
        Api::namespaced(client, ns)
    } else {
        println!("Listing Applications in all namespaces...");
        Api::all(client)
    };

    let applications = api
        .list(&kube::api::ListParams::default())
        .await
        .context("Failed to list Application resources")?;

    if applications.items.is_empty() {
        println!("No Application resources found.");
        return Ok(());
    }

    println!(
        "\n{:<30} {:<20} {:<12} {:<10} {:<22}",
        "NAME", "NAMESPACE", "STATUS", "RESOURCES", "SYNCED AT"
    );
    println!("{}", "-".repeat(96));

    for app in applications.items {
        let name = app.metadata.name.as_deref().unwrap_or("<unknown>");
        let ns = app.metadata.namespace.as_deref().unwrap_or("<unknown>");
        let (sync_status, resources, synced_at) = app.status.as_ref().map_or_else(
            || ("Unknown".to_string(), "-".to_string(), "-".to_string()),
            |s| {
                (
                    format!("{:?}", s.sync.sync_status),
                    s.resources.len().to_string(),
                    s.synced_at.clone().unwrap_or_else(|| "-".to_string()),
                )
            },
        );

        println!("{name:<30} {ns:<20} {sync_status:<12} {resources:<10} {synced_at:<22}");
    }

    Ok(())
}
