//! # GitOps Controller
//!
//! A Kubernetes controller that continuously converges cluster resources toward
//! the manifests stored in a repository.
//!
//! ## Overview
//!
//! For every `Application` resource the controller:
//!
//! 1. **Fetches manifests** from the GitHub contents API or a local `file://` checkout
//! 2. **Applies** every decoded resource, skipping those whose applied hash is unchanged
//! 3. **Prunes** resources that disappeared from the source since the last pass
//! 4. **Records** the managed resources and sync status on the Application
//! 5. **Cleans up** everything it manages when the Application is deleted
//!
//! ## Usage
//!
//! See the [README.md](../README.md) for configuration and deployment.

use anyhow::Result;
use gitops_controller::runtime::{initialize, run_watch_loop};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop(init.applications, init.reconciler, init.server_state).await?;

    info!("Controller stopped");
    Ok(())
}
