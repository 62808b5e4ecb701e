//! # gitopsctl
//!
//! Command-line interface for the GitOps controller.
//!
//! ## Usage
//!
//! ```bash
//! # List Applications in all namespaces
//! gitopsctl list application
//!
//! # Show status of an Application
//! gitopsctl status application foo --namespace default
//!
//! # Request an immediate reconciliation pass
//! gitopsctl reconcile gapp foo
//!
//! # Request a pass and wait until the controller handled it
//! gitopsctl reconcile gapp foo --wait
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kube::Client;

mod list;
mod reconcile;
mod status;

/// GitOps controller CLI
#[derive(Parser)]
#[command(name = "gitopsctl")]
#[command(
    about = "GitOps controller CLI",
    long_about = None,
    after_help = "\
Available resource types:
  application (or 'gapp') - Application resource

Examples:
  gitopsctl list application
  gitopsctl reconcile gapp foo
  gitopsctl status application foo --namespace default
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to `default`, or all namespaces for `list`)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Request an immediate reconciliation pass for an Application
    Reconcile {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: ResourceType,

        /// Name of the Application
        #[arg(value_name = "NAME")]
        name: String,

        /// Wait until the controller reports the request as handled
        #[arg(long)]
        wait: bool,

        /// Seconds to wait with `--wait`
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
    /// List Applications
    List {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: Option<ResourceType>,
    },
    /// Show status of an Application
    Status {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: ResourceType,

        /// Name of the Application
        #[arg(value_name = "NAME")]
        name: String,
    },
}

/// Resource types supported by gitopsctl
#[derive(Clone, ValueEnum)]
enum ResourceType {
    /// Application resource (short form: 'gapp')
    #[value(name = "application", alias = "gapp", alias = "app")]
    Application,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gitopsctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::Reconcile {
            resource_type: ResourceType::Application,
            name,
            wait,
            timeout,
        } => reconcile::reconcile_command(client, name, cli.namespace, wait, timeout).await,
        Commands::List { resource_type } => {
            resource_type.ok_or_else(|| {
                anyhow::anyhow!(
                    "Resource type is required.\n\n\
                    Available resource types:\n\
                      application (or 'gapp') - Application resource\n\n\
                    Example: gitopsctl list application"
                )
            })?;
            list::list_command(client, cli.namespace).await
        }
        Commands::Status {
            resource_type: ResourceType::Application,
            name,
        } => status::status_command(client, name, cli.namespace).await,
    }
}
