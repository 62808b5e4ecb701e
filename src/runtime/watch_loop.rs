//! # Watch Loop
//!
//! Controller watch loop that monitors `Application` resources and triggers
//! reconciliation when they change or their schedule comes due.

use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::Application;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{controller, watcher, Controller};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Run the controller watch loop
///
/// Watches `Application` resources and reconciles them with at most
/// `MAX_CONCURRENT_RECONCILIATIONS` passes in flight. Restarts the stream after
/// it ends, until a shutdown signal marks the server not ready and cancels the
/// reconciler's shutdown token.
///
/// # Errors
///
/// Currently never fails; the signature matches the other runtime entry points.
pub async fn run_watch_loop(
    applications: Api<Application>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let config = reconciler.config.clone();
    let backoff_duration_ms = Arc::new(AtomicU64::new(config.watch_backoff_start_ms));

    let shutdown_server_state = Arc::clone(&server_state);
    let shutdown_token = reconciler.shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");

        shutdown_server_state.set_ready(false);
        shutdown_token.cancel();
        info!("Marked server as not ready, cancelling in-flight reconciliations...");
    });

    loop {
        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff_clone = Arc::clone(&backoff_duration_ms);
        let backoff_start_ms = config.watch_backoff_start_ms;
        let max_backoff_ms = config.watch_backoff_max_ms;
        let restart_delay = config.watch_restart_delay_duration();
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        info!("Starting controller watch loop...");
        let controller_config =
            controller::Config::default().concurrency(config.max_concurrent_reconciliations);
        Controller::new(applications.clone(), watcher::Config::default().any_semantic())
            .with_config(controller_config)
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .filter_map(move |x| {
                let backoff = Arc::clone(&backoff_clone);
                async move {
                    match &x {
                        Ok((object, _)) => {
                            backoff.store(backoff_start_ms, std::sync::atomic::Ordering::Relaxed);
                            debug!(application = %object, "watch.event.success");
                            Some(x)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                max_backoff_ms,
                                restart_delay,
                            )
                            .await
                            .map(|()| x)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.ready() {
            info!("Controller stream ended after shutdown signal");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller stream ended unexpectedly, restarting in {}s...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
