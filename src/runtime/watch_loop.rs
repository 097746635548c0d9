//! # Watch Loop
//!
//! Controller watch loop that monitors components and their children and
//! triggers reconciliation when changes are detected.

use crate::backend::KubeBackend;
use crate::controller::reconciler::{reconcile, ComponentReconciler, ControllerContext};
use crate::controller::server::ServerState;
use crate::runtime::child_triggers::child_triggers;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::Api;
use kube::core::{GroupVersionKind, NamespaceResourceScope};
use kube::Client;
use kube_runtime::{watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Run the controller watch loop for the component type of `R`.
///
/// Children of every kind in [`ComponentReconciler::child_kinds`] are listed
/// and watched through the context's backend so that a change to an owned
/// object re-delivers its component. The loop
/// restarts the controller stream when it ends and exits on SIGINT/SIGTERM,
/// cancelling every in-flight reconcile.
pub async fn run_watch_loop<R: ComponentReconciler>(
    client: Client,
    context: Arc<ControllerContext>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error>
where
    R::Component: kube::Resource<Scope = NamespaceResourceScope>,
{
    let config = Arc::clone(&context.config);
    let backoff_duration_ms = Arc::new(AtomicU64::new(config.backoff_start_ms));

    let children = resolve_child_kinds::<R>(&client).await?;

    let shutdown_state = Arc::clone(&server_state);
    let shutdown_token = context.shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_state.set_ready(false);
        shutdown_token.cancel();
        info!("Marked server as not ready, cancelling in-flight reconciliations");
    });

    loop {
        if context.shutdown.is_cancelled() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        let components: Api<R::Component> = match config.watch_namespace.as_deref() {
            Some(namespace) => Api::namespaced(client.clone(), namespace),
            None => Api::all(client.clone()),
        };

        let triggers = match child_triggers::<R::Component>(
            Arc::clone(&context.backend),
            &children,
            config.watch_namespace.as_deref(),
        )
        .await
        {
            Ok(triggers) => triggers,
            Err(e) => {
                let delay = config.watch_restart_delay_duration();
                warn!(parent: &watch_span, error = %e, "Unable to watch child kinds, retrying in {} seconds...", delay.as_secs());
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        let controller = Controller::new(components, watcher::Config::default().any_semantic())
            .reconcile_on(triggers);

        info!(parent: &watch_span, "Starting controller watch loop...");
        let backoff = Arc::clone(&backoff_duration_ms);
        let filter_config = Arc::clone(&config);
        controller
            .graceful_shutdown_on(context.shutdown.clone().cancelled_owned())
            .run(
                reconcile::<R>,
                handle_reconciliation_error::<R::Component>,
                Arc::clone(&context),
            )
            .filter_map(move |x| {
                let backoff = Arc::clone(&backoff);
                let config = Arc::clone(&filter_config);
                async move {
                    match &x {
                        Ok((object, action)) => {
                            backoff.store(config.backoff_start_ms, Ordering::Relaxed);
                            debug!(resource = %object.name, action = ?action, "watch.event.reconciled");
                            Some(x)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                config.backoff_max_ms,
                                config.watch_restart_delay_duration(),
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

        if context.shutdown.is_cancelled() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolve every child kind through discovery so a missing CRD fails startup
async fn resolve_child_kinds<R: ComponentReconciler>(
    client: &Client,
) -> Result<Vec<GroupVersionKind>, anyhow::Error> {
    let discovery = KubeBackend::new(client.clone());
    let kinds = R::child_kinds();
    for gvk in &kinds {
        let (resource, _) = discovery.resolve(gvk).await?;
        debug!(kind = %gvk.kind, plural = %resource.plural, "resolved child kind");
    }
    Ok(kinds)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!("Unable to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            () = terminate => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
