//! Serve mode: runs the prober loop and the REST API in one process.
//!
//! Startup:
//! 1. Resolve settings from the loaded config
//! 2. Create the prober and add seed targets (each probed once)
//! 3. Start the background check loop
//! 4. Serve the REST API until Ctrl-C or SIGTERM
//!
//! Shutdown stops the API, signals the prober loop, and waits for it to
//! settle its in-flight cycle per the configured policy.

use std::net::SocketAddr;

use tokio::sync::watch;
use tracing::{error, info, warn};

use keepup_core::KeepupConfig;
use keepup_health::Prober;

pub async fn run_serve(config: KeepupConfig, port_override: Option<u16>) -> anyhow::Result<()> {
    info!("keepup daemon starting");

    let prober_settings = config.prober_settings()?;
    let shutdown_policy = config.shutdown_policy()?;
    let mut server_settings = config.server_settings();
    if let Some(port) = port_override {
        server_settings.port = port;
    }

    // ── Prober ─────────────────────────────────────────────────

    let prober = Prober::new(prober_settings)?;
    info!(
        interval_ms = prober.settings().interval.as_millis() as u64,
        timeout_ms = prober.settings().timeout.as_millis() as u64,
        history_capacity = prober.settings().history_capacity,
        ?shutdown_policy,
        "prober initialized"
    );

    for seed in &config.targets {
        match prober.add_target(&seed.url).await {
            Ok(target) => info!(target_id = target.id, url = %target.url, "seed target added"),
            Err(e) => warn!(url = %seed.url, error = %e, "skipping invalid seed target"),
        }
    }

    // ── Background loop ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let prober_handle = prober.spawn(shutdown_rx, shutdown_policy);

    // ── API server ─────────────────────────────────────────────

    let router = keepup_api::build_router(prober, &server_settings);
    let addr = SocketAddr::from(([0, 0, 0, 0], server_settings.port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Err(e) = prober_handle.await {
        error!(error = %e, "prober loop ended abnormally");
    }

    info!("keepup daemon stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
