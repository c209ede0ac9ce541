//! `tierroute serve`: health endpoints, background probing and hot reload

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tierroute_config_file::{FileConfigStore, TierrouteConfig};
use tierroute_core::RequestContext;
use tierroute_observability::{HealthState, Metrics, ReadinessChecker, health_router, init_logging};
use tierroute_routing::Router;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::wiring;

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let store = FileConfigStore::new(config_path).await?;
    let config = store.load()?;
    init_logging(&config.logging)?;

    let metrics = Arc::new(Metrics::new()?);
    let router = Arc::new(wiring::build_router(&config, Some(metrics.clone()))?);

    info!(
        failure_threshold = config.failover.failure_threshold,
        block_duration_ms = config.failover.block_duration_ms,
        routes = ?router.route_keys(),
        "TierRoute router ready"
    );

    tokio::spawn(probe_loop(router.clone(), config.health.probe_interval()));

    match store.watch_changes() {
        Ok(mut changes) => {
            let router = router.clone();
            let mut active = config.clone();
            tokio::spawn(async move {
                while let Some(reload) = changes.next().await {
                    let reset = apply_reload(&router, &mut active, &reload.config);
                    info!(
                        version = reload.version,
                        breaker_reset = reset,
                        "Configuration reloaded"
                    );
                }
            });
        }
        Err(e) => warn!("Hot reload disabled: {}", e),
    }

    if !config.health.enabled {
        info!("Health endpoints disabled");
        shutdown_signal().await;
        return Ok(());
    }

    let readiness: Arc<dyn ReadinessChecker> = router.clone();
    let app = health_router(HealthState::with_readiness_checker(metrics, readiness));

    let addr: SocketAddr = config.health.bind_address.parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("   Observability:");
    info!("   - Health check:       http://{}/healthz", addr);
    info!("   - Readiness check:    http://{}/readyz", addr);
    info!("   - Prometheus metrics: http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Apply a reloaded configuration to a running router.
///
/// Only a change to the failover settings reconfigures the router, since that
/// clears an open breaker. Returns whether the router was reconfigured.
fn apply_reload<C: Send + 'static>(
    router: &Router<C>,
    active: &mut TierrouteConfig,
    reloaded: &TierrouteConfig,
) -> bool {
    if reloaded.targets != active.targets {
        warn!("Target changes require a restart, applying failover settings only");
    }

    if reloaded.failover == active.failover {
        debug!("Failover settings unchanged, keeping breaker state");
        return false;
    }

    router.reconfigure(&reloaded.failover);
    active.failover = reloaded.failover.clone();
    true
}

/// Periodically request a primary connection so the breaker state stays current
async fn probe_loop(router: Arc<Router<TcpStream>>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    let ctx = RequestContext::primary();

    loop {
        ticker.tick().await;
        match router.get_connection(&ctx).await {
            Ok(routed) => debug!(
                served_by = %routed.served_by(),
                mode = %routed.mode(),
                "Probe succeeded"
            ),
            Err(e) => error!(error = %e, "Probe failed on every route"),
        }
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
