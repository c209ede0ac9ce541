//! Builds a router from the configuration file

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tierroute_config_file::TierrouteConfig;
use tierroute_observability::Metrics;
use tierroute_routing::{Router, TcpProvider};
use tokio::net::TcpStream;
use tracing::debug;

/// Load, apply `TIERROUTE_*` overrides and validate
pub fn load_config(path: &Path) -> anyhow::Result<TierrouteConfig> {
    let mut config = TierrouteConfig::from_file(path)
        .with_context(|| format!("failed to load configuration from {:?}", path))?;
    config.merge_env();
    Ok(config.validated()?)
}

/// One TCP provider per configured target
pub fn build_router(
    config: &TierrouteConfig,
    metrics: Option<Arc<Metrics>>,
) -> anyhow::Result<Router<TcpStream>> {
    let mut router = Router::new(config.failover.clone());
    if let Some(metrics) = metrics {
        router = router.with_metrics(metrics);
    }

    for (route, target) in &config.targets {
        debug!(route = %route, address = %target.address, "Adding TCP target");
        router.add_route(
            route.clone(),
            TcpProvider::new(target.address.clone()).with_connect_timeout(target.connect_timeout()),
        );
    }

    router.validate()?;
    Ok(router)
}
