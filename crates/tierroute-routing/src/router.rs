//! Connection router with primary breaker and single-hop fallback
//!
//! The Router resolves a request's route key to a registered provider and
//! hands back a connection. For fallback-eligible requests it protects the
//! primary with a [`BreakerState`]:
//! - retryable primary failures are counted and the request is retried once
//!   on the fallback routes
//! - once the failure threshold is reached the primary is skipped entirely
//!   until the block deadline passes
//! - requests for a fallback route never fail over any further
//!
//! Requests that disallow fallback talk to their exact route and never touch
//! breaker state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use tierroute_core::{ConnectError, ConnectionProvider, Error, Result, RouteContext, RouteKey};
use tierroute_observability::{BreakerState as BreakerGauge, Metrics, ReadinessChecker, RouteStatus};
use tracing::{debug, error, info, warn};

use crate::breaker::{BreakerState, FailureOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::FailoverConfig;

type SharedProvider<C> = Arc<dyn ConnectionProvider<Connection = C>>;

/// How a connection was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    /// Served by the requested route
    Direct,
    /// The requested route failed and a fallback route served the request
    Fallback,
    /// The breaker was open and the requested route was not attempted
    Degraded,
}

impl RouteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMode::Direct => "direct",
            RouteMode::Fallback => "fallback",
            RouteMode::Degraded => "degraded",
        }
    }
}

impl fmt::Display for RouteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connection together with where it came from
#[derive(Debug)]
pub struct Routed<C> {
    connection: C,
    requested: RouteKey,
    served_by: RouteKey,
    mode: RouteMode,
}

impl<C> Routed<C> {
    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    pub fn requested(&self) -> &RouteKey {
        &self.requested
    }

    pub fn served_by(&self) -> &RouteKey {
        &self.served_by
    }

    pub fn mode(&self) -> RouteMode {
        self.mode
    }

    pub fn into_inner(self) -> C {
        self.connection
    }
}

/// Router over a fixed set of connection providers
pub struct Router<C> {
    /// Providers by route; written only during setup
    routes: HashMap<RouteKey, SharedProvider<C>>,

    /// Ordered secondaries used for fallback
    fallback_routes: Vec<RouteKey>,

    breaker: BreakerState,

    clock: Arc<dyn Clock>,

    metrics: Option<Arc<Metrics>>,
}

impl<C: Send + 'static> Router<C> {
    /// Create a router with no routes registered
    pub fn new(config: FailoverConfig) -> Self {
        Self {
            routes: HashMap::new(),
            breaker: BreakerState::new(&config),
            fallback_routes: normalize_all(config.fallback_routes),
            clock: Arc::new(SystemClock),
            metrics: None,
        }
    }

    /// Create a router with default failover settings
    pub fn with_defaults() -> Self {
        Self::new(FailoverConfig::default())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register or replace the provider for a route, returning the previous one
    pub fn add_route<P>(&mut self, key: RouteKey, provider: P) -> Option<SharedProvider<C>>
    where
        P: ConnectionProvider<Connection = C> + 'static,
    {
        self.add_shared_route(key, Arc::new(provider))
    }

    pub fn add_shared_route(
        &mut self,
        key: RouteKey,
        provider: SharedProvider<C>,
    ) -> Option<SharedProvider<C>> {
        let key = key.normalized();
        debug!(route = %key, "Registering route");
        self.routes.insert(key, provider)
    }

    pub fn has_route(&self, key: &RouteKey) -> bool {
        self.routes.contains_key(&key.clone().normalized())
    }

    /// Registered routes in a stable order
    pub fn route_keys(&self) -> Vec<RouteKey> {
        let mut keys: Vec<RouteKey> = self.routes.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn fallback_routes(&self) -> &[RouteKey] {
        &self.fallback_routes
    }

    /// Replace the ordered list of fallback routes
    pub fn set_fallback_routes(&mut self, routes: Vec<RouteKey>) {
        self.fallback_routes = normalize_all(routes);
    }

    pub fn set_failure_threshold(&self, threshold: i32) {
        self.breaker.set_failure_threshold(threshold);
    }

    pub fn set_block_duration(&self, duration: Duration) {
        self.breaker.set_block_duration(duration);
    }

    /// Apply reloaded settings. This clears the failure count and any block.
    pub fn reconfigure(&self, config: &FailoverConfig) {
        if normalize_all(config.fallback_routes.clone()) != self.fallback_routes {
            warn!(
                configured = ?config.fallback_routes,
                active = ?self.fallback_routes,
                "Fallback routes cannot change at runtime, keeping the active list"
            );
        }
        self.breaker.reset(config);
        if let Some(metrics) = &self.metrics {
            metrics.update_breaker_state(RouteKey::Primary.as_str(), BreakerGauge::Closed);
            metrics.update_failure_count(RouteKey::Primary.as_str(), 0);
        }
        info!(
            failure_threshold = config.failure_threshold,
            block_duration_ms = config.block_duration_ms,
            "Failover settings reloaded, breaker reset"
        );
    }

    /// Check that the primary and at least one fallback route are registered
    pub fn validate(&self) -> Result<()> {
        if !self.has_route(&RouteKey::Primary) {
            return Err(Error::RouteNotConfigured(RouteKey::Primary));
        }

        if !self.fallback_routes.iter().any(|key| self.has_route(key)) {
            let missing = self
                .fallback_routes
                .first()
                .cloned()
                .unwrap_or(RouteKey::Replica);
            return Err(Error::RouteNotConfigured(missing));
        }

        Ok(())
    }

    /// Whether the primary is currently blocked by the breaker
    pub fn is_primary_blocked(&self) -> bool {
        self.breaker.is_open_at(self.clock.now_millis())
    }

    pub fn failure_count(&self) -> u32 {
        self.breaker.failure_count()
    }

    /// Block deadline, `None` if the breaker never opened
    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        match self.breaker.blocked_until() {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis as i64),
        }
    }

    pub fn breaker(&self) -> &BreakerState {
        &self.breaker
    }

    /// Obtain a connection for the request described by `ctx`
    pub async fn get_connection<X>(&self, ctx: &X) -> Result<Routed<C>>
    where
        X: RouteContext + ?Sized,
    {
        let route = ctx.route_key().normalized();
        let provider = self.provider(&route)?;

        if !ctx.fallback_allowed() {
            debug!(route = %route, "Fallback not allowed, connecting to the exact route");
            let connection = self.attempt(&route, provider).await?;
            return Ok(self.routed(connection, route.clone(), route, RouteMode::Direct));
        }

        if self.is_fallback_route(&route) {
            return match self.attempt(&route, provider).await {
                Ok(connection) => {
                    Ok(self.routed(connection, route.clone(), route, RouteMode::Direct))
                }
                Err(err) => {
                    error!(route = %route, error = %err, "Connection failed on fallback route, rethrowing");
                    Err(err.into())
                }
            };
        }

        let now = self.clock.now_millis();
        if self.breaker.is_open_at(now) {
            self.observe_breaker(BreakerGauge::Open);
            warn!(
                route = %route,
                "Primary is blocked after failures, getting connection from a fallback route"
            );
            return self.connect_degraded(route).await;
        }
        self.observe_breaker(BreakerGauge::Closed);

        debug!(route = %route, "Returning connection from the requested route");
        match self.attempt(&route, provider).await {
            Ok(connection) => Ok(self.routed(connection, route.clone(), route, RouteMode::Direct)),
            Err(err) if !err.is_retryable() => Err(err.into()),
            Err(err) => {
                // The block runs from when the failure was seen, not from when the attempt began
                self.record_primary_failure(&route, self.clock.now_millis());
                warn!(
                    route = %route,
                    error = %err,
                    "Caught connection failure, trying to get connection from a fallback route"
                );
                self.connect_fallback(route, err).await
            }
        }
    }

    fn provider(&self, route: &RouteKey) -> Result<&SharedProvider<C>> {
        self.routes
            .get(route)
            .ok_or_else(|| Error::RouteNotConfigured(route.clone()))
    }

    fn is_fallback_route(&self, route: &RouteKey) -> bool {
        self.fallback_routes.contains(route)
    }

    /// One `connect()` call with timing, failure metrics and route tagging
    async fn attempt(
        &self,
        route: &RouteKey,
        provider: &SharedProvider<C>,
    ) -> std::result::Result<C, ConnectError> {
        let started = Instant::now();
        let result = provider.connect().await;

        if let Some(metrics) = &self.metrics {
            metrics.record_connect_duration(route.as_str(), started.elapsed().as_secs_f64());
            if let Err(err) = &result {
                metrics.record_connect_failure(route.as_str(), err.kind().as_str());
            }
        }

        result.map_err(|err| err.for_route(route.clone()))
    }

    fn record_primary_failure(&self, route: &RouteKey, now: u64) {
        let outcome = self.breaker.record_failure(now);

        match outcome {
            FailureOutcome::Counted { failures } => {
                debug!(route = %route, failures, "Primary failure counted");
                if let Some(metrics) = &self.metrics {
                    metrics.update_failure_count(RouteKey::Primary.as_str(), failures);
                }
            }
            FailureOutcome::Opened { blocked_until } => {
                warn!(
                    route = %route,
                    blocked_until = %format_deadline(blocked_until),
                    "Primary is blocked until the deadline, connections will be taken from fallback routes"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_breaker_opened(RouteKey::Primary.as_str());
                    metrics.update_failure_count(RouteKey::Primary.as_str(), 0);
                }
            }
        }
    }

    /// Breaker is open: serve from the first fallback route that answers
    async fn connect_degraded(&self, requested: RouteKey) -> Result<Routed<C>> {
        let mut first_error: Option<ConnectError> = None;

        for fallback in self.registered_fallbacks() {
            self.record_fallback(&requested, fallback, "breaker_open");
            let provider = self.provider(fallback)?;

            match self.attempt(fallback, provider).await {
                Ok(connection) => {
                    return Ok(self.routed(
                        connection,
                        requested,
                        fallback.clone(),
                        RouteMode::Degraded,
                    ));
                }
                Err(err) => {
                    error!(route = %fallback, error = %err, "Caught connection failure on fallback route");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err.into()),
            None => Err(Error::RouteNotConfigured(
                self.fallback_routes
                    .first()
                    .cloned()
                    .unwrap_or(RouteKey::Replica),
            )),
        }
    }

    /// The requested route failed: try fallback routes, rethrow the original failure
    async fn connect_fallback(
        &self,
        requested: RouteKey,
        primary_error: ConnectError,
    ) -> Result<Routed<C>> {
        for fallback in self.registered_fallbacks() {
            self.record_fallback(&requested, fallback, "primary_failed");
            let provider = self.provider(fallback)?;

            match self.attempt(fallback, provider).await {
                Ok(connection) => {
                    return Ok(self.routed(
                        connection,
                        requested,
                        fallback.clone(),
                        RouteMode::Fallback,
                    ));
                }
                Err(err) => {
                    error!(
                        route = %fallback,
                        error = %err,
                        "Caught connection failure on fallback route, rethrowing the original failure"
                    );
                }
            }
        }

        Err(primary_error.into())
    }

    fn registered_fallbacks(&self) -> impl Iterator<Item = &RouteKey> {
        self.fallback_routes
            .iter()
            .filter(|key| self.routes.contains_key(*key))
    }

    fn record_fallback(&self, from: &RouteKey, to: &RouteKey, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_fallback(from.as_str(), to.as_str(), reason);
        }
    }

    fn observe_breaker(&self, state: BreakerGauge) {
        if let Some(metrics) = &self.metrics {
            metrics.update_breaker_state(RouteKey::Primary.as_str(), state);
        }
    }

    fn routed(
        &self,
        connection: C,
        requested: RouteKey,
        served_by: RouteKey,
        mode: RouteMode,
    ) -> Routed<C> {
        if let Some(metrics) = &self.metrics {
            metrics.record_connection(requested.as_str(), served_by.as_str(), mode.as_str());
        }
        Routed {
            connection,
            requested,
            served_by,
            mode,
        }
    }
}

impl<C: Send + 'static> ReadinessChecker for Router<C> {
    fn is_ready(&self) -> bool {
        let has_fallback = self.registered_fallbacks().next().is_some();
        let primary_usable = self.has_route(&RouteKey::Primary) && !self.is_primary_blocked();
        primary_usable || has_fallback
    }

    fn get_route_statuses(&self) -> Vec<RouteStatus> {
        let blocked = self.is_primary_blocked();

        self.route_keys()
            .into_iter()
            .map(|key| {
                if self.is_fallback_route(&key) {
                    RouteStatus {
                        route: key.to_string(),
                        status: "available".to_string(),
                        failure_count: None,
                        blocked_until: None,
                    }
                } else {
                    RouteStatus {
                        route: key.to_string(),
                        status: if blocked { "blocked" } else { "available" }.to_string(),
                        failure_count: Some(self.failure_count()),
                        blocked_until: self
                            .blocked_until()
                            .filter(|_| blocked)
                            .map(|deadline| deadline.to_rfc3339()),
                    }
                }
            })
            .collect()
    }
}

fn normalize_all(routes: Vec<RouteKey>) -> Vec<RouteKey> {
    routes.into_iter().map(RouteKey::normalized).collect()
}

fn format_deadline(millis: u64) -> String {
    DateTime::from_timestamp_millis(millis as i64)
        .map(|deadline| {
            deadline
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S%.3f")
                .to_string()
        })
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests;
