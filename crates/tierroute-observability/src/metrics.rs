//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for TierRoute:
//! - Connections handed out, by requested route, serving route and mode
//! - Connection failures by route and failure kind
//! - Fallback trigger counts
//! - Breaker state, failure count and opening events
//! - Connection acquisition latency

use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for TierRoute
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Connections returned to callers
    pub connections_total: CounterVec,
    /// Failed connection attempts
    pub connect_failures_total: CounterVec,
    /// Fallback trigger count
    pub fallback_triggered: CounterVec,

    /// Breaker state (0=closed, 1=open)
    pub breaker_state: GaugeVec,
    /// Number of times the breaker opened
    pub breaker_opened_total: CounterVec,
    /// Accumulated failures towards the threshold
    pub failure_count: GaugeVec,

    /// Time spent obtaining a connection from a provider
    pub connect_duration_seconds: HistogramVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let connections_total = CounterVec::new(
            Opts::new(
                "tierroute_connections_total",
                "Total number of connections returned to callers",
            ),
            &["route", "served_by", "mode"],
        )?;

        let connect_failures_total = CounterVec::new(
            Opts::new(
                "tierroute_connect_failures_total",
                "Total number of failed connection attempts",
            ),
            &["route", "kind"],
        )?;

        let fallback_triggered = CounterVec::new(
            Opts::new(
                "tierroute_fallback_triggered_total",
                "Number of times fallback was triggered",
            ),
            &["from_route", "to_route", "reason"],
        )?;

        let breaker_state = GaugeVec::new(
            Opts::new("tierroute_breaker_state", "Breaker state (0=closed, 1=open)"),
            &["route"],
        )?;

        let breaker_opened_total = CounterVec::new(
            Opts::new(
                "tierroute_breaker_opened_total",
                "Number of times the breaker opened",
            ),
            &["route"],
        )?;

        let failure_count = GaugeVec::new(
            Opts::new(
                "tierroute_failure_count",
                "Failures accumulated towards the breaker threshold",
            ),
            &["route"],
        )?;

        let connect_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "tierroute_connect_duration_seconds",
                "Connection acquisition duration in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["route"],
        )?;

        registry.register(Box::new(connections_total.clone()))?;
        registry.register(Box::new(connect_failures_total.clone()))?;
        registry.register(Box::new(fallback_triggered.clone()))?;
        registry.register(Box::new(breaker_state.clone()))?;
        registry.register(Box::new(breaker_opened_total.clone()))?;
        registry.register(Box::new(failure_count.clone()))?;
        registry.register(Box::new(connect_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connections_total,
            connect_failures_total,
            fallback_triggered,
            breaker_state,
            breaker_opened_total,
            failure_count,
            connect_duration_seconds,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a connection handed to a caller
    pub fn record_connection(&self, route: &str, served_by: &str, mode: &str) {
        self.connections_total
            .with_label_values(&[route, served_by, mode])
            .inc();
    }

    /// Record a failed connection attempt
    pub fn record_connect_failure(&self, route: &str, kind: &str) {
        self.connect_failures_total
            .with_label_values(&[route, kind])
            .inc();
    }

    /// Record fallback trigger
    pub fn record_fallback(&self, from_route: &str, to_route: &str, reason: &str) {
        self.fallback_triggered
            .with_label_values(&[from_route, to_route, reason])
            .inc();
    }

    /// Update breaker state
    pub fn update_breaker_state(&self, route: &str, state: BreakerState) {
        self.breaker_state
            .with_label_values(&[route])
            .set(state as i64 as f64);
    }

    /// Record the breaker opening
    pub fn record_breaker_opened(&self, route: &str) {
        self.breaker_opened_total.with_label_values(&[route]).inc();
        self.update_breaker_state(route, BreakerState::Open);
    }

    pub fn update_failure_count(&self, route: &str, count: u32) {
        self.failure_count
            .with_label_values(&[route])
            .set(count as f64);
    }

    /// Record connection acquisition latency
    pub fn record_connect_duration(&self, route: &str, duration_secs: f64) {
        self.connect_duration_seconds
            .with_label_values(&[route])
            .observe(duration_secs);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Breaker state for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakerState {
    Closed = 0,
    Open = 1,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
        }
    }
}
