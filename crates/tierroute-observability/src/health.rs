//! Health endpoints
//!
//! This module provides HTTP health check endpoints:
//! - `/healthz` - Liveness probe (always returns 200 OK if server is running)
//! - `/readyz` - Readiness probe (checks that some route can serve traffic)
//! - `/metrics` - Prometheus metrics endpoint

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::TextEncoder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::metrics::Metrics;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Optional message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Readiness check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Service status
    pub status: String,
    /// Route statuses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<RouteStatus>>,
    /// Optional message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Route status in readiness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStatus {
    /// Route name
    pub route: String,
    /// `available` or `blocked`
    pub status: String,
    /// Failures accumulated towards the breaker threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<u32>,
    /// RFC 3339 time the route becomes eligible again
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<String>,
}

/// Readiness checker trait
pub trait ReadinessChecker: Send + Sync {
    /// Check if the service is ready
    fn is_ready(&self) -> bool;

    /// Get route statuses
    fn get_route_statuses(&self) -> Vec<RouteStatus>;
}

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    /// Metrics collector
    pub metrics: Arc<Metrics>,
    /// Optional readiness checker
    pub readiness_checker: Option<Arc<dyn ReadinessChecker>>,
}

impl HealthState {
    /// Create a new health state
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            readiness_checker: None,
        }
    }

    /// Create a new health state with readiness checker
    pub fn with_readiness_checker(
        metrics: Arc<Metrics>,
        readiness_checker: Arc<dyn ReadinessChecker>,
    ) -> Self {
        Self {
            metrics,
            readiness_checker: Some(readiness_checker),
        }
    }
}

/// Create health check router
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: None,
    })
}

/// Returns 503 Service Unavailable when no route can serve traffic
async fn readyz(State(state): State<HealthState>) -> Response {
    let (code, body) = match &state.readiness_checker {
        Some(checker) => readiness(checker.as_ref()),
        None => (
            StatusCode::OK,
            ReadinessResponse {
                status: "ready".to_string(),
                routes: None,
                message: None,
            },
        ),
    };
    (code, Json(body)).into_response()
}

/// `degraded` while any route is blocked but traffic can still be served
fn readiness(checker: &dyn ReadinessChecker) -> (StatusCode, ReadinessResponse) {
    let routes = checker.get_route_statuses();

    if !checker.is_ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            ReadinessResponse {
                status: "not_ready".to_string(),
                routes: Some(routes),
                message: Some("No route is able to serve connections".to_string()),
            },
        );
    }

    let blocked: Vec<&str> = routes
        .iter()
        .filter(|r| r.status == "blocked")
        .map(|r| r.route.as_str())
        .collect();
    let (status, message) = if blocked.is_empty() {
        ("ready", None)
    } else {
        (
            "degraded",
            Some(format!(
                "Blocked: {}; serving from fallback routes",
                blocked.join(", ")
            )),
        )
    };

    (
        StatusCode::OK,
        ReadinessResponse {
            status: status.to_string(),
            routes: Some(routes),
            message,
        },
    )
}

/// Returns metrics in Prometheus text format
async fn metrics_handler(State(state): State<HealthState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(body) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", err),
        )
            .into_response(),
    }
}
