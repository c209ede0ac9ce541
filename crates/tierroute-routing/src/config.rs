//! Failover configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tierroute_core::RouteKey;

/// Breaker and fallback settings for a [`Router`](crate::Router)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Failures that open the breaker. Zero or negative disables it.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: i32,

    /// How long the primary stays blocked once the breaker opens
    #[serde(default = "default_block_duration_ms")]
    pub block_duration_ms: u64,

    /// Ordered secondary routes tried when the primary is failed or blocked
    #[serde(default = "default_fallback_routes")]
    pub fallback_routes: Vec<RouteKey>,
}

fn default_failure_threshold() -> i32 {
    3
}

fn default_block_duration_ms() -> u64 {
    120_000
}

fn default_fallback_routes() -> Vec<RouteKey> {
    vec![RouteKey::Replica]
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            block_duration_ms: default_block_duration_ms(),
            fallback_routes: default_fallback_routes(),
        }
    }
}

impl FailoverConfig {
    pub fn block_duration(&self) -> Duration {
        Duration::from_millis(self.block_duration_ms)
    }

    pub fn breaker_enabled(&self) -> bool {
        self.failure_threshold > 0
    }

    /// Semantic checks, returning every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.fallback_routes.is_empty() {
            errors.push("failover.fallback_routes must name at least one route".to_string());
        }

        if self.fallback_routes.contains(&RouteKey::Primary) {
            errors.push("failover.fallback_routes must not contain the primary route".to_string());
        }

        for (i, route) in self.fallback_routes.iter().enumerate() {
            if self.fallback_routes[..i].contains(route) {
                errors.push(format!("failover.fallback_routes lists '{}' twice", route));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
