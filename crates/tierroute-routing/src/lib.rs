//! TierRoute Routing Engine
//!
//! This crate provides the connection routing logic for TierRoute:
//! - Route registry mapping route keys to connection providers
//! - Time-windowed breaker guarding the primary
//! - Primary → fallback failover with a single hop
//! - A TCP connection provider

pub mod breaker;
pub mod clock;
pub mod config;
pub mod router;
pub mod tcp;

// Re-export commonly used types
pub use breaker::{BreakerState, FailureOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::FailoverConfig;
pub use router::{RouteMode, Routed, Router};
pub use tcp::{DEFAULT_CONNECT_TIMEOUT, TcpProvider};
