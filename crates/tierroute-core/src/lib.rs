//! TierRoute Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout TierRoute:
//! - Route keys and the per-request routing context
//! - Connection provider abstraction with a tagged failure taxonomy
//! - Object storage capability
//! - Core error types

pub mod connection;
pub mod error;
pub mod object_store;
pub mod route;

pub use connection::{ConnectError, ConnectErrorKind, ConnectionProvider};
pub use error::{Error, Result};
pub use route::{RequestContext, RouteContext, RouteKey};
