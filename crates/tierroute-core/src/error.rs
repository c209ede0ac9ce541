//! Error types for TierRoute Core

use thiserror::Error;

use crate::{connection::ConnectError, route::RouteKey};

#[derive(Debug, Error)]
pub enum Error {
    /// No provider is registered for the requested route. This is a setup
    /// defect and is never retried.
    #[error(
        "Route {0} is not available, please make sure the router configuration is correct"
    )]
    RouteNotConfigured(RouteKey),

    #[error(transparent)]
    Connection(#[from] ConnectError),

    #[error("Invalid route key: {0}")]
    InvalidRoute(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration not found")]
    ConfigNotFound,

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The underlying connection failure, if this error is one
    pub fn as_connect_error(&self) -> Option<&ConnectError> {
        match self {
            Error::Connection(err) => Some(err),
            _ => None,
        }
    }

    /// True for errors caused by wiring or configuration rather than by an upstream
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::RouteNotConfigured(_)
                | Error::InvalidRoute(_)
                | Error::Config(_)
                | Error::ConfigNotFound
                | Error::ConfigValidation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
