//! Connection provider abstraction
//!
//! A provider is an opaque factory for connections to one upstream tier. The
//! router only needs to know whether a `connect()` call succeeded and, when it
//! failed, whether the failure is something the failover policy should act on.
//! That decision is made once, here at the provider boundary, via
//! [`ConnectErrorKind`].

use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;

use crate::route::RouteKey;

/// Classification of a failed connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectErrorKind {
    /// The upstream could not be reached or refused the connection
    Establish,
    /// The connection pool in front of the upstream failed to initialise
    PoolInitialization,
    /// The upstream answered but the database protocol handshake failed
    Protocol,
    /// Caller-side defect; never counted against the upstream
    Application,
}

impl ConnectErrorKind {
    /// Whether this failure drives breaker accounting and fallback
    pub fn is_retryable(self) -> bool {
        !matches!(self, ConnectErrorKind::Application)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectErrorKind::Establish => "establish",
            ConnectErrorKind::PoolInitialization => "pool_initialization",
            ConnectErrorKind::Protocol => "protocol",
            ConnectErrorKind::Application => "application",
        }
    }
}

impl fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed `connect()` call
#[derive(Debug)]
pub struct ConnectError {
    kind: ConnectErrorKind,
    route: Option<RouteKey>,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ConnectError {
    pub fn new(kind: ConnectErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            route: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn establish(message: impl Into<String>) -> Self {
        Self::new(ConnectErrorKind::Establish, message)
    }

    pub fn pool_initialization(message: impl Into<String>) -> Self {
        Self::new(ConnectErrorKind::PoolInitialization, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ConnectErrorKind::Protocol, message)
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::new(ConnectErrorKind::Application, message)
    }

    /// Attach the route this failure was observed on. An already recorded
    /// route is kept.
    pub fn for_route(mut self, route: RouteKey) -> Self {
        if self.route.is_none() {
            self.route = Some(route);
        }
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ConnectErrorKind {
        self.kind
    }

    pub fn route(&self) -> Option<&RouteKey> {
        self.route.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.route {
            Some(route) => write!(
                f,
                "Connection error ({}) on route '{}': {}",
                self.kind, route, self.message
            ),
            None => write!(f, "Connection error ({}): {}", self.kind, self.message),
        }
    }
}

impl StdError for ConnectError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// Factory for connections to a single upstream tier
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    type Connection: Send;

    /// Establish a new connection
    async fn connect(&self) -> Result<Self::Connection, ConnectError>;
}
