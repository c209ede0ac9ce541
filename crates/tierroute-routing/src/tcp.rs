//! TCP connection provider
//!
//! Opens a plain TCP stream to a fixed upstream address. Used by the CLI to
//! probe configured targets and usable as a provider in its own right.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tierroute_core::{ConnectError, ConnectionProvider};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Provider that connects to `address` over TCP
#[derive(Debug, Clone)]
pub struct TcpProvider {
    address: String,
    connect_timeout: Duration,
}

impl TcpProvider {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

#[async_trait]
impl ConnectionProvider for TcpProvider {
    type Connection = TcpStream;

    #[instrument(skip(self), fields(address = %self.address))]
    async fn connect(&self) -> Result<TcpStream, ConnectError> {
        let attempt = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address));

        match attempt.await {
            Ok(Ok(stream)) => {
                debug!("TCP connection established");
                Ok(stream)
            }
            Ok(Err(err)) => Err(map_io_error(&self.address, err)),
            Err(_) => Err(ConnectError::establish(format!(
                "timed out after {}ms connecting to {}",
                self.connect_timeout.as_millis(),
                self.address
            ))),
        }
    }
}

fn map_io_error(address: &str, err: io::Error) -> ConnectError {
    let message = format!("failed to connect to {}: {}", address, err);
    match err.kind() {
        // Malformed address, the upstream is not at fault
        io::ErrorKind::InvalidInput => ConnectError::application(message).with_source(err),
        _ => ConnectError::establish(message).with_source(err),
    }
}
