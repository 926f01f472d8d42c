//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use jsonrpc_link::{Client, TransportKind};
//!
//! # fn example() -> jsonrpc_link::Result<()> {
//! let client = Client::builder()
//!     .host("localhost")
//!     .port(8080)
//!     .transport(TransportKind::WebSocket)
//!     .path("/rpc")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportKind};

use super::config::ClientConfig;
use super::core::Client;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Default)]
pub struct ClientBuilder {
    host: Option<String>,
    port: Option<u16>,
    kind: Option<TransportKind>,
    path: Option<String>,
    retry_delay: Option<Duration>,
    connect_timeout: Option<Duration>,
    call_timeout: Option<Duration>,
    disconnect_when_empty: bool,
    /// Caller-supplied transport, replacing the network one.
    transport: Option<Transport>,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the server port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the transport kind.
    #[inline]
    #[must_use]
    pub fn transport(mut self, kind: TransportKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Sets the URL path for HTTP and WebSocket endpoints.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the fixed reconnect delay.
    #[inline]
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Sets the socket connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the per-call timeout for persistent transports.
    #[inline]
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Drops the connection whenever the last caller deregisters.
    #[inline]
    #[must_use]
    pub fn disconnect_when_empty(mut self, enabled: bool) -> Self {
        self.disconnect_when_empty = enabled;
        self
    }

    /// Uses `transport` instead of opening network connections.
    ///
    /// The transport kind is taken from `transport` unless set explicitly.
    #[must_use]
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Assembles the configuration without starting a client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if host, port or transport is missing, or
    /// if the assembled configuration is invalid.
    pub fn config(&self) -> Result<ClientConfig> {
        let host = self.host.clone().ok_or_else(|| {
            Error::config(
                "host is required. Use .host() to set it.\n\
                 Example: Client::builder().host(\"localhost\")",
            )
        })?;
        let port = self
            .port
            .ok_or_else(|| Error::config("port is required. Use .port() to set it."))?;
        let kind = self
            .kind
            .or_else(|| self.transport.as_ref().map(Transport::kind))
            .ok_or_else(|| Error::config("transport is required. Use .transport() to set it."))?;

        let mut config = ClientConfig::new(host, port, kind);
        if let Some(path) = &self.path {
            config = config.with_path(path.as_str());
        }
        if let Some(delay) = self.retry_delay {
            config.retry_delay = delay;
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = timeout;
        }
        if let Some(timeout) = self.call_timeout {
            config.call_timeout = timeout;
        }
        config.disconnect_when_empty = self.disconnect_when_empty;

        config.validate()?;
        Ok(config)
    }

    /// Builds and starts the client.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if required settings are missing or invalid
    /// - [`Error::Config`] if a supplied transport does not match the kind
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn build(self) -> Result<Client> {
        let config = self.config()?;

        match self.transport {
            Some(transport) => Client::with_transport(config, transport),
            None => Client::new(config),
        }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("disconnect_when_empty", &self.disconnect_when_empty)
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::client::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RETRY_DELAY};
    use crate::transport::OneShot;

    struct Echo;

    #[async_trait]
    impl OneShot for Echo {
        async fn call(&self, _method: &str, params: Vec<Value>) -> Result<Value> {
            Ok(Value::Array(params))
        }
    }

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = ClientBuilder::new();
        assert!(builder.host.is_none());
        assert!(builder.port.is_none());
        assert!(builder.kind.is_none());
        assert!(!builder.disconnect_when_empty);
    }

    #[test]
    fn test_config_uses_defaults() {
        let config = ClientBuilder::new()
            .host("localhost")
            .port(7000)
            .transport(TransportKind::Socket)
            .config()
            .expect("config");

        assert_eq!(config.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(!config.disconnect_when_empty);
    }

    #[test]
    fn test_config_applies_overrides() {
        let config = ClientBuilder::new()
            .host("localhost")
            .port(8080)
            .transport(TransportKind::WebSocket)
            .path("rpc")
            .retry_delay(Duration::from_millis(250))
            .disconnect_when_empty(true)
            .config()
            .expect("config");

        assert_eq!(config.path.as_deref(), Some("/rpc"));
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert!(config.disconnect_when_empty);
    }

    #[test]
    fn test_missing_host_is_config_error() {
        let result = ClientBuilder::new()
            .port(1)
            .transport(TransportKind::Http)
            .config();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_missing_transport_is_config_error() {
        let result = ClientBuilder::new().host("localhost").port(1).config();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_kind_inferred_from_custom_transport() {
        let config = ClientBuilder::new()
            .host("localhost")
            .port(8080)
            .with_transport(Transport::Stateless(Arc::new(Echo)))
            .config()
            .expect("config");

        assert_eq!(config.transport, TransportKind::Http);
    }

    #[tokio::test]
    async fn test_build_with_custom_transport() {
        let client = ClientBuilder::new()
            .host("localhost")
            .port(8080)
            .with_transport(Transport::Stateless(Arc::new(Echo)))
            .build()
            .expect("client");

        let _rx = client.register_channel().expect("register");
        client
            .wait_for_phase(crate::client::Phase::Connected)
            .await
            .expect("connected");

        let result = client
            .call("echo", vec![Value::from(1)])
            .await
            .expect("call");
        assert_eq!(result, serde_json::json!([1]));
    }
}
