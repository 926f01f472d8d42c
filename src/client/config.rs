//! Client configuration.
//!
//! # Example
//!
//! ```ignore
//! use jsonrpc_link::ClientConfig;
//!
//! let config: ClientConfig = serde_json::from_str(
//!     r#"{ "host": "localhost", "port": "7000", "transport": "socket" }"#,
//! )?;
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use url::Url;

use crate::error::{Error, Result};
use crate::transport::TransportKind;
use crate::transport::connection::DEFAULT_CALL_TIMEOUT;

// ============================================================================
// Constants
// ============================================================================

/// Delay before reconnecting after a failed attempt or a dropped connection.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Time a socket connect attempt may take before it is abandoned.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// ClientConfig
// ============================================================================

/// Endpoint and reconnection settings for one client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,

    /// Server port, 1-65535. Accepts a number or a numeric string.
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,

    /// Transport kind.
    #[serde(alias = "transportKind")]
    pub transport: TransportKind,

    /// URL path for HTTP and WebSocket endpoints.
    #[serde(default)]
    pub path: Option<String>,

    /// Fixed delay between reconnect attempts.
    #[serde(
        default = "default_retry_delay",
        rename = "retryDelayMs",
        deserialize_with = "deserialize_millis"
    )]
    pub retry_delay: Duration,

    /// Socket connect timeout.
    #[serde(
        default = "default_connect_timeout",
        rename = "connectTimeoutMs",
        deserialize_with = "deserialize_millis"
    )]
    pub connect_timeout: Duration,

    /// Per-call timeout.
    #[serde(
        default = "default_call_timeout",
        rename = "callTimeoutMs",
        deserialize_with = "deserialize_millis"
    )]
    pub call_timeout: Duration,

    /// Drop the connection when the last caller deregisters.
    #[serde(default)]
    pub disconnect_when_empty: bool,
}

impl ClientConfig {
    /// Creates a configuration with default timing.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, transport: TransportKind) -> Self {
        Self {
            host: host.into(),
            port,
            transport,
            path: None,
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            disconnect_when_empty: false,
        }
    }

    /// Sets the URL path. A leading `/` is added if missing.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.is_empty() {
            None
        } else if path.starts_with('/') {
            Some(path)
        } else {
            Some(format!("/{path}"))
        };
        self
    }

    /// Checks that the configuration describes a reachable endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty host, port 0, a zero
    /// timeout, or a path that does not start with `/`.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("port must be in 1-65535"));
        }
        if let Some(path) = &self.path
            && !path.starts_with('/')
        {
            return Err(Error::config(format!("path `{path}` must start with `/`")));
        }
        if self.connect_timeout.is_zero() || self.call_timeout.is_zero() {
            return Err(Error::config("timeouts must be greater than zero"));
        }
        Ok(())
    }

    /// Builds `scheme://host:port{path}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the parts do not form a valid URL.
    pub fn endpoint_url(&self, scheme: &str) -> Result<Url> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let path = self.path.as_deref().unwrap_or("/");

        Url::parse(&format!("{scheme}://{host}:{}{path}", self.port))
            .map_err(|e| Error::config(format!("invalid endpoint: {e}")))
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_call_timeout() -> Duration {
    DEFAULT_CALL_TIMEOUT
}

fn deserialize_millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u64),
        Text(String),
    }

    let raw = match Port::deserialize(deserializer)? {
        Port::Number(n) => n,
        Port::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid port `{s}`")))?,
    };

    match u16::try_from(raw) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(serde::de::Error::custom(format!(
            "port {raw} out of range 1-65535"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("localhost", 7000, TransportKind::Socket);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert!(!config.disconnect_when_empty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"host": "localhost", "port": "7000", "transportKind": "websocket"}"#,
        )
        .expect("parse");

        assert_eq!(config.port, 7000);
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert_eq!(config.retry_delay, DEFAULT_RETRY_DELAY);
    }

    #[test]
    fn test_deserialize_full() {
        let config: ClientConfig = serde_json::from_str(
            r#"{
                "host": "rpc.local",
                "port": 8545,
                "transport": "http",
                "path": "/v1",
                "retryDelayMs": 250,
                "connectTimeoutMs": 500,
                "callTimeoutMs": 2000,
                "disconnectWhenEmpty": true
            }"#,
        )
        .expect("parse");

        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.call_timeout, Duration::from_secs(2));
        assert!(config.disconnect_when_empty);
        assert_eq!(
            config.endpoint_url("http").expect("url").as_str(),
            "http://rpc.local:8545/v1"
        );
    }

    #[test]
    fn test_port_out_of_range() {
        for port in ["0", "65536", "\"abc\""] {
            let json = format!(r#"{{"host": "h", "port": {port}, "transport": "socket"}}"#);
            assert!(serde_json::from_str::<ClientConfig>(&json).is_err(), "port {port}");
        }
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let config = ClientConfig::new(" ", 7000, TransportKind::Socket);
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_with_path_normalizes() {
        let config = ClientConfig::new("h", 1, TransportKind::Http).with_path("rpc");
        assert_eq!(config.path.as_deref(), Some("/rpc"));
        let config = config.with_path("");
        assert_eq!(config.path, None);
    }

    #[test]
    fn test_ipv6_endpoint() {
        let config = ClientConfig::new("::1", 9000, TransportKind::WebSocket);
        assert_eq!(
            config.endpoint_url("ws").expect("url").as_str(),
            "ws://[::1]:9000/"
        );
    }
}
