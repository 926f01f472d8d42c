//! Transport layer.
//!
//! A uniform capability interface over the three transport kinds a client
//! can be configured with. The connection state machine is written once
//! against these traits; the kind is chosen at construction.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   OneShot::call    ┌──────────────────────┐
//! │                  │───────────────────►│ HTTP POST per call   │
//! │  Client worker   │                    └──────────────────────┘
//! │                  │ Connector::connect ┌──────────────────────┐
//! │                  │───────────────────►│ TCP (line framed) or │
//! └──────────────────┘   → Established    │ WebSocket text frames│
//!                          { link, closed }└──────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Persistent link event loop and request correlation |
//! | `http` | Stateless HTTP transport |
//! | `socket` | Raw TCP socket connector |
//! | `websocket` | WebSocket connector |

// ============================================================================
// Submodules
// ============================================================================

/// Persistent link event loop.
pub mod connection;

/// Stateless HTTP transport.
pub mod http;

/// Raw TCP socket connector.
pub mod socket;

/// WebSocket connector.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::client::ClientConfig;
use crate::error::{Error, Result};

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::LinkConnection;
pub use http::HttpTransport;
pub use socket::SocketConnector;
pub use websocket::WebSocketConnector;

// ============================================================================
// TransportKind
// ============================================================================

/// Transport a client talks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One HTTP request per call. No persistent connection.
    Http,
    /// Persistent TCP socket, one JSON message per line.
    Socket,
    /// Persistent WebSocket, one JSON message per text frame.
    #[serde(alias = "ws")]
    WebSocket,
}

impl TransportKind {
    /// Returns `true` if the kind keeps a connection handle open.
    #[inline]
    #[must_use]
    pub const fn is_persistent(self) -> bool {
        !matches!(self, Self::Http)
    }

    /// Returns `true` if connect attempts are guarded by a timeout.
    #[inline]
    #[must_use]
    pub const fn arms_connect_timeout(self) -> bool {
        matches!(self, Self::Socket)
    }

    /// Configuration spelling.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Socket => "socket",
            Self::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "socket" | "tcp" => Ok(Self::Socket),
            "websocket" | "ws" => Ok(Self::WebSocket),
            other => Err(Error::config(format!(
                "unknown transport kind `{other}` (expected http, socket or websocket)"
            ))),
        }
    }
}

// ============================================================================
// Capability Traits
// ============================================================================

/// Fires once when a persistent link stops, carrying the reason if the
/// transport reported one.
pub type CloseSignal = oneshot::Receiver<Option<Error>>;

/// An established persistent connection.
pub struct Established {
    /// Call and close primitives.
    pub link: Arc<dyn Link>,
    /// Remote-close notification.
    pub closed: CloseSignal,
}

impl fmt::Debug for Established {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Established").finish_non_exhaustive()
    }
}

/// Call and close primitives of a persistent connection.
#[async_trait]
pub trait Link: Send + Sync {
    /// Invokes a remote method and waits for its result.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value>;

    /// Closes the connection. Pending calls fail with
    /// [`Error::ConnectionClosed`].
    fn close(&self);
}

/// Opens persistent connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Performs one connect attempt.
    async fn connect(&self) -> Result<Established>;
}

/// One-shot call primitive of a stateless transport.
#[async_trait]
pub trait OneShot: Send + Sync {
    /// Invokes a remote method over a fresh request.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value>;
}

// ============================================================================
// Transport
// ============================================================================

/// Transport selected for a client.
#[derive(Clone)]
pub enum Transport {
    /// Stateless request/response transport (HTTP).
    Stateless(Arc<dyn OneShot>),
    /// Connection-oriented transport.
    Persistent {
        /// Socket or WebSocket.
        kind: TransportKind,
        /// Connect primitive.
        connector: Arc<dyn Connector>,
    },
}

impl Transport {
    /// Builds the network transport described by `config`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint URL cannot be formed
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        match config.transport {
            TransportKind::Http => Ok(Self::Stateless(Arc::new(HttpTransport::new(config)?))),
            TransportKind::Socket => Ok(Self::Persistent {
                kind: TransportKind::Socket,
                connector: Arc::new(SocketConnector::new(config)),
            }),
            TransportKind::WebSocket => Ok(Self::Persistent {
                kind: TransportKind::WebSocket,
                connector: Arc::new(WebSocketConnector::new(config)?),
            }),
        }
    }

    /// Returns the transport kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stateless(_) => TransportKind::Http,
            Self::Persistent { kind, .. } => *kind,
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transport").field(&self.kind()).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
