//! JSON-RPC Link - shared, auto-reconnecting JSON-RPC 2.0 client connections.
//!
//! One [`Client`] owns one logical connection to a `(host, port, transport)`
//! endpoint and shares it between any number of independent callers.
//!
//! # Architecture
//!
//! - **Transport**: HTTP (one POST per call), raw TCP socket (newline
//!   delimited JSON) or WebSocket (JSON text frames)
//! - **State machine**: pure transitions from events to effects, with a
//!   generation per connect attempt so stale timers and results are ignored
//! - **Registry**: the first registered caller triggers the connect; every
//!   caller receives the same status pushes
//! - **Dispatcher**: calls fail fast with [`Error::NotConnected`] while no
//!   connection is active
//!
//! Key behaviours:
//!
//! - Fixed-delay reconnect after failures and remote closes
//! - Socket connect attempts are abandoned after a timeout and retried
//! - [`Client::end`] stops all further activity, including armed timers
//!
//! # Quick Start
//!
//! ```no_run
//! use jsonrpc_link::{Client, Phase, Result, TransportKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .host("localhost")
//!         .port(8080)
//!         .transport(TransportKind::WebSocket)
//!         .build()?;
//!
//!     let (caller, _statuses) = client.register_channel()?;
//!     client.wait_for_phase(Phase::Connected).await?;
//!
//!     let result = client.call("add", vec![1.into(), 2.into()]).await?;
//!     println!("1 + 2 = {result}");
//!
//!     client.deregister(caller)?;
//!     client.end().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client handle, state machine, registry and dispatcher |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | JSON-RPC messages and status objects |
//! | [`transport`] | HTTP, socket and WebSocket transports |

// ============================================================================
// Modules
// ============================================================================

/// Shared connection client.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for callers and requests.
pub mod identifiers;

/// JSON-RPC 2.0 message types and status objects.
pub mod protocol;

/// Transport layer.
///
/// Capability traits and the three network transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ClientConfig, Directory, Phase, RpcCaller, StatusSink};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallerId, RequestId};

// Protocol types
pub use protocol::{Status, StatusFill, StatusShape, StatusText};

// Transport types
pub use transport::{Connector, Link, OneShot, Transport, TransportKind};
