//! Shared connection client.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Cloneable handle to one shared connection |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientConfig`] | Endpoint and reconnection settings |
//! | [`Directory`] | Named client lookup |
//! | [`RpcCaller`] | Registered caller with a default method |
//! | [`Machine`] | Pure connection state machine |
//!
//! # Example
//!
//! ```no_run
//! use jsonrpc_link::{Client, Phase, Result, TransportKind};
//!
//! # async fn example() -> Result<()> {
//! let client = Client::builder()
//!     .host("localhost")
//!     .port(7000)
//!     .transport(TransportKind::Socket)
//!     .build()?;
//!
//! let (_caller, mut statuses) = client.register_channel()?;
//! while let Some(status) = statuses.recv().await {
//!     println!("{}", status.text);
//!     if client.phase() == Phase::Connected {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Registered caller bound to a client.
pub mod caller;

/// Client configuration.
pub mod config;

/// Client handle.
pub mod core;

/// Named client lookup.
pub mod directory;

/// Call routing.
pub mod dispatcher;

/// Connection state machine.
pub mod machine;

/// Caller registry and status fan-out.
pub mod registry;

mod worker;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use caller::{RpcCaller, params_from_payload};
pub use config::ClientConfig;
pub use core::Client;
pub use directory::Directory;
pub use machine::{Effect, Event, Generation, Machine, MachineConfig, Phase};
pub use registry::{CallerRegistry, Membership, StatusSink};
