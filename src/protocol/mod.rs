//! JSON-RPC protocol message types.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Client → Server | Method call |
//! | `Response` | Server → Client | Result or error object |
//! | `Incoming::Notification` | Server → Client | Unsolicited push (ignored) |
//! | `Status` | Client → Callers | Connection status fan-out |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `request` | JSON-RPC 2.0 request and response types |
//! | `status` | Status objects pushed to callers |

// ============================================================================
// Submodules
// ============================================================================

/// JSON-RPC 2.0 request and response types.
pub mod request;

/// Connection status objects.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use request::{ErrorObject, Incoming, JSONRPC_VERSION, Request, Response};
pub use status::{Status, StatusFill, StatusShape, StatusText};
