//! JSON-RPC 2.0 request and response message types.
//!
//! Shared by every transport: the socket and WebSocket links exchange these
//! as text frames, the HTTP transport as request/response bodies.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// Protocol version string carried in every message.
pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// Request
// ============================================================================

/// A method call from client to server.
///
/// # Format
///
/// ```json
/// { "jsonrpc": "2.0", "id": 7, "method": "add", "params": [1, 2] }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,

    /// Correlation identifier.
    pub id: RequestId,

    /// Remote method name.
    pub method: String,

    /// Positional parameters.
    pub params: Vec<Value>,
}

impl Request {
    /// Creates a new request with auto-generated ID.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self::with_id(RequestId::generate(), method, params)
    }

    /// Creates a new request with specific ID.
    #[inline]
    #[must_use]
    pub fn with_id(id: RequestId, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A reply from server to client.
///
/// Exactly one of `result` / `error` is meaningful. A response whose `id`
/// is `null` reports a request the server could not parse.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Matches the request `id`.
    pub id: Option<RequestId>,

    /// Result value (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error object (if error).
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// A success response without `result` yields `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rpc`] if the response carried an error object.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// ErrorObject
// ============================================================================

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Error code.
    pub code: i64,

    /// Short description.
    pub message: String,

    /// Additional information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<ErrorObject> for Error {
    fn from(object: ErrorObject) -> Self {
        Error::rpc(object.code, object.message, object.data)
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// Any message a client may receive on a persistent link.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// Reply to one of our requests.
    Response(Response),
    /// Server-initiated notification (no `id`).
    Notification {
        /// Notified method.
        method: String,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    id: Option<Value>,
}

impl Incoming {
    /// Parses an incoming text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not JSON
    /// - [`Error::Protocol`] if it is neither a response nor a notification
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let envelope: Envelope = serde_json::from_value(value.clone())?;

        match envelope {
            Envelope {
                method: Some(method),
                id: None,
            } => Ok(Self::Notification { method }),
            Envelope { method: None, .. } => Ok(Self::Response(serde_json::from_value(value)?)),
            Envelope {
                method: Some(method),
                id: Some(_),
            } => Err(Error::protocol(format!(
                "unexpected server request: {method}"
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
