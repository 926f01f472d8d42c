//! Call dispatch.
//!
//! The worker resolves a [`Route`] from the current connection state; the
//! caller then performs the call on its own task so a slow method never
//! stalls connection handling.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::transport::{Link, OneShot, Transport};

use super::machine::Machine;

// ============================================================================
// Route
// ============================================================================

/// Where a call goes.
#[derive(Clone)]
pub enum Route {
    /// Fresh HTTP request.
    Stateless(Arc<dyn OneShot>),
    /// Active persistent connection.
    Link(Arc<dyn Link>),
}

impl Route {
    /// Invokes `method` over this route.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        match self {
            Self::Stateless(transport) => transport.call(method, params).await,
            Self::Link(link) => link.call(method, params).await,
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stateless(_) => f.write_str("Route::Stateless"),
            Self::Link(_) => f.write_str("Route::Link"),
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Picks the route for a call, without touching the transport.
///
/// # Errors
///
/// Returns [`Error::NotConnected`] if no connection is active. This
/// includes an ended client and the window where a persistent transport
/// reports connected but holds no handle.
pub fn resolve(machine: &Machine<Arc<dyn Link>>, transport: &Transport) -> Result<Route> {
    if !machine.is_connected() {
        return Err(Error::NotConnected);
    }

    match transport {
        Transport::Stateless(one_shot) => Ok(Route::Stateless(Arc::clone(one_shot))),
        Transport::Persistent { .. } => machine
            .active()
            .map(|link| Route::Link(Arc::clone(link)))
            .ok_or(Error::NotConnected),
    }
}

// ============================================================================
// Tests
// ============================================================================
