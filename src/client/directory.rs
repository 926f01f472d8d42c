//! Named client lookup.
//!
//! Callers reference a shared connection by name. A lookup for a name
//! nobody configured is a configuration error and is never retried.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::core::Client;

// ============================================================================
// Directory
// ============================================================================

/// Thread-safe registry of named clients.
///
/// Cloning yields another handle to the same directory.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    clients: Arc<RwLock<FxHashMap<String, Client>>>,
}

impl Directory {
    /// Creates an empty directory.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client under `name`, returning the one it replaced.
    pub fn insert(&self, name: impl Into<String>, client: Client) -> Option<Client> {
        let name = name.into();
        debug!(%name, "Client added to directory");
        self.clients.write().insert(name, client)
    }

    /// Removes and returns the client named `name`.
    ///
    /// The client is not ended.
    pub fn remove(&self, name: &str) -> Option<Client> {
        self.clients.write().remove(name)
    }

    /// Looks up a client by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no client is registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Client> {
        self.clients
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::config(format!("missing client config `{name}`")))
    }

    /// Number of registered clients.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Returns `true` if no clients are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Removes and ends every client.
    pub async fn end_all(&self) {
        let clients: Vec<(String, Client)> = self.clients.write().drain().collect();
        let count = clients.len();

        for (name, client) in clients {
            debug!(%name, "Ending client");
            client.end().await;
        }

        info!(count, "Directory cleared");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio_test::{assert_err, assert_ok};

    use crate::client::ClientConfig;
    use crate::transport::{OneShot, Transport, TransportKind};

    struct Null;

    #[async_trait]
    impl OneShot for Null {
        async fn call(&self, _method: &str, _params: Vec<Value>) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn client() -> Client {
        let config = ClientConfig::new("localhost", 8080, TransportKind::Http);
        Client::with_transport(config, Transport::Stateless(Arc::new(Null))).expect("client")
    }

    #[tokio::test]
    async fn test_resolve_registered_client() {
        let directory = Directory::new();
        directory.insert("rpc", client());

        let resolved = assert_ok!(directory.resolve("rpc"));
        assert_eq!(resolved.config().port, 8080);
    }

    #[test]
    fn test_missing_client_is_config_error() {
        let directory = Directory::new();
        let error = assert_err!(directory.resolve("absent"));

        assert!(matches!(error, Error::Config { .. }));
        assert!(error.to_string().contains("missing client config"));
        assert!(!error.is_recoverable());
    }

    #[tokio::test]
    async fn test_end_all_empties_and_ends() {
        let directory = Directory::new();
        let a = client();
        directory.insert("a", a.clone());
        directory.insert("b", client());

        directory.end_all().await;

        assert!(directory.is_empty());
        assert!(a.is_ended());
    }

    #[tokio::test]
    async fn test_remove_does_not_end() {
        let directory = Directory::new();
        directory.insert("a", client());

        let removed = directory.remove("a").expect("removed");
        assert!(!removed.is_ended());
        assert!(directory.resolve("a").is_err());
    }
}
