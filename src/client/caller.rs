//! Caller bound to a shared client.
//!
//! An [`RpcCaller`] is what a consumer of a shared connection holds: it is
//! registered for status pushes while alive and invokes one default method
//! unless told otherwise.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::identifiers::CallerId;

use super::core::Client;
use super::directory::Directory;
use super::registry::StatusSink;

// ============================================================================
// RpcCaller
// ============================================================================

/// A registered caller with a default method.
///
/// Dropping the caller deregisters it.
#[derive(Debug)]
pub struct RpcCaller {
    id: CallerId,
    client: Client,
    method: String,
    attached: bool,
}

impl RpcCaller {
    /// Registers a new caller on `client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ended`](crate::Error::Ended) if the client has ended.
    pub fn attach(
        client: Client,
        method: impl Into<String>,
        sink: impl StatusSink + 'static,
    ) -> Result<Self> {
        let id = CallerId::generate();
        client.register(id, sink)?;

        let method = method.into();
        debug!(caller = %id, %method, "Caller attached");

        Ok(Self {
            id,
            client,
            method,
            attached: true,
        })
    }

    /// Resolves `name` in `directory` and attaches to it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if `name` is unknown
    /// - [`Error::Ended`](crate::Error::Ended) if the client has ended
    pub fn attach_named(
        directory: &Directory,
        name: &str,
        method: impl Into<String>,
        sink: impl StatusSink + 'static,
    ) -> Result<Self> {
        let client = directory.resolve(name)?;
        Self::attach(client, method, sink)
    }

    /// Caller identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CallerId {
        self.id
    }

    /// Default method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Shared client.
    #[inline]
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Calls `method_override`, or the default method, with `payload`
    /// as positional parameters.
    ///
    /// # Errors
    ///
    /// Same as [`Client::call`].
    pub async fn invoke(&self, method_override: Option<&str>, payload: Value) -> Result<Value> {
        let method = method_override
            .filter(|method| !method.is_empty())
            .unwrap_or(&self.method);

        self.client.call(method, params_from_payload(payload)).await
    }

    /// Deregisters the caller. Safe to call more than once.
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;

        // An ended client has already dropped every caller
        let _ = self.client.deregister(self.id);
        debug!(caller = %self.id, "Caller detached");
    }
}

impl Drop for RpcCaller {
    fn drop(&mut self) {
        self.detach();
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Converts a payload into positional parameters.
///
/// Arrays are used as-is; any other value, `null` included, becomes the
/// single parameter.
#[must_use]
pub fn params_from_payload(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(params) => params,
        other => vec![other],
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
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::client::{ClientConfig, Phase};
    use crate::error::Error;
    use crate::protocol::Status;
    use crate::transport::{OneShot, Transport, TransportKind};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Vec<Value>)>>,
    }

    #[async_trait]
    impl OneShot for Recorder {
        async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
            self.calls.lock().push((method.to_string(), params));
            Ok(json!("ok"))
        }
    }

    fn http_client(recorder: &Arc<Recorder>) -> Client {
        let config = ClientConfig::new("localhost", 8080, TransportKind::Http);
        let transport = Transport::Stateless(Arc::clone(recorder) as Arc<dyn OneShot>);
        Client::with_transport(config, transport).expect("client")
    }

    #[test]
    fn test_params_from_payload() {
        assert_eq!(params_from_payload(json!([1, "a"])), vec![json!(1), json!("a")]);
        assert_eq!(params_from_payload(json!({"x": 1})), vec![json!({"x": 1})]);
        assert_eq!(params_from_payload(json!(5)), vec![json!(5)]);
        assert_eq!(params_from_payload(Value::Null), vec![Value::Null]);
        assert!(params_from_payload(json!([])).is_empty());
    }

    #[tokio::test]
    async fn test_invoke_uses_default_and_override() {
        let recorder = Arc::new(Recorder::default());
        let client = http_client(&recorder);
        let caller = RpcCaller::attach(client.clone(), "add", |_status: Status| {})
            .expect("attach");
        client
            .wait_for_phase(Phase::Connected)
            .await
            .expect("connected");

        caller.invoke(None, json!([1, 2])).await.expect("default");
        caller.invoke(Some("sub"), json!(3)).await.expect("override");
        caller.invoke(Some(""), Value::Null).await.expect("empty override");

        let calls = recorder.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                ("add".to_string(), vec![json!(1), json!(2)]),
                ("sub".to_string(), vec![json!(3)]),
                ("add".to_string(), vec![Value::Null]),
            ]
        );
    }

    #[tokio::test]
    async fn test_attach_named_missing_is_config_error() {
        let directory = Directory::new();
        let result = RpcCaller::attach_named(&directory, "nope", "ping", |_status: Status| {});
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_drop_detaches_without_disconnecting() {
        let recorder = Arc::new(Recorder::default());
        let client = http_client(&recorder);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Status>();
        {
            let _caller = RpcCaller::attach(client.clone(), "ping", tx).expect("attach");
            client
                .wait_for_phase(Phase::Connected)
                .await
                .expect("connected");
        }

        assert_eq!(rx.recv().await, Some(Status::CONNECTING));
        assert_eq!(rx.recv().await, Some(Status::CONNECTED));
        // The sink was dropped with the registration
        assert_eq!(rx.recv().await, None);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_detach_after_end_is_silent() {
        let recorder = Arc::new(Recorder::default());
        let client = http_client(&recorder);
        let mut caller =
            RpcCaller::attach(client.clone(), "ping", |_status: Status| {}).expect("attach");

        client.end().await;
        caller.detach();
        caller.detach();

        assert!(matches!(
            caller.invoke(None, Value::Null).await,
            Err(Error::NotConnected)
        ));
    }
}
