//! Shared client handle.
//!
//! A [`Client`] is a cheap, cloneable handle to one connection worker.
//! Any number of callers register with it; the first registration opens
//! the connection and every caller receives the same status pushes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::CallerId;
use crate::protocol::Status;
use crate::transport::Transport;

use super::builder::ClientBuilder;
use super::config::ClientConfig;
use super::machine::{Machine, MachineConfig, Phase};
use super::registry::StatusSink;
use super::worker::{Command, Worker};

// ============================================================================
// Client
// ============================================================================

/// Handle to a shared, auto-reconnecting JSON-RPC connection.
///
/// # Example
///
/// ```no_run
/// use jsonrpc_link::{Client, Result, TransportKind};
///
/// # async fn example() -> Result<()> {
/// let client = Client::builder()
///     .host("127.0.0.1")
///     .port(7000)
///     .transport(TransportKind::Socket)
///     .build()?;
///
/// let (caller, mut statuses) = client.register_channel()?;
/// client.wait_for_phase(jsonrpc_link::Phase::Connected).await?;
///
/// let sum = client.call("add", vec![1.into(), 2.into()]).await?;
/// println!("sum = {sum}");
///
/// client.deregister(caller)?;
/// client.end().await;
/// # drop(statuses.try_recv());
/// # Ok(())
/// # }
/// ```
///
/// # Thread Safety
///
/// `Client` is `Send + Sync`. Clones share the same worker; the worker
/// stops on [`Client::end`] or when the last clone is dropped.
#[derive(Clone)]
pub struct Client {
    /// Channel to the worker.
    command_tx: mpsc::UnboundedSender<Command>,
    /// Latest published phase.
    phase_rx: watch::Receiver<Phase>,
    /// Configuration the client was built from.
    config: Arc<ClientConfig>,
    /// Set once any clone has asked the worker to end. Registrations check
    /// it under the read lock so none can queue behind the end command.
    ending: Arc<RwLock<bool>>,
}

impl Client {
    /// Creates a new client builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client over the network transport described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = Transport::from_config(&config)?;
        Self::with_transport(config, transport)
    }

    /// Creates a client over a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid or its
    /// transport kind differs from `transport`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_transport(config: ClientConfig, transport: Transport) -> Result<Self> {
        config.validate()?;
        if transport.kind() != config.transport {
            return Err(Error::config(format!(
                "transport is {} but configuration asks for {}",
                transport.kind(),
                config.transport
            )));
        }

        let machine = Machine::new(MachineConfig {
            kind: config.transport,
            retry_delay: config.retry_delay,
            connect_timeout: config.connect_timeout,
        });

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(Phase::Idle);

        let worker = Worker::new(
            machine,
            transport,
            config.disconnect_when_empty,
            command_rx,
            command_tx.downgrade(),
            phase_tx,
        );
        tokio::spawn(worker.run());

        debug!(
            host = %config.host,
            port = config.port,
            transport = %config.transport,
            "Client created"
        );

        Ok(Self {
            command_tx,
            phase_rx,
            config: Arc::new(config),
            ending: Arc::new(RwLock::new(false)),
        })
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Caller Registration
    // ------------------------------------------------------------------------

    /// Registers a caller. The first registration starts connecting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ended`] if the client has ended.
    pub fn register(&self, caller: CallerId, sink: impl StatusSink + 'static) -> Result<()> {
        self.send(Command::Register {
            caller,
            sink: Arc::new(sink),
        })
    }

    /// Registers a new caller whose statuses arrive on a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ended`] if the client has ended.
    pub fn register_channel(&self) -> Result<(CallerId, mpsc::UnboundedReceiver<Status>)> {
        let caller = CallerId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(caller, tx)?;
        Ok((caller, rx))
    }

    /// Removes a caller. The connection stays up unless the client was
    /// configured to disconnect when empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ended`] if the client has ended.
    pub fn deregister(&self, caller: CallerId) -> Result<()> {
        self.send(Command::Deregister { caller })
    }

    // ------------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------------

    /// Invokes a remote method.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if no connection is active; no I/O happens
    /// - [`Error::Rpc`] if the method returned an error object
    /// - transport errors from the active connection
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let (reply, route_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Route { reply })
            .map_err(|_| Error::NotConnected)?;

        let route = route_rx.await.map_err(|_| Error::NotConnected)??;

        trace!(method, ?route, "Dispatching call");
        route.call(method, params).await
    }

    /// Invokes a remote method and hands the outcome to `callback`.
    ///
    /// The callback runs exactly once, on a spawned task, with either the
    /// result or the error.
    pub fn call_with_callback<F>(&self, method: impl Into<String>, params: Vec<Value>, callback: F)
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let client = self.clone();
        let method = method.into();

        tokio::spawn(async move {
            callback(client.call(&method, params).await);
        });
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    /// Current connection phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase_rx.borrow()
    }

    /// Returns `true` while calls can be dispatched.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.phase() == Phase::Connected
    }

    /// Waits until the client reaches `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ended`] if the client ends first.
    pub async fn wait_for_phase(&self, phase: Phase) -> Result<()> {
        let mut phase_rx = self.phase_rx.clone();
        let reached = phase_rx
            .wait_for(|current| *current == phase || *current == Phase::Ended)
            .await
            .map(|current| *current)
            .unwrap_or(Phase::Ended);

        if reached == phase {
            Ok(())
        } else {
            Err(Error::Ended)
        }
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Ends the client.
    ///
    /// Closes the active connection, cancels pending retries and timeouts,
    /// and resolves once the worker has stopped. Safe to call repeatedly.
    pub async fn end(&self) {
        let (done, done_rx) = oneshot::channel();
        {
            let mut ending = self.ending.write();
            *ending = true;
            if self.command_tx.send(Command::End { done }).is_err() {
                return;
            }
        }
        let _ = done_rx.await;
    }

    /// Returns `true` once the client has ended.
    #[inline]
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.phase() == Phase::Ended || self.command_tx.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        let ending = self.ending.read();
        if *ending {
            return Err(Error::Ended);
        }
        self.command_tx.send(command).map_err(|_| Error::Ended)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("transport", &self.config.transport)
            .field("phase", &self.phase())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
