//! Persistent link and event loop.
//!
//! Shared by the socket and WebSocket transports. The link spawns a tokio
//! task that handles:
//!
//! - Incoming frames from the server (responses, notifications)
//! - Outgoing requests from callers
//! - Request/response correlation by JSON-RPC id
//! - Reporting the close reason once the loop stops

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, to_string};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Incoming, Request, Response};

use super::{CloseSignal, Established, Link};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for a single call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// Map of request IDs to response channels.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Result<Response>>>;

/// Outgoing half of a framed text channel.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes one message.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Closes the channel.
    async fn close(&mut self);
}

/// Incoming half of a framed text channel.
///
/// `next_text` must be cancel-safe: the event loop races it against
/// outgoing commands.
#[async_trait]
pub trait FrameStream: Send {
    /// Reads the next message. `None` means the peer closed cleanly.
    async fn next_text(&mut self) -> Option<Result<String>>;
}

// ============================================================================
// LinkCommand
// ============================================================================

/// Internal commands for the event loop.
enum LinkCommand {
    /// Send a request and wait for response.
    Send {
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(RequestId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// LinkConnection
// ============================================================================

/// Persistent JSON-RPC connection over a framed text channel.
///
/// # Thread Safety
///
/// `LinkConnection` is `Send + Sync` and can be shared across tasks.
#[derive(Clone)]
pub struct LinkConnection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<LinkCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Per-call timeout.
    call_timeout: Duration,
}

impl LinkConnection {
    /// Spawns the event loop over an already-connected channel.
    pub fn spawn(
        writer: Box<dyn FrameSink>,
        reader: Box<dyn FrameStream>,
        call_timeout: Duration,
    ) -> Established {
        let (link, closed) = Self::open(writer, reader, call_timeout);

        Established {
            link: Arc::new(link),
            closed,
        }
    }

    /// Like [`spawn`](Self::spawn), but keeps the concrete connection.
    pub fn open(
        writer: Box<dyn FrameSink>,
        reader: Box<dyn FrameStream>,
        call_timeout: Duration,
    ) -> (Self, CloseSignal) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx): (_, CloseSignal) = oneshot::channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));

        tokio::spawn(Self::run_event_loop(
            writer,
            reader,
            command_rx,
            Arc::clone(&correlation),
            closed_tx,
        ));

        let link = Self {
            command_tx,
            correlation,
            call_timeout,
        };

        (link, closed_rx)
    }

    /// Sends a request and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if connection is closed
    /// - [`Error::RequestTimeout`] if response not received within timeout
    /// - [`Error::Protocol`] if too many pending requests
    pub async fn send(&self, request: Request) -> Result<Response> {
        let request_id = request.id;

        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(LinkCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(self.call_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = self
                    .command_tx
                    .send(LinkCommand::RemoveCorrelation(request_id));

                Err(Error::request_timeout(
                    request_id,
                    self.call_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Asks the event loop to close the channel.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(LinkCommand::Shutdown);
    }

    /// Event loop that handles framed I/O.
    async fn run_event_loop(
        mut writer: Box<dyn FrameSink>,
        mut reader: Box<dyn FrameStream>,
        mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        closed_tx: oneshot::Sender<Option<Error>>,
    ) {
        let reason = loop {
            tokio::select! {
                frame = reader.next_text() => {
                    match frame {
                        Some(Ok(text)) => Self::handle_incoming_message(&text, &correlation),

                        Some(Err(e)) => {
                            debug!(error = %e, "Link read failed");
                            break Some(Error::remote_closed(e.to_string()));
                        }

                        None => {
                            debug!("Link closed by remote");
                            break None;
                        }
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(LinkCommand::Send { request, response_tx }) => {
                            Self::handle_send_command(
                                request,
                                response_tx,
                                writer.as_mut(),
                                &correlation,
                            ).await;
                        }

                        Some(LinkCommand::RemoveCorrelation(request_id)) => {
                            correlation.lock().remove(&request_id);
                            debug!(%request_id, "Removed timed-out correlation");
                        }

                        Some(LinkCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            writer.close().await;
                            break None;
                        }

                        None => {
                            debug!("Command channel closed");
                            writer.close().await;
                            break None;
                        }
                    }
                }
            }
        };

        Self::fail_pending_requests(&correlation);
        let _ = closed_tx.send(reason);

        debug!("Link event loop terminated");
    }

    /// Routes an incoming frame to the waiting caller.
    fn handle_incoming_message(text: &str, correlation: &Arc<Mutex<CorrelationMap>>) {
        match Incoming::parse(text) {
            Ok(Incoming::Response(response)) => {
                let Some(id) = response.id else {
                    warn!(error = ?response.error, "Server rejected a request it could not parse");
                    return;
                };

                let tx = correlation.lock().remove(&id);
                match tx {
                    Some(tx) => {
                        let _ = tx.send(Ok(response));
                    }
                    None => warn!(%id, "Response for unknown request"),
                }
            }

            Ok(Incoming::Notification { method }) => {
                trace!(%method, "Ignoring server notification");
            }

            Err(e) => warn!(error = %e, text = %text, "Failed to parse incoming message"),
        }
    }

    /// Serializes and writes one request.
    async fn handle_send_command(
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
        writer: &mut dyn FrameSink,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        let request_id = request.id;

        let json = match to_string(&request) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(request_id, response_tx);

        if let Err(e) = writer.send_text(json).await
            && let Some(tx) = correlation.lock().remove(&request_id)
        {
            let _ = tx.send(Err(Error::connection(e.to_string())));
        }

        trace!(%request_id, "Request sent");
    }

    /// Fails all pending requests with ConnectionClosed error.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on close");
        }
    }
}

#[async_trait]
impl Link for LinkConnection {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.send(Request::new(method, params)).await?.into_result()
    }

    fn close(&self) {
        self.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================
