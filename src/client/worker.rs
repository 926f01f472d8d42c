//! Client worker task.
//!
//! One worker per client owns the [`Machine`] and the [`CallerRegistry`].
//! Every input (caller commands, connect results, timer firings, remote
//! closes) arrives as a [`Command`] on one channel and is handled to
//! completion before the next, so transitions never interleave.
//!
//! Timers and connect attempts run as separate tasks that report back
//! through a weak sender: once every [`Client`](super::Client) handle is
//! gone they have nowhere to deliver and the worker winds down.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::identifiers::CallerId;
use crate::transport::{CloseSignal, Established, Link, Transport};

use super::dispatcher::{self, Route};
use super::machine::{Effect, Event, Generation, Machine, Phase};
use super::registry::{CallerRegistry, Membership, StatusSink};

// ============================================================================
// Constants
// ============================================================================

/// How long `end()` waits for the active link to finish closing.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

// ============================================================================
// Command
// ============================================================================

/// Input to the worker.
pub(crate) enum Command {
    /// Add a caller.
    Register {
        caller: CallerId,
        sink: Arc<dyn StatusSink>,
    },
    /// Remove a caller.
    Deregister { caller: CallerId },
    /// Resolve where a call should go.
    Route { reply: oneshot::Sender<Result<Route>> },
    /// A connect attempt finished.
    ConnectResult {
        generation: Generation,
        outcome: Result<Established>,
    },
    /// The socket connect timeout fired.
    ConnectTimedOut { generation: Generation },
    /// The retry delay elapsed.
    RetryElapsed { generation: Generation },
    /// An established link stopped.
    RemoteClosed {
        generation: Generation,
        error: Option<Error>,
    },
    /// Shut down and acknowledge.
    End { done: oneshot::Sender<()> },
}

// ============================================================================
// Worker
// ============================================================================

/// Owns the connection state of one client.
pub(crate) struct Worker {
    machine: Machine<Arc<dyn Link>>,
    registry: CallerRegistry,
    transport: Transport,
    disconnect_when_empty: bool,
    command_rx: mpsc::UnboundedReceiver<Command>,
    command_tx: mpsc::WeakUnboundedSender<Command>,
    phase_tx: watch::Sender<Phase>,
    /// In-flight connect attempt.
    attempt: Option<(Generation, JoinHandle<()>)>,
    /// Armed socket connect timeout.
    connect_timer: Option<AbortHandle>,
    /// Armed retry timer.
    retry_timer: Option<AbortHandle>,
    /// Close watcher of the adopted link.
    watcher: Option<(Generation, JoinHandle<()>)>,
}

impl Worker {
    pub(crate) fn new(
        machine: Machine<Arc<dyn Link>>,
        transport: Transport,
        disconnect_when_empty: bool,
        command_rx: mpsc::UnboundedReceiver<Command>,
        command_tx: mpsc::WeakUnboundedSender<Command>,
        phase_tx: watch::Sender<Phase>,
    ) -> Self {
        Self {
            machine,
            registry: CallerRegistry::new(),
            transport,
            disconnect_when_empty,
            command_rx,
            command_tx,
            phase_tx,
            attempt: None,
            connect_timer: None,
            retry_timer: None,
            watcher: None,
        }
    }

    /// Processes commands until `end()` or until every client handle is
    /// dropped.
    pub(crate) async fn run(mut self) {
        let mut done = None;

        while let Some(command) = self.command_rx.recv().await {
            match command {
                Command::Register { caller, sink } => self.on_register(caller, sink),
                Command::Deregister { caller } => self.on_deregister(caller),
                Command::Route { reply } => {
                    let _ = reply.send(dispatcher::resolve(&self.machine, &self.transport));
                }
                Command::ConnectResult {
                    generation,
                    outcome,
                } => self.on_connect_result(generation, outcome),
                Command::ConnectTimedOut { generation } => {
                    self.apply(Event::ConnectTimedOut { generation });
                }
                Command::RetryElapsed { generation } => {
                    self.apply(Event::RetryElapsed { generation });
                }
                Command::RemoteClosed { generation, error } => {
                    if matches!(self.watcher, Some((g, _)) if g == generation) {
                        self.watcher = None;
                    }
                    self.apply(Event::RemoteClosed { generation, error });
                }
                Command::End { done: ack } => {
                    done = Some(ack);
                    break;
                }
            }

            self.phase_tx.send_replace(self.machine.phase());
        }

        self.shutdown().await;

        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    // ------------------------------------------------------------------------
    // Command Handlers
    // ------------------------------------------------------------------------

    fn on_register(&mut self, caller: CallerId, sink: Arc<dyn StatusSink>) {
        if self.registry.register(caller, sink) == Membership::First {
            debug!(%caller, "First caller registered, connecting");
            self.apply(Event::Connect);
        }
    }

    fn on_deregister(&mut self, caller: CallerId) {
        if self.registry.deregister(caller) == Membership::Emptied && self.disconnect_when_empty {
            debug!("Last caller left, disconnecting");
            self.apply(Event::Park);
        }
    }

    fn on_connect_result(&mut self, generation: Generation, outcome: Result<Established>) {
        if matches!(self.attempt, Some((g, _)) if g == generation) {
            self.attempt = None;
        }

        let mut watcher = None;
        let event = match outcome {
            Ok(Established { link, closed }) => {
                watcher = Some(self.watch_close(generation, closed));
                Event::ConnectSucceeded {
                    generation,
                    handle: link,
                }
            }
            Err(error) => Event::ConnectFailed { generation, error },
        };

        self.apply(event);

        // A rejected link gets closed; its watcher reports a stale close
        if let Some(watcher) = watcher
            && self.machine.is_connected()
            && self.machine.generation() == generation
        {
            self.watcher = Some((generation, watcher));
        }
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    fn apply(&mut self, event: Event<Arc<dyn Link>>) {
        for effect in self.machine.handle(event) {
            self.perform(effect);
        }
    }

    fn perform(&mut self, effect: Effect<Arc<dyn Link>>) {
        match effect {
            Effect::Broadcast(status) => {
                info!(status = %status.text, callers = self.registry.len(), "Connection status");
                self.registry.broadcast(status);
            }

            Effect::StartConnect { generation } => self.start_connect(generation),

            Effect::ArmConnectTimeout { generation, after } => {
                let timer = self.schedule(after, Command::ConnectTimedOut { generation });
                if let Some(old) = self.connect_timer.replace(timer) {
                    old.abort();
                }
            }

            Effect::CancelConnectTimeout { generation } => {
                trace!(%generation, "Connect timeout disarmed");
                if let Some(timer) = self.connect_timer.take() {
                    timer.abort();
                }
            }

            Effect::AbortAttempt { generation, cause } => {
                if let Some((g, task)) = self.attempt.take() {
                    if g == generation {
                        match cause {
                            Some(cause) => {
                                debug!(%generation, error = %cause, "Aborting connect attempt");
                            }
                            None => debug!(%generation, "Aborting connect attempt"),
                        }
                        task.abort();
                    } else {
                        self.attempt = Some((g, task));
                    }
                }
            }

            Effect::ScheduleRetry { generation, after } => {
                debug!(%generation, delay_ms = after.as_millis() as u64, "Reconnect scheduled");
                let timer = self.schedule(after, Command::RetryElapsed { generation });
                if let Some(old) = self.retry_timer.replace(timer) {
                    old.abort();
                }
            }

            Effect::CancelRetry => {
                if let Some(timer) = self.retry_timer.take() {
                    timer.abort();
                }
            }

            Effect::CloseHandle(link) => link.close(),
        }
    }

    fn start_connect(&mut self, generation: Generation) {
        let Transport::Persistent { connector, kind } = &self.transport else {
            return;
        };

        trace!(%generation, %kind, "Issuing connect");
        let connector = Arc::clone(connector);
        let tx = self.command_tx.clone();

        let task = tokio::spawn(async move {
            let outcome = connector.connect().await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::ConnectResult {
                    generation,
                    outcome,
                });
            }
        });

        self.attempt = Some((generation, task));
    }

    /// Delivers `command` after `after` unless aborted first.
    fn schedule(&self, after: Duration, command: Command) -> AbortHandle {
        let tx = self.command_tx.clone();

        tokio::spawn(async move {
            sleep(after).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(command);
            }
        })
        .abort_handle()
    }

    /// Forwards the link's close signal as a [`Command::RemoteClosed`].
    fn watch_close(&self, generation: Generation, closed: CloseSignal) -> JoinHandle<()> {
        let tx = self.command_tx.clone();

        tokio::spawn(async move {
            let error = closed.await.unwrap_or(None);
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::RemoteClosed { generation, error });
            }
        })
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    async fn shutdown(&mut self) {
        self.apply(Event::End);
        self.phase_tx.send_replace(Phase::Ended);

        for timer in [self.connect_timer.take(), self.retry_timer.take()]
            .into_iter()
            .flatten()
        {
            timer.abort();
        }

        if let Some((_, task)) = self.attempt.take() {
            task.abort();
            let _ = task.await;
        }

        // The watcher finishes once the link's event loop has stopped
        if let Some((_, watcher)) = self.watcher.take()
            && timeout(CLOSE_GRACE, watcher).await.is_err()
        {
            debug!("Link did not close within grace period");
        }

        self.command_rx.close();
        info!("Client ended");
    }
}
