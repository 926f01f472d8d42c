//! Connection state machine.
//!
//! Pure transition logic: [`Machine::handle`] consumes one [`Event`] and
//! returns the [`Effect`]s the worker must perform (status broadcasts,
//! connect attempts, timers, closing handles). No I/O happens here, so
//! every transition is testable without sockets or real time.
//!
//! # States
//!
//! ```text
//!            connect()                 success
//!   Idle ───────────────► Connecting ───────────► Connected
//!    ▲  ◄── retry delay ──┘  │  ▲                     │
//!    │        failure        │  └── timeout (socket) ─┘ (re-connect)
//!    └──── retry delay ◄─────┼─────── remote close ───┘
//!                            ▼
//!                 end() from any state ──► Ended
//! ```
//!
//! Every connect attempt gets a new [`Generation`]. Timers, connect
//! results and close notifications carry the generation they belong to;
//! anything from an older generation, or arriving after `end`, is ignored.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::protocol::Status;
use crate::transport::TransportKind;

// ============================================================================
// Generation
// ============================================================================

/// Identifies one connect attempt and everything scheduled on its behalf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    /// Returns the following generation.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Raw counter value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Phase
// ============================================================================

/// Coarse connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No connection and no attempt in flight.
    Idle,
    /// A connect attempt is in flight.
    Connecting,
    /// Calls can be dispatched.
    Connected,
    /// Terminal.
    Ended,
}

// ============================================================================
// Event / Effect
// ============================================================================

/// Input to the state machine.
#[derive(Debug)]
pub enum Event<H> {
    /// Start connecting unless already connected, connecting or ended.
    Connect,
    /// A connect attempt produced a handle.
    ConnectSucceeded {
        /// Attempt the result belongs to.
        generation: Generation,
        /// Established connection.
        handle: H,
    },
    /// A connect attempt failed.
    ConnectFailed {
        /// Attempt the result belongs to.
        generation: Generation,
        /// Transport error.
        error: Error,
    },
    /// The socket connect timeout fired.
    ConnectTimedOut {
        /// Attempt the timer guarded.
        generation: Generation,
    },
    /// The retry delay elapsed.
    RetryElapsed {
        /// Generation that scheduled the retry.
        generation: Generation,
    },
    /// An established connection dropped.
    RemoteClosed {
        /// Generation of the dropped connection.
        generation: Generation,
        /// Reason, if the transport reported one.
        error: Option<Error>,
    },
    /// The last caller left and the policy asks to disconnect.
    Park,
    /// Explicit shutdown.
    End,
}

/// Work the worker performs on behalf of a transition.
#[derive(Debug)]
pub enum Effect<H> {
    /// Push a status to every registered caller.
    Broadcast(Status),
    /// Issue an asynchronous connect.
    StartConnect {
        /// Attempt identifier.
        generation: Generation,
    },
    /// Fire [`Event::ConnectTimedOut`] after `after`.
    ArmConnectTimeout {
        /// Attempt to guard.
        generation: Generation,
        /// Timeout.
        after: Duration,
    },
    /// Disarm the connect timeout.
    CancelConnectTimeout {
        /// Attempt it guarded.
        generation: Generation,
    },
    /// Forcibly end an in-flight connect attempt.
    AbortAttempt {
        /// Attempt to abort.
        generation: Generation,
        /// Why the attempt was abandoned; `None` on shutdown.
        cause: Option<Error>,
    },
    /// Fire [`Event::RetryElapsed`] after `after`.
    ScheduleRetry {
        /// Generation that scheduled the retry.
        generation: Generation,
        /// Delay.
        after: Duration,
    },
    /// Cancel every scheduled retry.
    CancelRetry,
    /// Close a connection handle.
    CloseHandle(H),
}

// ============================================================================
// ConnectionState
// ============================================================================

/// Mutable connection state, owned exclusively by the [`Machine`].
///
/// `connected` and `connecting` are never both true. Once `ended` is set
/// no transition schedules further work.
#[derive(Debug)]
pub struct ConnectionState<H> {
    connected: bool,
    connecting: bool,
    ended: bool,
    active: Option<H>,
    pending_timeout: Option<Generation>,
    generation: Generation,
}

impl<H> Default for ConnectionState<H> {
    fn default() -> Self {
        Self {
            connected: false,
            connecting: false,
            ended: false,
            active: None,
            pending_timeout: None,
            generation: Generation::default(),
        }
    }
}

// ============================================================================
// Machine
// ============================================================================

/// Timing and transport parameters of the machine.
#[derive(Debug, Clone, Copy)]
pub struct MachineConfig {
    /// Transport kind.
    pub kind: TransportKind,
    /// Fixed reconnect delay.
    pub retry_delay: Duration,
    /// Socket connect timeout.
    pub connect_timeout: Duration,
}

/// Connection state machine over handles of type `H`.
#[derive(Debug)]
pub struct Machine<H> {
    config: MachineConfig,
    state: ConnectionState<H>,
}

impl<H> Machine<H> {
    /// Creates an idle machine.
    #[must_use]
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            state: ConnectionState::default(),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        let state = &self.state;
        if state.ended {
            Phase::Ended
        } else if state.connected {
            Phase::Connected
        } else if state.connecting {
            Phase::Connecting
        } else {
            Phase::Idle
        }
    }

    /// Returns `true` while calls may be dispatched.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.connected
    }

    /// Returns `true` while a connect attempt is in flight.
    #[inline]
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state.connecting
    }

    /// Returns `true` once [`Event::End`] has been handled.
    #[inline]
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.state.ended
    }

    /// Active connection handle, present only for connected persistent
    /// transports.
    #[inline]
    #[must_use]
    pub fn active(&self) -> Option<&H> {
        self.state.active.as_ref()
    }

    /// Transport kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.config.kind
    }

    /// Generation of the latest connect attempt.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.state.generation
    }

    /// Applies one event and returns the effects to perform, in order.
    pub fn handle(&mut self, event: Event<H>) -> Vec<Effect<H>> {
        let mut effects = Vec::new();

        match event {
            Event::Connect => self.connect(&mut effects),
            Event::ConnectSucceeded { generation, handle } => {
                self.on_connect_succeeded(generation, handle, &mut effects);
            }
            Event::ConnectFailed { generation, error } => {
                self.on_connect_failed(generation, error, &mut effects);
            }
            Event::ConnectTimedOut { generation } => {
                self.on_connect_timed_out(generation, &mut effects);
            }
            Event::RetryElapsed { generation } => self.on_retry_elapsed(generation, &mut effects),
            Event::RemoteClosed { generation, error } => {
                self.on_remote_closed(generation, error, &mut effects);
            }
            Event::Park => self.park(&mut effects),
            Event::End => self.end(&mut effects),
        }

        effects
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    fn connect(&mut self, effects: &mut Vec<Effect<H>>) {
        let state = &mut self.state;
        if state.connected || state.connecting || state.ended {
            trace!(
                connected = state.connected,
                connecting = state.connecting,
                ended = state.ended,
                "Connect ignored"
            );
            return;
        }

        state.generation = state.generation.next();
        let generation = state.generation;
        effects.push(Effect::Broadcast(Status::CONNECTING));

        match self.config.kind {
            // Stateless: nothing to open
            TransportKind::Http => {
                state.connected = true;
                effects.push(Effect::Broadcast(Status::CONNECTED));
                debug!(%generation, "HTTP transport ready");
            }
            kind => {
                state.connecting = true;
                effects.push(Effect::StartConnect { generation });

                if kind.arms_connect_timeout() {
                    state.pending_timeout = Some(generation);
                    effects.push(Effect::ArmConnectTimeout {
                        generation,
                        after: self.config.connect_timeout,
                    });
                }
                debug!(%generation, %kind, "Connect attempt started");
            }
        }
    }

    /// Closes out the in-flight attempt. Returns `false` if `generation`
    /// is not the attempt currently in flight.
    fn settle_attempt(&mut self, generation: Generation, effects: &mut Vec<Effect<H>>) -> bool {
        let state = &mut self.state;
        if state.ended || !state.connecting || generation != state.generation {
            return false;
        }

        state.connecting = false;
        if let Some(pending) = state.pending_timeout.take() {
            effects.push(Effect::CancelConnectTimeout {
                generation: pending,
            });
        }
        true
    }

    fn on_connect_succeeded(
        &mut self,
        generation: Generation,
        handle: H,
        effects: &mut Vec<Effect<H>>,
    ) {
        if !self.settle_attempt(generation, effects) {
            debug!(%generation, "Discarding connection from stale attempt");
            effects.push(Effect::CloseHandle(handle));
            return;
        }

        self.state.connected = true;
        self.state.active = Some(handle);
        effects.push(Effect::Broadcast(Status::CONNECTED));
        debug!(%generation, "Connected");
    }

    fn on_connect_failed(
        &mut self,
        generation: Generation,
        error: Error,
        effects: &mut Vec<Effect<H>>,
    ) {
        if !self.settle_attempt(generation, effects) {
            trace!(%generation, error = %error, "Ignoring failure of stale attempt");
            return;
        }

        warn!(%generation, error = %error, "Connect attempt failed");
        self.state.connected = false;
        effects.push(Effect::Broadcast(Status::DISCONNECTED));
        effects.push(Effect::ScheduleRetry {
            generation,
            after: self.config.retry_delay,
        });
    }

    fn on_connect_timed_out(&mut self, generation: Generation, effects: &mut Vec<Effect<H>>) {
        let state = &mut self.state;
        if state.ended
            || !state.connecting
            || generation != state.generation
            || state.pending_timeout != Some(generation)
        {
            trace!(%generation, "Ignoring stale connect timeout");
            return;
        }

        let cause = Error::connection_timeout(self.config.connect_timeout.as_millis() as u64);
        warn!(%generation, error = %cause, "Connect attempt timed out, retrying");
        state.pending_timeout = None;
        state.connecting = false;
        effects.push(Effect::AbortAttempt {
            generation,
            cause: Some(cause),
        });

        self.connect(effects);
    }

    fn on_retry_elapsed(&mut self, generation: Generation, effects: &mut Vec<Effect<H>>) {
        if self.state.ended || generation != self.state.generation {
            trace!(%generation, "Ignoring stale retry");
            return;
        }

        self.connect(effects);
    }

    fn on_remote_closed(
        &mut self,
        generation: Generation,
        error: Option<Error>,
        effects: &mut Vec<Effect<H>>,
    ) {
        let state = &mut self.state;
        if !state.connected || generation != state.generation {
            trace!(%generation, "Ignoring close of inactive connection");
            return;
        }

        effects.push(Effect::Broadcast(Status::DISCONNECTED));
        match error {
            Some(error) => warn!(%generation, error = %error, "Connection closed by remote"),
            None => warn!(%generation, "Connection closed by remote"),
        }

        state.connected = false;
        state.active = None;

        if !state.ended {
            effects.push(Effect::ScheduleRetry {
                generation,
                after: self.config.retry_delay,
            });
        }
    }

    /// Stops connecting and drops the connection without ending.
    fn park(&mut self, effects: &mut Vec<Effect<H>>) {
        if self.state.ended {
            return;
        }

        self.tear_down(effects);
        // Invalidate timers armed for the previous generation
        self.state.generation = self.state.generation.next();
        debug!("Parked with no callers");
    }

    fn end(&mut self, effects: &mut Vec<Effect<H>>) {
        if self.state.ended {
            trace!("Already ended");
            return;
        }

        self.state.ended = true;
        self.tear_down(effects);
        debug!("Ended");
    }

    fn tear_down(&mut self, effects: &mut Vec<Effect<H>>) {
        let state = &mut self.state;

        if state.connecting {
            effects.push(Effect::AbortAttempt {
                generation: state.generation,
                cause: None,
            });
        }
        if let Some(pending) = state.pending_timeout.take() {
            effects.push(Effect::CancelConnectTimeout {
                generation: pending,
            });
        }
        effects.push(Effect::CancelRetry);
        if let Some(handle) = state.active.take() {
            effects.push(Effect::CloseHandle(handle));
        }

        state.connected = false;
        state.connecting = false;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Stand-in connection handle.
    #[derive(Debug, PartialEq, Eq)]
    struct Handle(u32);

    fn machine(kind: TransportKind) -> Machine<Handle> {
        Machine::new(MachineConfig {
            kind,
            retry_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
        })
    }

    fn broadcasts(effects: &[Effect<Handle>]) -> Vec<Status> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Broadcast(status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    fn connects(effects: &[Effect<Handle>]) -> Vec<Generation> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::StartConnect { generation } => Some(*generation),
                _ => None,
            })
            .collect()
    }

    fn retries(effects: &[Effect<Handle>]) -> Vec<Generation> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::ScheduleRetry { generation, .. } => Some(*generation),
                _ => None,
            })
            .collect()
    }

    /// Drives a websocket machine to Connected and returns its generation.
    fn connected_machine(kind: TransportKind) -> (Machine<Handle>, Generation) {
        let mut machine = machine(kind);
        let effects = machine.handle(Event::Connect);
        let generation = connects(&effects)[0];
        machine.handle(Event::ConnectSucceeded {
            generation,
            handle: Handle(1),
        });
        assert_eq!(machine.phase(), Phase::Connected);
        (machine, generation)
    }

    #[test]
    fn test_initial_state() {
        let machine = machine(TransportKind::Socket);
        assert_eq!(machine.phase(), Phase::Idle);
        assert!(machine.active().is_none());
    }

    #[test]
    fn test_http_connects_synchronously() {
        let mut machine = machine(TransportKind::Http);

        let effects = machine.handle(Event::Connect);

        assert_eq!(broadcasts(&effects), vec![Status::CONNECTING, Status::CONNECTED]);
        assert!(connects(&effects).is_empty());
        assert!(machine.is_connected());
        assert!(machine.active().is_none());
    }

    #[test]
    fn test_websocket_connect_does_not_arm_timeout() {
        let mut machine = machine(TransportKind::WebSocket);

        let effects = machine.handle(Event::Connect);

        assert_eq!(broadcasts(&effects), vec![Status::CONNECTING]);
        assert_eq!(connects(&effects).len(), 1);
        assert!(
            !effects
                .iter()
                .any(|e| matches!(e, Effect::ArmConnectTimeout { .. }))
        );
        assert_eq!(machine.phase(), Phase::Connecting);
    }

    #[test]
    fn test_socket_connect_arms_timeout() {
        let mut machine = machine(TransportKind::Socket);

        let effects = machine.handle(Event::Connect);

        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::ArmConnectTimeout { after, .. } if *after == Duration::from_secs(1)
        )));
    }

    #[test]
    fn test_connect_is_noop_while_connecting_or_connected() {
        let mut machine = machine(TransportKind::WebSocket);
        machine.handle(Event::Connect);
        assert!(machine.handle(Event::Connect).is_empty());

        let (mut machine, _) = connected_machine(TransportKind::WebSocket);
        assert!(machine.handle(Event::Connect).is_empty());
    }

    #[test]
    fn test_success_stores_handle_and_cancels_timeout() {
        let mut machine = machine(TransportKind::Socket);
        let generation = connects(&machine.handle(Event::Connect))[0];

        let effects = machine.handle(Event::ConnectSucceeded {
            generation,
            handle: Handle(7),
        });

        assert!(
            effects
                .iter()
                .any(|e| matches!(e, Effect::CancelConnectTimeout { .. }))
        );
        assert_eq!(broadcasts(&effects), vec![Status::CONNECTED]);
        assert_eq!(machine.active(), Some(&Handle(7)));
        assert!(!machine.is_connecting());
    }

    #[test]
    fn test_failure_broadcasts_and_schedules_retry() {
        let mut machine = machine(TransportKind::WebSocket);
        let generation = connects(&machine.handle(Event::Connect))[0];

        let effects = machine.handle(Event::ConnectFailed {
            generation,
            error: Error::connection("refused"),
        });

        assert_eq!(broadcasts(&effects), vec![Status::DISCONNECTED]);
        assert_eq!(retries(&effects), vec![generation]);
        assert_eq!(machine.phase(), Phase::Idle);

        let effects = machine.handle(Event::RetryElapsed { generation });
        assert_eq!(connects(&effects).len(), 1);
        assert_eq!(machine.phase(), Phase::Connecting);
    }

    #[test]
    fn test_socket_timeout_aborts_and_reconnects() {
        let mut machine = machine(TransportKind::Socket);
        let first = connects(&machine.handle(Event::Connect))[0];

        let effects = machine.handle(Event::ConnectTimedOut { generation: first });

        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::AbortAttempt {
                generation,
                cause: Some(Error::ConnectionTimeout { timeout_ms: 1000 }),
            } if *generation == first
        )));
        let second = connects(&effects);
        assert_eq!(second.len(), 1);
        assert!(second[0] > first);
        assert_eq!(broadcasts(&effects), vec![Status::CONNECTING]);
        assert!(machine.is_connecting());

        // The aborted attempt's late result is discarded
        let effects = machine.handle(Event::ConnectSucceeded {
            generation: first,
            handle: Handle(1),
        });
        assert!(matches!(effects.as_slice(), [Effect::CloseHandle(Handle(1))]));
        assert!(!machine.is_connected());
    }

    #[test]
    fn test_timeout_after_success_is_ignored() {
        let (mut machine, generation) = connected_machine(TransportKind::Socket);
        assert!(machine.handle(Event::ConnectTimedOut { generation }).is_empty());
        assert!(machine.is_connected());
    }

    #[test]
    fn test_remote_close_schedules_retry() {
        let (mut machine, generation) = connected_machine(TransportKind::Socket);

        let effects = machine.handle(Event::RemoteClosed {
            generation,
            error: Some(Error::remote_closed("reset")),
        });

        assert_eq!(broadcasts(&effects), vec![Status::DISCONNECTED]);
        assert_eq!(retries(&effects), vec![generation]);
        assert!(machine.active().is_none());
        assert_eq!(machine.phase(), Phase::Idle);
    }

    #[test]
    fn test_stale_remote_close_is_ignored() {
        let (mut machine, generation) = connected_machine(TransportKind::WebSocket);
        let stale = Generation(generation.get() - 1);

        assert!(
            machine
                .handle(Event::RemoteClosed {
                    generation: stale,
                    error: None,
                })
                .is_empty()
        );
        assert!(machine.is_connected());
    }

    #[test]
    fn test_end_closes_handle_and_blocks_timers() {
        let (mut machine, generation) = connected_machine(TransportKind::Socket);
        machine.handle(Event::RemoteClosed {
            generation,
            error: None,
        });

        let effects = machine.handle(Event::End);
        assert!(effects.iter().any(|e| matches!(e, Effect::CancelRetry)));
        assert_eq!(machine.phase(), Phase::Ended);

        // The retry armed before end() fires afterwards
        assert!(machine.handle(Event::RetryElapsed { generation }).is_empty());
        assert!(machine.handle(Event::ConnectTimedOut { generation }).is_empty());
        assert!(machine.handle(Event::Connect).is_empty());
        assert_eq!(machine.phase(), Phase::Ended);
    }

    #[test]
    fn test_end_while_connected_closes_handle() {
        let (mut machine, _) = connected_machine(TransportKind::WebSocket);

        let effects = machine.handle(Event::End);

        assert!(
            effects
                .iter()
                .any(|e| matches!(e, Effect::CloseHandle(Handle(1))))
        );
        assert!(broadcasts(&effects).is_empty());
    }

    #[test]
    fn test_end_while_connecting_aborts_attempt() {
        let mut machine = machine(TransportKind::Socket);
        let generation = connects(&machine.handle(Event::Connect))[0];

        let effects = machine.handle(Event::End);
        assert!(
            effects
                .iter()
                .any(|e| matches!(e, Effect::AbortAttempt { cause: None, .. }))
        );

        // A connection arriving after end() is closed, not adopted
        let effects = machine.handle(Event::ConnectSucceeded {
            generation,
            handle: Handle(3),
        });
        assert!(matches!(effects.as_slice(), [Effect::CloseHandle(Handle(3))]));
        assert!(!machine.is_connected());
    }

    #[test]
    fn test_end_is_idempotent() {
        let mut machine = machine(TransportKind::Http);
        machine.handle(Event::End);
        assert!(machine.handle(Event::End).is_empty());
    }

    #[test]
    fn test_park_invalidates_retry_and_allows_reconnect() {
        let (mut machine, generation) = connected_machine(TransportKind::WebSocket);
        machine.handle(Event::RemoteClosed {
            generation,
            error: None,
        });

        machine.handle(Event::Park);
        assert_eq!(machine.phase(), Phase::Idle);
        assert!(machine.handle(Event::RetryElapsed { generation }).is_empty());

        let effects = machine.handle(Event::Connect);
        assert_eq!(connects(&effects).len(), 1);
    }

    #[test]
    fn test_connected_and_connecting_never_both_true() {
        let mut machine = machine(TransportKind::Socket);
        let generation = connects(&machine.handle(Event::Connect))[0];
        machine.handle(Event::ConnectTimedOut { generation });
        let generation = machine.generation();
        machine.handle(Event::ConnectSucceeded {
            generation,
            handle: Handle(2),
        });

        assert!(machine.is_connected());
        assert!(!machine.is_connecting());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        /// Builds an event from a selector and a generation offset relative
        /// to the current attempt, so sequences hit both live and stale
        /// generations.
        fn event(machine: &Machine<Handle>, selector: u8, back: u64) -> Event<Handle> {
            let generation = Generation(machine.generation().get().saturating_sub(back));
            match selector {
                0 => Event::Connect,
                1 => Event::ConnectSucceeded {
                    generation,
                    handle: Handle(0),
                },
                2 => Event::ConnectFailed {
                    generation,
                    error: Error::connection("refused"),
                },
                3 => Event::ConnectTimedOut { generation },
                4 => Event::RetryElapsed { generation },
                5 => Event::RemoteClosed {
                    generation,
                    error: None,
                },
                6 => Event::Park,
                _ => Event::End,
            }
        }

        fn kind() -> impl Strategy<Value = TransportKind> {
            prop_oneof![
                Just(TransportKind::Http),
                Just(TransportKind::Socket),
                Just(TransportKind::WebSocket),
            ]
        }

        proptest! {
            #[test]
            fn never_connected_and_connecting(
                kind in kind(),
                ops in proptest::collection::vec((0u8..8, 0u64..2), 0..64)
            ) {
                let mut machine = machine(kind);
                for (selector, back) in ops {
                    let event = event(&machine, selector, back);
                    machine.handle(event);
                    prop_assert!(!(machine.is_connected() && machine.is_connecting()));
                    prop_assert!(machine.active().is_none() || machine.is_connected());
                }
            }

            #[test]
            fn nothing_happens_after_end(
                kind in kind(),
                before in proptest::collection::vec((0u8..7, 0u64..2), 0..32),
                after in proptest::collection::vec((0u8..8, 0u64..3), 0..32)
            ) {
                let mut machine = machine(kind);
                for (selector, back) in before {
                    let event = event(&machine, selector, back);
                    machine.handle(event);
                }
                machine.handle(Event::End);

                for (selector, back) in after {
                    let event = event(&machine, selector, back);
                    let effects = machine.handle(event);
                    // A late connection is handed back to be closed
                    prop_assert!(effects.iter().all(|e| matches!(e, Effect::CloseHandle(_))));
                    prop_assert_eq!(machine.phase(), Phase::Ended);
                }
            }
        }
    }
}
