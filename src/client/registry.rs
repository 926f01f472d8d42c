//! Registry of callers sharing one connection.
//!
//! The first registration triggers a connect. Removing the last caller
//! does nothing unless the client is configured to disconnect when empty.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::trace;

use crate::identifiers::CallerId;
use crate::protocol::Status;

// ============================================================================
// StatusSink
// ============================================================================

/// Receives status pushes for one caller.
///
/// Sinks run on the client's worker task and should return quickly.
pub trait StatusSink: Send + Sync {
    /// Called for every status change.
    fn on_status(&self, status: Status);
}

impl<F> StatusSink for F
where
    F: Fn(Status) + Send + Sync,
{
    fn on_status(&self, status: Status) {
        self(status);
    }
}

impl StatusSink for mpsc::UnboundedSender<Status> {
    fn on_status(&self, status: Status) {
        // Receiver gone means the caller stopped listening
        let _ = self.send(status);
    }
}

// ============================================================================
// Membership
// ============================================================================

/// Size transition caused by a registry change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Registry went from empty to one caller.
    First,
    /// Registry was already non-empty.
    Joined,
    /// A caller left and others remain.
    Left,
    /// The last caller left.
    Emptied,
    /// The caller was not registered.
    Unknown,
}

// ============================================================================
// CallerRegistry
// ============================================================================

/// Mapping from caller identity to its status sink.
#[derive(Default)]
pub struct CallerRegistry {
    callers: FxHashMap<CallerId, Arc<dyn StatusSink>>,
}

impl CallerRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a caller.
    ///
    /// Re-registering a known caller swaps its sink and reports
    /// [`Membership::Joined`].
    pub fn register(&mut self, caller: CallerId, sink: Arc<dyn StatusSink>) -> Membership {
        let was_empty = self.callers.is_empty();
        self.callers.insert(caller, sink);
        trace!(%caller, callers = self.callers.len(), "Caller registered");

        if was_empty {
            Membership::First
        } else {
            Membership::Joined
        }
    }

    /// Removes a caller.
    pub fn deregister(&mut self, caller: CallerId) -> Membership {
        if self.callers.remove(&caller).is_none() {
            return Membership::Unknown;
        }
        trace!(%caller, callers = self.callers.len(), "Caller deregistered");

        if self.callers.is_empty() {
            Membership::Emptied
        } else {
            Membership::Left
        }
    }

    /// Pushes `status` to every registered caller.
    pub fn broadcast(&self, status: Status) {
        for sink in self.callers.values() {
            sink.on_status(status);
        }
    }

    /// Returns `true` if `caller` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, caller: CallerId) -> bool {
        self.callers.contains_key(&caller)
    }

    /// Number of registered callers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.callers.len()
    }

    /// Returns `true` if no caller is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callers.is_empty()
    }
}

impl fmt::Debug for CallerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerRegistry")
            .field("callers", &self.callers.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    fn recording_sink() -> (Arc<dyn StatusSink>, Arc<Mutex<Vec<Status>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: Arc<dyn StatusSink> =
            Arc::new(move |status: Status| sink_seen.lock().push(status));
        (sink, seen)
    }

    #[test]
    fn test_first_registration() {
        let mut registry = CallerRegistry::new();
        let (sink, _) = recording_sink();

        assert_eq!(
            registry.register(CallerId::generate(), Arc::clone(&sink)),
            Membership::First
        );
        assert_eq!(
            registry.register(CallerId::generate(), sink),
            Membership::Joined
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reregistration_is_not_first() {
        let mut registry = CallerRegistry::new();
        let caller = CallerId::generate();
        let (sink, _) = recording_sink();

        registry.register(caller, Arc::clone(&sink));
        assert_eq!(registry.register(caller, sink), Membership::Joined);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_deregister_transitions() {
        let mut registry = CallerRegistry::new();
        let (a, b) = (CallerId::generate(), CallerId::generate());
        let (sink, _) = recording_sink();
        registry.register(a, Arc::clone(&sink));
        registry.register(b, sink);

        assert_eq!(registry.deregister(a), Membership::Left);
        assert_eq!(registry.deregister(a), Membership::Unknown);
        assert_eq!(registry.deregister(b), Membership::Emptied);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_reaches_every_caller() {
        let mut registry = CallerRegistry::new();
        let (sink_a, seen_a) = recording_sink();
        let (sink_b, seen_b) = recording_sink();
        registry.register(CallerId::generate(), sink_a);
        registry.register(CallerId::generate(), sink_b);

        registry.broadcast(Status::CONNECTING);
        registry.broadcast(Status::CONNECTED);

        let expected = vec![Status::CONNECTING, Status::CONNECTED];
        assert_eq!(*seen_a.lock(), expected);
        assert_eq!(*seen_b.lock(), expected);
    }

    #[test]
    fn test_channel_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Status>();
        let mut registry = CallerRegistry::new();
        registry.register(CallerId::generate(), Arc::new(tx));

        registry.broadcast(Status::DISCONNECTED);
        assert_eq!(rx.try_recv().expect("status"), Status::DISCONNECTED);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn first_reported_once_per_empty_to_nonempty(
                ops in proptest::collection::vec((any::<bool>(), 0usize..4), 0..64)
            ) {
                let callers: Vec<CallerId> = (0..4).map(|_| CallerId::generate()).collect();
                let (sink, _) = recording_sink();
                let mut registry = CallerRegistry::new();
                let mut firsts = 0usize;
                let mut transitions = 0usize;

                for (register, index) in ops {
                    let before = registry.len();
                    let membership = if register {
                        registry.register(callers[index], Arc::clone(&sink))
                    } else {
                        registry.deregister(callers[index])
                    };
                    if before == 0 && registry.len() == 1 {
                        transitions += 1;
                    }
                    if membership == Membership::First {
                        firsts += 1;
                    }
                }

                prop_assert_eq!(firsts, transitions);
            }
        }
    }
}
