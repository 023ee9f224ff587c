//! Store listeners.
//!
//! A listener is any callback that wants to hear about committed store
//! mutations (usually a view re-rendering itself).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::warn;

use super::StoreEvent;
use crate::error::ListenerError;

/// Unique identifier for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) type Listener = Arc<dyn Fn(&StoreEvent) -> Result<(), ListenerError> + Send + Sync>;

/// The set of listeners attached to one store.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.write().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) {
        self.listeners.write().retain(|(existing, _)| *existing != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Call every listener with `event`.
    ///
    /// The registry lock is released before any listener runs, so listeners
    /// may subscribe, unsubscribe or mutate the store. A listener that fails
    /// or panics is logged and skipped. Returns how many listeners failed.
    pub(crate) fn notify(&self, event: &StoreEvent) -> usize {
        let listeners: Vec<(ListenerId, Listener)> = self.listeners.read().clone();
        let mut failures = 0;

        for (id, listener) in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(event)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(listener = ?id, version = event.version, error = %err, "store listener failed");
                }
                Err(_) => {
                    failures += 1;
                    warn!(listener = ?id, version = event.version, "store listener panicked");
                }
            }
        }

        failures
    }
}

/// Handle to a registered listener.
///
/// Dropping this handle unsubscribes the listener.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: ListenerId,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, registry: &Arc<ListenerRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
