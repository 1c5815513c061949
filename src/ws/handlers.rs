//! Message handler registrations.
//!
//! Handlers live in an identity-keyed map owned by the manager. Each
//! registration returns a [`HandlerRegistration`] whose
//! [`remove`](HandlerRegistration::remove) deletes exactly that handler;
//! calling it twice, or after the manager is gone, does nothing.
//!
//! Dispatch snapshots the current handlers and calls them in registration
//! order outside the lock. A panicking handler is caught and logged, and
//! the remaining handlers still run.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::types::PriceReading;
use crate::ws::manager::FeedMessage;
use crate::ws::throttle::UpdateThrottle;

/// Callback invoked for every inbound message.
pub type MessageHandler = Arc<dyn Fn(&FeedMessage) + Send + Sync>;

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler({})", self.0)
    }
}

/// Run `f`, logging instead of unwinding if it panics.
pub(crate) fn invoke_guarded(context: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                context,
                panic = %panic_message(payload.as_ref()),
                "Handler panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

struct HandlerEntry {
    callback: MessageHandler,
    throttle: Option<UpdateThrottle<PriceReading>>,
}

/// The manager's handler collection.
#[derive(Default)]
pub(crate) struct HandlerSet {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<HandlerId, HandlerEntry>>,
}

impl HandlerSet {
    pub(crate) fn insert(
        self: &Arc<Self>,
        callback: MessageHandler,
        throttle: Option<UpdateThrottle<PriceReading>>,
    ) -> HandlerRegistration {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, HandlerEntry { callback, throttle });
        HandlerRegistration {
            id,
            set: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: HandlerId) -> bool {
        match self.lock().remove(&id) {
            Some(entry) => {
                if let Some(throttle) = entry.throttle {
                    throttle.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// Deliver `message` to every handler registered right now.
    pub(crate) fn dispatch(&self, message: &FeedMessage) {
        let snapshot: Vec<(HandlerId, MessageHandler)> = self
            .lock()
            .iter()
            .map(|(id, e)| (*id, e.callback.clone()))
            .collect();

        for (id, callback) in snapshot {
            invoke_guarded(&id.to_string(), || callback(message));
        }
    }

    /// Drop deferred deliveries of every throttled handler.
    pub(crate) fn cancel_throttles(&self) {
        for entry in self.lock().values() {
            if let Some(throttle) = &entry.throttle {
                throttle.cancel();
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<HandlerId, HandlerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owned by the caller that registered a handler; removes it on demand.
#[derive(Debug, Clone)]
pub struct HandlerRegistration {
    id: HandlerId,
    set: Weak<HandlerSet>,
}

impl HandlerRegistration {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Remove the handler. Returns `true` only on the call that removed it.
    pub fn remove(&self) -> bool {
        match self.set.upgrade() {
            Some(set) => set.remove(self.id),
            None => false,
        }
    }
}
