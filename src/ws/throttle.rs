//! Rate-limited delivery of a bursty stream of values.
//!
//! An [`UpdateThrottle`] forwards at most one value per interval to its
//! consumer. A value that arrives once the interval since the last
//! immediate delivery has elapsed is delivered on the spot. A value that
//! arrives earlier replaces any deferred delivery already scheduled and is
//! itself scheduled for the end of the window, so only the newest value of
//! a burst survives. Nothing is queued.
//!
//! The window starts when the throttle is created. Deferred flushes do not
//! move it; only immediate deliveries do.
//!
//! Deferred deliveries run on a Tokio task, so [`UpdateThrottle::push`] must
//! be called from within a runtime.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::ws::handlers::invoke_guarded;

type Deliver<T> = Arc<dyn Fn(T) + Send + Sync>;

struct ThrottleState {
    last_delivered: Instant,
    pending: Option<JoinHandle<()>>,
    /// Bumped by every `push` and `cancel`. A deferred task only delivers
    /// while its captured value is still current.
    seq: u64,
}

impl ThrottleState {
    /// Drop the scheduled task and invalidate any task already running.
    fn supersede(&mut self) -> u64 {
        self.seq += 1;
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        self.seq
    }

    /// Called by a woken deferred task; `true` when it may deliver.
    fn claim(&mut self, seq: u64) -> bool {
        if self.seq != seq {
            return false;
        }
        self.pending = None;
        true
    }
}

/// Coalescing rate limiter in front of a consumer callback.
///
/// Cloning yields another handle to the same throttle.
pub struct UpdateThrottle<T> {
    interval: Duration,
    deliver: Deliver<T>,
    state: Arc<Mutex<ThrottleState>>,
}

impl<T> Clone for UpdateThrottle<T> {
    fn clone(&self) -> Self {
        Self {
            interval: self.interval,
            deliver: self.deliver.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T> std::fmt::Debug for UpdateThrottle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateThrottle")
            .field("interval", &self.interval)
            .field("has_pending", &self.has_pending())
            .finish()
    }
}

impl<T: Send + 'static> UpdateThrottle<T> {
    /// Create a throttle that calls `deliver` at most once per `interval`.
    pub fn new(interval: Duration, deliver: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            interval,
            deliver: Arc::new(deliver),
            state: Arc::new(Mutex::new(ThrottleState {
                last_delivered: Instant::now(),
                pending: None,
                seq: 0,
            })),
        }
    }

    /// Offer a value.
    pub fn push(&self, value: T) {
        let now = Instant::now();
        let mut state = self.lock();
        let seq = state.supersede();

        let elapsed = now.saturating_duration_since(state.last_delivered);
        if elapsed >= self.interval {
            state.last_delivered = now;
            drop(state);
            let deliver = self.deliver.clone();
            invoke_guarded("throttle", move || deliver(value));
            return;
        }

        let wait = self.interval - elapsed;
        let deliver = self.deliver.clone();
        let shared = self.state.clone();
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let current = shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .claim(seq);
            if current {
                invoke_guarded("throttle", move || deliver(value));
            }
        }));
    }
}

impl<T> UpdateThrottle<T> {
    /// Drop any deferred delivery.
    pub fn cancel(&self) {
        self.lock().supersede();
    }

    /// Whether a deferred delivery is scheduled.
    pub fn has_pending(&self) -> bool {
        self.lock()
            .pending
            .as_ref()
            .is_some_and(|p| !p.is_finished())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ThrottleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
