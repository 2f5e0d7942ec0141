//! Publish/subscribe bus used to wake the agent on network changes

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use tracing::{debug, error, info};

use crate::events::watcher::{self, WatcherHandle};

/// Why the bus was poked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeReason {
    Connected,
    Disconnected,
    Manual,
}

impl fmt::Display for WakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeReason::Connected => write!(f, "connected"),
            WakeReason::Disconnected => write!(f, "disconnected"),
            WakeReason::Manual => write!(f, "manual"),
        }
    }
}

type Callback = Arc<dyn Fn(WakeReason) + Send + Sync>;

#[derive(Default)]
struct BusState {
    subscribers: Vec<(u64, Callback)>,
    next_id: u64,
    watcher: Option<WatcherHandle>,
}

/// Network change bus
///
/// Cheap to clone; all clones share the same subscriber list. Callbacks
/// run on the publishing task and must not block.
#[derive(Clone, Default)]
pub struct WakeBus {
    state: Arc<Mutex<BusState>>,
}

impl WakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`; it stays registered until the returned
    /// subscription is dropped or unsubscribed
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(WakeReason) + Send + Sync + 'static,
    {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.push((id, Arc::new(callback)));

        Subscription {
            id,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Notify every subscriber in registration order
    ///
    /// A panicking subscriber is logged and skipped.
    pub fn publish(&self, reason: WakeReason) {
        let targets: Vec<Callback> = lock(&self.state)
            .subscribers
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        debug!("Publishing network event {} to {} subscribers", reason, targets.len());
        for callback in targets {
            if catch_unwind(AssertUnwindSafe(|| callback(reason))).is_err() {
                error!("Network event subscriber failed on {}", reason);
            }
        }
    }

    pub fn poke(&self) {
        self.publish(WakeReason::Manual);
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    /// Start the platform watcher unless one is already running
    ///
    /// Returns whether a watcher is running afterwards. Must be called
    /// from within a tokio runtime.
    pub fn start_watcher(&self) -> bool {
        let mut state = lock(&self.state);
        if state.watcher.as_ref().is_some_and(|w| !w.is_finished()) {
            return true;
        }

        state.watcher = watcher::spawn(self.downgrade());
        state.watcher.is_some()
    }

    pub fn watcher_running(&self) -> bool {
        lock(&self.state)
            .watcher
            .as_ref()
            .is_some_and(|w| !w.is_finished())
    }

    /// Stop the platform watcher; publishing keeps working
    pub fn shutdown(&self) {
        let watcher = lock(&self.state).watcher.take();
        if let Some(watcher) = watcher {
            watcher.stop();
            info!("Network watcher stopped");
        }
    }

    pub(crate) fn downgrade(&self) -> WeakWakeBus {
        WeakWakeBus {
            state: Arc::downgrade(&self.state),
        }
    }
}

/// Bus reference held by the watcher so it does not keep the bus alive
#[derive(Clone)]
pub(crate) struct WeakWakeBus {
    state: Weak<Mutex<BusState>>,
}

impl WeakWakeBus {
    pub(crate) fn upgrade(&self) -> Option<WakeBus> {
        self.state.upgrade().map(|state| WakeBus { state })
    }
}

/// Registration handle returned by [`WakeBus::subscribe`]
pub struct Subscription {
    id: u64,
    state: Weak<Mutex<BusState>>,
}

impl Subscription {
    /// Remove the callback; calling this more than once is a no-op
    pub fn unsubscribe(&self) {
        if let Some(state) = self.state.upgrade() {
            lock(&state).subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Subscriber panics happen outside the lock, so poisoning only means a
/// panic inside this module; the list itself stays consistent.
fn lock(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}
