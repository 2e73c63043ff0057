//! Process-wide connectivity monitor.
//!
//! Single source of truth for "is the remote store currently reachable".
//! The flag is fed by the platform's connectivity signal (or a liveness
//! probe of the remote store); this module does not probe on its own.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type Callback = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle identifying a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Observable online/offline state with transition notifications.
pub struct ConnectivityMonitor {
    online: AtomicBool,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Callback)>>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial state. No notification is
    /// sent for the initial value.
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            next_id: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Current cached reachability. Not itself a network probe.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Feed a new reachability value from the platform signal.
    ///
    /// Subscribers are invoked synchronously, and only when the value
    /// actually changed (online -> online is not a transition).
    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return;
        }

        tracing::info!(
            "Connectivity changed: {}",
            if online { "online" } else { "offline" }
        );

        // snapshot under the lock, invoke outside it, so a callback may
        // subscribe/unsubscribe without deadlocking
        let callbacks: Vec<Callback> = self
            .lock_subscribers()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(online);
        }
    }

    /// Register a listener invoked with the new value on every transition.
    pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock_subscribers().push((id, Arc::new(callback)));
        SubscriptionId(id)
    }

    /// Remove a listener. Other subscribers are unaffected. Returns whether
    /// the subscription was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id.0);
        subscribers.len() != before
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Callback)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
