//! Subscription set tracking for WebSocket-based feeds.
//!
//! The book feed's token set changes as markets roll (§4.11 "token-set
//! roll"); this tracks the active set and exposes a notifier the book
//! consumer can race against its next-frame future to detect the change.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Notify;

pub struct SubscriptionManager {
    active: Arc<RwLock<HashSet<String>>>,
    resubscribe: Arc<Notify>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            active: Arc::new(RwLock::new(HashSet::new())),
            resubscribe: Arc::new(Notify::new()),
        }
    }

    pub fn active_subscriptions(&self) -> Vec<String> {
        self.active.read().iter().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.active.read().contains(id)
    }

    pub fn add(&self, id: String) -> bool {
        self.active.write().insert(id)
    }

    pub fn remove(&self, id: &str) -> bool {
        self.active.write().remove(id)
    }

    /// Replace the active set wholesale. Returns `true` if the set actually
    /// changed, and notifies any waiter racing `wait_for_resubscribe`.
    pub fn set(&self, ids: impl IntoIterator<Item = String>) -> bool {
        let new_set: HashSet<String> = ids.into_iter().collect();
        let changed = {
            let mut active = self.active.write();
            if *active == new_set {
                false
            } else {
                *active = new_set;
                true
            }
        };
        if changed {
            self.resubscribe.notify_waiters();
        }
        changed
    }

    pub fn clear(&self) {
        self.active.write().clear();
    }

    /// Resolves once `set()` has changed the active subscription set since
    /// the last call. Intended to be raced against the feed's next-frame
    /// future inside a `tokio::select!`.
    pub async fn wait_for_resubscribe(&self) {
        self.resubscribe.notified().await;
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
