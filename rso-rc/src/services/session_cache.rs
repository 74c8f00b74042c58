//! Session-scoped cache and subscription layer
//!
//! Process-local, rebuilt from scratch each run and lazily repopulated
//! through the fetch orchestrator. Gives repeat lookups a near-zero-latency
//! exact-key hit and pushes updates to subscribers.
//!
//! Subscribers are per-key channels rather than callbacks: registration
//! replays the current cached value (when present) into the channel before
//! the handle is returned, so a subscriber must not assume it only hears
//! about future changes. Delivery failure to one subscriber is logged and
//! prunes only that subscriber.

use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::models::RatingEntry;
use crate::services::cache_key;

struct Subscriber {
    id: Uuid,
    tx: mpsc::UnboundedSender<RatingEntry>,
}

/// Handle returned by [`SessionCache::subscribe`]
pub struct Subscription {
    /// Subscriber identity, for `unsubscribe`
    pub id: Uuid,
    /// Key the subscription is registered under
    pub key: String,
    /// Update stream; the first item may be the replayed current value
    pub rx: mpsc::UnboundedReceiver<RatingEntry>,
}

/// In-memory entry map plus per-key subscriber lists
#[derive(Default)]
pub struct SessionCache {
    entries: RwLock<HashMap<String, RatingEntry>>,
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-key lookup
    pub async fn peek(&self, key: &str) -> Option<RatingEntry> {
        self.entries.read().await.get(key).cloned()
    }

    /// Register a subscriber under `key`.
    ///
    /// The current cached value, if any, is queued for immediate replay
    /// before the handle is returned.
    pub async fn subscribe(&self, key: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        if let Some(current) = self.peek(key).await {
            // Replay cannot fail: we still hold the receiver
            let _ = tx.send(current);
        }

        self.subscribers
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .push(Subscriber { id, tx });

        Subscription { id, key: key.to_string(), rx }
    }

    /// Remove one subscriber from a key's list
    pub async fn unsubscribe(&self, key: &str, id: Uuid) {
        let mut subscribers = self.subscribers.lock().await;
        if let Some(list) = subscribers.get_mut(key) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                subscribers.remove(key);
            }
        }
    }

    /// Fan one update out under every key the entry is reachable by.
    ///
    /// The key set is de-duplicated, so a subscriber hears the update once
    /// per distinct key it subscribed under. Within one key, subscribers
    /// are notified in registration order.
    pub async fn publish(&self, entry: &RatingEntry) {
        let keys = entry_keys(entry);

        {
            let mut entries = self.entries.write().await;
            for key in &keys {
                entries.insert(key.clone(), entry.clone());
            }
        }

        let mut subscribers = self.subscribers.lock().await;
        for key in &keys {
            let Some(list) = subscribers.get_mut(key) else { continue };
            list.retain(|subscriber| match subscriber.tx.send(entry.clone()) {
                Ok(()) => true,
                Err(_) => {
                    tracing::debug!(key = %key, id = %subscriber.id, "Pruning dead subscriber");
                    false
                }
            });
            if list.is_empty() {
                subscribers.remove(key);
            }
        }
    }

    /// Entries currently held in memory
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drop all entries (subscriptions stay registered)
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// De-duplicated set of every key `entry` can be looked up by, master first
fn entry_keys(entry: &RatingEntry) -> Vec<String> {
    let master = entry.master_key();
    let mut keys = vec![master.clone()];
    keys.extend(cache_key::alias_keys(
        &master,
        entry.video_id.as_deref(),
        entry.imdb_id.as_deref(),
        &entry.title,
        entry.year.as_deref(),
    ));
    keys
}
