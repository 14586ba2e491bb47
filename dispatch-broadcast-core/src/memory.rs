//! In-process shared storage
//!
//! [`MemoryStorage`] stands in for an origin's storage area. Each call to
//! [`MemoryStorage::context`] attaches a new context (a "tab") that sees the
//! same entries but only receives notifications for changes made by others.
//!
//! # Example
//!
//! ```
//! use dispatch_broadcast_core::channel::Channel;
//! use dispatch_broadcast_core::memory::MemoryStorage;
//!
//! let storage = MemoryStorage::new();
//! let tab_a = storage.context();
//! let tab_b = storage.context();
//!
//! let mut events = tab_b.subscribe().unwrap();
//! tab_a.write("greeting", "hello").unwrap();
//!
//! let event = events.try_recv().unwrap();
//! assert_eq!(event.new_value.as_deref(), Some("hello"));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelError, ChannelSubscription, StorageEvent};

type ContextId = u64;

#[derive(Debug, Default)]
struct StorageInner {
    entries: HashMap<String, String>,
    listeners: Vec<(ContextId, mpsc::UnboundedSender<StorageEvent>)>,
    quota: Option<usize>,
    disabled: bool,
    next_context: ContextId,
}

impl StorageInner {
    fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    /// Deliver to every listener except those owned by `origin`, pruning
    /// closed subscriptions.
    fn notify(&mut self, origin: Option<ContextId>, event: StorageEvent) {
        self.listeners
            .retain(|(id, tx)| Some(*id) == origin || tx.send(event.clone()).is_ok());
    }
}

/// Storage area shared by several contexts
///
/// Cloning yields another handle to the same area.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<StorageInner>>,
}

impl MemoryStorage {
    /// Create an empty, available storage area with no quota
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage area limited to `bytes` of keys plus values
    pub fn with_quota(bytes: usize) -> Self {
        let storage = Self::new();
        storage.lock().quota = Some(bytes);
        storage
    }

    fn lock(&self) -> MutexGuard<'_, StorageInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a new context to this storage area
    pub fn context(&self) -> MemoryChannel {
        let mut inner = self.lock();
        let id = inner.next_context;
        inner.next_context += 1;
        MemoryChannel {
            id,
            storage: self.clone(),
        }
    }

    /// Enable or disable the area; while disabled every write and remove fails
    pub fn set_available(&self, available: bool) {
        self.lock().disabled = !available;
    }

    /// Whether writes are currently accepted
    pub fn is_available(&self) -> bool {
        !self.lock().disabled
    }

    /// Read a stored value
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().entries.get(key).cloned()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Bytes used by keys and values
    pub fn used_bytes(&self) -> usize {
        self.lock().used_bytes()
    }

    /// Number of live subscriptions across all contexts
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.listeners.retain(|(_, tx)| !tx.is_closed());
        inner.listeners.len()
    }

    /// Deliver a raw event to every subscribed context
    ///
    /// Useful to simulate synthetic or foreign notifications.
    pub fn inject(&self, event: StorageEvent) {
        self.lock().notify(None, event);
    }
}

/// One context's view of a [`MemoryStorage`]
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    id: ContextId,
    storage: MemoryStorage,
}

impl MemoryChannel {
    /// The shared storage area
    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }
}

impl Channel for MemoryChannel {
    fn write(&self, key: &str, value: &str) -> Result<(), ChannelError> {
        let mut inner = self.storage.lock();
        if inner.disabled {
            return Err(ChannelError::Unavailable("storage disabled".into()));
        }

        if let Some(quota) = inner.quota {
            let existing = inner.entries.get(key).map(|v| key.len() + v.len());
            let needed = inner.used_bytes() - existing.unwrap_or(0) + key.len() + value.len();
            if needed > quota {
                return Err(ChannelError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }

        let old = inner.entries.insert(key.to_string(), value.to_string());
        if old.as_deref() != Some(value) {
            inner.notify(Some(self.id), StorageEvent::set(key, old, value));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ChannelError> {
        let mut inner = self.storage.lock();
        if inner.disabled {
            return Err(ChannelError::Unavailable("storage disabled".into()));
        }

        if let Some(old) = inner.entries.remove(key) {
            inner.notify(Some(self.id), StorageEvent::removed(key, Some(old)));
        }
        Ok(())
    }

    fn subscribe(&self) -> Result<ChannelSubscription, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.storage.lock().listeners.push((self.id, tx));
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut ChannelSubscription) -> Vec<StorageEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_write_notifies_other_contexts_only() {
        let storage = MemoryStorage::new();
        let a = storage.context();
        let b = storage.context();
        let c = storage.context();
        let mut rx_a = a.subscribe().unwrap();
        let mut rx_b = b.subscribe().unwrap();
        let mut rx_c = c.subscribe().unwrap();

        a.write("k", "v").unwrap();

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec![StorageEvent::set("k", None, "v")]);
        assert_eq!(drain(&mut rx_c).len(), 1);
        assert_eq!(storage.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_write_then_remove_leaves_nothing() {
        let storage = MemoryStorage::new();
        let a = storage.context();
        let b = storage.context();
        let mut rx_b = b.subscribe().unwrap();

        a.write("k", "v").unwrap();
        a.remove("k").unwrap();

        assert!(storage.is_empty());
        let events = drain(&mut rx_b);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], StorageEvent::removed("k", Some("v".into())));
    }

    #[test]
    fn test_no_event_without_change() {
        let storage = MemoryStorage::new();
        let a = storage.context();
        let b = storage.context();
        let mut rx_b = b.subscribe().unwrap();

        a.remove("missing").unwrap();
        a.write("k", "v").unwrap();
        a.write("k", "v").unwrap();

        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[test]
    fn test_quota_exceeded() {
        let storage = MemoryStorage::with_quota(8);
        let a = storage.context();

        a.write("k", "1234567").unwrap();
        assert_eq!(storage.used_bytes(), 8);

        // Replacing a value only counts the difference
        a.write("k", "7654321").unwrap();

        let err = a.write("k2", "x").unwrap_err();
        assert!(matches!(err, ChannelError::QuotaExceeded { quota: 8, .. }));
        assert_eq!(storage.get("k2"), None);
    }

    #[test]
    fn test_disabled_storage_fails() {
        let storage = MemoryStorage::new();
        let a = storage.context();
        storage.set_available(false);

        assert!(!storage.is_available());
        assert!(matches!(
            a.write("k", "v"),
            Err(ChannelError::Unavailable(_))
        ));
        assert!(a.remove("k").is_err());

        storage.set_available(true);
        assert!(a.write("k", "v").is_ok());
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let storage = MemoryStorage::new();
        let a = storage.context();
        let b = storage.context();

        let rx = b.subscribe().unwrap();
        assert_eq!(storage.subscriber_count(), 1);

        drop(rx);
        a.write("k", "v").unwrap();
        assert_eq!(storage.subscriber_count(), 0);
    }

    #[test]
    fn test_inject_reaches_every_context() {
        let storage = MemoryStorage::new();
        let a = storage.context();
        let b = storage.context();
        let mut rx_a = a.subscribe().unwrap();
        let mut rx_b = b.subscribe().unwrap();

        storage.inject(StorageEvent::set("k", None, "v").untrusted());

        assert!(!drain(&mut rx_a)[0].trusted);
        assert_eq!(drain(&mut rx_b).len(), 1);
    }
}
