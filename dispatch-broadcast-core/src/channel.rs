//! Cross-context storage channel
//!
//! A [`Channel`] is a key-value store shared by every context of one origin.
//! Writes and removals in one context produce a [`StorageEvent`] in every
//! *other* context subscribed to the same store. The broadcast protocol only
//! uses it as a signaling medium and never leaves data behind.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Stream of change notifications for one context
pub type ChannelSubscription = mpsc::UnboundedReceiver<StorageEvent>;

/// Errors raised by channel operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("storage quota exceeded writing `{key}` ({needed} of {quota} bytes)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage channel closed")]
    Closed,
}

/// A change notification delivered to sibling contexts
///
/// Serializes with camelCase names (`key`, `oldValue`, `newValue`,
/// `isTrusted`) when attached to an error action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEvent {
    /// Key that changed; `None` when the whole store was cleared
    pub key: Option<String>,
    /// Value before the change
    pub old_value: Option<String>,
    /// Value after the change; `None` for removals
    pub new_value: Option<String>,
    /// Whether the event came from the storage implementation itself
    #[serde(rename = "isTrusted")]
    pub trusted: bool,
}

impl StorageEvent {
    /// A trusted event for a key that now holds `new_value`
    pub fn set(
        key: impl Into<String>,
        old_value: Option<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            key: Some(key.into()),
            old_value,
            new_value: Some(new_value.into()),
            trusted: true,
        }
    }

    /// A trusted event for a removed key
    pub fn removed(key: impl Into<String>, old_value: Option<String>) -> Self {
        Self {
            key: Some(key.into()),
            old_value,
            new_value: None,
            trusted: true,
        }
    }

    /// Mark the event as synthetic
    pub fn untrusted(mut self) -> Self {
        self.trusted = false;
        self
    }
}

/// Shared key-value channel
///
/// `write` and `remove` may fail at any time (quota, disabled storage); the
/// broadcast layer treats every failure as "unavailable".
pub trait Channel: Send + Sync {
    /// Store `value` under `key`
    fn write(&self, key: &str, value: &str) -> Result<(), ChannelError>;

    /// Remove `key`
    fn remove(&self, key: &str) -> Result<(), ChannelError>;

    /// Subscribe to changes made by other contexts
    fn subscribe(&self) -> Result<ChannelSubscription, ChannelError>;
}

impl<C: Channel + ?Sized> Channel for Arc<C> {
    fn write(&self, key: &str, value: &str) -> Result<(), ChannelError> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), ChannelError> {
        (**self).remove(key)
    }

    fn subscribe(&self) -> Result<ChannelSubscription, ChannelError> {
        (**self).subscribe()
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn write(&self, key: &str, value: &str) -> Result<(), ChannelError> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), ChannelError> {
        (**self).remove(key)
    }

    fn subscribe(&self) -> Result<ChannelSubscription, ChannelError> {
        (**self).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_camel_case() {
        let event = StorageEvent::set("k", None, "v");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "key": "k", "oldValue": null, "newValue": "v", "isTrusted": true })
        );
    }

    #[test]
    fn test_untrusted() {
        let event = StorageEvent::removed("k", Some("v".into())).untrusted();
        assert!(!event.trusted);
        assert_eq!(event.new_value, None);
    }
}
