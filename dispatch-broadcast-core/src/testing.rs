//! Test utilities for dispatch-broadcast
//!
//! - [`TestHarness`]: action queue capture with state
//! - [`RecordingChannel`]: a [`Channel`] that records operations and can be
//!   made to fail
//! - Assertion macros for verifying emitted actions
//!
//! # Example
//!
//! ```ignore
//! use dispatch_broadcast::testing::{RecordingChannel, TestHarness};
//!
//! let mut harness = TestHarness::new(());
//! let channel = RecordingChannel::new();
//! let middleware = BroadcastMiddleware::new(channel.clone(), config, harness.sender());
//!
//! channel.notify(StorageEvent::set(storage_key, None, envelope));
//! let action = harness.next_emitted(Duration::from_millis(100)).await;
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelError, ChannelSubscription, StorageEvent};
use crate::Action;

/// Generic test harness for code that emits actions.
///
/// Provides:
/// - State management with a simple `state` field
/// - Action channel for capturing emitted actions
/// - Helpers for draining and awaiting actions
pub struct TestHarness<S> {
    /// The application state under test
    pub state: S,
    tx: mpsc::UnboundedSender<Action>,
    rx: mpsc::UnboundedReceiver<Action>,
}

impl<S> TestHarness<S> {
    /// Create a new test harness with the given initial state.
    pub fn new(state: S) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { state, tx, rx }
    }

    /// Get a clone of the action sender, usable as a `dispatch` handle.
    pub fn sender(&self) -> mpsc::UnboundedSender<Action> {
        self.tx.clone()
    }

    /// Emit an action (simulates what a handler would do).
    pub fn emit(&self, action: Action) {
        let _ = self.tx.send(action);
    }

    /// Drain all emitted actions from the channel.
    pub fn drain_emitted(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        while let Ok(action) = self.rx.try_recv() {
            actions.push(action);
        }
        actions
    }

    /// Check if any actions were emitted.
    pub fn has_emitted(&mut self) -> bool {
        !self.drain_emitted().is_empty()
    }

    /// Drain emitted actions of one `type`, leaving the others queued.
    pub fn drain_kind(&mut self, kind: &str) -> Vec<Action> {
        let (matching, rest): (Vec<_>, Vec<_>) = self
            .drain_emitted()
            .into_iter()
            .partition(|action| action.kind == kind);

        for action in rest {
            let _ = self.tx.send(action);
        }

        matching
    }

    /// Wait for the next emitted action, giving up after `timeout`.
    pub async fn next_emitted(&mut self, timeout: Duration) -> Option<Action> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }
}

impl<S: Default> Default for TestHarness<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

/// A recorded channel operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    Write { key: String, value: String },
    Remove { key: String },
}

impl ChannelOp {
    pub fn write(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Write {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self::Remove { key: key.into() }
    }

    /// The key the operation touched
    pub fn key(&self) -> &str {
        match self {
            Self::Write { key, .. } | Self::Remove { key } => key,
        }
    }
}

#[derive(Debug, Default)]
struct RecordingInner {
    ops: Vec<ChannelOp>,
    failures: usize,
    fail_writes: bool,
    fail_removes: bool,
    subscribers: Vec<mpsc::UnboundedSender<StorageEvent>>,
}

/// A channel that records successful operations
///
/// Clones share the same record. Nothing is stored; subscribers only receive
/// events pushed with [`RecordingChannel::notify`].
#[derive(Debug, Clone, Default)]
pub struct RecordingChannel {
    inner: Arc<Mutex<RecordingInner>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecordingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Operations recorded so far
    pub fn ops(&self) -> Vec<ChannelOp> {
        self.lock().ops.clone()
    }

    /// Operations touching `key`
    pub fn ops_for(&self, key: &str) -> Vec<ChannelOp> {
        self.lock()
            .ops
            .iter()
            .filter(|op| op.key() == key)
            .cloned()
            .collect()
    }

    /// Number of operations rejected because of `fail_writes`/`fail_removes`
    pub fn failures(&self) -> usize {
        self.lock().failures
    }

    /// Forget recorded operations and failures
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.ops.clear();
        inner.failures = 0;
    }

    /// Make subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make subsequent removes fail
    pub fn fail_removes(&self, fail: bool) {
        self.lock().fail_removes = fail;
    }

    /// Push an event to every subscriber
    pub fn notify(&self, event: StorageEvent) {
        self.lock()
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Channel for RecordingChannel {
    fn write(&self, key: &str, value: &str) -> Result<(), ChannelError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            inner.failures += 1;
            return Err(ChannelError::Unavailable("writes disabled".into()));
        }
        inner.ops.push(ChannelOp::write(key, value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ChannelError> {
        let mut inner = self.lock();
        if inner.fail_removes {
            inner.failures += 1;
            return Err(ChannelError::Unavailable("removes disabled".into()));
        }
        inner.ops.push(ChannelOp::remove(key));
        Ok(())
    }

    fn subscribe(&self) -> Result<ChannelSubscription, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        Ok(rx)
    }
}

/// Assert that a specific action was emitted.
///
/// # Example
///
/// ```ignore
/// use dispatch_broadcast::assert_emitted;
///
/// let actions = harness.drain_emitted();
/// assert_emitted!(actions, Action { kind, .. } if kind == "Increment");
/// ```
#[macro_export]
macro_rules! assert_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            $actions.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected action matching `{}` to be emitted, but got: {:?}",
            stringify!($pattern),
            $actions
        );
    };
}

/// Assert that a specific action was NOT emitted.
#[macro_export]
macro_rules! assert_not_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            !$actions.iter().any(|a| matches!(a, $pattern $(if $guard)?)),
            "Expected action matching `{}` NOT to be emitted, but it was: {:?}",
            stringify!($pattern),
            $actions
        );
    };
}

/// Find and return the first action matching a pattern.
#[macro_export]
macro_rules! find_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        $actions.iter().find(|a| matches!(a, $pattern $(if $guard)?))
    };
}

/// Count how many actions match a pattern.
#[macro_export]
macro_rules! count_emitted {
    ($actions:expr, $pattern:pat $(if $guard:expr)?) => {
        $actions.iter().filter(|a| matches!(a, $pattern $(if $guard)?)).count()
    };
}

/// Assert that an action with the given `type` was emitted.
///
/// # Example
///
/// ```ignore
/// let actions = harness.drain_emitted();
/// assert_kind_emitted!(actions, "__dispatch-broadcast_error__");
/// ```
#[macro_export]
macro_rules! assert_kind_emitted {
    ($actions:expr, $kind:expr) => {
        assert!(
            $actions.iter().any(|a| a.kind == $kind),
            "Expected action of type `{}` to be emitted, but got: {:?}",
            $kind,
            $actions
        );
    };
}

/// Count how many actions have the given `type`.
#[macro_export]
macro_rules! count_kind {
    ($actions:expr, $kind:expr) => {
        $actions.iter().filter(|a| a.kind == $kind).count()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_emit_and_drain() {
        let mut harness = TestHarness::new(());

        harness.emit(Action::new("Foo"));
        harness.emit(Action::new("Bar").with_payload(42));

        let actions = harness.drain_emitted();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].kind, "Foo");
        assert_eq!(actions[1].payload, Some(serde_json::json!(42)));

        // Drain again should be empty
        assert!(harness.drain_emitted().is_empty());
    }

    #[test]
    fn test_harness_drain_kind() {
        let mut harness = TestHarness::new(());
        harness.emit(Action::new("Foo"));
        harness.emit(Action::new("Bar"));
        harness.emit(Action::new("Foo"));

        assert_eq!(harness.drain_kind("Foo").len(), 2);

        let rest = harness.drain_emitted();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].kind, "Bar");
    }

    #[tokio::test]
    async fn test_harness_next_emitted_times_out() {
        let mut harness = TestHarness::new(());
        assert!(harness.next_emitted(Duration::from_millis(10)).await.is_none());

        harness.emit(Action::new("Foo"));
        let action = harness.next_emitted(Duration::from_millis(10)).await;
        assert_eq!(action.map(|a| a.kind), Some("Foo".to_string()));
    }

    #[test]
    fn test_assert_macros() {
        let actions = vec![Action::new("Foo"), Action::new("Bar").with_payload(42)];

        assert_emitted!(actions, Action { kind, .. } if kind == "Foo");
        assert_not_emitted!(actions, Action { kind, .. } if kind == "Baz");
        assert_kind_emitted!(actions, "Bar");

        let found = find_emitted!(actions, Action { payload: Some(_), .. });
        assert!(found.is_some());

        assert_eq!(count_emitted!(actions, Action { payload: None, .. }), 1);
        assert_eq!(count_kind!(actions, "Foo"), 1);
    }

    #[test]
    fn test_recording_channel_records_and_fails() {
        let channel = RecordingChannel::new();
        channel.write("a", "1").unwrap();
        channel.remove("a").unwrap();
        channel.write("b", "2").unwrap();

        assert_eq!(channel.ops().len(), 3);
        assert_eq!(
            channel.ops_for("a"),
            vec![ChannelOp::write("a", "1"), ChannelOp::remove("a")]
        );

        channel.fail_writes(true);
        assert!(channel.write("c", "3").is_err());
        assert_eq!(channel.failures(), 1);
        assert_eq!(channel.ops().len(), 3);

        channel.clear();
        assert!(channel.ops().is_empty());
        assert_eq!(channel.failures(), 0);
    }

    #[test]
    fn test_recording_channel_notify() {
        let channel = RecordingChannel::new();
        let mut rx = channel.subscribe().unwrap();
        channel.notify(StorageEvent::set("k", None, "v"));
        assert_eq!(rx.try_recv().unwrap().key.as_deref(), Some("k"));
    }
}
