//! Broadcasting actions to sibling contexts
//!
//! Outbound, [`Broadcaster`] writes an envelope for every action whose
//! `meta[metaKey]` is truthy and removes it again straight away; the removal
//! leaves the channel empty while the write has already notified every other
//! context. Inbound, [`Listener`] turns those notifications back into
//! actions with the marker set to `null`, so a received action never
//! qualifies for another broadcast.
//!
//! [`BroadcastMiddleware`] wires both halves into a store.
//!
//! # Example
//!
//! ```ignore
//! use dispatch_broadcast::prelude::*;
//!
//! let storage = MemoryStorage::new();
//! let mut runtime = DispatchRuntime::with_middleware(state, reducer, |dispatch| {
//!     BroadcastMiddleware::new(storage.context(), BroadcastConfig::default(), dispatch)
//! });
//!
//! runtime.dispatch(Action::new("TodoAdd").with_meta_field("broadcast", true));
//! ```

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::action::is_truthy;
use crate::channel::{Channel, ChannelError, ChannelSubscription, StorageEvent};
use crate::config::BroadcastConfig;
use crate::envelope::{self, DecodeError};
use crate::probe::probe;
use crate::store::Middleware;
use crate::Action;

/// Whether `action` asks to be broadcast
///
/// True iff `meta` is an object whose `meta_key` field is truthy.
pub fn is_eligible(action: &Action, meta_key: &str) -> bool {
    match &action.meta {
        Some(Value::Object(meta)) => meta.get(meta_key).is_some_and(is_truthy),
        _ => false,
    }
}

/// Set `meta[meta_key]` to `null`, keeping every other meta field
///
/// A missing or non-object `meta` becomes `{ meta_key: null }`.
pub fn clear_marker(mut action: Action, meta_key: &str) -> Action {
    let mut meta = match action.meta.take() {
        Some(Value::Object(meta)) => meta,
        _ => Map::new(),
    };
    meta.insert(meta_key.to_string(), Value::Null);
    action.meta = Some(Value::Object(meta));
    action
}

/// What happened to an action on the outbound path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// No truthy broadcast marker
    Ineligible,
    /// The availability probe failed
    Unavailable,
    /// Written and removed
    Sent,
    /// The envelope could not be encoded
    ///
    /// Actions hold only JSON values, so this does not happen in practice.
    EncodeFailed(String),
    /// The envelope write failed after a successful probe
    WriteFailed(ChannelError),
    /// The envelope was written but could not be removed
    RemoveFailed(ChannelError),
}

impl BroadcastOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Outbound half: writes envelopes for eligible actions
#[derive(Debug)]
pub struct Broadcaster<C> {
    channel: C,
    config: Arc<BroadcastConfig>,
}

impl<C: Channel> Broadcaster<C> {
    pub fn new(channel: C, config: Arc<BroadcastConfig>) -> Self {
        Self { channel, config }
    }

    /// The underlying channel
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Broadcast `action` if it is marked and the channel is available
    ///
    /// The channel is probed on every call. Failures are logged and reported
    /// in the outcome, never raised.
    pub fn broadcast(&self, action: &Action) -> BroadcastOutcome {
        if !is_eligible(action, &self.config.meta_key) {
            return BroadcastOutcome::Ineligible;
        }

        if !probe(&self.channel, &self.config.test_key) {
            tracing::debug!(action = %action.name(), "Skipping broadcast, channel unavailable");
            return BroadcastOutcome::Unavailable;
        }

        let text = match envelope::encode(action) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(action = %action.name(), %error, "Failed to encode broadcast");
                return BroadcastOutcome::EncodeFailed(error.to_string());
            }
        };

        let key = &self.config.storage_key;
        if let Err(error) = self.channel.write(key, &text) {
            tracing::debug!(action = %action.name(), %error, "Broadcast write failed");
            return BroadcastOutcome::WriteFailed(error);
        }
        if let Err(error) = self.channel.remove(key) {
            tracing::warn!(
                action = %action.name(),
                key = %key,
                %error,
                "Broadcast envelope left on channel"
            );
            return BroadcastOutcome::RemoveFailed(error);
        }

        tracing::debug!(action = %action.name(), bytes = text.len(), "Broadcast action");
        BroadcastOutcome::Sent
    }
}

/// Inbound half: turns channel notifications into local actions
#[derive(Debug, Clone)]
pub struct Listener {
    config: Arc<BroadcastConfig>,
}

impl Listener {
    pub fn new(config: Arc<BroadcastConfig>) -> Self {
        Self { config }
    }

    /// Map a notification to the action to dispatch, if any
    ///
    /// Notifications for other keys, without a non-empty new value, or not
    /// marked trusted are ignored. A payload that fails to decode yields an
    /// error action of type `errorKey`.
    pub fn receive(&self, event: &StorageEvent) -> Option<Action> {
        if event.key.as_deref() != Some(self.config.storage_key.as_str()) {
            return None;
        }

        let text = match event.new_value.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => return None,
        };

        if !event.trusted {
            tracing::debug!(key = ?event.key, "Ignoring untrusted storage event");
            return None;
        }

        match envelope::decode(text) {
            Ok(envelope) => {
                tracing::trace!(action = %envelope.action.name(), "Received broadcast");
                Some(clear_marker(envelope.action, &self.config.meta_key))
            }
            Err(error) => {
                tracing::debug!(%error, "Undecodable broadcast envelope");
                Some(self.error_action(event, &error))
            }
        }
    }

    fn error_action(&self, event: &StorageEvent, error: &DecodeError) -> Action {
        let event = serde_json::to_value(event).unwrap_or(Value::Null);
        Action::new(&self.config.error_key)
            .with_meta(json!({ "event": event }))
            .with_payload(error.to_value())
    }

    /// Forward notifications from `events` to `dispatch` on a new task
    pub fn spawn(
        self,
        runtime: &Handle,
        mut events: ChannelSubscription,
        dispatch: mpsc::UnboundedSender<Action>,
    ) -> ListenerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => {
                        let Some(event) = event else {
                            tracing::debug!("Storage channel closed, listener stopping");
                            break;
                        };
                        let Some(action) = self.receive(&event) else {
                            continue;
                        };
                        if dispatch.send(action).is_err() {
                            tracing::debug!("Dispatch queue closed, listener stopping");
                            break;
                        }
                    }
                }
            }
        });

        ListenerHandle { cancel, task }
    }
}

/// Owned listener task
///
/// The task stops when [`close`](Self::close) is called or the handle is
/// dropped.
#[derive(Debug)]
pub struct ListenerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Whether the task is still running
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the task to stop
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Store middleware broadcasting marked actions and re-dispatching
/// broadcasts from sibling contexts
///
/// Construction probes the channel once; only if it is available is a
/// listener installed. The listener needs a Tokio runtime to run on and is
/// skipped (with a warning) outside one.
#[derive(Debug)]
pub struct BroadcastMiddleware<C> {
    broadcaster: Broadcaster<C>,
    listener: Option<ListenerHandle>,
}

impl<C: Channel> BroadcastMiddleware<C> {
    /// Set up broadcasting over `channel`
    ///
    /// `config` may be a [`BroadcastConfig`] or
    /// [`BroadcastOptions`](crate::config::BroadcastOptions). Received
    /// actions are sent to `dispatch`.
    pub fn new(
        channel: C,
        config: impl Into<BroadcastConfig>,
        dispatch: mpsc::UnboundedSender<Action>,
    ) -> Self {
        let config = Arc::new(config.into());
        if let Err(error) = config.validate() {
            tracing::warn!(%error, "Questionable broadcast config");
        }

        let listener = install_listener(&channel, &config, dispatch);
        Self {
            broadcaster: Broadcaster::new(channel, config),
            listener,
        }
    }

    /// The resolved configuration
    pub fn config(&self) -> &BroadcastConfig {
        &self.broadcaster.config
    }

    /// The outbound half
    pub fn broadcaster(&self) -> &Broadcaster<C> {
        &self.broadcaster
    }

    /// Whether a listener is installed and running
    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(ListenerHandle::is_active)
    }

    /// Stop receiving broadcasts; outbound broadcasting continues
    pub fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.close();
        }
    }
}

fn install_listener<C: Channel>(
    channel: &C,
    config: &Arc<BroadcastConfig>,
    dispatch: mpsc::UnboundedSender<Action>,
) -> Option<ListenerHandle> {
    if !probe(channel, &config.test_key) {
        tracing::debug!("Storage channel unavailable, not listening for broadcasts");
        return None;
    }

    let runtime = match Handle::try_current() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::warn!(%error, "No Tokio runtime, not listening for broadcasts");
            return None;
        }
    };

    let events = match channel.subscribe() {
        Ok(events) => events,
        Err(error) => {
            tracing::warn!(%error, "Failed to subscribe to storage channel");
            return None;
        }
    };

    tracing::debug!(key = %config.storage_key, "Listening for broadcasts");
    Some(Listener::new(config.clone()).spawn(&runtime, events, dispatch))
}

impl<C: Channel> Middleware for BroadcastMiddleware<C> {
    fn before(&mut self, action: &Action) {
        self.broadcaster.broadcast(action);
    }

    fn after(&mut self, _action: &Action, _state_changed: bool) {}
}
