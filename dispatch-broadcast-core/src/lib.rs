//! Core types for dispatch-broadcast
//!
//! Broadcasts dispatched actions to sibling execution contexts that share a
//! storage area (think browser tabs sharing `localStorage`), following a
//! Redux-style store/middleware architecture.
//!
//! # Core Concepts
//!
//! - **Action**: a `type` plus optional `meta` and `payload`
//! - **Store**: state container updated by a reducer
//! - **Middleware**: observes every action before and after the reducer
//! - **Channel**: the shared key-value store used as a signaling medium
//! - **BroadcastMiddleware**: sends actions whose `meta.broadcast` is truthy
//!   to sibling contexts and re-dispatches theirs with the marker cleared
//!
//! # Basic Example
//!
//! ```
//! use dispatch_broadcast_core::prelude::*;
//!
//! fn reducer(count: &mut i64, action: Action) -> bool {
//!     match action.kind.as_str() {
//!         "Increment" => {
//!             *count += 1;
//!             true
//!         }
//!         _ => false,
//!     }
//! }
//!
//! let storage = MemoryStorage::new();
//! let mut tab = DispatchRuntime::with_middleware(0, reducer, |dispatch| {
//!     BroadcastMiddleware::new(storage.context(), BroadcastConfig::default(), dispatch)
//! });
//!
//! tab.dispatch(Action::new("Increment").with_meta_field("broadcast", true));
//! assert_eq!(*tab.state(), 1);
//! // Broadcasting never leaves data behind
//! assert!(storage.is_empty());
//! ```

pub mod action;
pub mod broadcast;
pub mod channel;
pub mod config;
pub mod envelope;
pub mod logger;
pub mod memory;
pub mod probe;
pub mod runtime;
pub mod store;
pub mod testing;

pub use action::{is_truthy, Action};
pub use broadcast::{
    clear_marker, is_eligible, BroadcastMiddleware, BroadcastOutcome, Broadcaster, Listener,
    ListenerHandle,
};
pub use channel::{Channel, ChannelError, ChannelSubscription, StorageEvent};
pub use config::{BroadcastConfig, BroadcastOptions, ConfigError};
pub use envelope::{decode, encode, DecodeError, EncodeError, Envelope};
pub use logger::{
    ActionLog, ActionLogConfig, ActionLogEntry, ActionLoggerConfig, ActionLoggerMiddleware,
    BroadcastMark,
};
pub use memory::{MemoryChannel, MemoryStorage};
pub use probe::probe;
pub use runtime::DispatchRuntime;
pub use store::{
    ComposedMiddleware, LoggingMiddleware, Middleware, NoopMiddleware, Reducer, Store,
    StoreWithMiddleware,
};

pub use testing::{ChannelOp, RecordingChannel, TestHarness};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::Action;
    pub use crate::broadcast::{BroadcastMiddleware, BroadcastOutcome, Broadcaster};
    pub use crate::channel::{Channel, StorageEvent};
    pub use crate::config::{BroadcastConfig, BroadcastOptions};
    pub use crate::logger::{ActionLogConfig, ActionLoggerConfig, ActionLoggerMiddleware};
    pub use crate::memory::{MemoryChannel, MemoryStorage};
    pub use crate::runtime::DispatchRuntime;
    pub use crate::store::{
        ComposedMiddleware, LoggingMiddleware, Middleware, NoopMiddleware, Reducer, Store,
        StoreWithMiddleware,
    };
}
