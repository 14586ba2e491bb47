//! dispatch-broadcast: keep sibling contexts in sync by broadcasting actions
//!
//! Every context (tab, window, worker) runs its own store. Actions marked
//! with `meta.broadcast = true` are written to a shared storage channel and
//! immediately removed again; every other context sees the change, decodes
//! the action and dispatches it locally with the marker cleared, so it is
//! never sent back.
//!
//! # Example
//! ```ignore
//! use dispatch_broadcast::prelude::*;
//!
//! let storage = MemoryStorage::new();
//! let mut tab = DispatchRuntime::with_middleware(state, reducer, |dispatch| {
//!     BroadcastMiddleware::new(storage.context(), BroadcastOptions::new(), dispatch)
//! });
//!
//! tab.dispatch(Action::new("TodoAdd").with_payload("milk").with_meta_field("broadcast", true));
//! ```

// Re-export everything from core
pub use dispatch_broadcast_core::*;

/// Prelude for convenient imports
pub mod prelude {
    // Actions and store
    pub use dispatch_broadcast_core::{
        Action, ComposedMiddleware, DispatchRuntime, LoggingMiddleware, Middleware,
        NoopMiddleware, Reducer, Store, StoreWithMiddleware,
    };

    // Broadcasting
    pub use dispatch_broadcast_core::{
        BroadcastConfig, BroadcastMiddleware, BroadcastOptions, BroadcastOutcome, Broadcaster,
        Channel, MemoryChannel, MemoryStorage, StorageEvent,
    };

    // Logging
    pub use dispatch_broadcast_core::{ActionLogConfig, ActionLoggerConfig, ActionLoggerMiddleware};
}
