//! Centralized state store with reducer pattern

use crate::Action;

/// A reducer function that handles actions and mutates state
///
/// Returns `true` if the state changed.
pub type Reducer<S> = fn(&mut S, Action) -> bool;

/// Centralized state store with Redux-like reducer pattern
///
/// The store holds the application state and provides a single point
/// for state mutations through the `dispatch` method.
///
/// # Example
/// ```
/// use dispatch_broadcast_core::{Action, Store};
///
/// #[derive(Default)]
/// struct AppState {
///     counter: i64,
/// }
///
/// fn reducer(state: &mut AppState, action: Action) -> bool {
///     match action.kind.as_str() {
///         "Increment" => {
///             state.counter += 1;
///             true
///         }
///         _ => false,
///     }
/// }
///
/// let mut store = Store::new(AppState::default(), reducer);
/// store.dispatch(Action::new("Increment"));
/// assert_eq!(store.state().counter, 1);
/// ```
pub struct Store<S> {
    state: S,
    reducer: Reducer<S>,
}

impl<S> Store<S> {
    /// Create a new store with initial state and reducer
    pub fn new(state: S, reducer: Reducer<S>) -> Self {
        Self { state, reducer }
    }

    /// Dispatch an action to the store
    ///
    /// Returns `true` if the state changed.
    pub fn dispatch(&mut self, action: Action) -> bool {
        (self.reducer)(&mut self.state, action)
    }

    /// Get a reference to the current state
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Get a mutable reference to the state
    ///
    /// Use this sparingly - prefer dispatching actions for state changes.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }
}

/// Store with middleware support
///
/// Every dispatch runs `before`, then the reducer exactly once with the
/// original action, then `after`.
pub struct StoreWithMiddleware<S, M: Middleware> {
    store: Store<S>,
    middleware: M,
}

impl<S, M: Middleware> StoreWithMiddleware<S, M> {
    /// Create a new store with middleware
    pub fn new(state: S, reducer: Reducer<S>, middleware: M) -> Self {
        Self {
            store: Store::new(state, reducer),
            middleware,
        }
    }

    /// Dispatch an action through middleware and store
    pub fn dispatch(&mut self, action: Action) -> bool {
        self.middleware.before(&action);
        let changed = self.store.dispatch(action.clone());
        self.middleware.after(&action, changed);
        changed
    }

    /// Get a reference to the current state
    pub fn state(&self) -> &S {
        self.store.state()
    }

    /// Get a mutable reference to the state
    pub fn state_mut(&mut self) -> &mut S {
        self.store.state_mut()
    }

    /// Get a reference to the middleware
    pub fn middleware(&self) -> &M {
        &self.middleware
    }

    /// Get a mutable reference to the middleware
    pub fn middleware_mut(&mut self) -> &mut M {
        &mut self.middleware
    }
}

/// Middleware trait for intercepting actions
///
/// Implement this trait to add logging, broadcasting, or other
/// cross-cutting concerns to your store. Middleware observes actions; it
/// cannot replace or swallow them.
pub trait Middleware {
    /// Called before the action is dispatched to the reducer
    fn before(&mut self, action: &Action);

    /// Called after the action is processed by the reducer
    fn after(&mut self, action: &Action, state_changed: bool);
}

/// A no-op middleware that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMiddleware;

impl Middleware for NoopMiddleware {
    fn before(&mut self, _action: &Action) {}
    fn after(&mut self, _action: &Action, _state_changed: bool) {}
}

/// Middleware that logs actions (for debugging)
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    /// Whether to log before dispatch
    pub log_before: bool,
    /// Whether to log after dispatch
    pub log_after: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware with default settings (log after only)
    pub fn new() -> Self {
        Self {
            log_before: false,
            log_after: true,
        }
    }

    /// Create a logging middleware that logs both before and after
    pub fn verbose() -> Self {
        Self {
            log_before: true,
            log_after: true,
        }
    }
}

impl Middleware for LoggingMiddleware {
    fn before(&mut self, action: &Action) {
        if self.log_before {
            tracing::debug!(action = %action.name(), "Dispatching action");
        }
    }

    fn after(&mut self, action: &Action, state_changed: bool) {
        if self.log_after {
            tracing::debug!(
                action = %action.name(),
                state_changed = state_changed,
                "Action processed"
            );
        }
    }
}

/// Compose multiple middleware into a single middleware
#[derive(Default)]
pub struct ComposedMiddleware {
    middlewares: Vec<Box<dyn Middleware + Send>>,
}

impl std::fmt::Debug for ComposedMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedMiddleware")
            .field("middlewares_count", &self.middlewares.len())
            .finish()
    }
}

impl ComposedMiddleware {
    /// Create a new composed middleware
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the composition
    pub fn add<M: Middleware + Send + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Box::new(middleware));
    }

    /// Builder-style [`add`](Self::add)
    pub fn with<M: Middleware + Send + 'static>(mut self, middleware: M) -> Self {
        self.add(middleware);
        self
    }

    /// Number of composed middlewares
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether nothing has been composed
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl Middleware for ComposedMiddleware {
    fn before(&mut self, action: &Action) {
        for middleware in &mut self.middlewares {
            middleware.before(action);
        }
    }

    fn after(&mut self, action: &Action, state_changed: bool) {
        // Call in reverse order for proper nesting
        for middleware in self.middlewares.iter_mut().rev() {
            middleware.after(action, state_changed);
        }
    }
}
