//! Runtime helpers for dispatch-broadcast apps.
//!
//! [`DispatchRuntime`] owns a store and the action queue feeding it. Anything
//! that needs to dispatch later (a broadcast listener, spawned tasks) gets a
//! clone of the queue sender, and the runtime drains the queue through the
//! store's middleware.

use tokio::sync::mpsc;

use crate::store::{Middleware, NoopMiddleware, Reducer, StoreWithMiddleware};
use crate::Action;

/// Runtime for a store with middleware.
pub struct DispatchRuntime<S, M: Middleware = NoopMiddleware> {
    store: StoreWithMiddleware<S, M>,
    action_tx: mpsc::UnboundedSender<Action>,
    action_rx: mpsc::UnboundedReceiver<Action>,
}

impl<S> DispatchRuntime<S, NoopMiddleware> {
    /// Create a runtime from state + reducer.
    pub fn new(state: S, reducer: Reducer<S>) -> Self {
        Self::with_middleware(state, reducer, |_| NoopMiddleware)
    }
}

impl<S, M: Middleware> DispatchRuntime<S, M> {
    /// Create a runtime whose middleware is built from the action queue.
    ///
    /// `build` receives the sender middleware should use to dispatch actions
    /// of its own.
    ///
    /// # Example
    /// ```ignore
    /// let runtime = DispatchRuntime::with_middleware(state, reducer, |dispatch| {
    ///     BroadcastMiddleware::new(storage.context(), BroadcastConfig::default(), dispatch)
    /// });
    /// ```
    pub fn with_middleware<F>(state: S, reducer: Reducer<S>, build: F) -> Self
    where
        F: FnOnce(mpsc::UnboundedSender<Action>) -> M,
    {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let middleware = build(action_tx.clone());
        Self {
            store: StoreWithMiddleware::new(state, reducer, middleware),
            action_tx,
            action_rx,
        }
    }

    /// Send an action into the runtime queue.
    pub fn enqueue(&self, action: Action) {
        let _ = self.action_tx.send(action);
    }

    /// Clone the action sender.
    pub fn action_tx(&self) -> mpsc::UnboundedSender<Action> {
        self.action_tx.clone()
    }

    /// Dispatch an action immediately, bypassing the queue.
    pub fn dispatch(&mut self, action: Action) -> bool {
        self.store.dispatch(action)
    }

    /// Dispatch everything currently queued.
    ///
    /// Returns the number of actions dispatched.
    pub fn process_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(action) = self.action_rx.try_recv() {
            self.store.dispatch(action);
            count += 1;
        }
        count
    }

    /// Wait for the next queued action and dispatch it.
    ///
    /// Returns whether the state changed.
    pub async fn next_action(&mut self) -> bool {
        // The runtime holds a sender, so the queue never closes
        match self.action_rx.recv().await {
            Some(action) => self.store.dispatch(action),
            None => false,
        }
    }

    /// Run the action loop until `should_quit` matches an action.
    ///
    /// The quitting action is not dispatched.
    pub async fn run<FQuit>(&mut self, mut should_quit: FQuit)
    where
        FQuit: FnMut(&Action) -> bool,
    {
        while let Some(action) = self.action_rx.recv().await {
            if should_quit(&action) {
                break;
            }
            self.store.dispatch(action);
        }
    }

    /// Access the current state.
    pub fn state(&self) -> &S {
        self.store.state()
    }

    /// Access the middleware.
    pub fn middleware(&self) -> &M {
        self.store.middleware()
    }

    /// Mutable access to the middleware.
    pub fn middleware_mut(&mut self) -> &mut M {
        self.store.middleware_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn counter(count: &mut i64, action: Action) -> bool {
        match action.kind.as_str() {
            "Increment" => {
                *count += 1;
                true
            }
            _ => false,
        }
    }

    #[test]
    fn test_process_pending() {
        let mut runtime = DispatchRuntime::new(0, counter);
        runtime.enqueue(Action::new("Increment"));
        runtime.enqueue(Action::new("Ignored"));
        runtime.enqueue(Action::new("Increment"));

        assert_eq!(runtime.process_pending(), 3);
        assert_eq!(*runtime.state(), 2);
        assert_eq!(runtime.process_pending(), 0);
    }

    #[test]
    fn test_middleware_gets_queue_sender() {
        struct Echo(mpsc::UnboundedSender<Action>);

        impl Middleware for Echo {
            fn before(&mut self, action: &Action) {
                if action.kind == "Ping" {
                    let _ = self.0.send(Action::new("Increment"));
                }
            }
            fn after(&mut self, _action: &Action, _state_changed: bool) {}
        }

        let mut runtime = DispatchRuntime::with_middleware(0, counter, Echo);
        runtime.dispatch(Action::new("Ping"));
        assert_eq!(*runtime.state(), 0);

        runtime.process_pending();
        assert_eq!(*runtime.state(), 1);
    }

    #[tokio::test]
    async fn test_run_until_quit() {
        let mut runtime = DispatchRuntime::new(0, counter);
        let tx = runtime.action_tx();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = tx.send(Action::new("Increment"));
            let _ = tx.send(Action::new("Quit"));
            let _ = tx.send(Action::new("Increment"));
        });

        runtime.run(|action| action.kind == "Quit").await;
        assert_eq!(*runtime.state(), 1);

        assert!(runtime.next_action().await);
        assert_eq!(*runtime.state(), 2);
    }
}
