//! Two "tabs" sharing one storage area keep a counter in sync.
//!
//! Run with `RUST_LOG=debug` to watch the protocol.

use std::time::Duration;

use dispatch_broadcast::prelude::*;
use tracing_subscriber::EnvFilter;

fn counter(count: &mut i64, action: Action) -> bool {
    match action.kind.as_str() {
        "Increment" => {
            *count += 1;
            true
        }
        "Decrement" => {
            *count -= 1;
            true
        }
        _ => false,
    }
}

fn open_tab(storage: &MemoryStorage) -> DispatchRuntime<i64, ComposedMiddleware> {
    DispatchRuntime::with_middleware(0, counter, |dispatch| {
        ComposedMiddleware::new()
            .with(ActionLoggerMiddleware::log_all())
            .with(BroadcastMiddleware::new(
                storage.context(),
                BroadcastConfig::default(),
                dispatch,
            ))
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let storage = MemoryStorage::new();
    let mut left = open_tab(&storage);
    let mut right = open_tab(&storage);

    let shared = |kind: &str| Action::new(kind).with_meta_field("broadcast", true);

    left.dispatch(shared("Increment"));
    left.dispatch(shared("Increment"));
    right.dispatch(shared("Decrement"));
    // Local only
    right.dispatch(Action::new("Increment"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    left.process_pending();
    right.process_pending();

    println!("left  = {}", left.state());
    println!("right = {}", right.state());
}
