//! Broadcasting between runtimes attached to the same storage area

use std::time::Duration;

use dispatch_broadcast::prelude::*;
use dispatch_broadcast::{assert_kind_emitted, ChannelError};
use serde_json::{json, Value};

#[derive(Debug, Default)]
struct Todos {
    items: Vec<String>,
    seen: Vec<Action>,
}

fn reducer(state: &mut Todos, action: Action) -> bool {
    state.seen.push(action.clone());
    match (action.kind.as_str(), &action.payload) {
        ("TodoAdd", Some(Value::String(item))) => {
            state.items.push(item.clone());
            true
        }
        _ => false,
    }
}

type Tab = DispatchRuntime<Todos, BroadcastMiddleware<MemoryChannel>>;

fn open_tab_with(storage: &MemoryStorage, options: BroadcastOptions) -> Tab {
    DispatchRuntime::with_middleware(Todos::default(), reducer, |dispatch| {
        BroadcastMiddleware::new(storage.context(), options, dispatch)
    })
}

fn open_tab(storage: &MemoryStorage) -> Tab {
    open_tab_with(storage, BroadcastOptions::new())
}

fn add(item: &str) -> Action {
    Action::new("TodoAdd")
        .with_payload(item)
        .with_meta(json!({ "broadcast": true, "foo": 1 }))
}

/// Dispatch the next queued action, if one arrives in time
async fn receive(tab: &mut Tab) -> bool {
    tokio::time::timeout(Duration::from_millis(200), tab.next_action())
        .await
        .is_ok()
}

/// Let listeners run, then dispatch whatever they queued
async fn settle(tab: &mut Tab) -> usize {
    tokio::time::sleep(Duration::from_millis(20)).await;
    tab.process_pending()
}

#[tokio::test]
async fn test_round_trip_clears_marker() {
    let storage = MemoryStorage::new();
    let mut a = open_tab(&storage);
    let mut b = open_tab(&storage);
    assert!(a.middleware().is_listening());
    assert!(b.middleware().is_listening());

    a.dispatch(add("milk"));
    assert_eq!(a.state().items, vec!["milk"]);
    // The reducer saw the original action
    assert_eq!(a.state().seen, vec![add("milk")]);

    assert!(receive(&mut b).await);
    assert_eq!(b.state().items, vec!["milk"]);
    assert_eq!(
        b.state().seen,
        vec![Action::new("TodoAdd")
            .with_payload("milk")
            .with_meta(json!({ "broadcast": null, "foo": 1 }))]
    );

    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_origin_does_not_receive_its_own_broadcast() {
    let storage = MemoryStorage::new();
    let mut a = open_tab(&storage);
    let mut b = open_tab(&storage);
    let mut c = open_tab(&storage);

    a.dispatch(add("eggs"));

    assert_eq!(settle(&mut b).await, 1);
    assert_eq!(settle(&mut c).await, 1);
    assert_eq!(settle(&mut a).await, 0);
    assert_eq!(a.state().items, vec!["eggs"]);
}

#[tokio::test]
async fn test_received_actions_are_not_rebroadcast() {
    let storage = MemoryStorage::new();
    let mut a = open_tab(&storage);
    let mut b = open_tab(&storage);
    let mut c = open_tab(&storage);

    a.dispatch(add("bread"));

    // B and C dispatch the received action through their own middleware
    assert_eq!(settle(&mut b).await, 1);
    assert_eq!(settle(&mut c).await, 1);

    // Nothing bounces back to anyone
    assert_eq!(settle(&mut a).await, 0);
    assert_eq!(settle(&mut b).await, 0);
    assert_eq!(settle(&mut c).await, 0);

    let received = b.state().seen.last().unwrap();
    assert_eq!(
        b.middleware().broadcaster().broadcast(received),
        BroadcastOutcome::Ineligible
    );
}

#[tokio::test]
async fn test_unmarked_actions_stay_local() {
    let storage = MemoryStorage::new();
    let mut a = open_tab(&storage);
    let mut b = open_tab(&storage);

    a.dispatch(Action::new("TodoAdd").with_payload("local"));
    a.dispatch(
        Action::new("TodoAdd")
            .with_payload("off")
            .with_meta_field("broadcast", false),
    );

    assert_eq!(a.state().items, vec!["local", "off"]);
    assert_eq!(settle(&mut b).await, 0);
}

#[tokio::test]
async fn test_malformed_envelope_becomes_error_action() {
    let storage = MemoryStorage::new();
    let config = BroadcastConfig::default();
    let mut b = open_tab(&storage);

    let event = StorageEvent::set(
        config.storage_key.clone(),
        None,
        "not valid structured text",
    );
    storage.inject(event.clone());

    assert_eq!(settle(&mut b).await, 1);
    let seen = &b.state().seen;
    assert_kind_emitted!(seen, config.error_key);

    let error = &seen[0];
    assert_eq!(
        error.meta,
        Some(json!({ "event": serde_json::to_value(&event).unwrap() }))
    );
    assert_eq!(error.payload.as_ref().unwrap()["kind"], json!("syntax"));
}

#[tokio::test]
async fn test_untrusted_event_is_ignored() {
    let storage = MemoryStorage::new();
    let config = BroadcastConfig::default();
    let mut b = open_tab(&storage);

    let text = dispatch_broadcast::encode(&add("spoofed")).unwrap();
    storage.inject(StorageEvent::set(config.storage_key, None, text).untrusted());

    assert_eq!(settle(&mut b).await, 0);
    assert!(b.state().items.is_empty());
}

#[tokio::test]
async fn test_unavailable_storage_disables_broadcasting() {
    let storage = MemoryStorage::new();
    storage.set_available(false);
    let mut a = open_tab(&storage);
    assert!(!a.middleware().is_listening());

    // Dispatching still works, nothing is written
    a.dispatch(add("tea"));
    assert_eq!(a.state().items, vec!["tea"]);
    assert!(storage.is_empty());

    storage.set_available(true);
    let mut b = open_tab(&storage);
    b.dispatch(add("coffee"));

    // `a` never installed a listener
    assert_eq!(settle(&mut a).await, 0);
}

#[tokio::test]
async fn test_availability_is_probed_per_write() {
    let storage = MemoryStorage::new();
    let mut a = open_tab(&storage);
    let mut b = open_tab(&storage);

    storage.set_available(false);
    a.dispatch(add("one"));
    assert_eq!(settle(&mut b).await, 0);

    storage.set_available(true);
    a.dispatch(add("two"));
    assert_eq!(settle(&mut b).await, 1);
    assert_eq!(b.state().items, vec!["two"]);
}

#[tokio::test]
async fn test_quota_exceeded_write_is_swallowed() {
    // Room for the probe but not for the envelope
    let storage = MemoryStorage::with_quota(100);
    let mut a = open_tab(&storage);
    let mut b = open_tab(&storage);

    let big = add(&"x".repeat(200));
    let outcome = a.middleware().broadcaster().broadcast(&big);
    assert!(matches!(
        outcome,
        BroadcastOutcome::WriteFailed(ChannelError::QuotaExceeded { .. })
    ));

    a.dispatch(big);
    assert_eq!(a.state().items.len(), 1);
    assert_eq!(settle(&mut b).await, 0);
}

#[tokio::test]
async fn test_custom_keys() {
    let storage = MemoryStorage::new();
    let options = BroadcastOptions::new()
        .with_meta_key("sync")
        .with_storage_key("todos/action");
    let mut a = open_tab_with(&storage, options.clone());
    let mut b = open_tab_with(&storage, options);
    let mut other = open_tab(&storage);

    a.dispatch(Action::new("TodoAdd").with_payload("jam").with_meta_field("sync", true));

    assert!(receive(&mut b).await);
    assert_eq!(
        b.state().seen[0].meta,
        Some(json!({ "sync": null }))
    );
    // Different channel key, different meta key
    assert_eq!(settle(&mut other).await, 0);
}

#[tokio::test]
async fn test_shutdown_stops_receiving() {
    let storage = MemoryStorage::new();
    let mut a = open_tab(&storage);
    let mut b = open_tab(&storage);

    b.middleware_mut().shutdown();
    a.dispatch(add("late"));

    assert_eq!(settle(&mut b).await, 0);

    // Outbound still works from the closed tab
    b.dispatch(add("still sent"));
    assert_eq!(settle(&mut a).await, 1);
}
