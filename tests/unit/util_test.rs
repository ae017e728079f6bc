//! Tests for utility functions

use tick_scheduler::util::{init_tracing, init_tracing_with, TriggerId};
use uuid::Uuid;

#[test]
fn test_trigger_id_from_uuid() {
    let raw = Uuid::new_v4();
    let id = TriggerId::from(raw);
    assert_eq!(id.as_uuid(), &raw);
    assert_eq!(id.to_string(), raw.to_string());
}

#[test]
fn test_trigger_id_serde() {
    let id = TriggerId::new();
    let json = serde_json::to_string(&id).unwrap();
    let back: TriggerId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, back);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing_with("tick_scheduler=debug");
    init_tracing();
    init_tracing();
}
