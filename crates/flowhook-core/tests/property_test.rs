//! Property-based tests for envelope validation invariants.
//!
//! Inbound envelopes come from the network, so validation must never panic
//! and must name every field that breaks the shape.

#![allow(clippy::unwrap_used)]

use flowhook_core::{EventEnvelope, EventId};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use serde_json::{json, Value};

/// Deterministic property test configuration for CI stability.
fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        fork: false,
        failure_persistence: None,
        source_file: None,
        ..ProptestConfig::default()
    }
}

/// Arbitrary JSON values up to a small depth.
fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 :.-]{0,24}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::from),
            prop::collection::btree_map("[a-zA-Z]{1,10}", inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn envelope_field_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["eventId", "aggregator", "eventType", "validTime", "payload"])
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Arbitrary JSON never panics the validator, and acceptance implies the
    /// required keys were present with the right types.
    #[test]
    fn parse_never_panics(value in json_strategy()) {
        if let Ok(envelope) = EventEnvelope::parse(&value) {
            prop_assert_eq!(value["eventId"].as_str(), Some(envelope.event_id.as_str()));
            prop_assert_eq!(value["aggregator"].as_str(), Some(envelope.aggregator.as_str()));
        }
    }

    /// Removing any required field is reported under that field's path.
    #[test]
    fn missing_required_field_is_named(
        field in envelope_field_strategy(),
        payload in json_strategy(),
        flow_type in "[a-z]{1,12}\\.[0-9]",
    ) {
        let mut event = json!({
            "eventId": EventId::nil().to_string(),
            "aggregator": flow_type,
            "eventType": "created.0",
            "validTime": "2024-05-01T10:00:00.000Z",
            "payload": payload,
        });
        event.as_object_mut().unwrap().remove(field);

        let error = EventEnvelope::parse(&event).unwrap_err();
        let path = format!("/{field}");
        prop_assert_eq!(error.errors.get(&path).map(String::as_str), Some("Expected required property"));
        prop_assert_eq!(error.errors.len(), 1);
    }

    /// A well-formed envelope carries its payload through untouched.
    #[test]
    fn payload_is_preserved(payload in json_strategy()) {
        let event = json!({
            "eventId": "evt-1",
            "aggregator": "orders.0",
            "eventType": "created.0",
            "validTime": "2024-05-01T10:00:00Z",
            "payload": payload.clone(),
        });

        let envelope = EventEnvelope::parse(&event).unwrap();
        prop_assert_eq!(envelope.payload, payload);
    }
}
