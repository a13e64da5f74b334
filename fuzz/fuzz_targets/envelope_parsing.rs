#![no_main]

//! Fuzz target for inbound envelope parsing.
//!
//! Arbitrary request bodies must either parse into an envelope or produce
//! a non-empty field error map. Parsing must never panic.

use flowhook_core::EventEnvelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match EventEnvelope::from_slice(data) {
        Ok(envelope) => {
            // A parsed envelope must survive serialization and parse back.
            let value = serde_json::to_value(&envelope).expect("envelope serializes");
            let reparsed = EventEnvelope::parse(&value).expect("serialized envelope parses");
            assert_eq!(reparsed.event_id, envelope.event_id);
            assert_eq!(reparsed.event_type, envelope.event_type);
        },
        Err(e) => assert!(!e.errors.is_empty(), "rejection must name at least one field"),
    }
});
