//! # Zonelog Testing
//!
//! Testing utilities for the zone change ingestion bridge.
//!
//! This crate provides:
//! - [`InMemoryRecordStore`]: a `RecordStore` with failure injection
//! - [`LogCapture`]: a `tracing` layer for asserting on emitted log records
//! - [`fixtures`]: well-formed and malformed payloads
//! - [`properties`]: proptest strategies for payloads
//!
//! ## Example
//!
//! ```ignore
//! use zonelog_testing::{InMemoryRecordStore, LogCapture, fixtures};
//!
//! #[tokio::test]
//! async fn malformed_payload_is_dropped() {
//!     let store = Arc::new(InMemoryRecordStore::new());
//!     let handler = ZoneChangeHandler::new(store.clone());
//!     let capture = LogCapture::new();
//!     let _guard = tracing::subscriber::set_default(capture.subscriber());
//!
//!     let message = InboundMessage::new("zone_change", fixtures::MISSING_FIELDS_PAYLOAD);
//!     handler.handle(&message).await;
//!
//!     assert!(store.is_empty());
//!     assert_eq!(capture.count(Level::ERROR), 1);
//! }
//! ```

pub mod fixtures;
mod log_capture;
mod record_store;

pub use log_capture::{CapturedEvent, LogCapture};
pub use record_store::InMemoryRecordStore;

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use zonelog_core::ZoneChangeEvent;

    /// Non-blank subject identifiers.
    pub fn subject_id() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_-]{1,36}"
    }

    /// Any zone code.
    pub fn zone() -> impl Strategy<Value = i32> {
        any::<i32>()
    }

    /// Finite measurements in a realistic range.
    pub fn measured_value() -> impl Strategy<Value = f64> {
        -1.0e6..1.0e6_f64
    }

    /// Events that encode to well-formed payloads.
    pub fn zone_change_event() -> impl Strategy<Value = ZoneChangeEvent> {
        (
            subject_id(),
            zone(),
            zone(),
            measured_value(),
            proptest::option::of(0.0..2.0e9_f64),
        )
            .prop_map(
                |(subject_id, previous_zone, new_zone, current_value, source_timestamp)| {
                    ZoneChangeEvent {
                        subject_id,
                        previous_zone,
                        new_zone,
                        current_value,
                        source_timestamp,
                    }
                },
            )
    }

    /// Payloads that never decode: a required field removed, a required field
    /// given the wrong type, or bytes that are not UTF-8.
    pub fn malformed_payload() -> impl Strategy<Value = Vec<u8>> {
        let missing_field = (zone_change_event(), 0..4_usize).prop_map(|(event, drop)| {
            let mut value = serde_json::json!({
                "user_id": event.subject_id,
                "zona_anterior": event.previous_zone,
                "zona_nueva": event.new_zone,
                "bpm_actual": event.current_value,
            });
            let key = ["user_id", "zona_anterior", "zona_nueva", "bpm_actual"][drop];
            if let Some(object) = value.as_object_mut() {
                object.remove(key);
            }
            value.to_string().into_bytes()
        });

        let wrong_type = (zone_change_event(), 0..4_usize, "[a-z]{1,8}").prop_map(
            |(event, which, text)| {
                let mut value = serde_json::json!({
                    "user_id": event.subject_id,
                    "zona_anterior": event.previous_zone,
                    "zona_nueva": event.new_zone,
                    "bpm_actual": event.current_value,
                });
                let (key, replacement) = match which {
                    0 => ("user_id", serde_json::json!(event.previous_zone)),
                    1 => ("zona_anterior", serde_json::json!(text)),
                    2 => ("zona_nueva", serde_json::json!([event.new_zone])),
                    _ => ("bpm_actual", serde_json::json!(text)),
                };
                value[key] = replacement;
                value.to_string().into_bytes()
            },
        );

        let not_utf8 = proptest::collection::vec(any::<u8>(), 0..256).prop_map(|mut bytes| {
            bytes.insert(0, 0xff);
            bytes
        });

        prop_oneof![missing_field, wrong_type, not_utf8]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use zonelog_core::ZoneChangeEvent;

    #[test]
    fn example_payload_decodes() {
        let event = ZoneChangeEvent::decode(fixtures::EXAMPLE_PAYLOAD.as_bytes()).unwrap();
        assert_eq!(event.subject_id, "u1");
    }

    #[test]
    fn malformed_fixtures_never_decode() {
        for (name, payload) in fixtures::malformed_payloads() {
            assert!(ZoneChangeEvent::decode(&payload).is_err(), "{name} decoded");
        }
    }

    proptest! {
        #[test]
        fn generated_events_decode(event in properties::zone_change_event()) {
            let payload = fixtures::zone_change_payload(
                &event.subject_id,
                event.previous_zone,
                event.new_zone,
                event.current_value,
            );
            let decoded = ZoneChangeEvent::decode(&payload).unwrap();
            prop_assert_eq!(decoded.subject_id, event.subject_id);
            prop_assert_eq!(decoded.previous_zone, event.previous_zone);
            prop_assert_eq!(decoded.new_zone, event.new_zone);
        }

        #[test]
        fn generated_malformed_payloads_fail(payload in properties::malformed_payload()) {
            prop_assert!(ZoneChangeEvent::decode(&payload).is_err());
        }
    }
}
