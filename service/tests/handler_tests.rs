//! Behavioral tests for `ZoneChangeHandler` against the in-memory store.

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use zonelog_core::{
    DiscardReason, HandleOutcome, InboundMessage, MessageHandler, RecordStore, StoreError,
    ZoneChangeEvent,
};
use zonelog_service::ZoneChangeHandler;
use zonelog_testing::fixtures::{
    EXAMPLE_PAYLOAD, MISSING_FIELDS_PAYLOAD, ZONE_CHANGE_TOPIC, malformed_payloads,
    zone_change_payload,
};
use zonelog_testing::{InMemoryRecordStore, LogCapture, properties};

fn handler_with(store: &InMemoryRecordStore) -> ZoneChangeHandler {
    ZoneChangeHandler::new(Arc::new(store.clone()) as Arc<dyn RecordStore>)
}

fn message(payload: impl Into<Vec<u8>>) -> InboundMessage {
    InboundMessage::new(ZONE_CHANGE_TOPIC, payload)
}

fn close_enough(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * b.abs().max(1.0)
}

#[tokio::test]
async fn test_example_payload_is_persisted() {
    let store = InMemoryRecordStore::new();
    let handler = handler_with(&store);
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let before = chrono::Utc::now();
    let outcome = handler.handle(&message(EXAMPLE_PAYLOAD)).await;

    assert_eq!(outcome, HandleOutcome::Persisted);
    let rows = store.records();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.subject_id, "u1");
    assert_eq!(row.zone_previous, 2);
    assert_eq!(row.zone_new, 3);
    assert!(close_enough(row.measured_value, 142.5));
    assert_eq!(row.bus_topic, ZONE_CHANGE_TOPIC);
    assert_eq!(row.message, zonelog_core::ZONE_CHANGE_MESSAGE);
    assert_eq!(row.service_origin, zonelog_core::SERVICE_ORIGIN);
    assert!(row.recorded_at >= before);

    assert_eq!(capture.count(Level::ERROR), 0);
    let infos = capture.events_at(Level::INFO);
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].field("user"), Some("u1"));
    assert_eq!(infos[0].field("zona_nueva"), Some("3"));
}

#[tokio::test]
async fn test_missing_fields_logs_one_decode_error() {
    let store = InMemoryRecordStore::new();
    let handler = handler_with(&store);
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let outcome = handler.handle(&message(MISSING_FIELDS_PAYLOAD)).await;

    assert_eq!(outcome, HandleOutcome::Discarded(DiscardReason::Decode));
    assert!(store.is_empty());
    assert_eq!(store.insert_attempts(), 0);

    let errors = capture.events_at(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field("topic"), Some(ZONE_CHANGE_TOPIC));
    assert_eq!(errors[0].field("payload_raw"), Some(MISSING_FIELDS_PAYLOAD));
    assert!(errors[0].field("error").is_some());
    assert_eq!(capture.events().len(), 1);
}

#[tokio::test]
async fn test_every_malformed_fixture_is_dropped() {
    let store = InMemoryRecordStore::new();
    let handler = handler_with(&store);
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    for (name, payload) in malformed_payloads() {
        capture.clear();
        let outcome = handler.handle(&message(payload)).await;

        assert_eq!(
            outcome,
            HandleOutcome::Discarded(DiscardReason::Decode),
            "{name}"
        );
        assert_eq!(capture.count(Level::ERROR), 1, "{name}");
        assert_eq!(capture.events().len(), 1, "{name}");
    }

    assert_eq!(store.insert_attempts(), 0);
}

#[tokio::test]
async fn test_oversized_payload_is_truncated_in_log() {
    let store = InMemoryRecordStore::new();
    let handler = handler_with(&store);
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let payload = vec![b'x'; 10 * zonelog_core::MAX_LOGGED_PAYLOAD_BYTES];
    handler.handle(&message(payload)).await;

    let errors = capture.events_at(Level::ERROR);
    assert_eq!(errors.len(), 1);
    let logged = errors[0].field("payload_raw").unwrap();
    assert!(logged.len() < 2 * zonelog_core::MAX_LOGGED_PAYLOAD_BYTES);
}

#[tokio::test]
async fn test_duplicate_delivery_yields_two_records() {
    let store = InMemoryRecordStore::new();
    let handler = handler_with(&store);

    let delivery = message(EXAMPLE_PAYLOAD);
    assert_eq!(handler.handle(&delivery).await, HandleOutcome::Persisted);
    assert_eq!(handler.handle(&delivery).await, HandleOutcome::Persisted);

    let rows = store.records_for_subject("u1");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].zone_new, rows[1].zone_new);
}

#[tokio::test]
async fn test_insert_failure_is_logged_and_isolated() {
    let store = InMemoryRecordStore::new();
    let handler = handler_with(&store);
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    store.fail_next_insert(StoreError::Insert("deadlock detected".to_string()));

    let failed = handler
        .handle(&message(zone_change_payload("u7", 1, 2, 90.0)))
        .await;
    assert_eq!(failed, HandleOutcome::Discarded(DiscardReason::Insert));

    let errors = capture.events_at(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field("user"), Some("u7"));
    assert_eq!(errors[0].field("topic"), Some(ZONE_CHANGE_TOPIC));
    assert!(errors[0].field("error").unwrap().contains("deadlock detected"));

    capture.clear();
    let next = handler
        .handle(&message(zone_change_payload("u8", 2, 3, 120.0)))
        .await;
    assert_eq!(next, HandleOutcome::Persisted);

    assert_eq!(store.len(), 1);
    assert_eq!(store.records()[0].subject_id, "u8");
    assert_eq!(capture.count(Level::ERROR), 0);
    assert_eq!(capture.count(Level::INFO), 1);
}

#[tokio::test]
async fn test_insert_timeout_and_closed_store_are_discards() {
    let store = InMemoryRecordStore::new();
    let handler = handler_with(&store);

    store.fail_next_insert(StoreError::Timeout(Duration::from_secs(5)));
    assert_eq!(
        handler.handle(&message(EXAMPLE_PAYLOAD)).await,
        HandleOutcome::Discarded(DiscardReason::Insert)
    );

    store.close();
    assert_eq!(
        handler.handle(&message(EXAMPLE_PAYLOAD)).await,
        HandleOutcome::Discarded(DiscardReason::Insert)
    );
    assert!(store.is_empty());
    assert_eq!(store.insert_attempts(), 2);
}

#[tokio::test]
async fn test_concurrent_invocations_all_persist() {
    let store = InMemoryRecordStore::new().with_insert_delay(Duration::from_millis(20));
    let handler = Arc::new(handler_with(&store));

    let messages: Vec<InboundMessage> = (0..20)
        .map(|i| message(zone_change_payload(&format!("user-{i}"), i, i + 1, 100.0)))
        .collect();

    let outcomes = futures::future::join_all(messages.iter().map(|m| handler.handle(m))).await;

    assert!(outcomes.iter().all(|o| *o == HandleOutcome::Persisted));
    assert_eq!(store.len(), 20);
    assert!(store.max_concurrent_inserts() > 1);
    for i in 0..20 {
        assert_eq!(store.records_for_subject(&format!("user-{i}")).len(), 1);
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn prop_well_formed_payload_stored_field_for_field(event in properties::zone_change_event()) {
        let store = InMemoryRecordStore::new();
        let handler = handler_with(&store);
        let payload = zone_change_payload(
            &event.subject_id,
            event.previous_zone,
            event.new_zone,
            event.current_value,
        );

        let outcome = block_on(handler.handle(&message(payload)));

        prop_assert_eq!(outcome, HandleOutcome::Persisted);
        let rows = store.records();
        prop_assert_eq!(rows.len(), 1);
        prop_assert_eq!(&rows[0].subject_id, &event.subject_id);
        prop_assert_eq!(rows[0].zone_previous, event.previous_zone);
        prop_assert_eq!(rows[0].zone_new, event.new_zone);
        prop_assert!(close_enough(rows[0].measured_value, event.current_value));
    }

    #[test]
    fn prop_malformed_payload_never_writes(payload in properties::malformed_payload()) {
        prop_assume!(ZoneChangeEvent::decode(&payload).is_err());

        let store = InMemoryRecordStore::new();
        let handler = handler_with(&store);
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let outcome = block_on(handler.handle(&message(payload)));

        prop_assert_eq!(outcome, HandleOutcome::Discarded(DiscardReason::Decode));
        prop_assert_eq!(store.insert_attempts(), 0);
        prop_assert_eq!(capture.count(Level::ERROR), 1);
    }
}
