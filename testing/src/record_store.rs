//! In-memory [`RecordStore`] for fast, deterministic handler tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use chrono::Utc;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zonelog_core::{PersistedEventRecord, RecordStore, StoreError, ZoneChangeRecord};

#[derive(Debug, Default)]
struct Inner {
    records: Vec<PersistedEventRecord>,
    failures: VecDeque<StoreError>,
    attempts: usize,
    in_flight: usize,
    max_in_flight: usize,
    closed: bool,
}

/// Append-only store that keeps rows in memory.
///
/// Each insert is stamped with the current time, as the real store does. Failures
/// can be queued with [`fail_next_insert`](Self::fail_next_insert), and an insert
/// delay makes concurrent inserts overlap observably.
///
/// Clones share state.
///
/// # Example
///
/// ```
/// use zonelog_core::{RecordStore, StoreError, ZoneChangeEvent, ZoneChangeRecord};
/// use zonelog_testing::InMemoryRecordStore;
///
/// # async fn example() {
/// let store = InMemoryRecordStore::new();
/// let event = ZoneChangeEvent::decode(zonelog_testing::fixtures::EXAMPLE_PAYLOAD.as_bytes()).unwrap();
/// let record = ZoneChangeRecord::from_event("zone_change", &event);
///
/// store.fail_next_insert(StoreError::Insert("constraint violation".into()));
/// assert!(store.insert(&record).await.is_err());
/// assert!(store.insert(&record).await.is_ok());
///
/// assert_eq!(store.len(), 1);
/// assert_eq!(store.insert_attempts(), 2);
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRecordStore {
    inner: Arc<Mutex<Inner>>,
    insert_delay: Option<Duration>,
}

impl InMemoryRecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every successful insert.
    #[must_use]
    pub const fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    /// Make the next insert fail with `error`. Calls queue up in order.
    pub fn fail_next_insert(&self, error: StoreError) {
        self.inner.lock().unwrap().failures.push_back(error);
    }

    /// Reject every later insert with [`StoreError::Closed`].
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
    }

    /// All stored rows, in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<PersistedEventRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    /// Rows for one subject, in insertion order.
    #[must_use]
    pub fn records_for_subject(&self, subject_id: &str) -> Vec<PersistedEventRecord> {
        self.inner
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.subject_id == subject_id)
            .cloned()
            .collect()
    }

    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    /// Whether no rows are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().records.is_empty()
    }

    /// Number of insert calls, successful or not.
    #[must_use]
    pub fn insert_attempts(&self) -> usize {
        self.inner.lock().unwrap().attempts
    }

    /// Highest number of inserts that were in progress at once.
    #[must_use]
    pub fn max_concurrent_inserts(&self) -> usize {
        self.inner.lock().unwrap().max_in_flight
    }

    /// Drop all rows, queued failures and counters.
    pub fn clear(&self) {
        *self.inner.lock().unwrap() = Inner::default();
    }

    async fn insert_record(&self, record: &ZoneChangeRecord) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.attempts += 1;
            if inner.closed {
                return Err(StoreError::Closed);
            }
            if let Some(error) = inner.failures.pop_front() {
                return Err(error);
            }
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
        }

        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        inner.in_flight -= 1;
        inner
            .records
            .push(PersistedEventRecord::from_record(record, Utc::now()));
        Ok(())
    }
}

impl RecordStore for InMemoryRecordStore {
    fn insert<'a>(
        &'a self,
        record: &'a ZoneChangeRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(self.insert_record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use zonelog_core::ZoneChangeEvent;

    fn record(subject: &str) -> ZoneChangeRecord {
        let event =
            ZoneChangeEvent::decode(&fixtures::zone_change_payload(subject, 1, 2, 101.0)).unwrap();
        ZoneChangeRecord::from_event(fixtures::ZONE_CHANGE_TOPIC, &event)
    }

    #[tokio::test]
    async fn stores_rows_with_timestamp() {
        let store = InMemoryRecordStore::new();
        let before = Utc::now();
        store.insert(&record("u1")).await.unwrap();

        let rows = store.records();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject_id, "u1");
        assert_eq!(rows[0].bus_topic, fixtures::ZONE_CHANGE_TOPIC);
        assert!(rows[0].recorded_at >= before);
    }

    #[tokio::test]
    async fn queued_failures_apply_in_order() {
        let store = InMemoryRecordStore::new();
        store.fail_next_insert(StoreError::Timeout(Duration::from_secs(5)));
        store.fail_next_insert(StoreError::Insert("boom".to_string()));

        assert!(matches!(
            store.insert(&record("u1")).await,
            Err(StoreError::Timeout(_))
        ));
        assert!(matches!(
            store.insert(&record("u1")).await,
            Err(StoreError::Insert(_))
        ));
        assert!(store.insert(&record("u1")).await.is_ok());
        assert_eq!(store.len(), 1);
        assert_eq!(store.insert_attempts(), 3);
    }

    #[tokio::test]
    async fn closed_store_rejects_inserts() {
        let store = InMemoryRecordStore::new();
        store.close();
        assert!(matches!(
            store.insert(&record("u1")).await,
            Err(StoreError::Closed)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delayed_inserts_overlap() {
        let store = InMemoryRecordStore::new().with_insert_delay(Duration::from_millis(20));
        let records: Vec<_> = (0..5).map(|i| record(&format!("u{i}"))).collect();

        futures::future::join_all(records.iter().map(|r| store.insert(r))).await;

        assert_eq!(store.len(), 5);
        assert_eq!(store.max_concurrent_inserts(), 5);
        assert_eq!(store.records_for_subject("u3").len(), 1);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = InMemoryRecordStore::new();
        let clone = store.clone();
        clone.insert(&record("u1")).await.unwrap();
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(clone.is_empty());
        assert_eq!(clone.insert_attempts(), 0);
    }
}
