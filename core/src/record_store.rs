//! Record store trait for persisting zone change rows.
//!
//! The store is append-only from the bridge's point of view: rows are inserted,
//! never updated or deleted. Each decoded event produces at most one insert attempt;
//! a failed insert is reported to the caller, which logs and drops it.
//!
//! # Implementations
//!
//! - `PostgresRecordStore` (in `zonelog-postgres`): production implementation
//! - `InMemoryRecordStore` (in `zonelog-testing`): fast, deterministic testing
//!
//! # Dyn Compatibility
//!
//! The trait returns `Pin<Box<dyn Future>>` instead of using `async fn` so that the
//! handler can hold it as `Arc<dyn RecordStore>`.

use crate::event::ZoneChangeRecord;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the record store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Could not open a connection (unreachable host, rejected credentials).
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The connection opened but the no-op round trip failed.
    #[error("Liveness check failed: {0}")]
    LivenessCheck(String),

    /// The insert statement was rejected (constraint violation, type mismatch, I/O).
    #[error("Insert failed: {0}")]
    Insert(String),

    /// A read-back query failed.
    #[error("Query failed: {0}")]
    Query(String),

    /// The insert did not complete within the statement timeout.
    #[error("Insert timed out after {0:?}")]
    Timeout(Duration),

    /// The store has been closed.
    #[error("Record store is closed")]
    Closed,
}

/// Append-only sink for [`ZoneChangeRecord`]s.
///
/// Implementations must be safe for concurrent use: the bus client may run several
/// handler invocations at once, all sharing one store.
pub trait RecordStore: Send + Sync {
    /// Insert one row. The store assigns the row's `recorded_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the row could not be written. Callers do not retry.
    fn insert<'a>(
        &'a self,
        record: &'a ZoneChangeRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;
}
