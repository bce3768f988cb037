//! Pooled `PostgreSQL` implementation of [`RecordStore`].

use crate::config::PostgresConfig;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use zonelog_core::{PersistedEventRecord, RecordStore, StoreError, ZoneChangeRecord};

const INSERT_ZONE_CHANGE: &str = r"
    INSERT INTO sch_msoft.tbl_zone_change_events
        (message, service_origin, mqtt_topic, user_id, zone_previous, zone_new, bpm)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
";

/// Append-only record store backed by a `PostgreSQL` connection pool.
///
/// Cloning is cheap and shares the pool. The pool is safe for concurrent use by any
/// number of in-flight handler invocations.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresRecordStore {
    /// Open the pool and verify it with a no-op round trip.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Connection`] if no connection can be opened (unreachable host,
    ///   rejected credentials, unknown database)
    /// - [`StoreError::LivenessCheck`] if the connection opens but `SELECT 1` fails
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            user = %config.user,
            max_connections = config.max_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(config.connect_options())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self::from_pool(pool, config.statement_timeout);
        if let Err(e) = store.ping().await {
            store.pool.close().await;
            return Err(e);
        }

        tracing::info!(host = %config.host, "Connection established with PostgreSQL");
        Ok(store)
    }

    /// Wrap an existing pool without a liveness check.
    #[must_use]
    pub const fn from_pool(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Access the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run a no-op round trip.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LivenessCheck`] if the query fails.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::LivenessCheck(e.to_string()))?;
        Ok(())
    }

    /// Rows recorded for one subject, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after [`close`](Self::close), or
    /// [`StoreError::Query`] wrapping the driver error if the query fails.
    pub async fn records_for_subject(
        &self,
        subject_id: &str,
    ) -> Result<Vec<PersistedEventRecord>, StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Closed);
        }

        let rows = sqlx::query(
            r"
            SELECT message, service_origin, mqtt_topic, user_id,
                   zone_previous, zone_new, bpm, recorded_at
            FROM sch_msoft.tbl_zone_change_events
            WHERE user_id = $1
            ORDER BY recorded_at ASC, id ASC
            ",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.iter()
            .map(persisted_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    /// Close the pool, waiting for checked-out connections to be returned.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        if self.pool.is_closed() {
            return;
        }
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
    }

    async fn insert_record(&self, record: &ZoneChangeRecord) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Closed);
        }

        let query = sqlx::query(INSERT_ZONE_CHANGE)
            .bind(record.message)
            .bind(record.service_origin)
            .bind(&record.bus_topic)
            .bind(&record.subject_id)
            .bind(record.zone_previous)
            .bind(record.zone_new)
            .bind(record.measured_value)
            .execute(&self.pool);

        match tokio::time::timeout(self.statement_timeout, query).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(StoreError::Insert(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.statement_timeout)),
        }
    }
}

/// Fails on a column whose type does not decode, e.g. a `TIMESTAMP` without zone.
fn persisted_from_row(row: &PgRow) -> Result<PersistedEventRecord, sqlx::Error> {
    Ok(PersistedEventRecord {
        message: row.try_get("message")?,
        service_origin: row.try_get("service_origin")?,
        bus_topic: row.try_get("mqtt_topic")?,
        subject_id: row.try_get("user_id")?,
        zone_previous: row.try_get("zone_previous")?,
        zone_new: row.try_get("zone_new")?,
        measured_value: row.try_get("bpm")?,
        recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at")?,
    })
}

impl RecordStore for PostgresRecordStore {
    fn insert<'a>(
        &'a self,
        record: &'a ZoneChangeRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(self.insert_record(record))
    }
}
