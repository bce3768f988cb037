//! `PostgreSQL` record store for the zone change ingestion bridge.
//!
//! This crate provides the production [`RecordStore`](zonelog_core::RecordStore)
//! implementation. It uses sqlx for connection pooling and parameterized queries:
//!
//! - Connection options built field by field, so credentials never appear in a DSN
//!   string or in a log record
//! - An eager liveness check at connect time, so a bad configuration fails at startup
//!   instead of on the first event
//! - A single parameterized `INSERT` per event, bounded by a statement timeout
//! - An explicit, idempotent [`PostgresRecordStore::close`] for orderly shutdown
//!
//! # Example
//!
//! ```no_run
//! use zonelog_postgres::{PostgresConfig, PostgresRecordStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PostgresConfig::new("localhost", 5432, "logger", "secret", "msoft");
//! let store = PostgresRecordStore::connect(&config).await?;
//! // ... hand `store` to the event handler ...
//! store.close().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod schema;
pub mod store;

pub use config::PostgresConfig;
pub use sqlx::postgres::PgSslMode;
pub use store::PostgresRecordStore;
