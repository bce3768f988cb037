//! # Zonelog Service
//!
//! The zone change logger daemon: subscribes to the zone change topic and appends
//! one row per delivered notification to the `zone_change_events` table.
//!
//! ## Architecture
//!
//! ```text
//! MQTT broker ──► MqttBus (zonelog-mqtt) ──► ZoneChangeHandler ──► PostgresRecordStore
//!                     │                           │
//!                     └── reconnects forever      └── one log record per message
//! ```
//!
//! - [`config`]: environment-driven settings, validated before anything connects
//! - [`telemetry`]: JSON or pretty structured logs
//! - [`handler`]: decode, insert, log; failures drop the message
//! - [`lifecycle`]: startup ordering and bounded graceful shutdown
//! - [`metrics`]: persisted and discarded counters
//!
//! ## Running
//!
//! ```bash
//! MQTT_HOST=localhost MQTT_PORT=1883 \
//! DB_HOST=localhost DB_PORT=5432 DB_USER=zonelog DB_PASSWORD=secret DB_NAME=zonelog \
//! cargo run --bin zonelog
//! ```

pub mod config;
pub mod handler;
pub mod lifecycle;
pub mod metrics;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use handler::ZoneChangeHandler;
pub use lifecycle::{Application, shutdown_signal};
pub use telemetry::{LogFormat, TelemetryConfig, TelemetryError};

use thiserror::Error;
use zonelog_core::StoreError;
use zonelog_mqtt::BusError;

/// Reasons the service could not reach its running state.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The record store could not be reached.
    #[error("Record store unavailable: {0}")]
    Store(#[from] StoreError),

    /// The broker could not be reached.
    #[error("Message bus unavailable: {0}")]
    Bus(#[from] BusError),
}
