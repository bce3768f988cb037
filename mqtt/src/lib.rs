//! MQTT bus client for the zone change ingestion bridge.
//!
//! Subscribes to a single topic and hands every delivery to a
//! [`MessageHandler`](zonelog_core::MessageHandler). Built on `rumqttc`.
//!
//! # Connection lifecycle
//!
//! The client is an explicit state machine (see [`state`]):
//!
//! ```text
//! Disconnected → Connecting → ConnectedUnsubscribed → Subscribed
//!                    ▲                 │                  │
//!                    └─ ReconnectPending ◄────────────────┘
//! ```
//!
//! - Reconnection is unbounded, at a fixed interval with no backoff growth
//! - The session is persistent (keyed on the client id), so the broker keeps
//!   unacknowledged messages across a transport drop or a restart; the
//!   subscription is still re-asserted on every connect
//! - A rejected subscription is logged; the client stays connected but receives
//!   nothing until the next reconnect
//! - Losing the connection is logged at warning level and never fatal
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual acknowledgements:
//! - Each message is acknowledged AFTER its handler returns
//! - An ack is only sent on the connection that delivered the message; a handler
//!   that outlives its connection leaves the message to broker redelivery
//! - If the process dies before the ack, the broker redelivers on the next
//!   connect with the same client id
//! - Handlers therefore see duplicates; nothing here deduplicates
//! - Handlers run concurrently, with no ordering across messages
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use zonelog_mqtt::{MqttBus, MqttConfig, ShutdownOutcome};
//! # use zonelog_core::MessageHandler;
//!
//! # async fn example(handler: Arc<dyn MessageHandler>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = MqttConfig::builder()
//!     .host("localhost")
//!     .port(1883)
//!     .topic("msoft/msrr/zone_change")
//!     .build()?;
//!
//! let bus = MqttBus::start(&config, handler);
//! bus.wait_until_connected(Duration::from_secs(30)).await?;
//!
//! let outcome = bus.shutdown(Duration::from_millis(250)).await;
//! assert_eq!(outcome, ShutdownOutcome::Graceful);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;
use thiserror::Error;

mod client;
pub mod config;
mod driver;
pub mod state;

pub use client::{MqttBus, ShutdownOutcome};
pub use config::{MqttConfig, MqttConfigBuilder, MqttCredentials};
pub use driver::RECONNECTS_METRIC;
pub use state::ConnectionState;

/// Errors from the bus client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A configuration value is missing or out of range.
    #[error("Invalid MQTT configuration: {0}")]
    InvalidConfig(String),

    /// No connection was accepted within the first-connect window.
    #[error("Could not connect to MQTT broker {broker} within {timeout:?}")]
    InitialConnectTimeout {
        /// `host:port` of the broker
        broker: String,
        /// The window that expired
        timeout: Duration,
    },

    /// The driver task is no longer running.
    #[error("MQTT driver task stopped")]
    DriverStopped,
}
