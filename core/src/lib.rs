//! # Zonelog Core
//!
//! Domain types and the two seams of the zone change ingestion bridge.
//!
//! The bridge receives "zone change" notifications from an MQTT topic and appends
//! one row per notification to a relational table. This crate holds everything
//! that is independent of the broker and of the database driver:
//!
//! - [`event`]: the wire payload ([`ZoneChangeEvent`]), its decoder and the rows
//!   written to and read back from the store
//! - [`record_store`]: the [`RecordStore`] trait the handler persists through
//! - [`message`]: the [`InboundMessage`] envelope and the [`MessageHandler`] trait
//!   the bus client invokes once per delivery
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────────┐   InboundMessage   ┌────────────────┐  ZoneChangeRecord  ┌─────────────┐
//! │  Bus client  │ ─────────────────► │ MessageHandler │ ─────────────────► │ RecordStore │
//! │ (zonelog-mqtt)│                   │   (service)    │                    │ (postgres)  │
//! └──────────────┘                    └────────────────┘                    └─────────────┘
//! ```
//!
//! Delivery is at-least-once: a redelivered message is decoded and inserted again,
//! producing a second row. Nothing in this crate deduplicates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event;
pub mod message;
pub mod record_store;

pub use chrono::{DateTime, Utc};
pub use event::{
    DecodeError, MAX_LOGGED_PAYLOAD_BYTES, PersistedEventRecord, SERVICE_ORIGIN,
    ZONE_CHANGE_MESSAGE, ZoneChangeEvent, ZoneChangeRecord, payload_preview,
};
pub use message::{DiscardReason, HandleOutcome, InboundMessage, MessageHandler};
pub use record_store::{RecordStore, StoreError};
