//! Zone change payloads and the rows derived from them.
//!
//! The producer publishes a JSON object per zone transition:
//!
//! ```json
//! {"user_id":"u1","zona_anterior":2,"zona_nueva":3,"bpm_actual":142.5,"timestamp":1700000000.0}
//! ```
//!
//! [`ZoneChangeEvent::decode`] turns those bytes into a typed value. Unknown fields are
//! ignored; a missing or mistyped required field is a [`DecodeError`]. The producer's
//! `timestamp` is carried but never persisted: the store stamps each row with its own
//! ingestion time, so `recorded_at` is ingestion time, not event time.
//!
//! # Example
//!
//! ```
//! use zonelog_core::event::{ZoneChangeEvent, ZoneChangeRecord};
//!
//! let payload = br#"{"user_id":"u1","zona_anterior":2,"zona_nueva":3,"bpm_actual":142.5,"timestamp":1700000000.0}"#;
//! let event = ZoneChangeEvent::decode(payload).expect("well-formed payload");
//! assert_eq!(event.new_zone, 3);
//!
//! let record = ZoneChangeRecord::from_event("msoft/msrr/zone_change", &event);
//! assert_eq!(record.subject_id, "u1");
//! ```

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Fixed description written to the `message` column of every row.
pub const ZONE_CHANGE_MESSAGE: &str = "Cambio de Zona Detectado";

/// Fixed label written to the `service_origin` column of every row.
pub const SERVICE_ORIGIN: &str = "analyzer_service";

/// Upper bound on how much of a rejected payload is copied into a log record.
pub const MAX_LOGGED_PAYLOAD_BYTES: usize = 1024;

/// Errors produced while decoding a zone change payload.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The bytes are not JSON, or a required field is missing or has the wrong type.
    #[error("Malformed zone change payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload decoded but carries a blank subject identifier.
    #[error("Zone change payload has an empty user_id")]
    EmptySubject,
}

/// A zone transition reported by the upstream analyzer.
///
/// Immutable once received; lives only between receipt and persistence.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ZoneChangeEvent {
    /// Identifier of the monitored entity.
    #[serde(rename = "user_id")]
    pub subject_id: String,

    /// Classification before the transition.
    #[serde(rename = "zona_anterior")]
    pub previous_zone: i32,

    /// Classification after the transition.
    #[serde(rename = "zona_nueva")]
    pub new_zone: i32,

    /// Measurement that triggered the transition.
    #[serde(rename = "bpm_actual")]
    pub current_value: f64,

    /// Producer-side Unix time. Never persisted.
    #[serde(rename = "timestamp", default)]
    pub source_timestamp: Option<f64>,
}

impl ZoneChangeEvent {
    /// Decode and validate a raw payload.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::Malformed`] for non-JSON input, missing required fields,
    ///   wrong field types or zone codes outside the `i32` range
    /// - [`DecodeError::EmptySubject`] when `user_id` is blank
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let event: Self = serde_json::from_slice(payload)?;
        if event.subject_id.trim().is_empty() {
            return Err(DecodeError::EmptySubject);
        }
        Ok(event)
    }
}

/// The row inserted for one decoded event.
///
/// `recorded_at` is absent on purpose: the store assigns it at insert time.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneChangeRecord {
    /// Human-readable description of the event kind.
    pub message: &'static str,
    /// Label of the upstream producer.
    pub service_origin: &'static str,
    /// Topic the message arrived on.
    pub bus_topic: String,
    /// Copied from [`ZoneChangeEvent::subject_id`].
    pub subject_id: String,
    /// Copied from [`ZoneChangeEvent::previous_zone`].
    pub zone_previous: i32,
    /// Copied from [`ZoneChangeEvent::new_zone`].
    pub zone_new: i32,
    /// Copied from [`ZoneChangeEvent::current_value`].
    pub measured_value: f64,
}

impl ZoneChangeRecord {
    /// Build the insert row for `event`, received on `topic`.
    #[must_use]
    pub fn from_event(topic: impl Into<String>, event: &ZoneChangeEvent) -> Self {
        Self {
            message: ZONE_CHANGE_MESSAGE,
            service_origin: SERVICE_ORIGIN,
            bus_topic: topic.into(),
            subject_id: event.subject_id.clone(),
            zone_previous: event.previous_zone,
            zone_new: event.new_zone,
            measured_value: event.current_value,
        }
    }
}

/// A row as it exists in the store, including the store-assigned timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistedEventRecord {
    /// Human-readable description of the event kind.
    pub message: String,
    /// Label of the upstream producer.
    pub service_origin: String,
    /// Topic the message arrived on.
    pub bus_topic: String,
    /// Identifier of the monitored entity.
    pub subject_id: String,
    /// Classification before the transition.
    pub zone_previous: i32,
    /// Classification after the transition.
    pub zone_new: i32,
    /// Measurement associated with the transition.
    pub measured_value: f64,
    /// Ingestion time assigned by the store.
    pub recorded_at: DateTime<Utc>,
}

impl PersistedEventRecord {
    /// Pair an inserted row with the time the store recorded it.
    #[must_use]
    pub fn from_record(record: &ZoneChangeRecord, recorded_at: DateTime<Utc>) -> Self {
        Self {
            message: record.message.to_string(),
            service_origin: record.service_origin.to_string(),
            bus_topic: record.bus_topic.clone(),
            subject_id: record.subject_id.clone(),
            zone_previous: record.zone_previous,
            zone_new: record.zone_new,
            measured_value: record.measured_value,
            recorded_at,
        }
    }
}

/// Render a payload for a log record, bounded to [`MAX_LOGGED_PAYLOAD_BYTES`].
///
/// Invalid UTF-8 is replaced lossily. Truncation happens on a character boundary and
/// appends a marker with the number of bytes left out.
#[must_use]
pub fn payload_preview(payload: &[u8]) -> String {
    if payload.len() <= MAX_LOGGED_PAYLOAD_BYTES {
        return String::from_utf8_lossy(payload).into_owned();
    }

    // Step back to the first byte of a sequence the bound splits
    let mut cut = MAX_LOGGED_PAYLOAD_BYTES;
    while cut > MAX_LOGGED_PAYLOAD_BYTES - 3 && is_continuation_byte(payload[cut]) {
        cut -= 1;
    }

    format!(
        "{}...[truncated {} bytes]",
        String::from_utf8_lossy(&payload[..cut]),
        payload.len() - cut
    )
}

const fn is_continuation_byte(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}
