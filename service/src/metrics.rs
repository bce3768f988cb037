//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; which recorder (if any) collects them is
//! decided by the deployment.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `zonelog.events.persisted` - Events written to the store
//! - `zonelog.events.discarded{reason}` - Events dropped, by reason (`decode`, `insert`)
//! - `zonelog.bus.reconnects` - Failed connects and lost connections

use metrics::describe_counter;
use zonelog_core::DiscardReason;

/// Counter of persisted events.
pub const EVENTS_PERSISTED: &str = "zonelog.events.persisted";

/// Counter of discarded events, labelled by `reason`.
pub const EVENTS_DISCARDED: &str = "zonelog.events.discarded";

/// Register metric descriptions. Call once at startup.
pub fn register_metrics() {
    describe_counter!(EVENTS_PERSISTED, "Zone change events written to the store");
    describe_counter!(
        EVENTS_DISCARDED,
        "Zone change events dropped after a decode or insert failure"
    );
    describe_counter!(
        zonelog_mqtt::RECONNECTS_METRIC,
        "MQTT connect attempts that failed or connections that were lost"
    );
}

pub(crate) fn record_persisted() {
    metrics::counter!(EVENTS_PERSISTED).increment(1);
}

pub(crate) fn record_discarded(reason: DiscardReason) {
    metrics::counter!(EVENTS_DISCARDED, "reason" => reason.as_str()).increment(1);
}
