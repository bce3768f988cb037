//! The per-message handler: decode, insert once, log every exit.

use crate::metrics;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, info};
use zonelog_core::{
    DiscardReason, HandleOutcome, InboundMessage, MessageHandler, RecordStore, ZoneChangeEvent,
    ZoneChangeRecord, payload_preview,
};

/// Turns zone change deliveries into stored rows.
///
/// Each delivery is handled on its own: one decode, at most one insert, and
/// exactly one log record describing how it ended. Failures are logged and the
/// message is dropped; nothing is retried, re-queued or propagated. Redelivered
/// duplicates are stored again.
///
/// The store is the only shared state, so any number of invocations may run at
/// once.
pub struct ZoneChangeHandler {
    store: Arc<dyn RecordStore>,
}

impl ZoneChangeHandler {
    /// Create a handler writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn process(&self, message: &InboundMessage) -> HandleOutcome {
        let event = match ZoneChangeEvent::decode(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    topic = %message.topic,
                    payload_raw = %payload_preview(&message.payload),
                    error = %e,
                    "Failed to decode zone change payload, discarding message"
                );
                metrics::record_discarded(DiscardReason::Decode);
                return HandleOutcome::Discarded(DiscardReason::Decode);
            }
        };

        let record = ZoneChangeRecord::from_event(message.topic.as_str(), &event);
        if let Err(e) = self.store.insert(&record).await {
            error!(
                topic = %message.topic,
                user = %event.subject_id,
                error = %e,
                "Failed to insert zone change, discarding message"
            );
            metrics::record_discarded(DiscardReason::Insert);
            return HandleOutcome::Discarded(DiscardReason::Insert);
        }

        info!(
            user = %event.subject_id,
            zona_nueva = event.new_zone,
            "Zone change persisted"
        );
        metrics::record_persisted();
        HandleOutcome::Persisted
    }
}

impl MessageHandler for ZoneChangeHandler {
    fn handle<'a>(
        &'a self,
        message: &'a InboundMessage,
    ) -> Pin<Box<dyn Future<Output = HandleOutcome> + Send + 'a>> {
        Box::pin(self.process(message))
    }
}
