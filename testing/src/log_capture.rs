//! A `tracing` layer that records events for assertions.
//!
//! ```
//! use tracing::Level;
//! use zonelog_testing::LogCapture;
//!
//! let capture = LogCapture::new();
//! tracing::subscriber::with_default(capture.subscriber(), || {
//!     tracing::error!(topic = "zone_change", "Failed to decode payload");
//! });
//!
//! assert_eq!(capture.count(Level::ERROR), 1);
//! let event = &capture.events_at(Level::ERROR)[0];
//! assert_eq!(event.message, "Failed to decode payload");
//! assert_eq!(event.field("topic"), Some("zone_change"));
//! ```
//!
//! In async tests install it with `tracing::subscriber::set_default` and keep the
//! guard alive; the default `#[tokio::test]` runtime is single-threaded, so every
//! event from the test lands in the capture.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// One recorded log event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedEvent {
    /// Event level
    pub level: Level,
    /// Event target (module path unless overridden)
    pub target: String,
    /// The formatted message
    pub message: String,
    /// Structured fields other than the message, rendered as text
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// A structured field's rendered value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Shared buffer of captured events. Clones share the buffer.
#[derive(Clone, Debug, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
    /// Create an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscriber that records into this capture.
    #[must_use]
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync + 'static {
        tracing_subscriber::registry().with(self.clone())
    }

    /// Every captured event, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Captured events at exactly `level`.
    #[must_use]
    pub fn events_at(&self, level: Level) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Number of captured events at exactly `level`.
    #[must_use]
    pub fn count(&self, level: Level) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == level)
            .count()
    }

    /// Forget everything captured so far.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        self.events.lock().unwrap().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields.insert(field.name().to_string(), rendered);
        }
    }
}
