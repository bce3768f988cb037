//! Inbound messages and the handler the bus client invokes for each of them.
//!
//! # Delivery Semantics
//!
//! **At-least-once**: the broker may deliver the same message more than once (for
//! example after a reconnect before the acknowledgement reached it). Every delivery
//! is handed to the [`MessageHandler`] independently; handlers in this system do not
//! deduplicate, so a redelivery produces a second stored row.
//!
//! **No ordering** across messages: deliveries may be handled concurrently and
//! complete in any order.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A message received from the bus, detached from the client library's types.
#[derive(Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Create a new inbound message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("topic", &self.topic)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Why a message was dropped without being persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The payload could not be decoded.
    Decode,
    /// The store rejected the insert.
    Insert,
}

impl DiscardReason {
    /// Short label, used as a metrics label value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Insert => "insert",
        }
    }
}

/// Result of handling one delivery.
///
/// Purely informational: the bus client acknowledges the message either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// One row was inserted.
    Persisted,
    /// The message was logged and dropped.
    Discarded(DiscardReason),
}

/// Callback invoked once per inbound message.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the bus client runs several invocations
/// concurrently and shares one handler between them. A handler must not touch
/// process-global mutable state; its dependencies are injected at construction.
pub trait MessageHandler: Send + Sync {
    /// Handle one delivery. Every exit path is expected to be logged.
    fn handle<'a>(
        &'a self,
        message: &'a InboundMessage,
    ) -> Pin<Box<dyn Future<Output = HandleOutcome> + Send + 'a>>;
}
