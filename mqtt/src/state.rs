//! Connection and subscription state machine.
//!
//! ```text
//!                Start                Connected              SubscriptionGranted
//! Disconnected ────────► Connecting ───────────► ConnectedUnsubscribed ─────────► Subscribed
//!                          ▲    │                   │    ▲                           │
//!            RetryElapsed  │    │ TransportLost     │    └── SubscriptionRejected    │
//!                          │    ▼                   ▼                                │
//!                       ReconnectPending ◄──────────┴────────────────────────────────┘
//!                                             TransportLost
//!
//! Shutdown leads to Disconnected from every state.
//! ```
//!
//! Everything here is pure and synchronous; the driver feeds it the events it
//! observes on the wire.

use std::fmt;

/// Where the bus client is in its connection lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not started, or stopped by shutdown.
    Disconnected,
    /// A transport connect attempt is in progress.
    Connecting,
    /// Connected; the subscription has not been granted on this connection.
    ConnectedUnsubscribed,
    /// Connected and receiving deliveries on the topic.
    Subscribed,
    /// Transport lost; waiting out the fixed retry interval.
    ReconnectPending,
}

/// Observed events that move the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The driver starts its first connect attempt.
    Start,
    /// The broker accepted the connection.
    Connected,
    /// The broker granted the subscription.
    SubscriptionGranted,
    /// The broker rejected the subscription.
    SubscriptionRejected,
    /// The transport failed or the keep-alive expired.
    TransportLost,
    /// The retry interval has elapsed.
    RetryElapsed,
    /// Operator-initiated shutdown.
    Shutdown,
}

impl ConnectionState {
    /// The state reached by applying `transition`.
    ///
    /// Transitions that make no sense in the current state leave it unchanged.
    #[must_use]
    pub const fn next(self, transition: Transition) -> Self {
        use ConnectionState::{
            ConnectedUnsubscribed, Connecting, Disconnected, ReconnectPending, Subscribed,
        };

        match (self, transition) {
            (_, Transition::Shutdown) => Disconnected,
            (Disconnected, Transition::Start) | (ReconnectPending, Transition::RetryElapsed) => {
                Connecting
            }
            (Connecting | ConnectedUnsubscribed | Subscribed, Transition::Connected)
            | (ConnectedUnsubscribed, Transition::SubscriptionRejected) => ConnectedUnsubscribed,
            (ConnectedUnsubscribed, Transition::SubscriptionGranted) => Subscribed,
            (Connecting | ConnectedUnsubscribed | Subscribed, Transition::TransportLost) => {
                ReconnectPending
            }
            (state, _) => state,
        }
    }

    /// Whether a transport connection is up.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::ConnectedUnsubscribed | Self::Subscribed)
    }

    /// Stable lowercase label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::ConnectedUnsubscribed => "connected_unsubscribed",
            Self::Subscribed => "subscribed",
            Self::ReconnectPending => "reconnect_pending",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker-side status of the single topic subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// No subscription on the current connection.
    Inactive,
    /// Subscribe sent, acknowledgement pending.
    Requested,
    /// Granted by the broker.
    Active,
    /// Refused by the broker; stays deaf until the next connection.
    Rejected,
}

/// Tracks the one subscription the client holds.
///
/// There is a single record per topic. Requesting again replaces the status rather
/// than adding a second subscription, so repeated reconnects never accumulate
/// handlers.
#[derive(Clone, Debug)]
pub struct SubscriptionTracker {
    topic: String,
    status: SubscriptionStatus,
}

impl SubscriptionTracker {
    /// Tracker for `topic`, initially inactive.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            status: SubscriptionStatus::Inactive,
        }
    }

    /// The tracked topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> SubscriptionStatus {
        self.status
    }

    /// Number of granted subscriptions: zero or one.
    #[must_use]
    pub const fn active_subscriptions(&self) -> usize {
        match self.status {
            SubscriptionStatus::Active => 1,
            _ => 0,
        }
    }

    /// Record that a subscribe was sent.
    pub const fn request(&mut self) {
        self.status = SubscriptionStatus::Requested;
    }

    /// Record the broker's answer.
    pub const fn acknowledge(&mut self, granted: bool) {
        self.status = if granted {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Rejected
        };
    }

    /// Forget the subscription; the broker drops it with the connection.
    pub const fn reset(&mut self) {
        self.status = SubscriptionStatus::Inactive;
    }
}

/// Connection state plus the subscription it carries.
#[derive(Clone, Debug)]
pub struct Session {
    state: ConnectionState,
    subscription: SubscriptionTracker,
    connects: u64,
}

impl Session {
    /// New session for `topic`, in [`ConnectionState::Disconnected`].
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            subscription: SubscriptionTracker::new(topic),
            connects: 0,
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// The subscription record.
    #[must_use]
    pub const fn subscription(&self) -> &SubscriptionTracker {
        &self.subscription
    }

    /// Number of successful connects so far.
    #[must_use]
    pub const fn connects(&self) -> u64 {
        self.connects
    }

    /// Whether an acknowledgement for a message received on connection number
    /// `connection` may be sent now.
    ///
    /// Packet identifiers are scoped to one connection, so an ack that outlived its
    /// connection could match an unrelated message on the next one.
    #[must_use]
    pub const fn accepts_ack(&self, connection: u64) -> bool {
        self.state.is_connected() && connection == self.connects
    }

    const fn apply(&mut self, transition: Transition) -> ConnectionState {
        self.state = self.state.next(transition);
        self.state
    }

    /// Begin the first connect attempt.
    pub const fn begin(&mut self) -> ConnectionState {
        self.apply(Transition::Start)
    }

    /// The broker accepted a connection. The subscription is requested again
    /// unconditionally; the caller sends the subscribe.
    pub const fn on_connack(&mut self) -> ConnectionState {
        self.connects += 1;
        self.subscription.request();
        self.apply(Transition::Connected)
    }

    /// The broker answered the subscribe.
    ///
    /// Ignored unless a subscribe is outstanding on a live connection.
    pub const fn on_suback(&mut self, granted: bool) -> ConnectionState {
        if !matches!(self.state, ConnectionState::ConnectedUnsubscribed)
            || !matches!(self.subscription.status(), SubscriptionStatus::Requested)
        {
            return self.state;
        }
        self.subscription.acknowledge(granted);
        self.apply(if granted {
            Transition::SubscriptionGranted
        } else {
            Transition::SubscriptionRejected
        })
    }

    /// The transport failed. Returns whether a connection had been established,
    /// so the caller can tell a lost connection from a failed attempt.
    pub const fn on_transport_lost(&mut self) -> bool {
        let was_connected = self.state.is_connected();
        self.subscription.reset();
        self.apply(Transition::TransportLost);
        was_connected
    }

    /// The fixed retry interval has passed.
    pub const fn on_retry_elapsed(&mut self) -> ConnectionState {
        self.apply(Transition::RetryElapsed)
    }

    /// Shutdown finished.
    pub const fn on_shutdown(&mut self) -> ConnectionState {
        self.subscription.reset();
        self.apply(Transition::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [ConnectionState; 5] = [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::ConnectedUnsubscribed,
        ConnectionState::Subscribed,
        ConnectionState::ReconnectPending,
    ];

    #[test]
    fn happy_path() {
        let mut session = Session::new("zone_change");
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.begin(), ConnectionState::Connecting);
        assert_eq!(session.on_connack(), ConnectionState::ConnectedUnsubscribed);
        assert_eq!(session.subscription().status(), SubscriptionStatus::Requested);
        assert_eq!(session.on_suback(true), ConnectionState::Subscribed);
        assert_eq!(session.subscription().active_subscriptions(), 1);
        assert_eq!(session.connects(), 1);
    }

    #[test]
    fn loss_and_recovery() {
        let mut session = Session::new("zone_change");
        session.begin();
        session.on_connack();
        session.on_suback(true);

        assert!(session.on_transport_lost());
        assert_eq!(session.state(), ConnectionState::ReconnectPending);
        assert_eq!(session.subscription().active_subscriptions(), 0);

        assert_eq!(session.on_retry_elapsed(), ConnectionState::Connecting);
        assert_eq!(session.on_connack(), ConnectionState::ConnectedUnsubscribed);
        assert_eq!(session.on_suback(true), ConnectionState::Subscribed);
        assert_eq!(session.connects(), 2);
    }

    #[test]
    fn failed_attempt_is_not_a_lost_connection() {
        let mut session = Session::new("zone_change");
        session.begin();
        assert!(!session.on_transport_lost());
        assert_eq!(session.state(), ConnectionState::ReconnectPending);
        assert_eq!(session.connects(), 0);
    }

    #[test]
    fn rejected_subscription_stays_connected_but_deaf() {
        let mut session = Session::new("zone_change");
        session.begin();
        session.on_connack();
        assert_eq!(session.on_suback(false), ConnectionState::ConnectedUnsubscribed);
        assert!(session.state().is_connected());
        assert_eq!(session.subscription().status(), SubscriptionStatus::Rejected);
        assert_eq!(session.subscription().active_subscriptions(), 0);

        // A stray ack cannot revive a rejected subscription
        assert_eq!(session.on_suback(true), ConnectionState::ConnectedUnsubscribed);

        // The next connection re-asserts it
        session.on_transport_lost();
        session.on_retry_elapsed();
        session.on_connack();
        assert_eq!(session.on_suback(true), ConnectionState::Subscribed);
    }

    #[test]
    fn repeated_reconnects_hold_exactly_one_subscription() {
        let mut session = Session::new("zone_change");
        session.begin();
        for _ in 0..25 {
            session.on_connack();
            session.on_suback(true);
            assert_eq!(session.subscription().active_subscriptions(), 1);
            session.on_transport_lost();
            session.on_retry_elapsed();
        }
        session.on_connack();
        session.on_suback(true);
        session.on_connack();
        session.on_suback(true);
        assert_eq!(session.subscription().active_subscriptions(), 1);
        assert_eq!(session.subscription().topic(), "zone_change");
    }

    #[test]
    fn acks_only_go_out_on_the_receiving_connection() {
        let mut session = Session::new("zone_change");
        session.begin();
        assert!(!session.accepts_ack(0));

        session.on_connack();
        session.on_suback(true);
        let first = session.connects();
        assert!(session.accepts_ack(first));

        // Finished while the transport is down
        session.on_transport_lost();
        assert!(!session.accepts_ack(first));

        session.on_retry_elapsed();
        session.on_connack();
        let second = session.connects();
        assert_ne!(first, second);
        assert!(!session.accepts_ack(first));
        assert!(session.accepts_ack(second));
    }

    #[test]
    fn shutdown_from_every_state_ends_disconnected() {
        for state in ALL_STATES {
            assert_eq!(state.next(Transition::Shutdown), ConnectionState::Disconnected);
        }

        let mut session = Session::new("zone_change");
        session.begin();
        session.on_connack();
        session.on_suback(true);
        assert_eq!(session.on_shutdown(), ConnectionState::Disconnected);
        assert_eq!(session.subscription().active_subscriptions(), 0);
    }

    #[test]
    fn nonsensical_transitions_are_ignored() {
        assert_eq!(
            ConnectionState::Disconnected.next(Transition::Connected),
            ConnectionState::Disconnected
        );
        assert_eq!(
            ConnectionState::Disconnected.next(Transition::TransportLost),
            ConnectionState::Disconnected
        );
        assert_eq!(
            ConnectionState::Subscribed.next(Transition::RetryElapsed),
            ConnectionState::Subscribed
        );
        assert_eq!(
            ConnectionState::ReconnectPending.next(Transition::SubscriptionGranted),
            ConnectionState::ReconnectPending
        );
        assert_eq!(
            ConnectionState::Connecting.next(Transition::Start),
            ConnectionState::Connecting
        );
    }

    #[test]
    fn only_live_transports_count_as_connected() {
        let connected: Vec<_> = ALL_STATES.into_iter().filter(|s| s.is_connected()).collect();
        assert_eq!(
            connected,
            vec![ConnectionState::ConnectedUnsubscribed, ConnectionState::Subscribed]
        );
        assert_eq!(ConnectionState::ReconnectPending.to_string(), "reconnect_pending");
    }
}
