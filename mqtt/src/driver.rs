//! The task that owns the MQTT event loop.
//!
//! ```text
//! loop {
//!     poll event loop:
//!         ConnAck  -> subscribe (every connect, unconditionally)
//!         SubAck   -> subscribed, or connected but deaf
//!         Publish  -> spawn handler task; ack when it returns, if still on the
//!                     connection that delivered the message
//!         error    -> warn, wait the fixed interval, poll again (reconnects)
//!     shutdown signal:
//!         drain in-flight handlers, disconnect, stop
//! }
//! ```

use crate::config::MqttConfig;
use crate::state::{ConnectionState, Session};
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, Outgoing, Packet, Publish, QoS, SubAck,
    SubscribeReasonCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use zonelog_core::{InboundMessage, MessageHandler};

/// Metric incremented on every failed connect or lost connection.
pub const RECONNECTS_METRIC: &str = "zonelog.bus.reconnects";

enum Step {
    Shutdown,
    Polled(Result<Event, ConnectionError>),
    Reaped(Result<Delivered, JoinError>),
}

enum Wait {
    Shutdown,
    Elapsed,
    Reaped(Result<Delivered, JoinError>),
}

/// A message whose handler has returned, tagged with the connection it came in on.
struct Delivered {
    connection: u64,
    publish: Publish,
}

pub(crate) struct Driver {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    broker: String,
    reconnect_interval: Duration,
    disconnect_timeout: Duration,
    handler: Arc<dyn MessageHandler>,
    session: Session,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: broadcast::Receiver<()>,
    in_flight: JoinSet<Delivered>,
}

impl Driver {
    pub(crate) fn new(
        config: &MqttConfig,
        handler: Arc<dyn MessageHandler>,
        state_tx: watch::Sender<ConnectionState>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let (client, eventloop) = AsyncClient::new(config.mqtt_options(), config.request_capacity());
        Self {
            client,
            eventloop,
            topic: config.topic().to_string(),
            broker: config.broker(),
            reconnect_interval: config.reconnect_interval(),
            disconnect_timeout: config.disconnect_timeout(),
            handler,
            session: Session::new(config.topic()),
            state_tx,
            shutdown,
            in_flight: JoinSet::new(),
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.session.state());
    }

    pub(crate) async fn run(mut self) {
        self.session.begin();
        self.publish_state();
        info!(broker = %self.broker, topic = %self.topic, "Connecting to MQTT broker");

        loop {
            let step = tokio::select! {
                _ = self.shutdown.recv() => Step::Shutdown,
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    Step::Reaped(joined)
                }
                event = self.eventloop.poll() => Step::Polled(event),
            };

            match step {
                Step::Shutdown => break,
                Step::Reaped(joined) => self.on_handler_exit(joined),
                Step::Polled(Ok(event)) => self.on_event(event),
                Step::Polled(Err(e)) => {
                    if !self.on_transport_error(&e).await {
                        break;
                    }
                }
            }
        }

        self.stop().await;
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => self.on_connected(),
            Event::Incoming(Packet::SubAck(suback)) => self.on_subscribed(&suback),
            Event::Incoming(Packet::Publish(publish)) => self.dispatch(publish),
            _ => {}
        }
    }

    fn on_connected(&mut self) {
        self.session.on_connack();
        self.publish_state();
        if self.session.connects() > 1 {
            info!(broker = %self.broker, "Reconnected to MQTT broker");
        } else {
            info!(broker = %self.broker, "Connected to MQTT broker");
        }

        // Clean session: the broker forgot the subscription with the old connection
        if let Err(e) = self.client.try_subscribe(self.topic.as_str(), QoS::AtLeastOnce) {
            error!(topic = %self.topic, error = %e, "Failed to send subscribe request");
        }
    }

    fn on_subscribed(&mut self, suback: &SubAck) {
        let granted = !suback.return_codes.is_empty()
            && suback
                .return_codes
                .iter()
                .all(|code| matches!(code, SubscribeReasonCode::Success(_)));

        self.session.on_suback(granted);
        self.publish_state();
        if granted {
            info!(topic = %self.topic, "Subscribed to topic");
        } else {
            error!(
                topic = %self.topic,
                return_codes = ?suback.return_codes,
                "Broker rejected subscription; no deliveries until the next reconnect"
            );
        }
    }

    fn dispatch(&mut self, publish: Publish) {
        let handler = Arc::clone(&self.handler);
        let connection = self.session.connects();

        self.in_flight.spawn(async move {
            let message = InboundMessage::new(publish.topic.clone(), publish.payload.to_vec());
            let outcome = handler.handle(&message).await;
            debug!(topic = %message.topic, ?outcome, "Message handled");
            Delivered {
                connection,
                publish,
            }
        });
    }

    /// Ack a handled message. A panicked handler is never acked, so the broker
    /// redelivers its message.
    fn on_handler_exit(&self, joined: Result<Delivered, JoinError>) {
        let delivered = match joined {
            Ok(delivered) => delivered,
            Err(e) => {
                if e.is_panic() {
                    error!(error = %e, "Message handler task panicked");
                }
                return;
            }
        };

        let publish = &delivered.publish;
        if !self.session.accepts_ack(delivered.connection) {
            debug!(
                topic = %publish.topic,
                pkid = publish.pkid,
                "Connection changed before the handler returned, leaving message to redelivery"
            );
            return;
        }

        if let Err(e) = self.client.try_ack(publish) {
            warn!(
                topic = %publish.topic,
                pkid = publish.pkid,
                error = %e,
                "Failed to acknowledge message (it may be redelivered)"
            );
        }
    }

    /// Returns `false` if shutdown was requested while waiting to retry.
    async fn on_transport_error(&mut self, e: &ConnectionError) -> bool {
        let was_connected = self.session.on_transport_lost();
        self.publish_state();
        metrics::counter!(RECONNECTS_METRIC).increment(1);

        if was_connected {
            warn!(
                broker = %self.broker,
                error = %e,
                "Connection to MQTT broker lost, reconnecting in {:?}",
                self.reconnect_interval
            );
        } else {
            warn!(
                broker = %self.broker,
                error = %e,
                "Failed to connect to MQTT broker, retrying in {:?}",
                self.reconnect_interval
            );
        }

        // Keep reaping finished handlers while waiting
        let retry = tokio::time::sleep(self.reconnect_interval);
        tokio::pin!(retry);
        loop {
            let wait = tokio::select! {
                _ = self.shutdown.recv() => Wait::Shutdown,
                () = &mut retry => Wait::Elapsed,
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    Wait::Reaped(joined)
                }
            };

            match wait {
                Wait::Shutdown => return false,
                Wait::Elapsed => break,
                Wait::Reaped(joined) => self.on_handler_exit(joined),
            }
        }

        self.session.on_retry_elapsed();
        self.publish_state();
        true
    }

    async fn stop(mut self) {
        info!(in_flight = self.in_flight.len(), "MQTT client shutting down");

        // Finish in-flight messages; polling lets their acks reach the broker
        let mut connected = self.session.state().is_connected();
        while !self.in_flight.is_empty() {
            let step = tokio::select! {
                Some(joined) = self.in_flight.join_next() => Step::Reaped(joined),
                event = self.eventloop.poll(), if connected => Step::Polled(event),
            };

            match step {
                Step::Reaped(joined) => self.on_handler_exit(joined),
                Step::Polled(Ok(_)) | Step::Shutdown => {}
                Step::Polled(Err(_)) => {
                    connected = false;
                    self.session.on_transport_lost();
                }
            }
        }

        if connected {
            self.disconnect().await;
        }

        self.session.on_shutdown();
        self.publish_state();
        info!(broker = %self.broker, "Disconnected from MQTT broker");
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            warn!(error = %e, "Failed to queue disconnect request");
            return;
        }

        let flushed = tokio::time::timeout(self.disconnect_timeout, async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;

        if flushed.is_err() {
            warn!(
                timeout = ?self.disconnect_timeout,
                "MQTT disconnect not flushed in time, closing anyway"
            );
        }
    }
}
