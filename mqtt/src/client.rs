//! Handle to the running bus client.

use crate::BusError;
use crate::config::MqttConfig;
use crate::driver::Driver;
use crate::state::ConnectionState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use zonelog_core::MessageHandler;

/// How a [`MqttBus::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// In-flight messages finished and the disconnect was sent.
    Graceful,
    /// The bound expired; the driver and its handler tasks were aborted.
    TimedOut,
    /// The driver task had already failed.
    DriverFailed,
}

/// A running MQTT subscriber.
///
/// [`start`](Self::start) spawns a background task that owns the connection. That
/// task reconnects forever at the configured fixed interval, re-subscribes after
/// every connect and runs the handler once per delivery, concurrently. Each
/// message is acknowledged only after its handler returns, so delivery is
/// at-least-once.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use zonelog_mqtt::{MqttBus, MqttConfig};
/// # use zonelog_core::MessageHandler;
///
/// # async fn example(handler: Arc<dyn MessageHandler>) -> Result<(), zonelog_mqtt::BusError> {
/// let config = MqttConfig::new("localhost", 1883)?;
/// let bus = MqttBus::start(&config, handler);
/// bus.wait_until_connected(Duration::from_secs(30)).await?;
///
/// // ... later
/// bus.shutdown(Duration::from_secs(1)).await;
/// # Ok(())
/// # }
/// ```
pub struct MqttBus {
    broker: String,
    state: watch::Receiver<ConnectionState>,
    shutdown_tx: broadcast::Sender<()>,
    driver: JoinHandle<()>,
}

impl MqttBus {
    /// Spawn the driver task and begin connecting.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(config: &MqttConfig, handler: Arc<dyn MessageHandler>) -> Self {
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let driver = Driver::new(config, handler, state_tx, shutdown_rx);
        let driver = tokio::spawn(driver.run());

        Self {
            broker: config.broker(),
            state,
            shutdown_tx,
            driver,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the broker has accepted a connection.
    ///
    /// The driver keeps retrying whatever this returns.
    ///
    /// # Errors
    ///
    /// - [`BusError::InitialConnectTimeout`] if no connection is made within `timeout`
    /// - [`BusError::DriverStopped`] if the driver task is gone
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<(), BusError> {
        let mut state = self.state.clone();
        let connected = tokio::time::timeout(timeout, async {
            state.wait_for(|s| s.is_connected()).await.map(|_| ())
        })
        .await;

        match connected {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(BusError::DriverStopped),
            Err(_) => Err(BusError::InitialConnectTimeout {
                broker: self.broker.clone(),
                timeout,
            }),
        }
    }

    /// Stop the client, bounded by `timeout`.
    ///
    /// Waits for in-flight handlers, then sends a graceful disconnect. If that does
    /// not finish in time the driver is aborted, which also aborts its handler
    /// tasks; unacknowledged messages are redelivered by the broker.
    pub async fn shutdown(self, timeout: Duration) -> ShutdownOutcome {
        info!(broker = %self.broker, "Stopping MQTT client");
        let _ = self.shutdown_tx.send(());

        let mut driver = self.driver;
        match tokio::time::timeout(timeout, &mut driver).await {
            Ok(Ok(())) => ShutdownOutcome::Graceful,
            Ok(Err(e)) => {
                error!(error = %e, "MQTT driver task failed");
                ShutdownOutcome::DriverFailed
            }
            Err(_) => {
                driver.abort();
                warn!(timeout = ?timeout, "MQTT client did not stop in time, aborted");
                ShutdownOutcome::TimedOut
            }
        }
    }
}
