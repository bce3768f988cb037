//! Application lifecycle management and graceful shutdown.
//!
//! 1. **Startup**: connect the store, then start the bus client and wait for its
//!    first connection. A failure at either step releases whatever was already
//!    acquired and is returned as a [`StartupError`].
//! 2. **Runtime**: the bus driver delivers messages to the handler; the caller
//!    blocks on a shutdown signal.
//! 3. **Shutdown**: stop the bus client within its bound, then close the store.

use crate::StartupError;
use crate::config::Config;
use crate::handler::ZoneChangeHandler;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use zonelog_core::RecordStore;
use zonelog_mqtt::{MqttBus, ShutdownOutcome};
use zonelog_postgres::PostgresRecordStore;

/// Running application: a connected store and a bus client feeding it.
pub struct Application {
    store: PostgresRecordStore,
    bus: MqttBus,
    bus_shutdown_timeout: Duration,
}

impl Application {
    /// Connect the store, start the bus client and wait for the first connect.
    ///
    /// # Errors
    ///
    /// - [`StartupError::Store`] if the store is unreachable or fails its liveness check
    /// - [`StartupError::Bus`] if the broker does not accept a connection within
    ///   `bus_connect_timeout`; the store is closed before returning
    pub async fn start(config: &Config) -> Result<Self, StartupError> {
        let store = PostgresRecordStore::connect(&config.postgres).await?;

        let handler = Arc::new(ZoneChangeHandler::new(
            Arc::new(store.clone()) as Arc<dyn RecordStore>
        ));
        let bus = MqttBus::start(&config.mqtt, handler);

        if let Err(e) = bus.wait_until_connected(config.bus_connect_timeout).await {
            error!(error = %e, "MQTT broker unreachable at startup");
            bus.shutdown(config.mqtt.disconnect_timeout()).await;
            store.close().await;
            return Err(e.into());
        }

        info!(
            broker = %config.mqtt.broker(),
            topic = %config.mqtt.topic(),
            "Zone change logger running"
        );

        Ok(Self {
            store,
            bus,
            bus_shutdown_timeout: config.bus_shutdown_timeout(),
        })
    }

    /// Current bus connection state.
    #[must_use]
    pub fn bus_state(&self) -> zonelog_mqtt::ConnectionState {
        self.bus.state()
    }

    /// Run until `signal` completes, then shut down.
    pub async fn run_until<F>(self, signal: F) -> ShutdownOutcome
    where
        F: Future<Output = ()>,
    {
        signal.await;
        info!("Shutdown requested, stopping zone change logger");
        self.shutdown().await
    }

    /// Stop the bus client within its bound, then release the store.
    pub async fn shutdown(self) -> ShutdownOutcome {
        let outcome = self.bus.shutdown(self.bus_shutdown_timeout).await;
        match outcome {
            ShutdownOutcome::Graceful => info!("MQTT client stopped gracefully"),
            ShutdownOutcome::TimedOut => {
                warn!(timeout = ?self.bus_shutdown_timeout, "MQTT client shutdown timed out");
            }
            ShutdownOutcome::DriverFailed => warn!("MQTT client had already failed"),
        }

        self.store.close().await;
        info!("Shutdown complete");
        outcome
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed the failure is logged and that signal is
/// ignored; the other one still works.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
