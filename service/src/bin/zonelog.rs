//! Zone change logger daemon.
//!
//! Loads `.env` if present, installs logging, validates configuration, connects
//! the record store and the broker, then runs until Ctrl+C or SIGTERM.
//!
//! Exit status is non-zero when startup fails or the bus driver died before shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin zonelog
//! ```

use std::process::ExitCode;
use tracing::{error, info};
use zonelog_mqtt::ShutdownOutcome;
use zonelog_service::{
    Application, Config, StartupError, TelemetryConfig, metrics, shutdown_signal, telemetry,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file
    let _ = dotenvy::dotenv();

    if let Err(e) = telemetry::init(&TelemetryConfig::from_env()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    metrics::register_metrics();

    info!("Starting zone change logger");

    let app = match start().await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Zone change logger failed to start");
            return ExitCode::FAILURE;
        }
    };

    match app.run_until(shutdown_signal()).await {
        ShutdownOutcome::Graceful | ShutdownOutcome::TimedOut => ExitCode::SUCCESS,
        ShutdownOutcome::DriverFailed => ExitCode::FAILURE,
    }
}

async fn start() -> Result<Application, StartupError> {
    let config = Config::from_env()?;
    info!(
        broker = %config.mqtt.broker(),
        topic = %config.mqtt.topic(),
        client_id = %config.mqtt.client_id(),
        database = %config.postgres.database,
        "Configuration loaded"
    );
    Application::start(&config).await
}
