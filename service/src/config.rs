//! Configuration management for the zone change logger.
//!
//! Loads configuration from environment variables. Required values have no
//! defaults: a missing or unparsable value is a [`ConfigError`] and the process
//! exits before touching the store or the broker. Empty values count as absent.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use zonelog_mqtt::{BusError, MqttConfig};
use zonelog_postgres::{PgSslMode, PostgresConfig};

/// Default window for the first broker connect, in seconds.
pub const DEFAULT_BUS_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while reading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is absent or empty.
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is present but cannot be used.
    #[error("Invalid value for {key}: {reason}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The bus client rejected the assembled settings.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Application configuration loaded from environment variables.
///
/// `Debug` never shows passwords.
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker connection and subscription
    pub mqtt: MqttConfig,
    /// Record store connection
    pub postgres: PostgresConfig,
    /// How long startup waits for the first broker connect
    pub bus_connect_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first variable that is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first variable that is missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let mut mqtt = MqttConfig::builder()
            .host(vars.required("MQTT_HOST")?)
            .port(vars.port("MQTT_PORT")?)
            .keep_alive(vars.seconds("MQTT_KEEP_ALIVE_SECS", 30)?)
            .reconnect_interval(vars.seconds("MQTT_RECONNECT_INTERVAL_SECS", 5)?)
            .disconnect_timeout(vars.millis("MQTT_DISCONNECT_TIMEOUT_MS", 250)?);
        if let Some(client_id) = vars.optional("MQTT_CLIENT_ID") {
            mqtt = mqtt.client_id(client_id);
        }
        if let Some(topic) = vars.optional("MQTT_TOPIC") {
            mqtt = mqtt.topic(topic);
        }
        match (vars.optional("MQTT_USERNAME"), vars.optional("MQTT_PASSWORD")) {
            (Some(username), Some(password)) => mqtt = mqtt.credentials(username, password),
            (Some(_), None) => return Err(ConfigError::Missing("MQTT_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("MQTT_USERNAME")),
            (None, None) => {}
        }

        let max_connections: u32 = vars.parsed("DB_MAX_CONNECTIONS", 5)?;
        if max_connections == 0 {
            return Err(vars.invalid("DB_MAX_CONNECTIONS", "must be greater than zero"));
        }

        let postgres = PostgresConfig::new(
            vars.required("DB_HOST")?,
            vars.port("DB_PORT")?,
            vars.required("DB_USER")?,
            vars.required("DB_PASSWORD")?,
            vars.required("DB_NAME")?,
        )
        .with_max_connections(max_connections)
        .with_connect_timeout(vars.seconds("DB_CONNECT_TIMEOUT_SECS", 10)?)
        .with_statement_timeout(vars.seconds("DB_STATEMENT_TIMEOUT_SECS", 5)?)
        .with_ssl_mode(vars.parsed("DB_SSL_MODE", PgSslMode::Disable)?);

        let mqtt = mqtt.build()?;
        if postgres
            .statement_timeout
            .checked_add(mqtt.disconnect_timeout())
            .is_none()
        {
            return Err(vars.invalid(
                "DB_STATEMENT_TIMEOUT_SECS",
                "too large to combine with MQTT_DISCONNECT_TIMEOUT_MS",
            ));
        }

        Ok(Self {
            mqtt,
            postgres,
            bus_connect_timeout: vars.seconds(
                "MQTT_CONNECT_TIMEOUT_SECS",
                DEFAULT_BUS_CONNECT_TIMEOUT_SECS,
            )?,
        })
    }

    /// Upper bound for stopping the bus client: in-flight inserts are each bounded
    /// by the statement timeout, then the disconnect by its own timeout.
    #[must_use]
    pub fn bus_shutdown_timeout(&self) -> Duration {
        self.postgres
            .statement_timeout
            .saturating_add(self.mqtt.disconnect_timeout())
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn invalid(&self, key: &'static str, reason: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            key,
            value: self.optional(key).unwrap_or_default(),
            reason: reason.into(),
        }
    }

    fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.optional(key)
            .map_or(Ok(default), |value| Self::parse(key, &value))
    }

    fn port(&self, key: &'static str) -> Result<u16, ConfigError> {
        let port: u16 = Self::parse(key, &self.required(key)?)?;
        if port == 0 {
            return Err(self.invalid(key, "port must be between 1 and 65535"));
        }
        Ok(port)
    }

    fn positive(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        let value: u64 = self.parsed(key, default)?;
        if value == 0 {
            return Err(self.invalid(key, "must be greater than zero"));
        }
        Ok(value)
    }

    fn seconds(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.positive(key, default).map(Duration::from_secs)
    }

    fn millis(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.positive(key, default).map(Duration::from_millis)
    }
}
