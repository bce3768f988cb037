//! Broker connection settings and their builder.

use crate::BusError;
use rumqttc::MqttOptions;
use std::fmt;
use std::time::Duration;

/// Client identifier used when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "zone_logger_service_db";

/// Topic subscribed to when none is configured.
pub const DEFAULT_TOPIC: &str = "msoft/msrr/zone_change";

/// Default keep-alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Longest keep-alive the protocol can carry (a 16-bit count of seconds).
pub const MAX_KEEP_ALIVE: Duration = Duration::from_secs(65_535);

/// Default fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on the graceful disconnect.
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Default capacity of the client request channel.
pub const DEFAULT_REQUEST_CAPACITY: usize = 64;

/// Broker username and password. `Debug` redacts the password.
#[derive(Clone, PartialEq, Eq)]
pub struct MqttCredentials {
    /// Broker username
    pub username: String,
    /// Broker password
    pub password: String,
}

impl fmt::Debug for MqttCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validated bus client configuration.
///
/// Built through [`MqttConfig::builder`]; every field has been checked by
/// [`MqttConfigBuilder::build`].
#[derive(Clone, Debug)]
pub struct MqttConfig {
    host: String,
    port: u16,
    client_id: String,
    topic: String,
    credentials: Option<MqttCredentials>,
    keep_alive: Duration,
    reconnect_interval: Duration,
    disconnect_timeout: Duration,
    request_capacity: usize,
}

impl MqttConfig {
    /// Create a configuration for `host:port` with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] if the host is empty or the port is zero.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, BusError> {
        Self::builder().host(host).port(port).build()
    }

    /// Create a builder.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use zonelog_mqtt::MqttConfig;
    ///
    /// # fn example() -> Result<(), zonelog_mqtt::BusError> {
    /// let config = MqttConfig::builder()
    ///     .host("broker.local")
    ///     .port(1883)
    ///     .topic("msoft/msrr/zone_change")
    ///     .reconnect_interval(Duration::from_secs(2))
    ///     .build()?;
    /// assert_eq!(config.broker(), "broker.local:1883");
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn builder() -> MqttConfigBuilder {
        MqttConfigBuilder::default()
    }

    /// Broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Broker port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, for logs and errors.
    #[must_use]
    pub fn broker(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Client identifier, stable across reconnects.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The single subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Configured credentials, if any.
    #[must_use]
    pub const fn credentials(&self) -> Option<&MqttCredentials> {
        self.credentials.as_ref()
    }

    /// Keep-alive interval.
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Fixed delay between reconnect attempts.
    #[must_use]
    pub const fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    /// Bound on the graceful disconnect handshake.
    #[must_use]
    pub const fn disconnect_timeout(&self) -> Duration {
        self.disconnect_timeout
    }

    /// Client request channel capacity.
    #[must_use]
    pub const fn request_capacity(&self) -> usize {
        self.request_capacity
    }

    /// Options for the underlying client.
    ///
    /// The session is persistent: the broker keys it on the client id and keeps
    /// unacknowledged messages across disconnects, redelivering them on the next
    /// connect. The subscription is still re-asserted after every connect.
    /// Acknowledgements are manual and sent only once the handler has finished
    /// with a message.
    #[must_use]
    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(false);
        options.set_manual_acks(true);
        if let Some(credentials) = &self.credentials {
            options.set_credentials(&credentials.username, &credentials.password);
        }
        options
    }
}

/// Builder for [`MqttConfig`].
#[derive(Default)]
pub struct MqttConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    client_id: Option<String>,
    topic: Option<String>,
    credentials: Option<MqttCredentials>,
    keep_alive: Option<Duration>,
    reconnect_interval: Option<Duration>,
    disconnect_timeout: Option<Duration>,
    request_capacity: Option<usize>,
}

impl MqttConfigBuilder {
    /// Set the broker host (required).
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the broker port (required).
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the client identifier (default: `zone_logger_service_db`).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the subscribed topic (default: `msoft/msrr/zone_change`).
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Authenticate with a username and password.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(MqttCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Set the keep-alive interval (default: 30s). Must be whole seconds, at most
    /// [`MAX_KEEP_ALIVE`].
    #[must_use]
    pub const fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    /// Set the fixed reconnect delay (default: 5s).
    #[must_use]
    pub const fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = Some(interval);
        self
    }

    /// Set the graceful disconnect bound (default: 250ms).
    #[must_use]
    pub const fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = Some(timeout);
        self
    }

    /// Set the client request channel capacity (default: 64).
    #[must_use]
    pub const fn request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = Some(capacity);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] if:
    /// - host is missing or blank, or port is missing or zero
    /// - client id or topic is blank
    /// - keep-alive is shorter than one second, longer than [`MAX_KEEP_ALIVE`] or
    ///   not whole seconds
    /// - reconnect interval, disconnect timeout or request capacity is zero
    pub fn build(self) -> Result<MqttConfig, BusError> {
        let host = self
            .host
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| BusError::InvalidConfig("broker host is not set".to_string()))?;
        let port = self
            .port
            .filter(|p| *p != 0)
            .ok_or_else(|| BusError::InvalidConfig("broker port is not set".to_string()))?;

        let client_id = self.client_id.unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
        if client_id.trim().is_empty() {
            return Err(BusError::InvalidConfig("client id is empty".to_string()));
        }

        let topic = self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        if topic.trim().is_empty() {
            return Err(BusError::InvalidConfig("topic is empty".to_string()));
        }

        let keep_alive = self.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE);
        if keep_alive < Duration::from_secs(1) || keep_alive.subsec_nanos() != 0 {
            return Err(BusError::InvalidConfig(format!(
                "keep alive must be a whole number of seconds, got {keep_alive:?}"
            )));
        }
        if keep_alive > MAX_KEEP_ALIVE {
            return Err(BusError::InvalidConfig(format!(
                "keep alive must be at most {MAX_KEEP_ALIVE:?}, got {keep_alive:?}"
            )));
        }

        let reconnect_interval = self.reconnect_interval.unwrap_or(DEFAULT_RECONNECT_INTERVAL);
        if reconnect_interval.is_zero() {
            return Err(BusError::InvalidConfig("reconnect interval is zero".to_string()));
        }

        let disconnect_timeout = self.disconnect_timeout.unwrap_or(DEFAULT_DISCONNECT_TIMEOUT);
        if disconnect_timeout.is_zero() {
            return Err(BusError::InvalidConfig("disconnect timeout is zero".to_string()));
        }

        let request_capacity = self.request_capacity.unwrap_or(DEFAULT_REQUEST_CAPACITY);
        if request_capacity == 0 {
            return Err(BusError::InvalidConfig("request capacity is zero".to_string()));
        }

        Ok(MqttConfig {
            host,
            port,
            client_id,
            topic,
            credentials: self.credentials,
            keep_alive,
            reconnect_interval,
            disconnect_timeout,
            request_capacity,
        })
    }
}
