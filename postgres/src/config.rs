//! Connection parameters for the record store.

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::fmt;
use std::time::Duration;

/// Default maximum pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default connect/acquire timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default upper bound for a single insert.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(5);

/// `PostgreSQL` connection configuration.
///
/// `Debug` redacts the password.
#[derive(Clone)]
pub struct PostgresConfig {
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Role to connect as
    pub user: String,
    /// Role password
    pub password: String,
    /// Database name
    pub database: String,
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Timeout for opening or acquiring a connection
    pub connect_timeout: Duration,
    /// Upper bound for a single insert round trip
    pub statement_timeout: Duration,
    /// TLS negotiation mode (default: disable)
    pub ssl_mode: PgSslMode,
}

impl PostgresConfig {
    /// Create a configuration with default pool settings.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
            ssl_mode: PgSslMode::Disable,
        }
    }

    /// Set the maximum pool size.
    #[must_use]
    pub const fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set the connect/acquire timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-insert timeout.
    #[must_use]
    pub const fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Set the TLS mode.
    #[must_use]
    pub const fn with_ssl_mode(mut self, ssl_mode: PgSslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    /// Build driver connect options from the individual fields.
    #[must_use]
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(self.ssl_mode)
            .application_name("zonelog")
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout", &self.connect_timeout)
            .field("statement_timeout", &self.statement_timeout)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let config = PostgresConfig::new("db", 5432, "logger", "hunter2", "msoft");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("msoft"));
    }

    #[test]
    fn defaults_and_overrides() {
        let config = PostgresConfig::new("db", 5432, "logger", "pw", "msoft");
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(matches!(config.ssl_mode, PgSslMode::Disable));

        let config = config
            .with_max_connections(12)
            .with_statement_timeout(Duration::from_millis(750))
            .with_ssl_mode(PgSslMode::Require);
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.statement_timeout, Duration::from_millis(750));
        assert!(matches!(config.ssl_mode, PgSslMode::Require));
    }

    #[test]
    fn connect_options_carry_fields() {
        let options = PostgresConfig::new("db.internal", 6543, "logger", "pw", "msoft")
            .connect_options();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "logger");
        assert_eq!(options.get_database(), Some("msoft"));
    }
}
