//! Tracing subscriber setup.
//!
//! Initialised before anything else so that configuration errors are logged too.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info,sqlx=warn,rumqttc=warn";

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Multi-line human-readable output
    Pretty,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value. Anything but `pretty` selects JSON.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("pretty") => Self::Pretty,
            _ => Self::Json,
        }
    }
}

/// Logging settings, read separately from [`Config`](crate::Config) so logging is
/// up before the rest of the configuration is validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Output format
    pub format: LogFormat,
    /// `EnvFilter` directives
    pub filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read `LOG_FORMAT` and `RUST_LOG` from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read `LOG_FORMAT` and `RUST_LOG` through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            format: LogFormat::parse(lookup("LOG_FORMAT").as_deref()),
            filter: lookup("RUST_LOG")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Errors from installing the global subscriber.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::Install`] if a global subscriber already exists.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = config.env_filter();
    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .try_init(),
    };
    installed.map_err(|e| TelemetryError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_defaults_to_json() {
        assert_eq!(LogFormat::parse(None), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("xml")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" Pretty ")), LogFormat::Pretty);
    }

    #[test]
    fn filter_defaults_when_unset_or_empty() {
        let config = TelemetryConfig::from_lookup(|_| None);
        assert_eq!(config, TelemetryConfig::default());

        let config = TelemetryConfig::from_lookup(|key| (key == "RUST_LOG").then(String::new));
        assert_eq!(config.filter, DEFAULT_LOG_FILTER);

        let config = TelemetryConfig::from_lookup(|key| match key {
            "RUST_LOG" => Some("debug".to_string()),
            "LOG_FORMAT" => Some("pretty".to_string()),
            _ => None,
        });
        assert_eq!(config.filter, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn unparsable_filter_falls_back() {
        let config = TelemetryConfig {
            format: LogFormat::Json,
            filter: "info,[[[".to_string(),
        };
        // Must not panic
        let _filter = config.env_filter();
    }
}
