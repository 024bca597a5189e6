//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name recorded with startup logs
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error or a directive list)
    pub log_level: String,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Whether to include file and line in each record
    pub with_source: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ledger-link".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            with_source: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `LINK_SERVICE_NAME`: Service name (default: ledger-link)
    /// - `LINK_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `LINK_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let json_logs = lookup("LINK_JSON_LOGS")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(defaults.json_logs);

        Self {
            service_name: lookup("LINK_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("LINK_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            json_logs,
            with_source: json_logs,
        }
    }

    /// Override the level, e.g. from a `--verbose` flag.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}
