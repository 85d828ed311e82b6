//! Telemetry Configuration

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Fallback filter directive when `RUST_LOG` is unset or unparsable
    pub log_level: String,
    pub json_logs: bool,
    /// Include thread names, useful to tell the read loop from the listener
    pub thread_names: bool,
}

impl TelemetryConfig {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            thread_names: true,
        }
    }

    pub fn from_env(service_name: &str) -> Self {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    fn from_lookup(service_name: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::new(service_name);
        Self {
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            json_logs: lookup("JSON_LOGS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.json_logs),
            thread_names: lookup("LOG_THREAD_NAMES")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.thread_names),
            ..defaults
        }
    }
}
