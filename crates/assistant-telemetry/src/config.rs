//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Configuration for logs and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to every log line.
    pub service_name: String,

    /// Log filter directive (`info`, `bass_client=debug`, ...).
    pub log_level: String,

    /// Emit JSON lines.
    pub json_logs: bool,

    /// Include the module target in each line.
    pub log_targets: bool,

    /// Register Prometheus metrics.
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "broadcast-assistant".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            log_targets: true,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Read the `BASS_*` environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay environment variables on top of the current values.
    pub fn apply_env(&mut self) {
        if let Ok(level) = env::var("BASS_LOG_LEVEL").or_else(|_| env::var("RUST_LOG")) {
            self.log_level = level;
        }
        if let Ok(v) = env::var("BASS_JSON_LOGS") {
            self.json_logs = parse_flag(&v, self.json_logs);
        }
        if let Ok(v) = env::var("BASS_LOG_TARGETS") {
            self.log_targets = parse_flag(&v, self.log_targets);
        }
        if let Ok(v) = env::var("BASS_METRICS") {
            self.metrics_enabled = parse_flag(&v, self.metrics_enabled);
        }
    }
}

fn parse_flag(value: &str, fallback: bool) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "broadcast-assistant");
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(config.metrics_enabled);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE", false));
        assert!(parse_flag("1", false));
        assert!(!parse_flag("off", true));
        assert!(parse_flag("maybe", true));
    }
}
