//! # Runtime Configuration
//!
//! Loaded from an optional JSON file, then overlaid with `BASS_*`
//! environment variables.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `BASS_MAX_ACTIVE_SYNCS` | `assistant.sync.max_active_synced_sources` |
//! | `BASS_SYNC_TIMEOUT_MS` | `assistant.sync.sync_timeout_ms` |
//! | `BASS_IDLE_SYNC_TIMEOUT_MS` | `assistant.sync.idle_sync_timeout_ms` |
//! | `BASS_MAX_SINKS` | `assistant.sinks.max_sink_devices` |
//! | `BASS_GATE_ADDS` | `assistant.handover.gate_adds_on_local_stream` |
//! | `BASS_DIAL_OUT_TIMEOUT_MS` | `assistant.handover.dial_out_timeout_ms` |
//! | `BASS_COMMAND_QUEUE` | `command_queue_capacity` |
//! | `BASS_EVENT_BUS_CAPACITY` | `event_bus_capacity` |

use anyhow::{ensure, Context, Result};
use assistant_bus::{InMemoryEventBus, DEFAULT_CHANNEL_CAPACITY};
use assistant_telemetry::TelemetryConfig;
use bass_client::AssistantConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub assistant: AssistantConfig,

    /// Commands buffered before senders wait.
    pub command_queue_capacity: usize,

    /// Callbacks buffered per subscriber before it lags.
    pub event_bus_capacity: usize,

    pub telemetry: TelemetryConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            assistant: AssistantConfig::default(),
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            event_bus_capacity: DEFAULT_CHANNEL_CAPACITY,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Small limits and short timers.
    pub fn for_testing() -> Self {
        Self {
            assistant: AssistantConfig::for_testing(),
            command_queue_capacity: 32,
            event_bus_capacity: 64,
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Event bus sized for this config.
    pub fn event_bus(&self) -> InMemoryEventBus {
        InMemoryEventBus::with_capacity(self.event_bus_capacity)
    }

    pub fn validate(&self) -> Result<()> {
        self.assistant
            .validate()
            .context("invalid assistant configuration")?;
        ensure!(
            self.command_queue_capacity > 0,
            "command_queue_capacity must be greater than zero"
        );
        ensure!(
            self.event_bus_capacity > 0,
            "event_bus_capacity must be greater than zero"
        );
        Ok(())
    }

    /// Overlay `BASS_*` values returned by `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let sync = &mut self.assistant.sync;
        override_from(&lookup, "BASS_MAX_ACTIVE_SYNCS", &mut sync.max_active_synced_sources)?;
        override_from(&lookup, "BASS_SYNC_TIMEOUT_MS", &mut sync.sync_timeout_ms)?;
        override_from(&lookup, "BASS_IDLE_SYNC_TIMEOUT_MS", &mut sync.idle_sync_timeout_ms)?;
        override_from(
            &lookup,
            "BASS_MAX_SINKS",
            &mut self.assistant.sinks.max_sink_devices,
        )?;
        let handover = &mut self.assistant.handover;
        override_from(&lookup, "BASS_GATE_ADDS", &mut handover.gate_adds_on_local_stream)?;
        override_from(&lookup, "BASS_DIAL_OUT_TIMEOUT_MS", &mut handover.dial_out_timeout_ms)?;
        override_from(&lookup, "BASS_COMMAND_QUEUE", &mut self.command_queue_capacity)?;
        override_from(&lookup, "BASS_EVENT_BUS_CAPACITY", &mut self.event_bus_capacity)?;
        Ok(())
    }
}

fn override_from<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(name) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value {raw:?} for {name}"))?;
    }
    Ok(())
}

/// Load the runtime configuration.
///
/// Missing fields in the file take their defaults. The process environment
/// is applied on top, then the result is validated.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => RuntimeConfig::default(),
    };
    config.apply_overrides(|name| std::env::var(name).ok())?;
    config.telemetry.apply_env();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert_eq!(config.command_queue_capacity, DEFAULT_COMMAND_QUEUE_CAPACITY);
        assert!(config.validate().is_ok());
        assert!(RuntimeConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("BASS_MAX_ACTIVE_SYNCS", "2"),
            ("BASS_GATE_ADDS", "true"),
            ("BASS_COMMAND_QUEUE", " 16 "),
        ]
        .into_iter()
        .collect();

        let mut config = RuntimeConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.assistant.sync.max_active_synced_sources, 2);
        assert!(config.assistant.handover.gate_adds_on_local_stream);
        assert_eq!(config.command_queue_capacity, 16);
        assert_eq!(config.assistant.sinks.max_sink_devices, 10);
    }

    #[test]
    fn test_bad_override_names_variable() {
        let mut config = RuntimeConfig::default();
        let err = config
            .apply_overrides(|name| (name == "BASS_MAX_SINKS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("BASS_MAX_SINKS"));
    }

    #[test]
    fn test_validate_rejects_zero_queue() {
        let config = RuntimeConfig {
            command_queue_capacity: 0,
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"assistant":{{"sync":{{"max_active_synced_sources":3}}}},"event_bus_capacity":32}}"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.assistant.sync.max_active_synced_sources, 3);
        assert_eq!(config.assistant.sync.max_bis_discovery_tries, 5);
        assert_eq!(config.event_bus_capacity, 32);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/bass.json"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
