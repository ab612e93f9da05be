//! # Assistant Configuration
//!
//! Tunables of the engine. Durations are carried as milliseconds so the
//! config round-trips through JSON unchanged.

use le_audio_types::AudioContexts;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::{
    DIAL_OUT_TIMEOUT_MS, IDLE_SYNC_TIMEOUT_MS, MAX_ACTIVE_SYNCED_SOURCES,
    MAX_BIS_DISCOVERY_TRIES, MAX_SINK_DEVICES, SYNC_TIMEOUT_MS,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("narrowed contexts must not be empty")]
    EmptyContexts,
}

/// Engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub sync: SyncConfig,
    pub sinks: SinkConfig,
    pub handover: HandoverConfig,
    pub contexts: ContextConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Periodic-advertising syncs held at once.
    pub max_active_synced_sources: usize,

    /// Periodic reports inspected for a BASE before giving up.
    pub max_bis_discovery_tries: u8,

    /// Timeout handed to the sync registration.
    pub sync_timeout_ms: u64,

    /// Idle time after which syncs are dropped while not searching.
    pub idle_sync_timeout_ms: u64,

    /// Report `SourceLost` for sources previously reported as found.
    pub notify_source_lost: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_active_synced_sources: MAX_ACTIVE_SYNCED_SOURCES,
            max_bis_discovery_tries: MAX_BIS_DISCOVERY_TRIES,
            sync_timeout_ms: SYNC_TIMEOUT_MS,
            idle_sync_timeout_ms: IDLE_SYNC_TIMEOUT_MS,
            notify_source_lost: true,
        }
    }
}

impl SyncConfig {
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn idle_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_sync_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub max_sink_devices: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_sink_devices: MAX_SINK_DEVICES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoverConfig {
    /// Hold adds until the local unicast stream reports suspended.
    pub gate_adds_on_local_stream: bool,

    /// Grace period before a local broadcast whose receiver dropped is
    /// stopped.
    pub dial_out_timeout_ms: u64,
}

impl Default for HandoverConfig {
    fn default() -> Self {
        Self {
            gate_adds_on_local_stream: false,
            dial_out_timeout_ms: DIAL_OUT_TIMEOUT_MS,
        }
    }
}

impl HandoverConfig {
    pub fn dial_out_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_out_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Contexts left to the unicast group while an external broadcast is
    /// received.
    pub narrowed_contexts: AudioContexts,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            narrowed_contexts: AudioContexts::CONVERSATIONAL
                .union(AudioContexts::RINGTONE)
                .union(AudioContexts::ALERTS)
                .union(AudioContexts::EMERGENCY_ALARM),
        }
    }
}

impl AssistantConfig {
    /// Create a config for testing (small limits, short timers).
    pub fn for_testing() -> Self {
        Self {
            sync: SyncConfig {
                max_active_synced_sources: 2,
                max_bis_discovery_tries: 3,
                sync_timeout_ms: 100,
                idle_sync_timeout_ms: 1_000,
                notify_source_lost: true,
            },
            sinks: SinkConfig {
                max_sink_devices: 4,
            },
            handover: HandoverConfig {
                gate_adds_on_local_stream: false,
                dial_out_timeout_ms: 2_000,
            },
            contexts: ContextConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("sync.max_active_synced_sources", self.sync.max_active_synced_sources as u64),
            ("sync.max_bis_discovery_tries", u64::from(self.sync.max_bis_discovery_tries)),
            ("sync.sync_timeout_ms", self.sync.sync_timeout_ms),
            ("sync.idle_sync_timeout_ms", self.sync.idle_sync_timeout_ms),
            ("sinks.max_sink_devices", self.sinks.max_sink_devices as u64),
            ("handover.dial_out_timeout_ms", self.handover.dial_out_timeout_ms),
        ];
        if let Some(&(field, _)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero { field });
        }
        if self.contexts.narrowed_contexts.0 == 0 {
            return Err(ConfigError::EmptyContexts);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AssistantConfig::default();
        assert_eq!(config.sync.max_active_synced_sources, 4);
        assert_eq!(config.sync.max_bis_discovery_tries, 5);
        assert_eq!(config.sync.idle_sync_timeout(), Duration::from_secs(30));
        assert_eq!(config.handover.dial_out_timeout(), Duration::from_secs(60));
        assert!(config.contexts.narrowed_contexts.contains(AudioContexts::RINGTONE));
        assert!(!config.contexts.narrowed_contexts.contains(AudioContexts::MEDIA));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config() {
        let config = AssistantConfig::for_testing();
        assert_eq!(config.sync.max_active_synced_sources, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let mut config = AssistantConfig::default();
        config.sync.max_active_synced_sources = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "sync.max_active_synced_sources"
            })
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AssistantConfig =
            serde_json::from_str(r#"{"handover":{"gate_adds_on_local_stream":true}}"#).unwrap();
        assert!(config.handover.gate_adds_on_local_stream);
        assert_eq!(config.handover.dial_out_timeout_ms, DIAL_OUT_TIMEOUT_MS);
        assert_eq!(config.sync, SyncConfig::default());
    }
}
