//! # Assistant Events
//!
//! The callback stream delivered to applications.

use le_audio_types::{
    AssistantError, BroadcastId, BroadcastMetadata, DeviceAddress, Reason, ReceiveState, SourceId,
};
use serde::{Deserialize, Serialize};

/// Every callback the assistant emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssistantEvent {
    // =========================================================================
    // SEARCH
    // =========================================================================
    /// Discovery scan started.
    SearchStarted { reason: Reason },

    /// Discovery scan could not be started.
    SearchStartFailed { error: AssistantError },

    /// Discovery scan stopped.
    SearchStopped { reason: Reason },

    /// Discovery scan could not be stopped.
    SearchStopFailed { error: AssistantError },

    // =========================================================================
    // DISCOVERY
    // =========================================================================
    /// A broadcast source was synchronized and its BASE decoded.
    /// Emitted at most once per source per search.
    SourceFound { metadata: BroadcastMetadata },

    /// Sync to a previously reported source was lost.
    SourceLost { broadcast_id: BroadcastId },

    // =========================================================================
    // SOURCE OPERATIONS (per sink device)
    // =========================================================================
    SourceAdded {
        sink: DeviceAddress,
        source_id: SourceId,
        reason: Reason,
    },

    SourceAddFailed {
        sink: DeviceAddress,
        metadata: BroadcastMetadata,
        error: AssistantError,
    },

    SourceModified {
        sink: DeviceAddress,
        source_id: SourceId,
        reason: Reason,
    },

    SourceModifyFailed {
        sink: DeviceAddress,
        source_id: SourceId,
        error: AssistantError,
    },

    SourceRemoved {
        sink: DeviceAddress,
        source_id: SourceId,
        reason: Reason,
    },

    SourceRemoveFailed {
        sink: DeviceAddress,
        source_id: SourceId,
        error: AssistantError,
    },

    /// A sink reported a new receive state for one of its slots.
    ReceiveStateChanged {
        sink: DeviceAddress,
        source_id: SourceId,
        state: ReceiveState,
    },
}

impl AssistantEvent {
    /// Topic used for filtering.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::SearchStarted { .. }
            | Self::SearchStartFailed { .. }
            | Self::SearchStopped { .. }
            | Self::SearchStopFailed { .. } => EventTopic::Search,
            Self::SourceFound { .. } | Self::SourceLost { .. } => EventTopic::Discovery,
            Self::SourceAdded { .. }
            | Self::SourceAddFailed { .. }
            | Self::SourceModified { .. }
            | Self::SourceModifyFailed { .. }
            | Self::SourceRemoved { .. }
            | Self::SourceRemoveFailed { .. } => EventTopic::SourceOperation,
            Self::ReceiveStateChanged { .. } => EventTopic::ReceiveState,
        }
    }

    /// Sink device the event concerns, if any.
    #[must_use]
    pub fn sink(&self) -> Option<DeviceAddress> {
        match self {
            Self::SourceAdded { sink, .. }
            | Self::SourceAddFailed { sink, .. }
            | Self::SourceModified { sink, .. }
            | Self::SourceModifyFailed { sink, .. }
            | Self::SourceRemoved { sink, .. }
            | Self::SourceRemoveFailed { sink, .. }
            | Self::ReceiveStateChanged { sink, .. } => Some(*sink),
            _ => None,
        }
    }

    /// True for the `*Failed` variants.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::SearchStartFailed { .. }
                | Self::SearchStopFailed { .. }
                | Self::SourceAddFailed { .. }
                | Self::SourceModifyFailed { .. }
                | Self::SourceRemoveFailed { .. }
        )
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Matches every topic.
    All,
    Search,
    Discovery,
    SourceOperation,
    ReceiveState,
}

/// Subscription filter. Empty lists match everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to accept.
    pub topics: Vec<EventTopic>,
    /// Sink devices to accept. Events without a sink always pass.
    pub sinks: Vec<DeviceAddress>,
}

impl EventFilter {
    /// Accept all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Accept only the given topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            sinks: Vec::new(),
        }
    }

    /// Restrict sink-scoped events to the given devices.
    #[must_use]
    pub fn for_sinks(mut self, sinks: Vec<DeviceAddress>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Check if an event passes this filter.
    #[must_use]
    pub fn matches(&self, event: &AssistantEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let sink_match = self.sinks.is_empty()
            || event.sink().map_or(true, |sink| self.sinks.contains(&sink));

        topic_match && sink_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(last: u8) -> DeviceAddress {
        DeviceAddress::new([0, 0, 0, 0, 0, last])
    }

    fn added(last: u8) -> AssistantEvent {
        AssistantEvent::SourceAdded {
            sink: sink(last),
            source_id: 1,
            reason: Reason::LocalAppRequest,
        }
    }

    #[test]
    fn test_event_topic_mapping() {
        assert_eq!(added(1).topic(), EventTopic::SourceOperation);
        let lost = AssistantEvent::SourceLost {
            broadcast_id: BroadcastId::new(7).unwrap(),
        };
        assert_eq!(lost.topic(), EventTopic::Discovery);
        assert_eq!(lost.sink(), None);
    }

    #[test]
    fn test_filter_all() {
        assert!(EventFilter::all().matches(&added(1)));
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Search]);
        assert!(!filter.matches(&added(1)));
        assert!(filter.matches(&AssistantEvent::SearchStarted {
            reason: Reason::LocalAppRequest
        }));
    }

    #[test]
    fn test_filter_by_sink() {
        let filter = EventFilter::all().for_sinks(vec![sink(1)]);
        assert!(filter.matches(&added(1)));
        assert!(!filter.matches(&added(2)));
        assert!(filter.matches(&AssistantEvent::SearchStopped {
            reason: Reason::LocalAppRequest
        }));
    }

    #[test]
    fn test_failure_classification() {
        let failed = AssistantEvent::SourceRemoveFailed {
            sink: sink(1),
            source_id: 0,
            error: AssistantError::InvalidSourceId,
        };
        assert!(failed.is_failure());
        assert!(!added(1).is_failure());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&added(3)).unwrap();
        let back: AssistantEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, added(3));
    }
}
