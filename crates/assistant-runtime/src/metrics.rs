//! Metric recording from published callbacks and engine statistics.

use assistant_bus::AssistantEvent;
use assistant_telemetry::{
    metric_inc, ACTIVE_SYNCS, EVENTS_PUBLISHED, SOURCES_FOUND, SOURCE_OPERATIONS,
    SYNCS_ESTABLISHED, SYNCS_LOST, SYNC_FAILURES,
};
use bass_client::AssistantStats;

/// `(operation, outcome)` labels for source operation callbacks.
pub(crate) fn operation_labels(event: &AssistantEvent) -> Option<[&'static str; 2]> {
    let labels = match event {
        AssistantEvent::SourceAdded { .. } => ["add", "success"],
        AssistantEvent::SourceAddFailed { .. } => ["add", "failure"],
        AssistantEvent::SourceModified { .. } => ["modify", "success"],
        AssistantEvent::SourceModifyFailed { .. } => ["modify", "failure"],
        AssistantEvent::SourceRemoved { .. } => ["remove", "success"],
        AssistantEvent::SourceRemoveFailed { .. } => ["remove", "failure"],
        _ => return None,
    };
    Some(labels)
}

pub(crate) fn record_event(event: &AssistantEvent) {
    metric_inc!(EVENTS_PUBLISHED);
    if matches!(event, AssistantEvent::SourceFound { .. }) {
        metric_inc!(SOURCES_FOUND);
    }
    if let Some(labels) = operation_labels(event) {
        metric_inc!(SOURCE_OPERATIONS, &labels);
    }
}

/// Record the sync counters that moved while one command was applied.
pub(crate) fn record_stats(before: &AssistantStats, after: &AssistantStats) {
    let delta = |b: u64, a: u64| a.saturating_sub(b) as f64;
    SYNCS_ESTABLISHED.inc_by(delta(before.syncs_established, after.syncs_established));
    SYNCS_LOST.inc_by(delta(before.syncs_lost, after.syncs_lost));
    SYNC_FAILURES.inc_by(delta(before.sync_failures, after.sync_failures));
    ACTIVE_SYNCS.set(after.active_syncs as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use le_audio_types::{AssistantError, DeviceAddress, Reason};

    #[test]
    fn test_operation_labels() {
        let sink = DeviceAddress::new([1, 2, 3, 4, 5, 6]);
        let removed = AssistantEvent::SourceRemoveFailed {
            sink,
            source_id: 1,
            error: AssistantError::InvalidSourceId,
        };
        assert_eq!(operation_labels(&removed), Some(["remove", "failure"]));

        let started = AssistantEvent::SearchStarted {
            reason: Reason::LocalAppRequest,
        };
        assert_eq!(operation_labels(&started), None);
    }

    #[test]
    fn test_record_stats_counts_deltas() {
        let before = AssistantStats {
            syncs_established: 2,
            ..AssistantStats::default()
        };
        let after = AssistantStats {
            syncs_established: 5,
            active_syncs: 3,
            ..AssistantStats::default()
        };
        let established = SYNCS_ESTABLISHED.get();
        record_stats(&before, &after);
        assert!(SYNCS_ESTABLISHED.get() >= established + 3.0);
    }
}
