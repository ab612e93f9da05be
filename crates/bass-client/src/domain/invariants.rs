//! Structural invariants of the engine state, checked in tests and by the
//! service's `check_invariants`.

use std::collections::HashSet;

use super::catalog::BroadcastCatalog;
use super::sink_coordinator::{SinkCoordinator, SinkDevice};
use super::sync_queue::SyncAdmissionQueue;

/// INVARIANT-1: Sync capacity
/// At most `max_active` syncs are live.
pub fn invariant_sync_capacity(queue: &SyncAdmissionQueue) -> bool {
    queue.active_len() <= queue.max_active()
}

/// INVARIANT-2: Unique broadcast per sink
/// A sink never holds two slots for the same broadcast.
pub fn invariant_unique_broadcast_per_sink(sink: &SinkDevice) -> bool {
    let mut seen = HashSet::new();
    sink.sources().all(|s| seen.insert(s.broadcast_id))
}

/// INVARIANT-3: BASE bound to live handle
/// Every bound handle is live, and a live handle whose BIS discovery
/// finished has its BASE.
pub fn invariant_base_per_live_handle(
    catalog: &BroadcastCatalog,
    queue: &SyncAdmissionQueue,
) -> bool {
    let bound_are_live = catalog
        .live_handles()
        .into_iter()
        .all(|h| queue.active(h).is_some());
    let discovered_have_base = queue.active_handles().into_iter().all(|h| {
        match queue.active(h).map(|a| a.bis_tries_left) {
            Some(None) => catalog.base(h).is_some(),
            _ => true,
        }
    });
    bound_are_live && discovered_have_base
}

/// INVARIANT-4: Unique ledger keys
/// A sink's ledger never holds two entries with the same (kind, key).
pub fn invariant_unique_ledger_keys(sink: &SinkDevice) -> bool {
    let mut seen = HashSet::new();
    sink.pending().iter().all(|op| seen.insert((op.kind, op.key)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    SyncCapacityExceeded,
    DuplicateBroadcastOnSink,
    OrphanedBase,
    DuplicateLedgerEntry,
}

pub fn check_all_invariants(
    catalog: &BroadcastCatalog,
    queue: &SyncAdmissionQueue,
    coordinator: &SinkCoordinator,
) -> Result<(), InvariantViolation> {
    if !invariant_sync_capacity(queue) {
        return Err(InvariantViolation::SyncCapacityExceeded);
    }

    if !invariant_base_per_live_handle(catalog, queue) {
        return Err(InvariantViolation::OrphanedBase);
    }

    for sink in coordinator.sinks() {
        if !invariant_unique_broadcast_per_sink(sink) {
            return Err(InvariantViolation::DuplicateBroadcastOnSink);
        }
        if !invariant_unique_ledger_keys(sink) {
            return Err(InvariantViolation::DuplicateLedgerEntry);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::ScanResult;
    use le_audio_types::{
        AddressType, BaseData, BroadcastId, DeviceAddress, ReceiveState, SyncHandle,
    };

    fn scan() -> ScanResult {
        ScanResult {
            device: DeviceAddress::new([0xA0, 0, 0, 0, 0, 1]),
            address_type: AddressType::Public,
            adv_sid: 1,
            rssi: -40,
            pa_interval: None,
            advertising_data: Vec::new(),
        }
    }

    #[test]
    fn test_base_invariant_tracks_discovery() {
        let id = BroadcastId::new(9).unwrap();
        let mut catalog = BroadcastCatalog::new();
        let mut queue = SyncAdmissionQueue::new(4, 5);
        queue.enqueue(scan(), id, false);
        queue.begin_dispatch();
        queue.resolve_claim(SyncHandle(3));
        catalog.bind_handle(SyncHandle(3), scan().device, id);
        assert!(invariant_base_per_live_handle(&catalog, &queue));

        queue.record_bis_attempt(SyncHandle(3), true);
        assert!(!invariant_base_per_live_handle(&catalog, &queue));

        catalog.set_base(
            SyncHandle(3),
            BaseData {
                presentation_delay_micros: 0,
                subgroups: Vec::new(),
            },
        );
        assert!(invariant_base_per_live_handle(&catalog, &queue));

        queue.remove_active(SyncHandle(3));
        assert!(!invariant_base_per_live_handle(&catalog, &queue));
    }

    #[test]
    fn test_duplicate_broadcast_detected() {
        let id = BroadcastId::new(9).unwrap();
        let slot = |source_id| ReceiveState {
            source_device: scan().device,
            broadcast_id: id,
            ..ReceiveState::empty(source_id)
        };
        let mut sink = SinkDevice::new(DeviceAddress::new([1, 0, 0, 0, 0, 0]));
        sink.seed_slots(vec![slot(0), ReceiveState::empty(1)]);
        assert!(invariant_unique_broadcast_per_sink(&sink));

        sink.seed_slots(vec![slot(0), slot(1)]);
        assert!(!invariant_unique_broadcast_per_sink(&sink));
    }

    #[test]
    fn test_check_all_on_empty_state() {
        let catalog = BroadcastCatalog::new();
        let queue = SyncAdmissionQueue::new(4, 5);
        let coordinator = SinkCoordinator::new(10);
        assert_eq!(check_all_invariants(&catalog, &queue, &coordinator), Ok(()));
    }
}
