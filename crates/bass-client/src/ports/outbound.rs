//! # Outbound Ports
//!
//! External collaborators the engine drives. Every call returns right after
//! the intent is handed over; completions come back through the inbound
//! handlers.

use le_audio_types::{
    AudioContexts, BroadcastId, BroadcastMetadata, DeviceAddress, ReceiveState, SourceId,
    SyncHandle,
};
use std::time::Duration;
use thiserror::Error;

use crate::domain::{PaSyncRequest, ScanFilter, ScanResult, TimerId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("sink {0} is not reachable")]
    Unreachable(DeviceAddress),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("scanner unavailable: {0}")]
    Unavailable(String),

    #[error("sync registration rejected: {0}")]
    Rejected(String),
}

/// Per-sink Broadcast Audio Scan Service client.
pub trait SinkTransport: Send + Sync {
    fn send_add_source(
        &self,
        sink: DeviceAddress,
        metadata: &BroadcastMetadata,
    ) -> Result<(), TransportError>;

    /// Replace `old` with a new source in one step.
    fn send_switch_source(
        &self,
        sink: DeviceAddress,
        old: SourceId,
        metadata: &BroadcastMetadata,
    ) -> Result<(), TransportError>;

    fn send_modify_source(
        &self,
        sink: DeviceAddress,
        source_id: SourceId,
        metadata: &BroadcastMetadata,
        pa_sync: PaSyncRequest,
    ) -> Result<(), TransportError>;

    fn send_remove_source(&self, sink: DeviceAddress, source_id: SourceId)
        -> Result<(), TransportError>;

    /// Current receive-state slots, empty ones included.
    fn receive_states(&self, sink: DeviceAddress) -> Vec<ReceiveState>;

    fn max_source_capacity(&self, sink: DeviceAddress) -> usize;

    /// The transport's own state machine still has work queued for the
    /// sink (for the given broadcast, or for anything when `None`).
    fn has_pending_source_operation(
        &self,
        sink: DeviceAddress,
        broadcast_id: Option<BroadcastId>,
    ) -> bool;
}

/// Low-level extended scan and periodic-advertising sync primitive.
pub trait PeriodicSyncScanner: Send + Sync {
    fn start_scan(&self, filters: &[ScanFilter]) -> Result<(), ScanError>;

    fn stop_scan(&self) -> Result<(), ScanError>;

    fn register_sync(&self, candidate: &ScanResult, timeout: Duration) -> Result<(), ScanError>;

    fn unregister_sync(&self, handle: SyncHandle) -> Result<(), ScanError>;

    /// Abandon a registration that has not produced a handle yet.
    fn cancel_registration(&self) -> Result<(), ScanError>;
}

/// Coordinated-set membership.
pub trait GroupDirectory: Send + Sync {
    /// Members of the sink's set in a stable order, the sink included.
    /// A sink outside any set yields just itself.
    fn ordered_group_members(&self, sink: DeviceAddress) -> Vec<DeviceAddress>;
}

/// Local audio-routing subsystem.
pub trait LocalAudioGateway: Send + Sync {
    fn notify_assistant_active(&self, active: bool);

    fn set_active_group_allowed_contexts(&self, contexts: AudioContexts);

    /// The metadata describes a broadcast originated by this device.
    fn is_local_broadcast(&self, metadata: &BroadcastMetadata) -> bool;

    fn is_playing(&self, broadcast_id: BroadcastId) -> bool;

    fn is_primary_device(&self, sink: DeviceAddress) -> bool;

    fn stop_broadcast(&self, broadcast_id: BroadcastId);
}

/// One-shot cancellable timers. Expiry is delivered to
/// `TimerEventHandler::on_timer_fired`.
pub trait TimerScheduler: Send + Sync {
    fn schedule(&self, id: TimerId, after: Duration);

    fn cancel(&self, id: TimerId);
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks {
    use super::*;
    use crate::domain::TimerKind;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TransportCall {
        Add {
            sink: DeviceAddress,
            broadcast_id: BroadcastId,
        },
        Switch {
            sink: DeviceAddress,
            old: SourceId,
            broadcast_id: BroadcastId,
        },
        Modify {
            sink: DeviceAddress,
            source_id: SourceId,
            pa_sync: PaSyncRequest,
        },
        Remove {
            sink: DeviceAddress,
            source_id: SourceId,
        },
    }

    /// Records every request; slots are whatever the test seeds.
    #[derive(Debug, Default)]
    pub struct MockSinkTransport {
        calls: Mutex<Vec<TransportCall>>,
        states: Mutex<HashMap<DeviceAddress, Vec<ReceiveState>>>,
        pending: Mutex<HashSet<DeviceAddress>>,
        failing: Mutex<HashSet<DeviceAddress>>,
    }

    impl MockSinkTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_receive_states(&self, sink: DeviceAddress, states: Vec<ReceiveState>) {
            self.states.lock().insert(sink, states);
        }

        pub fn set_pending(&self, sink: DeviceAddress, pending: bool) {
            let mut set = self.pending.lock();
            if pending {
                set.insert(sink);
            } else {
                set.remove(&sink);
            }
        }

        /// Make every request to `sink` fail.
        pub fn fail_sink(&self, sink: DeviceAddress) {
            self.failing.lock().insert(sink);
        }

        pub fn calls(&self) -> Vec<TransportCall> {
            self.calls.lock().clone()
        }

        pub fn clear_calls(&self) {
            self.calls.lock().clear();
        }

        fn record(&self, sink: DeviceAddress, call: TransportCall) -> Result<(), TransportError> {
            if self.failing.lock().contains(&sink) {
                return Err(TransportError::Unreachable(sink));
            }
            self.calls.lock().push(call);
            Ok(())
        }
    }

    impl SinkTransport for MockSinkTransport {
        fn send_add_source(
            &self,
            sink: DeviceAddress,
            metadata: &BroadcastMetadata,
        ) -> Result<(), TransportError> {
            self.record(
                sink,
                TransportCall::Add {
                    sink,
                    broadcast_id: metadata.broadcast_id,
                },
            )
        }

        fn send_switch_source(
            &self,
            sink: DeviceAddress,
            old: SourceId,
            metadata: &BroadcastMetadata,
        ) -> Result<(), TransportError> {
            self.record(
                sink,
                TransportCall::Switch {
                    sink,
                    old,
                    broadcast_id: metadata.broadcast_id,
                },
            )
        }

        fn send_modify_source(
            &self,
            sink: DeviceAddress,
            source_id: SourceId,
            _metadata: &BroadcastMetadata,
            pa_sync: PaSyncRequest,
        ) -> Result<(), TransportError> {
            self.record(
                sink,
                TransportCall::Modify {
                    sink,
                    source_id,
                    pa_sync,
                },
            )
        }

        fn send_remove_source(
            &self,
            sink: DeviceAddress,
            source_id: SourceId,
        ) -> Result<(), TransportError> {
            self.record(sink, TransportCall::Remove { sink, source_id })
        }

        fn receive_states(&self, sink: DeviceAddress) -> Vec<ReceiveState> {
            self.states.lock().get(&sink).cloned().unwrap_or_default()
        }

        fn max_source_capacity(&self, sink: DeviceAddress) -> usize {
            self.states.lock().get(&sink).map_or(0, Vec::len)
        }

        fn has_pending_source_operation(
            &self,
            sink: DeviceAddress,
            _broadcast_id: Option<BroadcastId>,
        ) -> bool {
            self.pending.lock().contains(&sink)
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ScanCall {
        StartScan(Vec<ScanFilter>),
        StopScan,
        Register {
            device: DeviceAddress,
            adv_sid: u8,
        },
        Unregister(SyncHandle),
        CancelRegistration,
    }

    #[derive(Debug, Default)]
    pub struct MockSyncScanner {
        calls: Mutex<Vec<ScanCall>>,
        fail_scan: Mutex<bool>,
        reject_device: Mutex<HashSet<DeviceAddress>>,
    }

    impl MockSyncScanner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_scan_failing(&self, failing: bool) {
            *self.fail_scan.lock() = failing;
        }

        /// Reject registrations for this advertiser.
        pub fn reject_registrations_for(&self, device: DeviceAddress) {
            self.reject_device.lock().insert(device);
        }

        pub fn calls(&self) -> Vec<ScanCall> {
            self.calls.lock().clone()
        }

        pub fn registrations(&self) -> Vec<DeviceAddress> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    ScanCall::Register { device, .. } => Some(*device),
                    _ => None,
                })
                .collect()
        }

        pub fn unregistered(&self) -> Vec<SyncHandle> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    ScanCall::Unregister(handle) => Some(*handle),
                    _ => None,
                })
                .collect()
        }

        pub fn clear_calls(&self) {
            self.calls.lock().clear();
        }
    }

    impl PeriodicSyncScanner for MockSyncScanner {
        fn start_scan(&self, filters: &[ScanFilter]) -> Result<(), ScanError> {
            if *self.fail_scan.lock() {
                return Err(ScanError::Unavailable("scanner off".to_string()));
            }
            self.calls.lock().push(ScanCall::StartScan(filters.to_vec()));
            Ok(())
        }

        fn stop_scan(&self) -> Result<(), ScanError> {
            self.calls.lock().push(ScanCall::StopScan);
            Ok(())
        }

        fn register_sync(&self, candidate: &ScanResult, _timeout: Duration) -> Result<(), ScanError> {
            if self.reject_device.lock().contains(&candidate.device) {
                return Err(ScanError::Rejected(candidate.device.to_string()));
            }
            self.calls.lock().push(ScanCall::Register {
                device: candidate.device,
                adv_sid: candidate.adv_sid,
            });
            Ok(())
        }

        fn unregister_sync(&self, handle: SyncHandle) -> Result<(), ScanError> {
            self.calls.lock().push(ScanCall::Unregister(handle));
            Ok(())
        }

        fn cancel_registration(&self) -> Result<(), ScanError> {
            self.calls.lock().push(ScanCall::CancelRegistration);
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    pub struct MockGroupDirectory {
        groups: Mutex<HashMap<DeviceAddress, Vec<DeviceAddress>>>,
    }

    impl MockGroupDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a coordinated set.
        pub fn set_group(&self, members: &[DeviceAddress]) {
            let mut groups = self.groups.lock();
            for member in members {
                groups.insert(*member, members.to_vec());
            }
        }
    }

    impl GroupDirectory for MockGroupDirectory {
        fn ordered_group_members(&self, sink: DeviceAddress) -> Vec<DeviceAddress> {
            self.groups
                .lock()
                .get(&sink)
                .cloned()
                .unwrap_or_else(|| vec![sink])
        }
    }

    #[derive(Debug, Default)]
    pub struct MockLocalAudio {
        active_notifications: Mutex<Vec<bool>>,
        contexts: Mutex<Vec<AudioContexts>>,
        local: Mutex<HashSet<BroadcastId>>,
        playing: Mutex<HashSet<BroadcastId>>,
        primary: Mutex<HashSet<DeviceAddress>>,
        stopped: Mutex<Vec<BroadcastId>>,
    }

    impl MockLocalAudio {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_local_broadcast(&self, broadcast_id: BroadcastId, playing: bool) {
            self.local.lock().insert(broadcast_id);
            if playing {
                self.playing.lock().insert(broadcast_id);
            }
        }

        /// Flip playback without a broadcast state report.
        pub fn set_playing(&self, broadcast_id: BroadcastId, playing: bool) {
            if playing {
                self.playing.lock().insert(broadcast_id);
            } else {
                self.playing.lock().remove(&broadcast_id);
            }
        }

        pub fn set_primary(&self, sink: DeviceAddress) {
            self.primary.lock().insert(sink);
        }

        pub fn active_notifications(&self) -> Vec<bool> {
            self.active_notifications.lock().clone()
        }

        pub fn last_active(&self) -> Option<bool> {
            self.active_notifications.lock().last().copied()
        }

        pub fn contexts(&self) -> Vec<AudioContexts> {
            self.contexts.lock().clone()
        }

        pub fn stopped(&self) -> Vec<BroadcastId> {
            self.stopped.lock().clone()
        }
    }

    impl LocalAudioGateway for MockLocalAudio {
        fn notify_assistant_active(&self, active: bool) {
            self.active_notifications.lock().push(active);
        }

        fn set_active_group_allowed_contexts(&self, contexts: AudioContexts) {
            self.contexts.lock().push(contexts);
        }

        fn is_local_broadcast(&self, metadata: &BroadcastMetadata) -> bool {
            self.local.lock().contains(&metadata.broadcast_id)
        }

        fn is_playing(&self, broadcast_id: BroadcastId) -> bool {
            self.playing.lock().contains(&broadcast_id)
        }

        fn is_primary_device(&self, sink: DeviceAddress) -> bool {
            self.primary.lock().contains(&sink)
        }

        fn stop_broadcast(&self, broadcast_id: BroadcastId) {
            self.playing.lock().remove(&broadcast_id);
            self.stopped.lock().push(broadcast_id);
        }
    }

    #[derive(Debug, Default)]
    pub struct MockTimerScheduler {
        scheduled: Mutex<Vec<(TimerId, Duration)>>,
        cancelled: Mutex<Vec<TimerId>>,
    }

    impl MockTimerScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Latest arming of a timer kind that has not been cancelled.
        pub fn armed(&self, kind: TimerKind) -> Option<(TimerId, Duration)> {
            let cancelled = self.cancelled.lock();
            self.scheduled
                .lock()
                .iter()
                .rev()
                .find(|(id, _)| id.kind == kind)
                .filter(|(id, _)| !cancelled.contains(id))
                .copied()
        }

        pub fn cancelled(&self) -> Vec<TimerId> {
            self.cancelled.lock().clone()
        }
    }

    impl TimerScheduler for MockTimerScheduler {
        fn schedule(&self, id: TimerId, after: Duration) {
            self.scheduled.lock().push((id, after));
        }

        fn cancel(&self, id: TimerId) {
            self.cancelled.lock().push(id);
        }
    }
}
