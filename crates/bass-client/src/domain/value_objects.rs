//! # Value Objects
//!
//! Limits, scan results, queued sync requests and the small enums that flow
//! between the engine components.

use le_audio_types::{AddressType, AdvertisingSid, BroadcastId, DeviceAddress, SourceId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// =============================================================================
// LIMITS
// =============================================================================

/// Periodic-advertising syncs the controller can hold at once.
pub const MAX_ACTIVE_SYNCED_SOURCES: usize = 4;

/// Periodic reports inspected for a BASE before the sync is given up.
pub const MAX_BIS_DISCOVERY_TRIES: u8 = 5;

/// Sink devices tracked at once.
pub const MAX_SINK_DEVICES: usize = 10;

/// Sync registration timeout handed to the scan primitive.
pub const SYNC_TIMEOUT_MS: u64 = 2_000;

/// Idle time after which syncs are torn down while no search is running.
pub const IDLE_SYNC_TIMEOUT_MS: u64 = 30_000;

/// Grace period for a local-broadcast receiver that dropped unexpectedly.
pub const DIAL_OUT_TIMEOUT_MS: u64 = 60_000;

/// RSSI assigned to sync requests built from application metadata.
pub const UNKNOWN_RSSI: i8 = i8::MIN;

// =============================================================================
// DISCOVERY
// =============================================================================

/// One extended-advertising report from the discovery scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub device: DeviceAddress,
    pub address_type: AddressType,
    pub adv_sid: AdvertisingSid,
    pub rssi: i8,
    /// Periodic advertising interval announced in the extended header.
    pub pa_interval: Option<u16>,
    /// Raw AD structures.
    pub advertising_data: Vec<u8>,
}

/// Extra filter handed to the discovery scan. The engine always adds a
/// filter on the Broadcast Audio Announcement service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanFilter {
    pub device: Option<DeviceAddress>,
    pub service_uuid: Option<u16>,
    pub broadcast_name: Option<String>,
}

/// Queued intent to synchronize to a periodic advertiser.
///
/// Ordered so that a max-heap pops priority requests first, then the
/// strongest signal; equal entries fall back to arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSyncRequest {
    pub scan: ScanResult,
    pub broadcast_id: BroadcastId,
    pub has_priority: bool,
    pub(crate) sequence: u64,
}

impl Ord for SourceSyncRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.has_priority
            .cmp(&other.has_priority)
            .then(self.scan.rssi.cmp(&other.scan.rssi))
            .then(other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for SourceSyncRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// SOURCE OPERATIONS
// =============================================================================

/// Kind of per-sink source operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Add,
    Modify,
    Remove,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Remove => "remove",
        }
    }
}

/// Correlates a pending operation with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKey {
    /// Adds are correlated by broadcast identity.
    Broadcast(BroadcastId),
    /// Modifies and removes are correlated by the sink's source id.
    Source(SourceId),
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast(id) => write!(f, "broadcast {id}"),
            Self::Source(id) => write!(f, "source {id}"),
        }
    }
}

/// PA sync request carried by a modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaSyncRequest {
    /// Leave the PA sync decision to the transport.
    Keep,
    /// Ask the sink to drop PA sync.
    Idle,
    /// Ask the sink to sync, PAST available.
    SyncPastAvailable,
    /// Ask the sink to sync on its own.
    SyncPastNotAvailable,
}

// =============================================================================
// LOCAL AUDIO
// =============================================================================

/// Local unicast stream status reported by the audio-routing subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalStreamStatus {
    Requested,
    Streaming,
    Suspended,
}

/// State of a broadcast originated by this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastState {
    Stopped,
    Configuring,
    Paused,
    Stopping,
    Streaming,
}

// =============================================================================
// TIMERS
// =============================================================================

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Tear down idle syncs while no search is running.
    SyncIdleTeardown,
    /// Stop a local broadcast whose receiver did not come back.
    DialOut(BroadcastId),
}

/// Identity of one arming of a timer. Re-arming bumps the generation, so an
/// expiry from an earlier arming is recognisably stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerId {
    pub kind: TimerKind,
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn request(has_priority: bool, rssi: i8, sequence: u64) -> SourceSyncRequest {
        SourceSyncRequest {
            scan: ScanResult {
                device: DeviceAddress::new([0, 0, 0, 0, 0, sequence as u8]),
                address_type: AddressType::Public,
                adv_sid: 0,
                rssi,
                pa_interval: None,
                advertising_data: Vec::new(),
            },
            broadcast_id: BroadcastId::new(sequence as u32).unwrap(),
            has_priority,
            sequence,
        }
    }

    #[test]
    fn test_priority_then_rssi_ordering() {
        let mut heap = BinaryHeap::new();
        heap.push(request(false, -80, 0));
        heap.push(request(true, -90, 1));
        heap.push(request(false, -60, 2));

        let order: Vec<(bool, i8)> = std::iter::from_fn(|| heap.pop())
            .map(|r| (r.has_priority, r.scan.rssi))
            .collect();
        assert_eq!(order, vec![(true, -90), (false, -60), (false, -80)]);
    }

    #[test]
    fn test_equal_requests_pop_in_arrival_order() {
        let mut heap = BinaryHeap::new();
        heap.push(request(false, -70, 5));
        heap.push(request(false, -70, 3));
        assert_eq!(heap.pop().map(|r| r.sequence), Some(3));
    }

    #[test]
    fn test_operation_key_display() {
        assert_eq!(OperationKey::Source(2).to_string(), "source 2");
        assert_eq!(OperationKind::Remove.as_str(), "remove");
    }
}
