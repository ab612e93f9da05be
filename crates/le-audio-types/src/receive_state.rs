//! # Receive State
//!
//! The per-slot view a sink device reports for each broadcast source it
//! tracks, plus the link-level connection state of a sink.

use serde::{Deserialize, Serialize};

use crate::identifiers::{AddressType, AdvertisingSid, BroadcastId, DeviceAddress, SourceId};

/// BIS sync value meaning "not synchronized to any BIS".
pub const BIS_SYNC_NONE: u32 = 0x0000_0000;

/// BIS sync value meaning "failed to synchronize to the BIG".
pub const BIS_SYNC_FAILED: u32 = 0xFFFF_FFFF;

/// Periodic advertising sync state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaSyncState {
    /// Not synchronized.
    #[default]
    Idle,
    /// Waiting for sync info (PAST) or synchronizing.
    Synchronizing,
    /// Synchronized to the periodic advertising train.
    Synchronized,
    /// Synchronization attempt failed.
    FailedToSynchronize,
    /// No PAST available, sink must sync on its own.
    NoPast,
}

/// BIG encryption state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BigEncryptionState {
    #[default]
    NotEncrypted,
    CodeRequired,
    Decrypting,
    BadCode,
}

/// Link state of a sink device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// One receive-state slot of a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveState {
    /// Slot identifier assigned by the sink.
    pub source_id: SourceId,
    /// Periodic advertiser; [`DeviceAddress::EMPTY`] for an unused slot.
    pub source_device: DeviceAddress,
    pub source_address_type: AddressType,
    pub source_adv_sid: AdvertisingSid,
    pub broadcast_id: BroadcastId,
    pub pa_sync_state: PaSyncState,
    pub big_encryption: BigEncryptionState,
    /// Code the sink rejected, reported with [`BigEncryptionState::BadCode`].
    pub bad_code: Option<Vec<u8>>,
    /// BIS sync bitmask per subgroup.
    pub bis_sync_state: Vec<u32>,
}

impl ReceiveState {
    /// An unused slot.
    #[must_use]
    pub fn empty(source_id: SourceId) -> Self {
        Self {
            source_id,
            source_device: DeviceAddress::EMPTY,
            source_address_type: AddressType::Public,
            source_adv_sid: 0,
            broadcast_id: BroadcastId::INVALID,
            pa_sync_state: PaSyncState::Idle,
            big_encryption: BigEncryptionState::NotEncrypted,
            bad_code: None,
            bis_sync_state: Vec::new(),
        }
    }

    /// The slot does not hold a source.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source_device.is_empty()
    }

    /// At least one subgroup is synchronized to a BIS.
    #[must_use]
    pub fn is_receiving(&self) -> bool {
        self.bis_sync_state
            .iter()
            .any(|&state| state != BIS_SYNC_NONE && state != BIS_SYNC_FAILED)
    }

    #[must_use]
    pub fn is_pa_synchronized(&self) -> bool {
        self.pa_sync_state == PaSyncState::Synchronized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot() {
        let slot = ReceiveState::empty(2);
        assert!(slot.is_empty());
        assert!(!slot.is_receiving());
        assert!(!slot.is_pa_synchronized());
        assert_eq!(slot.source_id, 2);
    }

    #[test]
    fn test_receiving_ignores_none_and_failed() {
        let mut slot = ReceiveState::empty(0);
        slot.bis_sync_state = vec![BIS_SYNC_NONE, BIS_SYNC_FAILED];
        assert!(!slot.is_receiving());

        slot.bis_sync_state.push(0b0000_0011);
        assert!(slot.is_receiving());
    }
}
