//! # Broadcast Metadata
//!
//! Describes a broadcast source as applications see it: identity of the
//! periodic advertiser, public-broadcast information, and the decoded BASE
//! (subgroups and their channels).

use serde::{Deserialize, Serialize};

use crate::identifiers::{AddressType, AdvertisingSid, BroadcastId, DeviceAddress};
use crate::receive_state::ReceiveState;

/// Shortest broadcast code accepted by a sink, in octets.
pub const MIN_BROADCAST_CODE_LEN: usize = 4;

/// Longest broadcast code accepted by a sink, in octets.
pub const MAX_BROADCAST_CODE_LEN: usize = 16;

/// Audio context bitmask (Bluetooth Assigned Numbers, Context Type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AudioContexts(pub u16);

impl AudioContexts {
    pub const UNSPECIFIED: Self = Self(0x0001);
    pub const CONVERSATIONAL: Self = Self(0x0002);
    pub const MEDIA: Self = Self(0x0004);
    pub const GAME: Self = Self(0x0008);
    pub const INSTRUCTIONAL: Self = Self(0x0010);
    pub const VOICE_ASSISTANTS: Self = Self(0x0020);
    pub const LIVE: Self = Self(0x0040);
    pub const SOUND_EFFECTS: Self = Self(0x0080);
    pub const NOTIFICATIONS: Self = Self(0x0100);
    pub const RINGTONE: Self = Self(0x0200);
    pub const ALERTS: Self = Self(0x0400);
    pub const EMERGENCY_ALARM: Self = Self(0x0800);
    pub const ALL: Self = Self(0x0FFF);

    /// Bitwise union.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// One channel (BIS) of a BASE subgroup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseChannel {
    /// BIS index inside the BIG.
    pub bis_index: u8,
    /// Channel-level codec specific configuration (LTV encoded).
    pub codec_config: Vec<u8>,
}

/// One subgroup of the BASE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseSubgroup {
    /// Coding format, company id and vendor codec id.
    pub codec_id: [u8; 5],
    /// Subgroup-level codec specific configuration (LTV encoded).
    pub codec_config: Vec<u8>,
    /// Subgroup metadata (LTV encoded).
    pub metadata: Vec<u8>,
    /// Channels carried by this subgroup.
    pub channels: Vec<BaseChannel>,
}

/// Decoded Broadcast Audio Source Endpoint structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseData {
    /// Presentation delay in microseconds.
    pub presentation_delay_micros: u32,
    /// Subgroups, in announcement order.
    pub subgroups: Vec<BaseSubgroup>,
}

impl BaseData {
    /// Total number of channels across all subgroups.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.subgroups.iter().map(|s| s.channels.len()).sum()
    }
}

/// Public Broadcast Announcement contents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicBroadcastData {
    /// Streams are encrypted.
    pub encrypted: bool,
    /// Standard quality audio configuration present.
    pub standard_quality: bool,
    /// High quality audio configuration present.
    pub high_quality: bool,
    /// Program metadata (LTV encoded).
    pub metadata: Vec<u8>,
}

/// Everything an application or sink needs to know about one broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMetadata {
    /// Address of the periodic advertiser.
    pub source_device: DeviceAddress,
    /// Address type of the periodic advertiser.
    pub source_address_type: AddressType,
    /// Advertising set id of the periodic advertiser.
    pub source_adv_sid: AdvertisingSid,
    /// Broadcast identity.
    pub broadcast_id: BroadcastId,
    /// Periodic advertising interval, when known.
    pub pa_sync_interval: Option<u16>,
    /// The broadcast streams are encrypted.
    pub encrypted: bool,
    /// Public broadcast data; `None` for a non-public broadcast.
    pub public_broadcast: Option<PublicBroadcastData>,
    /// Human readable broadcast name.
    pub broadcast_name: Option<String>,
    /// Code used to decrypt the streams.
    pub broadcast_code: Option<Vec<u8>>,
    /// Presentation delay taken from the BASE.
    pub presentation_delay_micros: u32,
    /// Subgroups taken from the BASE.
    pub subgroups: Vec<BaseSubgroup>,
}

impl BroadcastMetadata {
    /// Metadata with only the source identity filled in.
    #[must_use]
    pub fn new(
        source_device: DeviceAddress,
        source_address_type: AddressType,
        source_adv_sid: AdvertisingSid,
        broadcast_id: BroadcastId,
    ) -> Self {
        Self {
            source_device,
            source_address_type,
            source_adv_sid,
            broadcast_id,
            pa_sync_interval: None,
            encrypted: false,
            public_broadcast: None,
            broadcast_name: None,
            broadcast_code: None,
            presentation_delay_micros: 0,
            subgroups: Vec::new(),
        }
    }

    /// Attach a broadcast code.
    #[must_use]
    pub fn with_broadcast_code(mut self, code: impl Into<Vec<u8>>) -> Self {
        self.broadcast_code = Some(code.into());
        self
    }

    /// Attach a broadcast name.
    #[must_use]
    pub fn with_broadcast_name(mut self, name: impl Into<String>) -> Self {
        self.broadcast_name = Some(name.into());
        self
    }

    /// Copy presentation delay and subgroups from a decoded BASE.
    #[must_use]
    pub fn with_base(mut self, base: &BaseData) -> Self {
        self.presentation_delay_micros = base.presentation_delay_micros;
        self.subgroups = base.subgroups.clone();
        self
    }

    /// The broadcast carries a Public Broadcast Announcement.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.public_broadcast.is_some()
    }

    /// No code, or a code of 4 to 16 octets.
    #[must_use]
    pub fn has_valid_code_length(&self) -> bool {
        self.broadcast_code.as_ref().map_or(true, |code| {
            (MIN_BROADCAST_CODE_LEN..=MAX_BROADCAST_CODE_LEN).contains(&code.len())
        })
    }

    /// Same advertiser, address type, advertising set and broadcast identity.
    #[must_use]
    pub fn describes(&self, state: &ReceiveState) -> bool {
        self.source_device == state.source_device
            && self.source_address_type == state.source_address_type
            && self.source_adv_sid == state.source_adv_sid
            && self.broadcast_id == state.broadcast_id
    }

    /// Rebuild the identity part of the metadata from a receive-state slot.
    #[must_use]
    pub fn from_receive_state(state: &ReceiveState) -> Self {
        Self::new(
            state.source_device,
            state.source_address_type,
            state.source_adv_sid,
            state.broadcast_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receive_state::{BigEncryptionState, PaSyncState};

    fn metadata() -> BroadcastMetadata {
        BroadcastMetadata::new(
            DeviceAddress::new([1, 2, 3, 4, 5, 6]),
            AddressType::Random,
            3,
            BroadcastId::new(0x0A0B0C).unwrap(),
        )
    }

    #[test]
    fn test_code_length_bounds() {
        assert!(metadata().has_valid_code_length());
        assert!(metadata().with_broadcast_code(vec![0; 4]).has_valid_code_length());
        assert!(metadata().with_broadcast_code(vec![0; 16]).has_valid_code_length());
        assert!(!metadata().with_broadcast_code(vec![0; 3]).has_valid_code_length());
        assert!(!metadata().with_broadcast_code(vec![0; 17]).has_valid_code_length());
    }

    #[test]
    fn test_describes_matches_all_identity_fields() {
        let meta = metadata();
        let mut state = ReceiveState {
            source_id: 1,
            source_device: meta.source_device,
            source_address_type: meta.source_address_type,
            source_adv_sid: meta.source_adv_sid,
            broadcast_id: meta.broadcast_id,
            pa_sync_state: PaSyncState::Synchronized,
            big_encryption: BigEncryptionState::NotEncrypted,
            bad_code: None,
            bis_sync_state: vec![1],
        };
        assert!(meta.describes(&state));

        state.source_adv_sid = 4;
        assert!(!meta.describes(&state));
    }

    #[test]
    fn test_audio_contexts() {
        let narrowed = AudioContexts::CONVERSATIONAL.union(AudioContexts::RINGTONE);
        assert!(narrowed.contains(AudioContexts::RINGTONE));
        assert!(!narrowed.contains(AudioContexts::MEDIA));
        assert!(AudioContexts::ALL.contains(narrowed));
    }

    #[test]
    fn test_with_base_copies_structure() {
        let base = BaseData {
            presentation_delay_micros: 40_000,
            subgroups: vec![BaseSubgroup {
                codec_id: [0x06, 0, 0, 0, 0],
                codec_config: vec![],
                metadata: vec![],
                channels: vec![
                    BaseChannel { bis_index: 1, codec_config: vec![] },
                    BaseChannel { bis_index: 2, codec_config: vec![] },
                ],
            }],
        };
        let meta = metadata().with_base(&base);
        assert_eq!(meta.presentation_delay_micros, 40_000);
        assert_eq!(base.channel_count(), 2);
        assert_eq!(meta.subgroups.len(), 1);
    }
}
