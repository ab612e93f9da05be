//! # Domain Entities
//!
//! Records with identity and a lifecycle: periodic advertisement results,
//! pending per-sink operations and adds waiting on a precondition.

use le_audio_types::{
    AddressType, AdvertisingSid, BaseData, BroadcastId, BroadcastMetadata, DeviceAddress,
    PublicBroadcastData, SourceId, SyncHandle,
};
use serde::{Deserialize, Serialize};

use super::value_objects::{OperationKey, OperationKind};

/// What the engine knows about one periodic advertiser broadcasting one
/// broadcast identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicAdvertisementResult {
    pub device: DeviceAddress,
    pub broadcast_id: BroadcastId,
    pub address_type: Option<AddressType>,
    pub sync_handle: Option<SyncHandle>,
    pub adv_sid: Option<AdvertisingSid>,
    pub adv_interval: Option<u16>,
    pub public_broadcast: Option<PublicBroadcastData>,
    pub broadcast_name: Option<String>,
    /// From BIG info reports.
    pub encrypted: Option<bool>,
    /// Applications were told about this source during the current search.
    pub notified: bool,
}

impl PeriodicAdvertisementResult {
    #[must_use]
    pub fn new(device: DeviceAddress, broadcast_id: BroadcastId) -> Self {
        Self {
            device,
            broadcast_id,
            address_type: None,
            sync_handle: None,
            adv_sid: None,
            adv_interval: None,
            public_broadcast: None,
            broadcast_name: None,
            encrypted: None,
            notified: false,
        }
    }

    /// Apply an update. Known values in the update replace the stored ones;
    /// unknown values leave them untouched.
    pub fn merge(&mut self, update: &PaResultUpdate) {
        if let Some(address_type) = update.address_type {
            self.address_type = Some(address_type);
        }
        if let Some(handle) = update.sync_handle {
            self.sync_handle = Some(handle);
        }
        if let Some(sid) = update.adv_sid {
            self.adv_sid = Some(sid);
        }
        if let Some(interval) = update.adv_interval {
            self.adv_interval = Some(interval);
        }
        if let Some(public) = &update.public_broadcast {
            self.public_broadcast = Some(public.clone());
        }
        if let Some(name) = &update.broadcast_name {
            self.broadcast_name = Some(name.clone());
        }
    }

    /// Build application-facing metadata, adding the BASE when known.
    #[must_use]
    pub fn to_metadata(&self, base: Option<&BaseData>) -> BroadcastMetadata {
        let mut metadata = BroadcastMetadata::new(
            self.device,
            self.address_type.unwrap_or_default(),
            self.adv_sid.unwrap_or_default(),
            self.broadcast_id,
        );
        metadata.pa_sync_interval = self.adv_interval;
        metadata.public_broadcast = self.public_broadcast.clone();
        metadata.broadcast_name = self.broadcast_name.clone();
        metadata.encrypted = self.encrypted.unwrap_or(false)
            || self.public_broadcast.as_ref().is_some_and(|p| p.encrypted);
        match base {
            Some(base) => metadata.with_base(base),
            None => metadata,
        }
    }
}

/// Partial information about a periodic advertiser.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaResultUpdate {
    pub device: DeviceAddress,
    /// When `None`, the update targets the advertiser's existing record.
    pub broadcast_id: Option<BroadcastId>,
    pub address_type: Option<AddressType>,
    pub sync_handle: Option<SyncHandle>,
    pub adv_sid: Option<AdvertisingSid>,
    pub adv_interval: Option<u16>,
    pub public_broadcast: Option<PublicBroadcastData>,
    pub broadcast_name: Option<String>,
}

impl PaResultUpdate {
    #[must_use]
    pub fn new(device: DeviceAddress) -> Self {
        Self {
            device,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn broadcast_id(mut self, id: BroadcastId) -> Self {
        self.broadcast_id = Some(id);
        self
    }

    #[must_use]
    pub fn address_type(mut self, address_type: AddressType) -> Self {
        self.address_type = Some(address_type);
        self
    }

    #[must_use]
    pub fn sync_handle(mut self, handle: SyncHandle) -> Self {
        self.sync_handle = Some(handle);
        self
    }

    #[must_use]
    pub fn adv_sid(mut self, sid: AdvertisingSid) -> Self {
        self.adv_sid = Some(sid);
        self
    }

    #[must_use]
    pub fn adv_interval(mut self, interval: Option<u16>) -> Self {
        self.adv_interval = interval;
        self
    }

    #[must_use]
    pub fn public_broadcast(mut self, data: Option<PublicBroadcastData>) -> Self {
        self.public_broadcast = data;
        self
    }

    #[must_use]
    pub fn broadcast_name(mut self, name: Option<String>) -> Self {
        self.broadcast_name = name;
        self
    }
}

/// An issued operation waiting for its completion event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub key: OperationKey,
    /// Part of a group operation.
    pub group_op: bool,
    /// Metadata sent with an add or modify.
    pub metadata: Option<BroadcastMetadata>,
    /// For an add issued as a switch: the source being replaced.
    pub replaces: Option<SourceId>,
}

impl PendingOperation {
    #[must_use]
    pub fn new(kind: OperationKind, key: OperationKey) -> Self {
        Self {
            kind,
            key,
            group_op: false,
            metadata: None,
            replaces: None,
        }
    }

    #[must_use]
    pub fn group(mut self, group_op: bool) -> Self {
        self.group_op = group_op;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: BroadcastMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn replacing(mut self, source_id: SourceId) -> Self {
        self.replaces = Some(source_id);
        self
    }
}

/// An add request parked until a precondition holds (source synced, or the
/// handover gate opened).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredAdd {
    pub sink: DeviceAddress,
    pub metadata: BroadcastMetadata,
    pub group_op: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceAddress {
        DeviceAddress::new([0xC0, 0, 0, 0, 0, 1])
    }

    #[test]
    fn test_merge_keeps_known_fields() {
        let id = BroadcastId::new(0x1234).unwrap();
        let mut result = PeriodicAdvertisementResult::new(device(), id);
        result.merge(
            &PaResultUpdate::new(device())
                .broadcast_id(id)
                .adv_sid(2)
                .adv_interval(Some(0x50))
                .broadcast_name(Some("Cafe".to_string())),
        );
        result.merge(&PaResultUpdate::new(device()).sync_handle(SyncHandle(9)));

        assert_eq!(result.adv_sid, Some(2));
        assert_eq!(result.adv_interval, Some(0x50));
        assert_eq!(result.broadcast_name.as_deref(), Some("Cafe"));
        assert_eq!(result.sync_handle, Some(SyncHandle(9)));
    }

    #[test]
    fn test_merge_overwrites_with_new_known_value() {
        let id = BroadcastId::new(1).unwrap();
        let mut result = PeriodicAdvertisementResult::new(device(), id);
        result.merge(&PaResultUpdate::new(device()).address_type(AddressType::Public));
        result.merge(&PaResultUpdate::new(device()).address_type(AddressType::Random));
        assert_eq!(result.address_type, Some(AddressType::Random));
    }

    #[test]
    fn test_to_metadata_encryption_from_public_data() {
        let id = BroadcastId::new(1).unwrap();
        let mut result = PeriodicAdvertisementResult::new(device(), id);
        result.public_broadcast = Some(PublicBroadcastData {
            encrypted: true,
            ..PublicBroadcastData::default()
        });
        let metadata = result.to_metadata(None);
        assert!(metadata.encrypted);
        assert!(metadata.is_public());
        assert_eq!(metadata.broadcast_id, id);
    }
}
