//! # Broadcast Catalog
//!
//! Owned tables describing what the engine has discovered:
//!
//! - candidate sources seen by the discovery scan, by broadcast identity
//! - periodic advertisement results, by advertiser then broadcast identity
//! - live sync handles, each bound to one advertiser/broadcast and, once BIS
//!   discovery succeeds, to exactly one BASE
//!
//! Absence is absence: a handle that is not live has no row, so its BASE
//! disappears with it.

use le_audio_types::{BaseData, BroadcastId, BroadcastMetadata, DeviceAddress, SyncHandle};
use std::collections::HashMap;
use tracing::debug;

use super::entities::{PaResultUpdate, PeriodicAdvertisementResult};
use super::value_objects::ScanResult;

/// What a live sync handle is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncBinding {
    pub device: DeviceAddress,
    pub broadcast_id: BroadcastId,
    pub base: Option<BaseData>,
}

#[derive(Debug, Default)]
pub struct BroadcastCatalog {
    candidates: HashMap<BroadcastId, ScanResult>,
    pa_results: HashMap<DeviceAddress, HashMap<BroadcastId, PeriodicAdvertisementResult>>,
    bindings: HashMap<SyncHandle, SyncBinding>,
}

impl BroadcastCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // CANDIDATES
    // =========================================================================

    /// Remember a discovered source. Returns `false` if it was already known.
    pub fn cache_candidate(&mut self, broadcast_id: BroadcastId, scan: ScanResult) -> bool {
        if self.candidates.contains_key(&broadcast_id) {
            return false;
        }
        self.candidates.insert(broadcast_id, scan);
        true
    }

    #[must_use]
    pub fn candidate(&self, broadcast_id: BroadcastId) -> Option<&ScanResult> {
        self.candidates.get(&broadcast_id)
    }

    pub fn remove_candidate(&mut self, broadcast_id: BroadcastId) -> Option<ScanResult> {
        self.candidates.remove(&broadcast_id)
    }

    pub fn clear_candidates(&mut self) {
        self.candidates.clear();
    }

    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    // =========================================================================
    // PERIODIC ADVERTISEMENT RESULTS
    // =========================================================================

    /// Merge partial advertiser information into the catalog.
    ///
    /// With a broadcast id the record is created on first sight. Without
    /// one, the update lands on the advertiser's existing record (matching
    /// the advertising set when given); if there is none it is dropped.
    pub fn merge_pa_result(
        &mut self,
        update: &PaResultUpdate,
    ) -> Option<&PeriodicAdvertisementResult> {
        let records = self.pa_results.entry(update.device).or_default();

        let key = match update.broadcast_id {
            Some(id) => {
                records
                    .entry(id)
                    .or_insert_with(|| PeriodicAdvertisementResult::new(update.device, id));
                id
            }
            None => {
                let found = records
                    .values()
                    .find(|r| update.adv_sid.is_some() && r.adv_sid == update.adv_sid)
                    .or_else(|| records.values().next())
                    .map(|r| r.broadcast_id);
                match found {
                    Some(id) => id,
                    None => {
                        debug!(device = %update.device, "PA update without a record, dropped");
                        if records.is_empty() {
                            self.pa_results.remove(&update.device);
                        }
                        return None;
                    }
                }
            }
        };

        let record = self.pa_results.get_mut(&update.device)?.get_mut(&key)?;
        record.merge(update);
        Some(record)
    }

    #[must_use]
    pub fn pa_result(
        &self,
        device: DeviceAddress,
        broadcast_id: BroadcastId,
    ) -> Option<&PeriodicAdvertisementResult> {
        self.pa_results.get(&device)?.get(&broadcast_id)
    }

    /// Record bound to a live handle.
    #[must_use]
    pub fn pa_result_for_handle(&self, handle: SyncHandle) -> Option<&PeriodicAdvertisementResult> {
        let binding = self.bindings.get(&handle)?;
        self.pa_result(binding.device, binding.broadcast_id)
    }

    pub fn remove_pa_result(&mut self, device: DeviceAddress, broadcast_id: BroadcastId) {
        if let Some(records) = self.pa_results.get_mut(&device) {
            records.remove(&broadcast_id);
            if records.is_empty() {
                self.pa_results.remove(&device);
            }
        }
    }

    /// Record the BIG encryption flag reported for a handle.
    pub fn set_encrypted(&mut self, handle: SyncHandle, encrypted: bool) -> bool {
        let Some(binding) = self.bindings.get(&handle) else {
            return false;
        };
        let (device, id) = (binding.device, binding.broadcast_id);
        match self.pa_results.get_mut(&device).and_then(|r| r.get_mut(&id)) {
            Some(record) => {
                record.encrypted = Some(encrypted);
                true
            }
            None => false,
        }
    }

    /// Allow every source to be reported again.
    pub fn clear_notified_flags(&mut self) {
        for record in self.pa_results.values_mut().flat_map(HashMap::values_mut) {
            record.notified = false;
        }
    }

    /// Set the notified flag. Returns `false` if it was already set.
    pub fn mark_notified(&mut self, device: DeviceAddress, broadcast_id: BroadcastId) -> bool {
        match self
            .pa_results
            .get_mut(&device)
            .and_then(|r| r.get_mut(&broadcast_id))
        {
            Some(record) if !record.notified => {
                record.notified = true;
                true
            }
            _ => false,
        }
    }

    // =========================================================================
    // SYNC HANDLES
    // =========================================================================

    /// Attach a freshly established handle.
    pub fn bind_handle(
        &mut self,
        handle: SyncHandle,
        device: DeviceAddress,
        broadcast_id: BroadcastId,
    ) {
        self.bindings.insert(
            handle,
            SyncBinding {
                device,
                broadcast_id,
                base: None,
            },
        );
    }

    #[must_use]
    pub fn binding(&self, handle: SyncHandle) -> Option<&SyncBinding> {
        self.bindings.get(&handle)
    }

    /// Live handle synced to a broadcast.
    #[must_use]
    pub fn handle_for_broadcast(&self, broadcast_id: BroadcastId) -> Option<SyncHandle> {
        self.bindings
            .iter()
            .find(|(_, b)| b.broadcast_id == broadcast_id)
            .map(|(h, _)| *h)
    }

    /// Store the decoded BASE for a live handle.
    pub fn set_base(&mut self, handle: SyncHandle, base: BaseData) -> bool {
        match self.bindings.get_mut(&handle) {
            Some(binding) => {
                binding.base = Some(base);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn base(&self, handle: SyncHandle) -> Option<&BaseData> {
        self.bindings.get(&handle)?.base.as_ref()
    }

    /// Retire a handle: drop its binding and BASE and detach it from the
    /// advertiser's record.
    pub fn release_handle(&mut self, handle: SyncHandle) -> Option<SyncBinding> {
        let binding = self.bindings.remove(&handle)?;
        if let Some(record) = self
            .pa_results
            .get_mut(&binding.device)
            .and_then(|r| r.get_mut(&binding.broadcast_id))
        {
            if record.sync_handle == Some(handle) {
                record.sync_handle = None;
            }
        }
        Some(binding)
    }

    #[must_use]
    pub fn live_handles(&self) -> Vec<SyncHandle> {
        self.bindings.keys().copied().collect()
    }

    /// Application-facing metadata for a live handle.
    #[must_use]
    pub fn metadata_for_handle(&self, handle: SyncHandle) -> Option<BroadcastMetadata> {
        let binding = self.bindings.get(&handle)?;
        let record = self.pa_result(binding.device, binding.broadcast_id)?;
        Some(record.to_metadata(binding.base.as_ref()))
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.candidates.clear();
        self.pa_results.clear();
        self.bindings.clear();
    }
}
