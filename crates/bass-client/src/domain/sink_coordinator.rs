//! # Sink Coordinator
//!
//! Per-sink bookkeeping and request validation.
//!
//! Each [`SinkDevice`] mirrors the sink's receive-state slots and keeps a
//! ledger of issued operations waiting for completion. The coordinator
//! validates requests against that state, plans adds (plain add or switch),
//! fans group operations out to the members of a coordinated set and
//! reconciles completions.
//!
//! ## Ledger keys
//!
//! | Operation | Key                          |
//! |-----------|------------------------------|
//! | Add       | `OperationKey::Broadcast(id)`|
//! | Modify    | `OperationKey::Source(sid)`  |
//! | Remove    | `OperationKey::Source(sid)`  |
//!
//! A sink's ledger never holds two entries with the same (kind, key).

use le_audio_types::{
    AssistantError, BroadcastId, BroadcastMetadata, ConnectionState, DeviceAddress, ReceiveState,
    SourceId,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::entities::{DeferredAdd, PendingOperation};
use super::value_objects::{OperationKey, OperationKind};

// =============================================================================
// SINK DEVICE
// =============================================================================

#[derive(Debug, Clone)]
pub struct SinkDevice {
    pub address: DeviceAddress,
    pub connection: ConnectionState,
    pub bonded: bool,
    slots: Vec<ReceiveState>,
    ledger: Vec<PendingOperation>,
    group_managed: HashSet<SourceId>,
    source_metadata: HashMap<SourceId, BroadcastMetadata>,
    /// Last metadata requested for this sink, used by pause/resume.
    pub last_metadata: Option<BroadcastMetadata>,
    awaiting_desync: HashSet<SourceId>,
}

impl SinkDevice {
    #[must_use]
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            address,
            connection: ConnectionState::Disconnected,
            bonded: false,
            slots: Vec::new(),
            ledger: Vec::new(),
            group_managed: HashSet::new(),
            source_metadata: HashMap::new(),
            last_metadata: None,
            awaiting_desync: HashSet::new(),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    // --- slots ---------------------------------------------------------------

    pub fn seed_slots(&mut self, slots: Vec<ReceiveState>) {
        self.slots = slots;
    }

    /// Store a reported slot. Returns the previous content of that slot.
    pub fn update_slot(&mut self, state: ReceiveState) -> Option<ReceiveState> {
        if state.is_empty() {
            self.group_managed.remove(&state.source_id);
            self.source_metadata.remove(&state.source_id);
            self.awaiting_desync.remove(&state.source_id);
        }
        match self.slots.iter_mut().find(|s| s.source_id == state.source_id) {
            Some(slot) => Some(std::mem::replace(slot, state)),
            None => {
                self.slots.push(state);
                None
            }
        }
    }

    #[must_use]
    pub fn slots(&self) -> &[ReceiveState] {
        &self.slots
    }

    /// Occupied slots only.
    pub fn sources(&self) -> impl Iterator<Item = &ReceiveState> {
        self.slots.iter().filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn slot(&self, source_id: SourceId) -> Option<&ReceiveState> {
        self.sources().find(|s| s.source_id == source_id)
    }

    #[must_use]
    pub fn find_source(&self, broadcast_id: BroadcastId) -> Option<&ReceiveState> {
        self.sources().find(|s| s.broadcast_id == broadcast_id)
    }

    /// The sink already holds this source.
    #[must_use]
    pub fn is_duplicate(&self, metadata: &BroadcastMetadata) -> bool {
        self.sources()
            .any(|s| metadata.describes(s) || s.broadcast_id == metadata.broadcast_id)
    }

    #[must_use]
    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(ReceiveState::is_empty)
    }

    /// Slot to replace when the sink is full: the first one that is not PA
    /// synchronized, else the first occupied one.
    #[must_use]
    pub fn eviction_candidate(&self) -> Option<SourceId> {
        self.sources()
            .find(|s| !s.is_pa_synchronized())
            .or_else(|| self.sources().next())
            .map(|s| s.source_id)
    }

    #[must_use]
    pub fn is_receiving(&self) -> bool {
        self.sources().any(ReceiveState::is_receiving)
    }

    // --- ledger --------------------------------------------------------------

    /// Record an issued operation. Returns `false` for a (kind, key) that
    /// is already pending.
    pub fn record(&mut self, op: PendingOperation) -> bool {
        if self.has_pending(op.kind, op.key) {
            return false;
        }
        self.ledger.push(op);
        true
    }

    pub fn take_pending(&mut self, kind: OperationKind, key: OperationKey) -> Option<PendingOperation> {
        let index = self
            .ledger
            .iter()
            .position(|op| op.kind == kind && op.key == key)?;
        Some(self.ledger.remove(index))
    }

    #[must_use]
    pub fn has_pending(&self, kind: OperationKind, key: OperationKey) -> bool {
        self.ledger.iter().any(|op| op.kind == kind && op.key == key)
    }

    /// Any pending operation on the key, whatever its kind.
    #[must_use]
    pub fn has_pending_key(&self, key: OperationKey) -> bool {
        self.ledger.iter().any(|op| op.key == key)
    }

    #[must_use]
    pub fn pending(&self) -> &[PendingOperation] {
        &self.ledger
    }

    // --- per-source flags ----------------------------------------------------

    #[must_use]
    pub fn is_group_managed(&self, source_id: SourceId) -> bool {
        self.group_managed.contains(&source_id)
    }

    #[must_use]
    pub fn metadata(&self, source_id: SourceId) -> Option<&BroadcastMetadata> {
        self.source_metadata.get(&source_id)
    }

    /// Metadata for a slot, falling back to the identity in the slot itself.
    #[must_use]
    pub fn metadata_or_slot(&self, source_id: SourceId) -> Option<BroadcastMetadata> {
        self.metadata(source_id)
            .cloned()
            .or_else(|| self.slot(source_id).map(BroadcastMetadata::from_receive_state))
    }

    pub fn await_desync(&mut self, source_id: SourceId) {
        self.awaiting_desync.insert(source_id);
    }

    #[must_use]
    pub fn is_awaiting_desync(&self, source_id: SourceId) -> bool {
        self.awaiting_desync.contains(&source_id)
    }

    pub fn finish_desync(&mut self, source_id: SourceId) -> bool {
        self.awaiting_desync.remove(&source_id)
    }
}

// =============================================================================
// PLANS
// =============================================================================

/// How an add reaches a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPlan {
    Add,
    /// The sink is full: replace `evict`.
    Switch { evict: SourceId },
}

/// How a remove reaches a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovePlan {
    Remove,
    /// The slot is PA synchronized: ask for PA idle first with this
    /// metadata and remove once the sink reports it unsynced.
    DesyncFirst(BroadcastMetadata),
}

// =============================================================================
// COORDINATOR
// =============================================================================

#[derive(Debug)]
pub struct SinkCoordinator {
    sinks: HashMap<DeviceAddress, SinkDevice>,
    max_sinks: usize,
    awaiting_sync: Vec<DeferredAdd>,
}

impl SinkCoordinator {
    #[must_use]
    pub fn new(max_sinks: usize) -> Self {
        Self {
            sinks: HashMap::new(),
            max_sinks,
            awaiting_sync: Vec::new(),
        }
    }

    // --- registry ------------------------------------------------------------

    /// Get or start tracking a sink. `None` once the registry is full.
    pub fn track(&mut self, address: DeviceAddress) -> Option<&mut SinkDevice> {
        if !self.sinks.contains_key(&address) && self.sinks.len() >= self.max_sinks {
            warn!(sink = %address, max = self.max_sinks, "Sink registry full");
            return None;
        }
        Some(
            self.sinks
                .entry(address)
                .or_insert_with(|| SinkDevice::new(address)),
        )
    }

    pub fn forget(&mut self, address: DeviceAddress) -> Option<SinkDevice> {
        self.awaiting_sync.retain(|d| d.sink != address);
        self.sinks.remove(&address)
    }

    #[must_use]
    pub fn sink(&self, address: DeviceAddress) -> Option<&SinkDevice> {
        self.sinks.get(&address)
    }

    pub fn sink_mut(&mut self, address: DeviceAddress) -> Option<&mut SinkDevice> {
        self.sinks.get_mut(&address)
    }

    pub fn sinks(&self) -> impl Iterator<Item = &SinkDevice> {
        self.sinks.values()
    }

    pub fn connected(&self) -> impl Iterator<Item = &SinkDevice> {
        self.sinks.values().filter(|s| s.is_connected())
    }

    #[must_use]
    pub fn is_connected(&self, address: DeviceAddress) -> bool {
        self.sink(address).is_some_and(SinkDevice::is_connected)
    }

    #[must_use]
    pub fn any_receiving(&self) -> bool {
        self.connected().any(SinkDevice::is_receiving)
    }

    /// Drop all in-flight bookkeeping for a sink that went away.
    pub fn on_disconnected(&mut self, address: DeviceAddress) {
        if let Some(sink) = self.sinks.get_mut(&address) {
            sink.connection = ConnectionState::Disconnected;
            if !sink.ledger.is_empty() {
                debug!(sink = %address, dropped = sink.ledger.len(), "Clearing ledger on disconnect");
            }
            sink.ledger.clear();
            sink.awaiting_desync.clear();
        }
    }

    // --- targets -------------------------------------------------------------

    /// Targets of a request. A group operation reaches every member of a
    /// set of two or more; otherwise it degrades to the sink alone.
    #[must_use]
    pub fn resolve_targets(
        sink: DeviceAddress,
        is_group_op: bool,
        members: Vec<DeviceAddress>,
    ) -> (Vec<DeviceAddress>, bool) {
        if is_group_op && members.len() >= 2 {
            (members, true)
        } else {
            (vec![sink], false)
        }
    }

    /// Map each member to its slot holding `broadcast_id`.
    #[must_use]
    pub fn map_group_sources(
        &self,
        targets: &[DeviceAddress],
        broadcast_id: BroadcastId,
    ) -> Vec<(DeviceAddress, Option<SourceId>)> {
        targets
            .iter()
            .map(|addr| {
                let source_id = self
                    .sink(*addr)
                    .and_then(|s| s.find_source(broadcast_id))
                    .map(|s| s.source_id);
                (*addr, source_id)
            })
            .collect()
    }

    // --- add -----------------------------------------------------------------

    /// Validate an add against one sink and decide how to issue it.
    ///
    /// `transport_pending` reports whether the transport itself is still
    /// busy with an operation for the same broadcast.
    pub fn plan_add(
        &self,
        address: DeviceAddress,
        metadata: &BroadcastMetadata,
        transport_pending: bool,
    ) -> Result<AddPlan, AssistantError> {
        let sink = self
            .sink(address)
            .filter(|s| s.is_connected())
            .ok_or(AssistantError::NotConnected)?;

        let key = OperationKey::Broadcast(metadata.broadcast_id);
        if transport_pending || sink.has_pending(OperationKind::Add, key) {
            return Err(AssistantError::OperationAlreadyPending);
        }
        if sink.is_duplicate(metadata) {
            return Err(AssistantError::DuplicateSource);
        }
        if !metadata.has_valid_code_length() {
            return Err(AssistantError::BadParameters);
        }
        if sink.slots().is_empty() {
            return Err(AssistantError::NoCapacity);
        }
        if sink.has_free_slot() {
            return Ok(AddPlan::Add);
        }

        let evict = sink.eviction_candidate().ok_or(AssistantError::NoCapacity)?;
        if sink.has_pending_key(OperationKey::Source(evict)) {
            return Err(AssistantError::OperationAlreadyPending);
        }
        Ok(AddPlan::Switch { evict })
    }

    /// Record an issued add (and, for a switch, the implied remove).
    pub fn record_add(
        &mut self,
        address: DeviceAddress,
        metadata: &BroadcastMetadata,
        group_op: bool,
        plan: AddPlan,
    ) {
        let Some(sink) = self.sinks.get_mut(&address) else {
            return;
        };
        let mut op = PendingOperation::new(
            OperationKind::Add,
            OperationKey::Broadcast(metadata.broadcast_id),
        )
        .group(group_op)
        .with_metadata(metadata.clone());
        if let AddPlan::Switch { evict } = plan {
            op = op.replacing(evict);
            sink.record(PendingOperation::new(
                OperationKind::Remove,
                OperationKey::Source(evict),
            ));
        }
        sink.record(op);
        sink.last_metadata = Some(metadata.clone());
    }

    // --- modify / remove -----------------------------------------------------

    fn validate_source(
        &self,
        address: DeviceAddress,
        source_id: SourceId,
    ) -> Result<&SinkDevice, AssistantError> {
        let sink = self
            .sink(address)
            .filter(|s| s.is_connected())
            .ok_or(AssistantError::NotConnected)?;
        if sink.slot(source_id).is_none() {
            return Err(AssistantError::InvalidSourceId);
        }
        if sink.has_pending_key(OperationKey::Source(source_id))
            || sink.is_awaiting_desync(source_id)
        {
            return Err(AssistantError::OperationAlreadyPending);
        }
        Ok(sink)
    }

    pub fn validate_modify(
        &self,
        address: DeviceAddress,
        source_id: SourceId,
        metadata: &BroadcastMetadata,
    ) -> Result<(), AssistantError> {
        self.validate_source(address, source_id)?;
        if !metadata.has_valid_code_length() {
            return Err(AssistantError::BadParameters);
        }
        Ok(())
    }

    pub fn validate_remove(
        &self,
        address: DeviceAddress,
        source_id: SourceId,
    ) -> Result<RemovePlan, AssistantError> {
        let sink = self.validate_source(address, source_id)?;
        match sink.slot(source_id) {
            Some(slot) if slot.is_pa_synchronized() => Ok(RemovePlan::DesyncFirst(
                sink.metadata_or_slot(source_id)
                    .unwrap_or_else(|| BroadcastMetadata::from_receive_state(slot)),
            )),
            _ => Ok(RemovePlan::Remove),
        }
    }

    pub fn record_source_op(
        &mut self,
        address: DeviceAddress,
        kind: OperationKind,
        source_id: SourceId,
        metadata: Option<&BroadcastMetadata>,
        group_op: bool,
    ) -> bool {
        let Some(sink) = self.sinks.get_mut(&address) else {
            return false;
        };
        let mut op = PendingOperation::new(kind, OperationKey::Source(source_id)).group(group_op);
        if let Some(metadata) = metadata {
            op = op.with_metadata(metadata.clone());
            sink.last_metadata = Some(metadata.clone());
        }
        sink.record(op)
    }

    // --- completion ----------------------------------------------------------

    /// Reconcile a completion with the ledger.
    ///
    /// `source_id` is the slot the sink used for an add. A successful add
    /// stores the metadata for that slot and, for a group add, marks it
    /// group-managed. A finished switch also retires the implied remove.
    pub fn complete(
        &mut self,
        address: DeviceAddress,
        kind: OperationKind,
        key: OperationKey,
        success: bool,
        source_id: Option<SourceId>,
    ) -> Option<PendingOperation> {
        let sink = self.sinks.get_mut(&address)?;
        let op = sink.take_pending(kind, key)?;

        if kind == OperationKind::Add {
            if let Some(replaced) = op.replaces {
                sink.take_pending(OperationKind::Remove, OperationKey::Source(replaced));
            }
            if let (true, Some(sid)) = (success, source_id) {
                if op.group_op {
                    sink.group_managed.insert(sid);
                }
                if let Some(metadata) = &op.metadata {
                    sink.source_metadata.insert(sid, metadata.clone());
                }
            }
        }
        if kind == OperationKind::Modify && success {
            if let (OperationKey::Source(sid), Some(metadata)) = (key, &op.metadata) {
                sink.source_metadata.insert(sid, metadata.clone());
            }
        }
        Some(op)
    }

    // --- adds waiting for sync -----------------------------------------------

    pub fn defer_until_synced(&mut self, add: DeferredAdd) {
        let duplicate = self.awaiting_sync.iter().any(|d| {
            d.sink == add.sink && d.metadata.broadcast_id == add.metadata.broadcast_id
        });
        if !duplicate {
            self.awaiting_sync.push(add);
        }
    }

    /// Remove and return the adds waiting on a broadcast.
    pub fn take_awaiting_sync(&mut self, broadcast_id: BroadcastId) -> Vec<DeferredAdd> {
        let (ready, waiting) = std::mem::take(&mut self.awaiting_sync)
            .into_iter()
            .partition(|d| d.metadata.broadcast_id == broadcast_id);
        self.awaiting_sync = waiting;
        ready
    }

    #[must_use]
    pub fn is_awaiting_sync(&self, broadcast_id: BroadcastId) -> bool {
        self.awaiting_sync
            .iter()
            .any(|d| d.metadata.broadcast_id == broadcast_id)
    }

    /// Broadcasts that deferred adds wait on.
    #[must_use]
    pub fn awaited_broadcasts(&self) -> HashSet<BroadcastId> {
        self.awaiting_sync
            .iter()
            .map(|d| d.metadata.broadcast_id)
            .collect()
    }

    #[must_use]
    pub fn awaiting_sync_len(&self) -> usize {
        self.awaiting_sync.len()
    }

    pub fn clear_awaiting_sync(&mut self) -> Vec<DeferredAdd> {
        std::mem::take(&mut self.awaiting_sync)
    }

    // --- aggregate queries ---------------------------------------------------

    #[must_use]
    pub fn any_pending_adds(&self) -> bool {
        !self.awaiting_sync.is_empty()
            || self
                .sinks
                .values()
                .flat_map(|s| s.ledger.iter())
                .any(|op| op.kind == OperationKind::Add)
    }

    #[must_use]
    pub fn any_switch_in_flight(&self) -> bool {
        self.sinks
            .values()
            .flat_map(|s| s.ledger.iter())
            .any(|op| op.kind == OperationKind::Add && op.replaces.is_some())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn clear(&mut self) {
        self.sinks.clear();
        self.awaiting_sync.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use le_audio_types::{AddressType, PaSyncState};

    fn addr(n: u8) -> DeviceAddress {
        DeviceAddress::new([0xE0, 0, 0, 0, 0, n])
    }

    fn metadata(bid: u32) -> BroadcastMetadata {
        BroadcastMetadata::new(
            DeviceAddress::new([0xAA, 0, 0, 0, 0, bid as u8]),
            AddressType::Random,
            1,
            BroadcastId::new(bid).unwrap(),
        )
    }

    fn occupied(source_id: SourceId, bid: u32, pa: PaSyncState) -> ReceiveState {
        let m = metadata(bid);
        ReceiveState {
            source_device: m.source_device,
            source_address_type: m.source_address_type,
            source_adv_sid: m.source_adv_sid,
            broadcast_id: m.broadcast_id,
            pa_sync_state: pa,
            ..ReceiveState::empty(source_id)
        }
    }

    fn connected(coordinator: &mut SinkCoordinator, n: u8, slots: Vec<ReceiveState>) {
        let sink = coordinator.track(addr(n)).unwrap();
        sink.connection = ConnectionState::Connected;
        sink.seed_slots(slots);
    }

    #[test]
    fn test_plan_add_checks_in_order() {
        let mut coordinator = SinkCoordinator::new(10);
        assert_eq!(
            coordinator.plan_add(addr(1), &metadata(1), false),
            Err(AssistantError::NotConnected)
        );

        connected(&mut coordinator, 1, vec![occupied(0, 1, PaSyncState::Idle), ReceiveState::empty(1)]);
        assert_eq!(
            coordinator.plan_add(addr(1), &metadata(2), true),
            Err(AssistantError::OperationAlreadyPending)
        );
        assert_eq!(
            coordinator.plan_add(addr(1), &metadata(1), false),
            Err(AssistantError::DuplicateSource)
        );
        assert_eq!(
            coordinator.plan_add(addr(1), &metadata(2).with_broadcast_code(vec![1, 2]), false),
            Err(AssistantError::BadParameters)
        );
        assert_eq!(coordinator.plan_add(addr(1), &metadata(2), false), Ok(AddPlan::Add));
    }

    #[test]
    fn test_full_sink_switches_unsynced_slot() {
        let mut coordinator = SinkCoordinator::new(10);
        connected(
            &mut coordinator,
            1,
            vec![
                occupied(0, 1, PaSyncState::Synchronized),
                occupied(1, 2, PaSyncState::Idle),
            ],
        );
        assert_eq!(
            coordinator.plan_add(addr(1), &metadata(3), false),
            Ok(AddPlan::Switch { evict: 1 })
        );
    }

    #[test]
    fn test_full_sink_all_synced_switches_first() {
        let mut coordinator = SinkCoordinator::new(10);
        connected(
            &mut coordinator,
            1,
            vec![
                occupied(4, 1, PaSyncState::Synchronized),
                occupied(5, 2, PaSyncState::Synchronized),
            ],
        );
        assert_eq!(
            coordinator.plan_add(addr(1), &metadata(3), false),
            Ok(AddPlan::Switch { evict: 4 })
        );
    }

    #[test]
    fn test_sink_without_slots_has_no_capacity() {
        let mut coordinator = SinkCoordinator::new(10);
        connected(&mut coordinator, 1, Vec::new());
        assert_eq!(
            coordinator.plan_add(addr(1), &metadata(3), false),
            Err(AssistantError::NoCapacity)
        );
    }

    #[test]
    fn test_ledger_rejects_duplicate_key() {
        let mut coordinator = SinkCoordinator::new(10);
        connected(&mut coordinator, 1, vec![ReceiveState::empty(0)]);
        coordinator.record_add(addr(1), &metadata(3), false, AddPlan::Add);
        assert_eq!(
            coordinator.plan_add(addr(1), &metadata(3), false),
            Err(AssistantError::OperationAlreadyPending)
        );
        let sink = coordinator.sink_mut(addr(1)).unwrap();
        assert!(!sink.record(PendingOperation::new(
            OperationKind::Add,
            OperationKey::Broadcast(metadata(3).broadcast_id)
        )));
        assert_eq!(sink.pending().len(), 1);
    }

    #[test]
    fn test_group_add_completion_marks_group_managed() {
        let mut coordinator = SinkCoordinator::new(10);
        connected(&mut coordinator, 1, vec![ReceiveState::empty(0)]);
        coordinator.record_add(addr(1), &metadata(3), true, AddPlan::Add);

        let key = OperationKey::Broadcast(metadata(3).broadcast_id);
        let op = coordinator
            .complete(addr(1), OperationKind::Add, key, true, Some(0))
            .unwrap();
        assert!(op.group_op);

        let sink = coordinator.sink(addr(1)).unwrap();
        assert!(sink.is_group_managed(0));
        assert_eq!(sink.metadata(0), Some(&metadata(3)));
        assert!(sink.pending().is_empty());
    }

    #[test]
    fn test_switch_completion_retires_implied_remove() {
        let mut coordinator = SinkCoordinator::new(10);
        connected(&mut coordinator, 1, vec![occupied(0, 1, PaSyncState::Idle)]);
        coordinator.record_add(addr(1), &metadata(3), false, AddPlan::Switch { evict: 0 });
        assert!(coordinator.any_switch_in_flight());
        assert_eq!(coordinator.sink(addr(1)).unwrap().pending().len(), 2);

        let key = OperationKey::Broadcast(metadata(3).broadcast_id);
        coordinator.complete(addr(1), OperationKind::Add, key, false, None);
        assert!(coordinator.sink(addr(1)).unwrap().pending().is_empty());
        assert!(!coordinator.any_switch_in_flight());
    }

    #[test]
    fn test_remove_validation() {
        let mut coordinator = SinkCoordinator::new(10);
        connected(
            &mut coordinator,
            1,
            vec![
                occupied(0, 1, PaSyncState::Synchronized),
                occupied(1, 2, PaSyncState::Idle),
            ],
        );
        assert_eq!(
            coordinator.validate_remove(addr(1), 7),
            Err(AssistantError::InvalidSourceId)
        );
        assert_eq!(coordinator.validate_remove(addr(1), 1), Ok(RemovePlan::Remove));
        assert!(matches!(
            coordinator.validate_remove(addr(1), 0),
            Ok(RemovePlan::DesyncFirst(m)) if m.broadcast_id == metadata(1).broadcast_id
        ));

        coordinator.record_source_op(addr(1), OperationKind::Modify, 1, None, false);
        assert_eq!(
            coordinator.validate_remove(addr(1), 1),
            Err(AssistantError::OperationAlreadyPending)
        );
    }

    #[test]
    fn test_group_mapping_reports_missing_members() {
        let mut coordinator = SinkCoordinator::new(10);
        connected(&mut coordinator, 1, vec![occupied(2, 9, PaSyncState::Idle)]);
        connected(&mut coordinator, 2, vec![ReceiveState::empty(0)]);

        let mapping = coordinator.map_group_sources(&[addr(1), addr(2)], metadata(9).broadcast_id);
        assert_eq!(mapping, vec![(addr(1), Some(2)), (addr(2), None)]);
    }

    #[test]
    fn test_resolve_targets_degrades_single_member_set() {
        let (targets, group) = SinkCoordinator::resolve_targets(addr(1), true, vec![addr(1)]);
        assert_eq!(targets, vec![addr(1)]);
        assert!(!group);

        let (targets, group) =
            SinkCoordinator::resolve_targets(addr(1), true, vec![addr(1), addr(2)]);
        assert_eq!(targets.len(), 2);
        assert!(group);
    }

    #[test]
    fn test_registry_is_bounded() {
        let mut coordinator = SinkCoordinator::new(2);
        assert!(coordinator.track(addr(1)).is_some());
        assert!(coordinator.track(addr(2)).is_some());
        assert!(coordinator.track(addr(3)).is_none());
        assert!(coordinator.track(addr(1)).is_some());
    }

    #[test]
    fn test_disconnect_clears_ledger() {
        let mut coordinator = SinkCoordinator::new(10);
        connected(&mut coordinator, 1, vec![ReceiveState::empty(0)]);
        coordinator.record_add(addr(1), &metadata(3), false, AddPlan::Add);
        coordinator.on_disconnected(addr(1));
        assert!(!coordinator.any_pending_adds());
        assert!(!coordinator.is_connected(addr(1)));
    }

    #[test]
    fn test_deferred_adds_partition_by_broadcast() {
        let mut coordinator = SinkCoordinator::new(10);
        for (sink, bid) in [(1, 3), (2, 3), (1, 4)] {
            coordinator.defer_until_synced(DeferredAdd {
                sink: addr(sink),
                metadata: metadata(bid),
                group_op: false,
            });
        }
        assert_eq!(coordinator.take_awaiting_sync(metadata(3).broadcast_id).len(), 2);
        assert!(coordinator.is_awaiting_sync(metadata(4).broadcast_id));
        assert!(!coordinator.is_awaiting_sync(metadata(3).broadcast_id));
    }
}
