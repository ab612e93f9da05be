//! # Assistant Service
//!
//! Orchestrates the domain components in response to every inbound port.
//!
//! ## Architecture
//!
//! The service implements all inbound ports:
//! - [`BroadcastAssistantApi`]: application requests
//! - [`ScanEventHandler`]: discovery and periodic-sync lifecycle
//! - [`SinkEventHandler`]: per-sink connection, receive state and completions
//! - [`LocalAudioEventHandler`]: the local unicast/broadcast workload
//! - [`TimerEventHandler`]: timer expiries
//!
//! It depends on five outbound ports (implemented by adapters in the
//! runtime):
//! - [`SinkTransport`]: per-sink source operations
//! - [`PeriodicSyncScanner`]: extended scan and PA sync registration
//! - [`GroupDirectory`]: coordinated-set membership
//! - [`LocalAudioGateway`]: local audio routing
//! - [`TimerScheduler`]: one-shot timers
//!
//! ## Threading
//!
//! The service is not shared: one event loop owns it and applies inputs one
//! at a time. Application callbacks accumulate in an outbox drained with
//! [`AssistantService::take_events`].

use assistant_bus::AssistantEvent;
use le_audio_types::{
    AdvertisingSid, AssistantError, AudioContexts, BroadcastId, BroadcastMetadata,
    ConnectionState, DeviceAddress, Reason, ReceiveState, SourceId, SyncHandle,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AssistantConfig;
use crate::domain::{
    check_all_invariants, parse_base, AddPlan, Announcement, BisDiscovery, BroadcastCatalog,
    BroadcastState, DeferredAdd, Dispatch, GateTransition, HandoverGate, InvariantViolation,
    LocalStreamStatus, OperationKey, OperationKind, PaResultUpdate, PaSyncRequest, PendingClaim,
    Reception, RemovePlan, ScanFilter, ScanResult, SinkCoordinator, SinkDevice,
    SyncAdmissionQueue, SyncClaim, TimerId, TimerKind, BROADCAST_AUDIO_ANNOUNCEMENT_UUID,
    UNKNOWN_RSSI,
};
use crate::ports::inbound::{
    BroadcastAssistantApi, LocalAudioEventHandler, ScanEventHandler, SinkEventHandler,
    TimerEventHandler,
};
use crate::ports::outbound::{
    GroupDirectory, LocalAudioGateway, PeriodicSyncScanner, SinkTransport, TimerScheduler,
};

/// Point-in-time view of the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssistantStats {
    pub searching: bool,
    pub assistant_active: bool,
    pub active_syncs: usize,
    pub queued_requests: usize,
    pub claim: SyncClaim,
    pub known_sinks: usize,
    pub connected_sinks: usize,
    pub paused_sinks: usize,
    /// Adds held by the handover gate.
    pub gated_adds: usize,
    /// Adds waiting for their source to sync.
    pub adds_awaiting_sync: usize,
    pub syncs_established: u64,
    pub syncs_lost: u64,
    pub sync_failures: u64,
}

/// Broadcast assistant engine.
///
/// ## Dependencies
///
/// - `T: SinkTransport` - per-sink source operations
/// - `S: PeriodicSyncScanner` - discovery scan and sync registration
/// - `G: GroupDirectory` - coordinated sets
/// - `L: LocalAudioGateway` - local audio routing
/// - `C: TimerScheduler` - timers
pub struct AssistantService<T, S, G, L, C>
where
    T: SinkTransport,
    S: PeriodicSyncScanner,
    G: GroupDirectory,
    L: LocalAudioGateway,
    C: TimerScheduler,
{
    config: AssistantConfig,
    catalog: BroadcastCatalog,
    queue: SyncAdmissionQueue,
    coordinator: SinkCoordinator,
    gate: HandoverGate,
    searching: bool,
    assistant_active: bool,
    contexts_narrowed: bool,
    /// Sinks receiving each broadcast originated by this device.
    local_receivers: HashMap<BroadcastId, HashSet<DeviceAddress>>,
    /// Dial-out timer per local broadcast, with the receiver awaited.
    dial_out: HashMap<BroadcastId, (TimerId, DeviceAddress)>,
    idle_timer: Option<TimerId>,
    timer_generation: u64,
    /// Removals issued by the stack whose failure is not reported.
    silent_removals: HashSet<(DeviceAddress, SourceId)>,
    /// Paused sources replayed while their teardown was still in flight.
    resume_after_teardown: HashMap<(DeviceAddress, SourceId), BroadcastMetadata>,
    /// Unbonded while connected.
    forget_on_disconnect: HashSet<DeviceAddress>,
    syncs_established: u64,
    syncs_lost: u64,
    sync_failures: u64,
    outbox: Vec<AssistantEvent>,
    transport: Arc<T>,
    scanner: Arc<S>,
    groups: Arc<G>,
    local_audio: Arc<L>,
    timers: Arc<C>,
}

impl<T, S, G, L, C> AssistantService<T, S, G, L, C>
where
    T: SinkTransport,
    S: PeriodicSyncScanner,
    G: GroupDirectory,
    L: LocalAudioGateway,
    C: TimerScheduler,
{
    pub fn new(
        config: AssistantConfig,
        transport: Arc<T>,
        scanner: Arc<S>,
        groups: Arc<G>,
        local_audio: Arc<L>,
        timers: Arc<C>,
    ) -> Self {
        Self {
            catalog: BroadcastCatalog::new(),
            queue: SyncAdmissionQueue::new(
                config.sync.max_active_synced_sources,
                config.sync.max_bis_discovery_tries,
            ),
            coordinator: SinkCoordinator::new(config.sinks.max_sink_devices),
            gate: HandoverGate::new(config.handover.gate_adds_on_local_stream),
            searching: false,
            assistant_active: false,
            contexts_narrowed: false,
            local_receivers: HashMap::new(),
            dial_out: HashMap::new(),
            idle_timer: None,
            timer_generation: 0,
            silent_removals: HashSet::new(),
            resume_after_teardown: HashMap::new(),
            forget_on_disconnect: HashSet::new(),
            syncs_established: 0,
            syncs_lost: 0,
            sync_failures: 0,
            outbox: Vec::new(),
            config,
            transport,
            scanner,
            groups,
            local_audio,
            timers,
        }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Drain the callbacks produced since the last call.
    pub fn take_events(&mut self) -> Vec<AssistantEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn is_assistant_active(&self) -> bool {
        self.assistant_active
    }

    pub fn sink(&self, address: DeviceAddress) -> Option<&SinkDevice> {
        self.coordinator.sink(address)
    }

    pub fn stats(&self) -> AssistantStats {
        AssistantStats {
            searching: self.searching,
            assistant_active: self.assistant_active,
            active_syncs: self.queue.active_len(),
            queued_requests: self.queue.queued_len(),
            claim: self.queue.claim().clone(),
            known_sinks: self.coordinator.len(),
            connected_sinks: self.coordinator.connected().count(),
            paused_sinks: self.gate.paused_len(),
            gated_adds: self.gate.pending_adds_len(),
            adds_awaiting_sync: self.coordinator.awaiting_sync_len(),
            syncs_established: self.syncs_established,
            syncs_lost: self.syncs_lost,
            sync_failures: self.sync_failures,
        }
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        check_all_invariants(&self.catalog, &self.queue, &self.coordinator)
    }

    /// Cancel one live sync, or every sync and any pending registration.
    /// Unknown handles are ignored.
    pub fn cancel_active_sync(&mut self, handle: Option<SyncHandle>) {
        match handle {
            Some(handle) => {
                let active = self.queue.remove_active(handle);
                if active.is_none() && self.catalog.binding(handle).is_none() {
                    debug!(handle = %handle, "Cancel for unknown sync ignored");
                    return;
                }
                info!(handle = %handle, "Cancelling periodic sync");
                self.retire_handle(handle);
            }
            None => {
                if self.queue.claim().is_claiming() {
                    if let Err(e) = self.scanner.cancel_registration() {
                        warn!(error = %e, "Failed to cancel sync registration");
                    }
                }
                for sync in self.queue.cancel_all() {
                    self.retire_handle(sync.handle);
                }
            }
        }
        self.dispatch();
    }

    /// Stop everything: timers, syncs, search, queues and the active flag.
    pub fn shutdown(&mut self) {
        info!("Assistant shutting down");
        self.cancel_idle_timer();
        for (_, (id, _)) in self.dial_out.drain() {
            self.timers.cancel(id);
        }
        if self.searching {
            if let Err(e) = self.scanner.stop_scan() {
                warn!(error = %e, "Failed to stop scan on shutdown");
            }
            self.searching = false;
        }
        self.queue.clear_queue();
        self.coordinator.clear_awaiting_sync();
        self.cancel_active_sync(None);
        self.catalog.clear();
        self.gate.clear();
        self.local_receivers.clear();
        self.silent_removals.clear();
        self.resume_after_teardown.clear();
        if self.contexts_narrowed {
            self.contexts_narrowed = false;
            self.local_audio
                .set_active_group_allowed_contexts(AudioContexts::ALL);
        }
        if self.assistant_active {
            self.set_assistant_active(false);
        }
    }

    // =========================================================================
    // SYNC ADMISSION
    // =========================================================================

    /// Issue registrations until one is in flight or the queue is empty.
    fn dispatch(&mut self) {
        while let Some(Dispatch { request, evict }) = self.queue.begin_dispatch() {
            if let Some(evicted) = evict {
                info!(
                    handle = %evicted.handle,
                    broadcast_id = %evicted.broadcast_id,
                    "Evicting oldest sync at capacity"
                );
                self.retire_handle(evicted.handle);
            }

            match self
                .scanner
                .register_sync(&request.scan, self.config.sync.sync_timeout())
            {
                Ok(()) => {
                    debug!(
                        device = %request.scan.device,
                        broadcast_id = %request.broadcast_id,
                        priority = request.has_priority,
                        "Sync registration issued"
                    );
                    return;
                }
                Err(e) => {
                    warn!(
                        device = %request.scan.device,
                        broadcast_id = %request.broadcast_id,
                        error = %e,
                        "Sync registration failed"
                    );
                    if let Some(pending) = self.queue.release_claim() {
                        self.on_claim_failed(&pending);
                    }
                }
            }
        }
        self.reap_deferred_adds();
    }

    fn on_claim_failed(&mut self, pending: &PendingClaim) {
        self.sync_failures += 1;
        self.catalog
            .remove_pa_result(pending.device, pending.broadcast_id);
        self.catalog.remove_candidate(pending.broadcast_id);
    }

    /// Fail adds whose source can no longer sync: nothing is queued and
    /// nothing is in flight.
    fn reap_deferred_adds(&mut self) {
        if self.queue.claim().is_claiming() || !self.queue.is_empty() {
            return;
        }
        let mut reaped = false;
        for broadcast_id in self.coordinator.awaited_broadcasts() {
            if self.queue.is_active(broadcast_id) {
                continue;
            }
            for add in self.coordinator.take_awaiting_sync(broadcast_id) {
                warn!(
                    sink = %add.sink,
                    broadcast_id = %broadcast_id,
                    "Source did not sync, failing deferred add"
                );
                self.outbox.push(AssistantEvent::SourceAddFailed {
                    sink: add.sink,
                    metadata: add.metadata,
                    error: AssistantError::NoBackingService,
                });
                reaped = true;
            }
        }
        if reaped {
            self.update_assistant_state();
        }
    }

    fn retire_handle(&mut self, handle: SyncHandle) {
        self.catalog.release_handle(handle);
        if let Err(e) = self.scanner.unregister_sync(handle) {
            warn!(handle = %handle, error = %e, "Failed to unregister sync");
        }
    }

    fn notify_source_found(&mut self, handle: SyncHandle) {
        if !self.searching {
            return;
        }
        let Some(record) = self.catalog.pa_result_for_handle(handle) else {
            return;
        };
        if record.notified || self.catalog.base(handle).is_none() {
            return;
        }
        let (device, broadcast_id) = (record.device, record.broadcast_id);
        let Some(metadata) = self.catalog.metadata_for_handle(handle) else {
            return;
        };
        if self.catalog.mark_notified(device, broadcast_id) {
            info!(broadcast_id = %broadcast_id, handle = %handle, "Source found");
            self.outbox.push(AssistantEvent::SourceFound { metadata });
        }
    }

    // =========================================================================
    // TIMERS
    // =========================================================================

    fn next_timer_id(&mut self, kind: TimerKind) -> TimerId {
        self.timer_generation += 1;
        TimerId {
            kind,
            generation: self.timer_generation,
        }
    }

    fn arm_idle_timer(&mut self) {
        self.cancel_idle_timer();
        let id = self.next_timer_id(TimerKind::SyncIdleTeardown);
        self.timers
            .schedule(id, self.config.sync.idle_sync_timeout());
        self.idle_timer = Some(id);
    }

    fn cancel_idle_timer(&mut self) {
        if let Some(id) = self.idle_timer.take() {
            self.timers.cancel(id);
        }
    }

    // =========================================================================
    // SOURCE OPERATIONS
    // =========================================================================

    fn add_source_request(
        &mut self,
        sink: DeviceAddress,
        metadata: BroadcastMetadata,
        is_group_op: bool,
    ) {
        let broadcast_id = metadata.broadcast_id;
        if !broadcast_id.is_valid() {
            warn!(sink = %sink, "Add rejected: invalid broadcast id");
            self.outbox.push(AssistantEvent::SourceAddFailed {
                sink,
                metadata,
                error: AssistantError::BadParameters,
            });
            return;
        }

        if !self.local_audio.is_local_broadcast(&metadata) {
            if !self.gate.is_status_known() && !self.assistant_active {
                self.set_assistant_active(true);
            }
            if !self.gate.is_add_allowed() {
                debug!(sink = %sink, broadcast_id = %broadcast_id, "Add held until local stream suspends");
                self.gate.queue_add(DeferredAdd {
                    sink,
                    metadata,
                    group_op: is_group_op,
                });
                return;
            }
            if !self.queue.is_active(broadcast_id) {
                debug!(sink = %sink, broadcast_id = %broadcast_id, "Source not synced, deferring add");
                let scan = self
                    .catalog
                    .candidate(broadcast_id)
                    .cloned()
                    .unwrap_or_else(|| scan_from_metadata(&metadata));
                self.coordinator.defer_until_synced(DeferredAdd {
                    sink,
                    metadata,
                    group_op: is_group_op,
                });
                self.queue.enqueue(scan, broadcast_id, true);
                self.dispatch();
                return;
            }
        }

        let metadata = match self
            .catalog
            .handle_for_broadcast(broadcast_id)
            .and_then(|h| self.catalog.base(h))
        {
            Some(base) if metadata.subgroups.is_empty() => metadata.with_base(base),
            _ => metadata,
        };

        let members = if is_group_op {
            self.groups.ordered_group_members(sink)
        } else {
            vec![sink]
        };
        let (targets, group_op) = SinkCoordinator::resolve_targets(sink, is_group_op, members);
        for target in targets {
            self.issue_add(target, &metadata, group_op);
        }
        self.update_assistant_state();
    }

    fn issue_add(&mut self, target: DeviceAddress, metadata: &BroadcastMetadata, group_op: bool) {
        let transport_pending = self
            .transport
            .has_pending_source_operation(target, Some(metadata.broadcast_id));
        let plan = match self.coordinator.plan_add(target, metadata, transport_pending) {
            Ok(plan) => plan,
            Err(error) => {
                warn!(sink = %target, broadcast_id = %metadata.broadcast_id, error = %error, "Add rejected");
                self.outbox.push(AssistantEvent::SourceAddFailed {
                    sink: target,
                    metadata: metadata.clone(),
                    error,
                });
                return;
            }
        };

        let sent = match plan {
            AddPlan::Add => self.transport.send_add_source(target, metadata),
            AddPlan::Switch { evict } => {
                info!(sink = %target, evict, "Sink full, switching source");
                self.transport.send_switch_source(target, evict, metadata)
            }
        };
        match sent {
            Ok(()) => self.coordinator.record_add(target, metadata, group_op, plan),
            Err(e) => {
                warn!(sink = %target, error = %e, "Add could not be sent");
                self.outbox.push(AssistantEvent::SourceAddFailed {
                    sink: target,
                    metadata: metadata.clone(),
                    error: AssistantError::NoBackingService,
                });
            }
        }
    }

    /// Targets of a modify or remove: every member holding the same
    /// broadcast when the source is group managed, else the sink alone.
    fn source_targets(
        &self,
        sink: DeviceAddress,
        source_id: SourceId,
    ) -> Vec<(DeviceAddress, Option<SourceId>)> {
        let single = vec![(sink, Some(source_id))];
        let Some(device) = self.coordinator.sink(sink) else {
            return single;
        };
        let Some(slot) = device.slot(source_id) else {
            return single;
        };
        if !device.is_group_managed(source_id) {
            return single;
        }
        let members = self.groups.ordered_group_members(sink);
        let (targets, _) = SinkCoordinator::resolve_targets(sink, true, members);
        self.coordinator.map_group_sources(&targets, slot.broadcast_id)
    }

    fn remove_one(
        &mut self,
        target: DeviceAddress,
        source_id: SourceId,
        group_op: bool,
        silent: bool,
    ) -> Result<(), AssistantError> {
        match self.coordinator.validate_remove(target, source_id)? {
            RemovePlan::Remove => {
                self.transport
                    .send_remove_source(target, source_id)
                    .map_err(|e| {
                        warn!(sink = %target, source_id, error = %e, "Remove could not be sent");
                        AssistantError::NoBackingService
                    })?;
                self.coordinator.record_source_op(
                    target,
                    OperationKind::Remove,
                    source_id,
                    None,
                    group_op,
                );
            }
            RemovePlan::DesyncFirst(metadata) => {
                debug!(sink = %target, source_id, "Requesting PA desync before removal");
                self.transport
                    .send_modify_source(target, source_id, &metadata, PaSyncRequest::Idle)
                    .map_err(|e| {
                        warn!(sink = %target, source_id, error = %e, "Desync could not be sent");
                        AssistantError::NoBackingService
                    })?;
                self.coordinator.record_source_op(
                    target,
                    OperationKind::Modify,
                    source_id,
                    Some(&metadata),
                    group_op,
                );
                if let Some(device) = self.coordinator.sink_mut(target) {
                    device.await_desync(source_id);
                }
            }
        }
        if silent {
            self.silent_removals.insert((target, source_id));
        }
        Ok(())
    }

    /// Remove on behalf of the stack; failures are not reported.
    fn pause_source(&mut self, sink: DeviceAddress, source_id: SourceId) {
        if let Err(error) = self.remove_one(sink, source_id, false, true) {
            debug!(sink = %sink, source_id, error = %error, "Pause removal rejected");
        }
    }

    /// Second half of a desync-first removal, once PA is no longer synced
    /// and the desync modify has completed.
    fn continue_removal(&mut self, sink: DeviceAddress, source_id: SourceId) {
        let Some(device) = self.coordinator.sink(sink) else {
            return;
        };
        if !device.is_awaiting_desync(source_id)
            || device.has_pending(OperationKind::Modify, OperationKey::Source(source_id))
        {
            return;
        }
        let slot_present = match device.slot(source_id) {
            Some(slot) if slot.is_pa_synchronized() => return,
            Some(_) => true,
            None => false,
        };
        let group_op = device.is_group_managed(source_id);
        if let Some(device) = self.coordinator.sink_mut(sink) {
            device.finish_desync(source_id);
        }
        if !slot_present {
            self.silent_removals.remove(&(sink, source_id));
            return;
        }

        match self.transport.send_remove_source(sink, source_id) {
            Ok(()) => {
                debug!(sink = %sink, source_id, "PA desynced, removing source");
                self.coordinator.record_source_op(
                    sink,
                    OperationKind::Remove,
                    source_id,
                    None,
                    group_op,
                );
            }
            Err(e) => {
                warn!(sink = %sink, source_id, error = %e, "Remove could not be sent");
                if !self.silent_removals.remove(&(sink, source_id)) {
                    self.outbox.push(AssistantEvent::SourceRemoveFailed {
                        sink,
                        source_id,
                        error: AssistantError::NoBackingService,
                    });
                }
            }
        }
    }

    // =========================================================================
    // ASSISTANT STATE
    // =========================================================================

    fn receptions(&self) -> Vec<(DeviceAddress, Reception)> {
        self.coordinator
            .connected()
            .map(|sink| {
                let mut reception = Reception::default();
                for slot in sink.sources().filter(|s| s.is_receiving()) {
                    if self.local_audio.is_local_broadcast(&slot_metadata(sink, slot)) {
                        reception.local = true;
                    } else {
                        reception.external = true;
                    }
                }
                (sink.address, reception)
            })
            .collect()
    }

    fn set_assistant_active(&mut self, active: bool) {
        self.assistant_active = active;
        info!(active, "Assistant active state changed");
        self.local_audio.notify_assistant_active(active);
        if !active {
            self.gate.reset_status();
        }
    }

    /// Keep the active flag and the unicast contexts in line with what the
    /// sinks are receiving.
    fn update_assistant_state(&mut self) {
        let receiving_external = self.receptions().iter().any(|(_, r)| r.external);
        let keep_active = receiving_external
            || self.coordinator.any_pending_adds()
            || self.gate.has_paused()
            || !self.resume_after_teardown.is_empty()
            || self.gate.pending_adds_len() > 0;

        if receiving_external && !self.assistant_active {
            self.set_assistant_active(true);
        } else if self.assistant_active && !keep_active {
            self.set_assistant_active(false);
        }

        if receiving_external && !self.contexts_narrowed {
            self.contexts_narrowed = true;
            self.local_audio
                .set_active_group_allowed_contexts(self.config.contexts.narrowed_contexts);
        } else if self.contexts_narrowed
            && !self.coordinator.any_receiving()
            && !self.coordinator.any_switch_in_flight()
        {
            self.contexts_narrowed = false;
            self.local_audio
                .set_active_group_allowed_contexts(AudioContexts::ALL);
        }
    }

    // =========================================================================
    // HANDOVER
    // =========================================================================

    fn suspend_external_reception(&mut self) {
        let receptions = self.receptions();
        let flags: Vec<Reception> = receptions.iter().map(|(_, r)| *r).collect();
        if !HandoverGate::should_suspend(&flags) {
            debug!("Nothing to pause for local stream");
            return;
        }
        self.gate.clear_paused();

        let targets: Vec<(DeviceAddress, SourceId, BroadcastMetadata)> = self
            .coordinator
            .connected()
            .flat_map(|sink| {
                sink.sources()
                    .filter(|s| s.is_receiving())
                    .map(move |s| (sink.address, s.source_id, slot_metadata(sink, s)))
            })
            .collect();

        for (sink, source_id, metadata) in targets {
            info!(sink = %sink, broadcast_id = %metadata.broadcast_id, "Pausing broadcast for local stream");
            self.gate.cache_paused(sink, metadata);
            self.pause_source(sink, source_id);
        }
    }

    /// Bring paused sinks back: resync in place when the sink still holds
    /// the broadcast, re-add otherwise.
    fn replay_paused(&mut self) {
        for (sink, metadata) in self.gate.take_paused() {
            if !self.coordinator.is_connected(sink) {
                debug!(sink = %sink, "Paused sink gone, dropping");
                continue;
            }
            let held = self
                .coordinator
                .sink(sink)
                .and_then(|d| d.find_source(metadata.broadcast_id))
                .map(|s| s.source_id);
            match held {
                Some(source_id) => self.resume_held(sink, source_id, metadata),
                None => {
                    info!(sink = %sink, broadcast_id = %metadata.broadcast_id, "Re-adding paused source");
                    self.add_source_request(sink, metadata, false);
                }
            }
        }
    }

    /// Resume a source the sink still holds. A removal already sent is
    /// followed by a re-add; a desync not yet removed is called off.
    fn resume_held(&mut self, sink: DeviceAddress, source_id: SourceId, metadata: BroadcastMetadata) {
        let Some(device) = self.coordinator.sink_mut(sink) else {
            return;
        };
        if device.has_pending(OperationKind::Remove, OperationKey::Source(source_id)) {
            debug!(sink = %sink, source_id, "Removal in flight, re-adding once it lands");
            self.resume_after_teardown.insert((sink, source_id), metadata);
            return;
        }
        if device.finish_desync(source_id) {
            debug!(sink = %sink, source_id, "Calling off pending removal");
        }
        self.silent_removals.remove(&(sink, source_id));
        self.resume_in_place(sink, source_id, metadata);
    }

    /// Ask the sink to resync PA for a source it holds, once nothing else
    /// is pending on that slot.
    fn resume_in_place(&mut self, sink: DeviceAddress, source_id: SourceId, metadata: BroadcastMetadata) {
        let busy = self
            .coordinator
            .sink(sink)
            .map_or(true, |d| d.has_pending_key(OperationKey::Source(source_id)));
        if busy {
            debug!(sink = %sink, source_id, "Slot busy, resuming once it settles");
            self.resume_after_teardown.insert((sink, source_id), metadata);
            return;
        }

        info!(sink = %sink, source_id, "Resuming paused source in place");
        match self.transport.send_modify_source(
            sink,
            source_id,
            &metadata,
            PaSyncRequest::SyncPastNotAvailable,
        ) {
            Ok(()) => {
                self.coordinator.record_source_op(
                    sink,
                    OperationKind::Modify,
                    source_id,
                    Some(&metadata),
                    false,
                );
            }
            Err(e) => warn!(sink = %sink, error = %e, "Resume could not be sent"),
        }
    }

    fn receivers_of(&self, broadcast_id: BroadcastId) -> Vec<(DeviceAddress, SourceId, BroadcastMetadata)> {
        self.coordinator
            .connected()
            .filter_map(|sink| {
                sink.find_source(broadcast_id)
                    .map(|slot| (sink.address, slot.source_id, slot_metadata(sink, slot)))
            })
            .collect()
    }

    /// A receiver of `broadcast_id` other than `sink` is still connected.
    fn other_receiver_connected(&self, broadcast_id: BroadcastId, sink: DeviceAddress) -> bool {
        self.local_receivers.get(&broadcast_id).is_some_and(|receivers| {
            receivers
                .iter()
                .any(|d| *d != sink && self.coordinator.is_connected(*d))
        })
    }

    /// Sharing mode: some receiver is not one of the primary devices.
    fn is_sharing(&self, broadcast_id: BroadcastId) -> bool {
        self.local_receivers.get(&broadcast_id).is_some_and(|receivers| {
            receivers
                .iter()
                .any(|d| !self.local_audio.is_primary_device(*d))
        })
    }

    fn forget_sink(&mut self, sink: DeviceAddress) {
        info!(sink = %sink, "Forgetting sink");
        self.coordinator.forget(sink);
        self.gate.forget_paused(sink);
        self.resume_after_teardown.retain(|(s, _), _| *s != sink);
        for receivers in self.local_receivers.values_mut() {
            receivers.remove(&sink);
        }
    }
}

/// Metadata for a slot: what was requested for it, else its identity.
fn slot_metadata(sink: &SinkDevice, slot: &ReceiveState) -> BroadcastMetadata {
    sink.metadata(slot.source_id)
        .cloned()
        .unwrap_or_else(|| BroadcastMetadata::from_receive_state(slot))
}

/// Sync request for a source the scan has not reported.
fn scan_from_metadata(metadata: &BroadcastMetadata) -> ScanResult {
    ScanResult {
        device: metadata.source_device,
        address_type: metadata.source_address_type,
        adv_sid: metadata.source_adv_sid,
        rssi: UNKNOWN_RSSI,
        pa_interval: metadata.pa_sync_interval,
        advertising_data: Vec::new(),
    }
}

// =============================================================================
// INBOUND PORTS
// =============================================================================

impl<T, S, G, L, C> BroadcastAssistantApi for AssistantService<T, S, G, L, C>
where
    T: SinkTransport,
    S: PeriodicSyncScanner,
    G: GroupDirectory,
    L: LocalAudioGateway,
    C: TimerScheduler,
{
    fn start_searching(&mut self, filters: Vec<ScanFilter>) {
        if self.searching {
            warn!("Search already running");
            self.outbox.push(AssistantEvent::SearchStartFailed {
                error: AssistantError::Unknown,
            });
            return;
        }

        let mut all = vec![ScanFilter {
            service_uuid: Some(BROADCAST_AUDIO_ANNOUNCEMENT_UUID),
            ..ScanFilter::default()
        }];
        all.extend(filters);

        if let Err(e) = self.scanner.start_scan(&all) {
            warn!(error = %e, "Scan could not be started");
            self.outbox.push(AssistantEvent::SearchStartFailed {
                error: AssistantError::NoBackingService,
            });
            return;
        }

        self.searching = true;
        self.catalog.clear_candidates();
        self.catalog.clear_notified_flags();
        self.cancel_idle_timer();
        info!(filters = all.len(), "Search started");
        self.outbox.push(AssistantEvent::SearchStarted {
            reason: Reason::LocalAppRequest,
        });
    }

    fn stop_searching(&mut self) {
        if !self.searching {
            warn!("No search to stop");
            self.outbox.push(AssistantEvent::SearchStopFailed {
                error: AssistantError::Unknown,
            });
            return;
        }
        if let Err(e) = self.scanner.stop_scan() {
            warn!(error = %e, "Scan could not be stopped");
            self.outbox.push(AssistantEvent::SearchStopFailed {
                error: AssistantError::NoBackingService,
            });
            return;
        }

        self.searching = false;
        self.queue.retain_priority();
        if matches!(self.queue.claim(), SyncClaim::Claiming(p) if !p.has_priority) {
            if let Err(e) = self.scanner.cancel_registration() {
                warn!(error = %e, "Failed to cancel sync registration");
            }
            self.queue.release_claim();
        }

        let awaited = self.coordinator.awaited_broadcasts();
        let idle: Vec<SyncHandle> = self
            .queue
            .active_handles()
            .into_iter()
            .filter(|h| {
                self.queue
                    .active(*h)
                    .is_some_and(|a| !awaited.contains(&a.broadcast_id))
            })
            .collect();
        for handle in idle {
            self.queue.remove_active(handle);
            self.retire_handle(handle);
        }
        if self.queue.active_len() > 0 {
            self.arm_idle_timer();
        }

        info!("Search stopped");
        self.outbox.push(AssistantEvent::SearchStopped {
            reason: Reason::LocalAppRequest,
        });
        self.dispatch();
    }

    fn add_source(&mut self, sink: DeviceAddress, metadata: BroadcastMetadata, is_group_op: bool) {
        info!(sink = %sink, broadcast_id = %metadata.broadcast_id, group = is_group_op, "Add source requested");
        self.add_source_request(sink, metadata, is_group_op);
    }

    fn modify_source(&mut self, sink: DeviceAddress, source_id: SourceId, metadata: BroadcastMetadata) {
        let targets = self.source_targets(sink, source_id);
        let group_op = targets.len() > 1;
        for (target, target_source) in targets {
            let Some(target_source) = target_source else {
                self.outbox.push(AssistantEvent::SourceModifyFailed {
                    sink: target,
                    source_id,
                    error: AssistantError::InvalidSourceId,
                });
                continue;
            };
            if let Err(error) = self
                .coordinator
                .validate_modify(target, target_source, &metadata)
            {
                warn!(sink = %target, source_id = target_source, error = %error, "Modify rejected");
                self.outbox.push(AssistantEvent::SourceModifyFailed {
                    sink: target,
                    source_id: target_source,
                    error,
                });
                continue;
            }
            match self.transport.send_modify_source(
                target,
                target_source,
                &metadata,
                PaSyncRequest::Keep,
            ) {
                Ok(()) => {
                    self.coordinator.record_source_op(
                        target,
                        OperationKind::Modify,
                        target_source,
                        Some(&metadata),
                        group_op,
                    );
                }
                Err(e) => {
                    warn!(sink = %target, error = %e, "Modify could not be sent");
                    self.outbox.push(AssistantEvent::SourceModifyFailed {
                        sink: target,
                        source_id: target_source,
                        error: AssistantError::NoBackingService,
                    });
                }
            }
        }
    }

    fn remove_source(&mut self, sink: DeviceAddress, source_id: SourceId) {
        let targets = self.source_targets(sink, source_id);
        let group_op = targets.len() > 1;
        for (target, target_source) in targets {
            let result = match target_source {
                Some(sid) => self.remove_one(target, sid, group_op, false),
                None => Err(AssistantError::InvalidSourceId),
            };
            if let Err(error) = result {
                warn!(sink = %target, source_id, error = %error, "Remove rejected");
                self.outbox.push(AssistantEvent::SourceRemoveFailed {
                    sink: target,
                    source_id: target_source.unwrap_or(source_id),
                    error,
                });
            }
        }
    }

    fn get_all_sources(&self, sink: DeviceAddress) -> Vec<ReceiveState> {
        self.coordinator
            .sink(sink)
            .map(|d| d.sources().cloned().collect())
            .unwrap_or_default()
    }

    fn get_max_source_capacity(&self, sink: DeviceAddress) -> usize {
        self.transport.max_source_capacity(sink)
    }

    fn is_searching(&self) -> bool {
        self.searching
    }
}

impl<T, S, G, L, C> ScanEventHandler for AssistantService<T, S, G, L, C>
where
    T: SinkTransport,
    S: PeriodicSyncScanner,
    G: GroupDirectory,
    L: LocalAudioGateway,
    C: TimerScheduler,
{
    fn on_scan_result(&mut self, result: ScanResult) {
        if !self.searching {
            return;
        }
        let Some(announcement) = Announcement::parse(&result.advertising_data) else {
            return;
        };
        let broadcast_id = announcement.broadcast_id;

        self.catalog.merge_pa_result(
            &PaResultUpdate::new(result.device)
                .broadcast_id(broadcast_id)
                .address_type(result.address_type)
                .adv_sid(result.adv_sid)
                .adv_interval(result.pa_interval)
                .public_broadcast(announcement.public_broadcast)
                .broadcast_name(announcement.broadcast_name),
        );

        if !self.catalog.cache_candidate(broadcast_id, result.clone()) {
            return;
        }
        debug!(device = %result.device, broadcast_id = %broadcast_id, rssi = result.rssi, "Broadcast source discovered");
        self.queue.enqueue(result, broadcast_id, false);
        self.dispatch();
    }

    fn on_sync_established(
        &mut self,
        handle: SyncHandle,
        device: DeviceAddress,
        adv_sid: AdvertisingSid,
        success: bool,
    ) {
        if !self.queue.matches_claim(device, adv_sid) {
            if success {
                warn!(handle = %handle, device = %device, "Unexpected sync, unregistering");
                if let Err(e) = self.scanner.unregister_sync(handle) {
                    warn!(handle = %handle, error = %e, "Failed to unregister sync");
                }
            }
            return;
        }

        if success {
            let Some(pending) = self.queue.resolve_claim(handle) else {
                return;
            };
            self.syncs_established += 1;
            self.catalog.merge_pa_result(
                &PaResultUpdate::new(device)
                    .broadcast_id(pending.broadcast_id)
                    .sync_handle(handle)
                    .adv_sid(adv_sid),
            );
            self.catalog
                .bind_handle(handle, device, pending.broadcast_id);
            info!(handle = %handle, broadcast_id = %pending.broadcast_id, "Periodic sync established");

            if !self.searching {
                self.arm_idle_timer();
            }
            for add in self.coordinator.take_awaiting_sync(pending.broadcast_id) {
                self.add_source_request(add.sink, add.metadata, add.group_op);
            }
        } else if let Some(pending) = self.queue.release_claim() {
            warn!(device = %device, broadcast_id = %pending.broadcast_id, "Periodic sync failed");
            self.on_claim_failed(&pending);
        }

        self.dispatch();
    }

    fn on_sync_lost(&mut self, handle: SyncHandle) {
        let active = self.queue.remove_active(handle);
        let binding = self.catalog.release_handle(handle);
        let (device, broadcast_id) = match (&active, &binding) {
            (_, Some(b)) => (b.device, b.broadcast_id),
            (Some(a), None) => (a.device, a.broadcast_id),
            (None, None) => {
                debug!(handle = %handle, "Loss of unknown sync ignored");
                return;
            }
        };

        self.syncs_lost += 1;
        info!(handle = %handle, broadcast_id = %broadcast_id, "Periodic sync lost");

        let notified = self
            .catalog
            .pa_result(device, broadcast_id)
            .is_some_and(|r| r.notified);
        if self.config.sync.notify_source_lost && notified {
            self.outbox.push(AssistantEvent::SourceLost { broadcast_id });
        }
        self.catalog.remove_candidate(broadcast_id);
        self.dispatch();
    }

    fn on_periodic_report(&mut self, handle: SyncHandle, data: &[u8]) {
        let base = parse_base(data);
        match self.queue.record_bis_attempt(handle, base.is_some()) {
            BisDiscovery::NotActive => {
                debug!(handle = %handle, "Report for inactive sync ignored");
            }
            BisDiscovery::Complete => {
                if let Some(base) = base {
                    debug!(handle = %handle, channels = base.channel_count(), "BASE discovered");
                    self.catalog.set_base(handle, base);
                }
                self.notify_source_found(handle);
            }
            BisDiscovery::AlreadyComplete => self.notify_source_found(handle),
            BisDiscovery::Retry { left } => {
                debug!(handle = %handle, left, "No BASE in periodic report");
            }
            BisDiscovery::Exhausted => {
                warn!(handle = %handle, "BIS discovery exhausted, cancelling sync");
                self.cancel_active_sync(Some(handle));
            }
        }
    }

    fn on_big_info_report(&mut self, handle: SyncHandle, encrypted: bool) {
        if !self.catalog.set_encrypted(handle, encrypted) {
            debug!(handle = %handle, "BIG info for unknown sync ignored");
        }
    }
}

impl<T, S, G, L, C> SinkEventHandler for AssistantService<T, S, G, L, C>
where
    T: SinkTransport,
    S: PeriodicSyncScanner,
    G: GroupDirectory,
    L: LocalAudioGateway,
    C: TimerScheduler,
{
    fn on_connection_state_changed(&mut self, sink: DeviceAddress, state: ConnectionState) {
        match state {
            ConnectionState::Connected => {
                let slots = self.transport.receive_states(sink);
                let Some(device) = self.coordinator.track(sink) else {
                    return;
                };
                device.connection = state;
                device.seed_slots(slots);
                info!(sink = %sink, "Sink connected");

                let awaited: Vec<BroadcastId> = self
                    .dial_out
                    .iter()
                    .filter(|(_, (_, awaited))| *awaited == sink)
                    .map(|(id, _)| *id)
                    .collect();
                for broadcast_id in awaited {
                    if let Some((id, _)) = self.dial_out.remove(&broadcast_id) {
                        info!(sink = %sink, broadcast_id = %broadcast_id, "Awaited receiver returned");
                        self.timers.cancel(id);
                    }
                }
            }
            ConnectionState::Disconnected => {
                info!(sink = %sink, "Sink disconnected");
                self.coordinator.on_disconnected(sink);
                self.silent_removals.retain(|(s, _)| *s != sink);
                self.resume_after_teardown.retain(|(s, _), _| *s != sink);
                if self.forget_on_disconnect.remove(&sink) {
                    self.forget_sink(sink);
                }
            }
            ConnectionState::Connecting | ConnectionState::Disconnecting => {
                if let Some(device) = self.coordinator.sink_mut(sink) {
                    device.connection = state;
                }
            }
        }
        self.update_assistant_state();
    }

    fn on_bond_state_changed(&mut self, sink: DeviceAddress, bonded: bool) {
        if bonded {
            self.forget_on_disconnect.remove(&sink);
            if let Some(device) = self.coordinator.track(sink) {
                device.bonded = true;
            }
        } else if self.coordinator.is_connected(sink) {
            if let Some(device) = self.coordinator.sink_mut(sink) {
                device.bonded = false;
            }
            self.forget_on_disconnect.insert(sink);
        } else {
            self.forget_sink(sink);
        }
    }

    fn on_receive_state_changed(&mut self, sink: DeviceAddress, state: ReceiveState) {
        let Some(device) = self.coordinator.sink_mut(sink) else {
            debug!(sink = %sink, "Receive state for unknown sink ignored");
            return;
        };
        let source_id = state.source_id;
        let previous = device.update_slot(state.clone());

        if state.is_empty() {
            if let Some(previous) = previous.filter(|p| !p.is_empty()) {
                if let Some(receivers) = self.local_receivers.get_mut(&previous.broadcast_id) {
                    receivers.remove(&sink);
                }
            }
        }

        self.outbox.push(AssistantEvent::ReceiveStateChanged {
            sink,
            source_id,
            state,
        });
        self.continue_removal(sink, source_id);
        self.update_assistant_state();
    }

    fn on_source_added(&mut self, sink: DeviceAddress, state: ReceiveState, reason: Reason) {
        let source_id = state.source_id;
        let op = self.coordinator.complete(
            sink,
            OperationKind::Add,
            OperationKey::Broadcast(state.broadcast_id),
            true,
            Some(source_id),
        );
        if let Some(device) = self.coordinator.sink_mut(sink) {
            device.update_slot(state.clone());
        }

        let metadata = op
            .and_then(|o| o.metadata)
            .unwrap_or_else(|| BroadcastMetadata::from_receive_state(&state));
        if self.local_audio.is_local_broadcast(&metadata) {
            self.local_receivers
                .entry(state.broadcast_id)
                .or_default()
                .insert(sink);
        }

        info!(sink = %sink, source_id, broadcast_id = %state.broadcast_id, "Source added");
        self.outbox.push(AssistantEvent::SourceAdded {
            sink,
            source_id,
            reason,
        });
        self.update_assistant_state();
    }

    fn on_source_add_failed(
        &mut self,
        sink: DeviceAddress,
        metadata: BroadcastMetadata,
        error: AssistantError,
    ) {
        self.coordinator.complete(
            sink,
            OperationKind::Add,
            OperationKey::Broadcast(metadata.broadcast_id),
            false,
            None,
        );
        warn!(sink = %sink, broadcast_id = %metadata.broadcast_id, error = %error, "Add failed");
        self.outbox.push(AssistantEvent::SourceAddFailed {
            sink,
            metadata,
            error,
        });
        self.update_assistant_state();
    }

    fn on_source_modified(&mut self, sink: DeviceAddress, source_id: SourceId, reason: Reason) {
        self.coordinator.complete(
            sink,
            OperationKind::Modify,
            OperationKey::Source(source_id),
            true,
            None,
        );
        if let Some(metadata) = self.resume_after_teardown.remove(&(sink, source_id)) {
            self.resume_in_place(sink, source_id, metadata);
            return;
        }
        let desync = self
            .coordinator
            .sink(sink)
            .is_some_and(|d| d.is_awaiting_desync(source_id));
        if desync {
            self.continue_removal(sink, source_id);
        } else {
            self.outbox.push(AssistantEvent::SourceModified {
                sink,
                source_id,
                reason,
            });
        }
    }

    fn on_source_modify_failed(
        &mut self,
        sink: DeviceAddress,
        source_id: SourceId,
        error: AssistantError,
    ) {
        self.coordinator.complete(
            sink,
            OperationKind::Modify,
            OperationKey::Source(source_id),
            false,
            None,
        );
        if let Some(metadata) = self.resume_after_teardown.remove(&(sink, source_id)) {
            self.resume_in_place(sink, source_id, metadata);
            return;
        }
        let desync = self
            .coordinator
            .sink_mut(sink)
            .is_some_and(|d| d.finish_desync(source_id));
        if desync {
            if !self.silent_removals.remove(&(sink, source_id)) {
                self.outbox.push(AssistantEvent::SourceRemoveFailed {
                    sink,
                    source_id,
                    error,
                });
            }
        } else {
            self.outbox.push(AssistantEvent::SourceModifyFailed {
                sink,
                source_id,
                error,
            });
        }
    }

    fn on_source_removed(&mut self, sink: DeviceAddress, source_id: SourceId, reason: Reason) {
        self.coordinator.complete(
            sink,
            OperationKind::Remove,
            OperationKey::Source(source_id),
            true,
            None,
        );
        let removed = self.coordinator.sink_mut(sink).and_then(|device| {
            device.finish_desync(source_id);
            device
                .update_slot(ReceiveState::empty(source_id))
                .filter(|s| !s.is_empty())
                .map(|s| s.broadcast_id)
        });
        if let Some(broadcast_id) = removed {
            if let Some(receivers) = self.local_receivers.get_mut(&broadcast_id) {
                receivers.remove(&sink);
            }
        }
        self.silent_removals.remove(&(sink, source_id));

        info!(sink = %sink, source_id, "Source removed");
        self.outbox.push(AssistantEvent::SourceRemoved {
            sink,
            source_id,
            reason,
        });
        if let Some(metadata) = self.resume_after_teardown.remove(&(sink, source_id)) {
            info!(sink = %sink, broadcast_id = %metadata.broadcast_id, "Re-adding paused source");
            self.add_source_request(sink, metadata, false);
        }
        self.update_assistant_state();
    }

    fn on_source_remove_failed(
        &mut self,
        sink: DeviceAddress,
        source_id: SourceId,
        error: AssistantError,
    ) {
        self.coordinator.complete(
            sink,
            OperationKind::Remove,
            OperationKey::Source(source_id),
            false,
            None,
        );
        if let Some(metadata) = self.resume_after_teardown.remove(&(sink, source_id)) {
            self.silent_removals.remove(&(sink, source_id));
            self.resume_in_place(sink, source_id, metadata);
            return;
        }
        if self.silent_removals.remove(&(sink, source_id)) {
            debug!(sink = %sink, source_id, error = %error, "Stack removal failed");
            return;
        }
        warn!(sink = %sink, source_id, error = %error, "Remove failed");
        self.outbox.push(AssistantEvent::SourceRemoveFailed {
            sink,
            source_id,
            error,
        });
    }
}

impl<T, S, G, L, C> LocalAudioEventHandler for AssistantService<T, S, G, L, C>
where
    T: SinkTransport,
    S: PeriodicSyncScanner,
    G: GroupDirectory,
    L: LocalAudioGateway,
    C: TimerScheduler,
{
    fn on_unicast_stream_status(&mut self, status: LocalStreamStatus) {
        info!(?status, "Local stream status");
        match self.gate.on_status(status) {
            GateTransition::Suspend => self.suspend_external_reception(),
            GateTransition::Replay => {
                self.replay_paused();
                for add in self.gate.take_pending_adds() {
                    self.add_source_request(add.sink, add.metadata, add.group_op);
                }
            }
            GateTransition::None => {}
        }
        self.update_assistant_state();
    }

    fn handle_device_disconnection(&mut self, sink: DeviceAddress, intentional: bool) {
        let stale: Vec<BroadcastId> = self
            .local_receivers
            .keys()
            .copied()
            .filter(|id| !self.local_audio.is_playing(*id))
            .collect();
        for broadcast_id in stale {
            debug!(broadcast_id = %broadcast_id, "Dropping receivers of a broadcast that is not playing");
            self.local_receivers.remove(&broadcast_id);
        }

        let receiving: Vec<BroadcastId> = self
            .local_receivers
            .iter()
            .filter(|(_, receivers)| receivers.contains(&sink))
            .map(|(id, _)| *id)
            .collect();

        for broadcast_id in receiving {
            if intentional {
                if let Some(receivers) = self.local_receivers.get_mut(&broadcast_id) {
                    receivers.remove(&sink);
                }
                let primary_left = self.local_receivers.get(&broadcast_id).is_some_and(|r| {
                    r.iter().any(|d| {
                        self.coordinator.is_connected(*d) && self.local_audio.is_primary_device(*d)
                    })
                });
                if !primary_left {
                    info!(broadcast_id = %broadcast_id, "No primary receiver left, stopping broadcast");
                    self.local_receivers.remove(&broadcast_id);
                    self.local_audio.stop_broadcast(broadcast_id);
                }
                continue;
            }

            if self.other_receiver_connected(broadcast_id, sink) {
                debug!(sink = %sink, broadcast_id = %broadcast_id, "Another receiver is still connected");
                continue;
            }
            if !self.is_sharing(broadcast_id) {
                info!(sink = %sink, broadcast_id = %broadcast_id, "Private broadcast lost its receiver, stopping");
                self.local_receivers.remove(&broadcast_id);
                self.local_audio.stop_broadcast(broadcast_id);
                continue;
            }

            if let Some((previous, _)) = self.dial_out.remove(&broadcast_id) {
                self.timers.cancel(previous);
            }
            let id = self.next_timer_id(TimerKind::DialOut(broadcast_id));
            self.timers
                .schedule(id, self.config.handover.dial_out_timeout());
            self.dial_out.insert(broadcast_id, (id, sink));
            info!(sink = %sink, broadcast_id = %broadcast_id, "Receiver lost, waiting for it to return");
        }
    }

    fn on_broadcast_state_changed(&mut self, state: BroadcastState, broadcast_id: BroadcastId) {
        debug!(?state, broadcast_id = %broadcast_id, "Local broadcast state");
        if state == BroadcastState::Stopped {
            self.local_receivers.remove(&broadcast_id);
            if let Some((id, _)) = self.dial_out.remove(&broadcast_id) {
                self.timers.cancel(id);
            }
            self.gate.forget_broadcast(broadcast_id);
        }
    }

    fn suspend_receivers(&mut self, broadcast_id: BroadcastId) {
        self.gate.clear_paused();
        for (sink, source_id, metadata) in self.receivers_of(broadcast_id) {
            self.gate.cache_paused(sink, metadata);
            self.pause_source(sink, source_id);
        }
    }

    fn suspend_all_receivers(&mut self) {
        self.gate.clear_paused();
        let targets: Vec<(DeviceAddress, SourceId, BroadcastMetadata)> = self
            .coordinator
            .connected()
            .flat_map(|sink| {
                sink.sources()
                    .map(move |s| (sink.address, s.source_id, slot_metadata(sink, s)))
            })
            .collect();
        for (sink, source_id, metadata) in targets {
            self.gate.cache_paused(sink, metadata);
            self.pause_source(sink, source_id);
        }
    }

    fn stop_receivers(&mut self, broadcast_id: BroadcastId) {
        for (sink, source_id, _) in self.receivers_of(broadcast_id) {
            self.pause_source(sink, source_id);
        }
        self.local_receivers.remove(&broadcast_id);
        self.gate.forget_broadcast(broadcast_id);
    }

    fn resume_receivers(&mut self) {
        self.replay_paused();
        self.update_assistant_state();
    }
}

impl<T, S, G, L, C> TimerEventHandler for AssistantService<T, S, G, L, C>
where
    T: SinkTransport,
    S: PeriodicSyncScanner,
    G: GroupDirectory,
    L: LocalAudioGateway,
    C: TimerScheduler,
{
    fn on_timer_fired(&mut self, id: TimerId) {
        match id.kind {
            TimerKind::SyncIdleTeardown => {
                if self.idle_timer != Some(id) {
                    debug!(generation = id.generation, "Stale idle timer ignored");
                    return;
                }
                self.idle_timer = None;
                if self.searching {
                    return;
                }
                debug!("Idle sync teardown");
                self.queue.clear_queue();
                self.coordinator.clear_awaiting_sync();
                self.cancel_active_sync(None);
                self.catalog.clear();
            }
            TimerKind::DialOut(broadcast_id) => {
                if self.dial_out.get(&broadcast_id).map(|(t, _)| *t) != Some(id) {
                    debug!(broadcast_id = %broadcast_id, "Stale dial-out timer ignored");
                    return;
                }
                let Some((_, awaited)) = self.dial_out.remove(&broadcast_id) else {
                    return;
                };
                if self.other_receiver_connected(broadcast_id, awaited) {
                    debug!(broadcast_id = %broadcast_id, "Another receiver is listening, keeping broadcast");
                    return;
                }
                self.local_receivers.remove(&broadcast_id);
                if self.local_audio.is_playing(broadcast_id) {
                    info!(broadcast_id = %broadcast_id, "Receiver did not return, stopping broadcast");
                    self.local_audio.stop_broadcast(broadcast_id);
                }
            }
        }
    }
}
