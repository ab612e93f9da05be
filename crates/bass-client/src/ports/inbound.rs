//! # Inbound Ports
//!
//! Every input the engine reacts to. All handlers take `&mut self`: the
//! service is owned by a single serial event loop, so inputs are applied
//! one at a time and never overlap.
//!
//! Outcomes of requests are reported on the event stream rather than as
//! return values, since most of them complete asynchronously per sink.

use le_audio_types::{
    AdvertisingSid, AssistantError, BroadcastId, BroadcastMetadata, ConnectionState,
    DeviceAddress, Reason, ReceiveState, SourceId, SyncHandle,
};

use crate::domain::{BroadcastState, LocalStreamStatus, ScanFilter, ScanResult, TimerId};

/// Application-facing API.
pub trait BroadcastAssistantApi {
    /// Start discovering broadcast sources.
    fn start_searching(&mut self, filters: Vec<ScanFilter>);

    fn stop_searching(&mut self);

    /// Add a source to a sink, or to every member of its coordinated set
    /// when `is_group_op` is set.
    fn add_source(&mut self, sink: DeviceAddress, metadata: BroadcastMetadata, is_group_op: bool);

    fn modify_source(&mut self, sink: DeviceAddress, source_id: SourceId, metadata: BroadcastMetadata);

    fn remove_source(&mut self, sink: DeviceAddress, source_id: SourceId);

    /// Occupied slots of a sink.
    fn get_all_sources(&self, sink: DeviceAddress) -> Vec<ReceiveState>;

    fn get_max_source_capacity(&self, sink: DeviceAddress) -> usize;

    fn is_searching(&self) -> bool;
}

/// Callbacks from the periodic-advertising scan primitive.
pub trait ScanEventHandler {
    fn on_scan_result(&mut self, result: ScanResult);

    /// Outcome of a sync registration. `handle` is only meaningful on
    /// success.
    fn on_sync_established(
        &mut self,
        handle: SyncHandle,
        device: DeviceAddress,
        adv_sid: AdvertisingSid,
        success: bool,
    );

    fn on_sync_lost(&mut self, handle: SyncHandle);

    fn on_periodic_report(&mut self, handle: SyncHandle, data: &[u8]);

    fn on_big_info_report(&mut self, handle: SyncHandle, encrypted: bool);
}

/// Callbacks from the per-sink transport.
pub trait SinkEventHandler {
    fn on_connection_state_changed(&mut self, sink: DeviceAddress, state: ConnectionState);

    fn on_bond_state_changed(&mut self, sink: DeviceAddress, bonded: bool);

    fn on_receive_state_changed(&mut self, sink: DeviceAddress, state: ReceiveState);

    /// `state` is the slot the sink placed the source in.
    fn on_source_added(&mut self, sink: DeviceAddress, state: ReceiveState, reason: Reason);

    fn on_source_add_failed(
        &mut self,
        sink: DeviceAddress,
        metadata: BroadcastMetadata,
        error: AssistantError,
    );

    fn on_source_modified(&mut self, sink: DeviceAddress, source_id: SourceId, reason: Reason);

    fn on_source_modify_failed(
        &mut self,
        sink: DeviceAddress,
        source_id: SourceId,
        error: AssistantError,
    );

    fn on_source_removed(&mut self, sink: DeviceAddress, source_id: SourceId, reason: Reason);

    fn on_source_remove_failed(
        &mut self,
        sink: DeviceAddress,
        source_id: SourceId,
        error: AssistantError,
    );
}

/// Notifications from the local audio-routing subsystem.
pub trait LocalAudioEventHandler {
    fn on_unicast_stream_status(&mut self, status: LocalStreamStatus);

    /// A sink dropped. `intentional` is false for link loss.
    fn handle_device_disconnection(&mut self, sink: DeviceAddress, intentional: bool);

    fn on_broadcast_state_changed(&mut self, state: BroadcastState, broadcast_id: BroadcastId);

    /// Pause reception of a local broadcast, caching the sinks for resume.
    fn suspend_receivers(&mut self, broadcast_id: BroadcastId);

    /// Pause reception of every broadcast on every sink.
    fn suspend_all_receivers(&mut self);

    /// Remove a local broadcast from its receivers for good.
    fn stop_receivers(&mut self, broadcast_id: BroadcastId);

    fn resume_receivers(&mut self);
}

pub trait TimerEventHandler {
    fn on_timer_fired(&mut self, id: TimerId);
}
