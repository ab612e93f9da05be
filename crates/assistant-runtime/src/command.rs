//! # Commands
//!
//! One variant per inbound call of the engine. Adapters for the Bluetooth
//! stack and the local audio subsystem enqueue these on the actor; queries
//! carry a oneshot sender for the answer.

use bass_client::{
    AssistantService, AssistantStats, BroadcastAssistantApi, BroadcastState, GroupDirectory,
    LocalAudioEventHandler, LocalAudioGateway, LocalStreamStatus, PeriodicSyncScanner,
    ScanEventHandler, ScanFilter, ScanResult, SinkEventHandler, SinkTransport, TimerEventHandler,
    TimerId, TimerScheduler,
};
use le_audio_types::{
    AdvertisingSid, AssistantError, BroadcastId, BroadcastMetadata, ConnectionState,
    DeviceAddress, Reason, ReceiveState, SourceId, SyncHandle,
};
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum Command {
    // --- application API -----------------------------------------------------
    StartSearching(Vec<ScanFilter>),
    StopSearching,
    AddSource {
        sink: DeviceAddress,
        metadata: BroadcastMetadata,
        is_group_op: bool,
    },
    ModifySource {
        sink: DeviceAddress,
        source_id: SourceId,
        metadata: BroadcastMetadata,
    },
    RemoveSource {
        sink: DeviceAddress,
        source_id: SourceId,
    },
    GetAllSources {
        sink: DeviceAddress,
        reply: oneshot::Sender<Vec<ReceiveState>>,
    },
    GetMaxSourceCapacity {
        sink: DeviceAddress,
        reply: oneshot::Sender<usize>,
    },
    IsSearching {
        reply: oneshot::Sender<bool>,
    },
    Stats {
        reply: oneshot::Sender<AssistantStats>,
    },
    CancelActiveSync(Option<SyncHandle>),

    // --- scan primitive ------------------------------------------------------
    ScanResult(ScanResult),
    SyncEstablished {
        handle: SyncHandle,
        device: DeviceAddress,
        adv_sid: AdvertisingSid,
        success: bool,
    },
    SyncLost(SyncHandle),
    PeriodicReport {
        handle: SyncHandle,
        data: Vec<u8>,
    },
    BigInfoReport {
        handle: SyncHandle,
        encrypted: bool,
    },

    // --- sink transport ------------------------------------------------------
    ConnectionStateChanged {
        sink: DeviceAddress,
        state: ConnectionState,
    },
    BondStateChanged {
        sink: DeviceAddress,
        bonded: bool,
    },
    ReceiveStateChanged {
        sink: DeviceAddress,
        state: ReceiveState,
    },
    SourceAdded {
        sink: DeviceAddress,
        state: ReceiveState,
        reason: Reason,
    },
    SourceAddFailed {
        sink: DeviceAddress,
        metadata: BroadcastMetadata,
        error: AssistantError,
    },
    SourceModified {
        sink: DeviceAddress,
        source_id: SourceId,
        reason: Reason,
    },
    SourceModifyFailed {
        sink: DeviceAddress,
        source_id: SourceId,
        error: AssistantError,
    },
    SourceRemoved {
        sink: DeviceAddress,
        source_id: SourceId,
        reason: Reason,
    },
    SourceRemoveFailed {
        sink: DeviceAddress,
        source_id: SourceId,
        error: AssistantError,
    },

    // --- local audio ---------------------------------------------------------
    UnicastStreamStatus(LocalStreamStatus),
    DeviceDisconnection {
        sink: DeviceAddress,
        intentional: bool,
    },
    BroadcastStateChanged {
        state: BroadcastState,
        broadcast_id: BroadcastId,
    },
    SuspendReceivers(BroadcastId),
    SuspendAllReceivers,
    StopReceivers(BroadcastId),
    ResumeReceivers,

    TimerFired(TimerId),
}

impl Command {
    /// Short name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartSearching(_) => "start_searching",
            Self::StopSearching => "stop_searching",
            Self::AddSource { .. } => "add_source",
            Self::ModifySource { .. } => "modify_source",
            Self::RemoveSource { .. } => "remove_source",
            Self::GetAllSources { .. } => "get_all_sources",
            Self::GetMaxSourceCapacity { .. } => "get_max_source_capacity",
            Self::IsSearching { .. } => "is_searching",
            Self::Stats { .. } => "stats",
            Self::CancelActiveSync(_) => "cancel_active_sync",
            Self::ScanResult(_) => "scan_result",
            Self::SyncEstablished { .. } => "sync_established",
            Self::SyncLost(_) => "sync_lost",
            Self::PeriodicReport { .. } => "periodic_report",
            Self::BigInfoReport { .. } => "big_info_report",
            Self::ConnectionStateChanged { .. } => "connection_state_changed",
            Self::BondStateChanged { .. } => "bond_state_changed",
            Self::ReceiveStateChanged { .. } => "receive_state_changed",
            Self::SourceAdded { .. } => "source_added",
            Self::SourceAddFailed { .. } => "source_add_failed",
            Self::SourceModified { .. } => "source_modified",
            Self::SourceModifyFailed { .. } => "source_modify_failed",
            Self::SourceRemoved { .. } => "source_removed",
            Self::SourceRemoveFailed { .. } => "source_remove_failed",
            Self::UnicastStreamStatus(_) => "unicast_stream_status",
            Self::DeviceDisconnection { .. } => "device_disconnection",
            Self::BroadcastStateChanged { .. } => "broadcast_state_changed",
            Self::SuspendReceivers(_) => "suspend_receivers",
            Self::SuspendAllReceivers => "suspend_all_receivers",
            Self::StopReceivers(_) => "stop_receivers",
            Self::ResumeReceivers => "resume_receivers",
            Self::TimerFired(_) => "timer_fired",
        }
    }

    /// Apply the command to the engine. Replies whose receiver went away
    /// are dropped.
    pub(crate) fn apply<T, S, G, L, C>(self, service: &mut AssistantService<T, S, G, L, C>)
    where
        T: SinkTransport,
        S: PeriodicSyncScanner,
        G: GroupDirectory,
        L: LocalAudioGateway,
        C: TimerScheduler,
    {
        match self {
            Self::StartSearching(filters) => service.start_searching(filters),
            Self::StopSearching => service.stop_searching(),
            Self::AddSource {
                sink,
                metadata,
                is_group_op,
            } => service.add_source(sink, metadata, is_group_op),
            Self::ModifySource {
                sink,
                source_id,
                metadata,
            } => service.modify_source(sink, source_id, metadata),
            Self::RemoveSource { sink, source_id } => service.remove_source(sink, source_id),
            Self::GetAllSources { sink, reply } => {
                let _ = reply.send(service.get_all_sources(sink));
            }
            Self::GetMaxSourceCapacity { sink, reply } => {
                let _ = reply.send(service.get_max_source_capacity(sink));
            }
            Self::IsSearching { reply } => {
                let _ = reply.send(service.is_searching());
            }
            Self::Stats { reply } => {
                let _ = reply.send(service.stats());
            }
            Self::CancelActiveSync(handle) => service.cancel_active_sync(handle),

            Self::ScanResult(result) => service.on_scan_result(result),
            Self::SyncEstablished {
                handle,
                device,
                adv_sid,
                success,
            } => service.on_sync_established(handle, device, adv_sid, success),
            Self::SyncLost(handle) => service.on_sync_lost(handle),
            Self::PeriodicReport { handle, data } => service.on_periodic_report(handle, &data),
            Self::BigInfoReport { handle, encrypted } => {
                service.on_big_info_report(handle, encrypted)
            }

            Self::ConnectionStateChanged { sink, state } => {
                service.on_connection_state_changed(sink, state)
            }
            Self::BondStateChanged { sink, bonded } => service.on_bond_state_changed(sink, bonded),
            Self::ReceiveStateChanged { sink, state } => {
                service.on_receive_state_changed(sink, state)
            }
            Self::SourceAdded {
                sink,
                state,
                reason,
            } => service.on_source_added(sink, state, reason),
            Self::SourceAddFailed {
                sink,
                metadata,
                error,
            } => service.on_source_add_failed(sink, metadata, error),
            Self::SourceModified {
                sink,
                source_id,
                reason,
            } => service.on_source_modified(sink, source_id, reason),
            Self::SourceModifyFailed {
                sink,
                source_id,
                error,
            } => service.on_source_modify_failed(sink, source_id, error),
            Self::SourceRemoved {
                sink,
                source_id,
                reason,
            } => service.on_source_removed(sink, source_id, reason),
            Self::SourceRemoveFailed {
                sink,
                source_id,
                error,
            } => service.on_source_remove_failed(sink, source_id, error),

            Self::UnicastStreamStatus(status) => service.on_unicast_stream_status(status),
            Self::DeviceDisconnection { sink, intentional } => {
                service.handle_device_disconnection(sink, intentional)
            }
            Self::BroadcastStateChanged {
                state,
                broadcast_id,
            } => service.on_broadcast_state_changed(state, broadcast_id),
            Self::SuspendReceivers(broadcast_id) => service.suspend_receivers(broadcast_id),
            Self::SuspendAllReceivers => service.suspend_all_receivers(),
            Self::StopReceivers(broadcast_id) => service.stop_receivers(broadcast_id),
            Self::ResumeReceivers => service.resume_receivers(),

            Self::TimerFired(id) => service.on_timer_fired(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(Command::StopSearching.name(), "stop_searching");
        assert_eq!(
            Command::SyncLost(SyncHandle(1)).name(),
            "sync_lost"
        );
        let (reply, _rx) = oneshot::channel();
        assert_eq!(Command::Stats { reply }.name(), "stats");
    }
}
