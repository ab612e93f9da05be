//! # Handover Gate
//!
//! Arbitrates between broadcast reception on the sinks and the local
//! unicast workload (calls, voice assistants) competing for them.
//!
//! - While a unicast stream is requested, sinks receiving only external
//!   broadcasts are paused: their sources are removed and cached here.
//! - When the stream is suspended, paused sinks are replayed and adds
//!   queued while gated are drained.
//! - With `gate_adds_on_local_stream` on, adds only pass once the local
//!   stream is known to be suspended.

use le_audio_types::{BroadcastId, BroadcastMetadata, DeviceAddress};
use std::collections::{HashMap, VecDeque};

use super::entities::DeferredAdd;
use super::value_objects::LocalStreamStatus;

/// What the service should do after a local stream status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    None,
    /// Pause external reception.
    Suspend,
    /// Resume paused sinks and drain queued adds.
    Replay,
}

/// Reception summary for one connected sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reception {
    pub external: bool,
    pub local: bool,
}

#[derive(Debug, Default)]
pub struct HandoverGate {
    enabled: bool,
    status: Option<LocalStreamStatus>,
    paused: HashMap<DeviceAddress, BroadcastMetadata>,
    pending_adds: VecDeque<DeferredAdd>,
}

impl HandoverGate {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn status(&self) -> Option<LocalStreamStatus> {
        self.status
    }

    #[must_use]
    pub fn is_status_known(&self) -> bool {
        self.status.is_some()
    }

    /// Unknown and requested both block; only suspended lets adds through.
    #[must_use]
    pub fn is_add_allowed(&self) -> bool {
        !self.enabled || self.status == Some(LocalStreamStatus::Suspended)
    }

    pub fn on_status(&mut self, status: LocalStreamStatus) -> GateTransition {
        self.status = Some(status);
        match status {
            LocalStreamStatus::Requested => GateTransition::Suspend,
            LocalStreamStatus::Streaming => GateTransition::None,
            LocalStreamStatus::Suspended => GateTransition::Replay,
        }
    }

    /// Forget the last report, e.g. once the assistant goes inactive.
    pub fn reset_status(&mut self) {
        self.status = None;
    }

    /// Pause only when something is received and every receiving sink
    /// hears external broadcasts alone.
    #[must_use]
    pub fn should_suspend(receptions: &[Reception]) -> bool {
        let mut receiving = receptions.iter().filter(|r| r.external || r.local).peekable();
        receiving.peek().is_some() && receiving.all(|r| r.external && !r.local)
    }

    // --- paused sinks --------------------------------------------------------

    /// A new suspension replaces whatever an earlier one cached.
    pub fn clear_paused(&mut self) {
        self.paused.clear();
    }

    pub fn cache_paused(&mut self, sink: DeviceAddress, metadata: BroadcastMetadata) {
        self.paused.insert(sink, metadata);
    }

    #[must_use]
    pub fn is_paused(&self, sink: DeviceAddress) -> bool {
        self.paused.contains_key(&sink)
    }

    #[must_use]
    pub fn has_paused(&self) -> bool {
        !self.paused.is_empty()
    }

    #[must_use]
    pub fn paused_len(&self) -> usize {
        self.paused.len()
    }

    pub fn forget_paused(&mut self, sink: DeviceAddress) -> Option<BroadcastMetadata> {
        self.paused.remove(&sink)
    }

    /// Drop cached sinks that were receiving `broadcast_id`.
    pub fn forget_broadcast(&mut self, broadcast_id: BroadcastId) {
        self.paused.retain(|_, m| m.broadcast_id != broadcast_id);
    }

    pub fn take_paused(&mut self) -> Vec<(DeviceAddress, BroadcastMetadata)> {
        self.paused.drain().collect()
    }

    // --- adds queued while gated ---------------------------------------------

    pub fn queue_add(&mut self, add: DeferredAdd) {
        self.pending_adds.push_back(add);
    }

    #[must_use]
    pub fn pending_adds_len(&self) -> usize {
        self.pending_adds.len()
    }

    pub fn take_pending_adds(&mut self) -> Vec<DeferredAdd> {
        self.pending_adds.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.status = None;
        self.paused.clear();
        self.pending_adds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use le_audio_types::AddressType;

    fn metadata() -> BroadcastMetadata {
        BroadcastMetadata::new(
            DeviceAddress::new([0xAB, 0, 0, 0, 0, 1]),
            AddressType::Public,
            0,
            BroadcastId::new(42).unwrap(),
        )
    }

    #[test]
    fn test_gate_blocks_until_suspended() {
        let mut gate = HandoverGate::new(true);
        assert!(!gate.is_add_allowed());

        assert_eq!(gate.on_status(LocalStreamStatus::Requested), GateTransition::Suspend);
        assert!(!gate.is_add_allowed());

        assert_eq!(gate.on_status(LocalStreamStatus::Suspended), GateTransition::Replay);
        assert!(gate.is_add_allowed());

        gate.reset_status();
        assert!(!gate.is_status_known());
        assert!(!gate.is_add_allowed());
    }

    #[test]
    fn test_disabled_gate_always_allows() {
        let mut gate = HandoverGate::new(false);
        assert!(gate.is_add_allowed());
        gate.on_status(LocalStreamStatus::Requested);
        assert!(gate.is_add_allowed());
    }

    #[test]
    fn test_should_suspend() {
        let external = Reception { external: true, local: false };
        let local = Reception { external: false, local: true };
        let idle = Reception::default();

        assert!(!HandoverGate::should_suspend(&[]));
        assert!(!HandoverGate::should_suspend(&[idle]));
        assert!(HandoverGate::should_suspend(&[external, idle]));
        assert!(!HandoverGate::should_suspend(&[external, local]));
    }

    #[test]
    fn test_paused_cache_and_pending_adds() {
        let mut gate = HandoverGate::new(true);
        let sink = DeviceAddress::new([1, 1, 1, 1, 1, 1]);
        gate.cache_paused(sink, metadata());
        gate.queue_add(DeferredAdd {
            sink,
            metadata: metadata(),
            group_op: false,
        });

        assert!(gate.is_paused(sink));
        assert_eq!(gate.take_paused(), vec![(sink, metadata())]);
        assert!(!gate.has_paused());
        assert_eq!(gate.take_pending_adds().len(), 1);
        assert_eq!(gate.pending_adds_len(), 0);
    }

    #[test]
    fn test_clear_paused_keeps_queued_adds() {
        let mut gate = HandoverGate::new(true);
        let sink = DeviceAddress::new([1, 1, 1, 1, 1, 1]);
        gate.cache_paused(sink, metadata());
        gate.queue_add(DeferredAdd {
            sink,
            metadata: metadata(),
            group_op: false,
        });

        gate.clear_paused();
        assert!(!gate.is_paused(sink));
        assert_eq!(gate.pending_adds_len(), 1);
    }
}
