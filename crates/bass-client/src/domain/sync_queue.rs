//! # Sync Admission Queue
//!
//! Admission control for periodic-advertising syncs.
//!
//! ```text
//!   enqueue ──► [ BinaryHeap<SourceSyncRequest> ]
//!                         │ begin_dispatch (only while no claim is pending)
//!                         ▼
//!               SyncClaim::Claiming ──resolve──► SyncClaim::Synced(handle)
//!                         │                              │
//!                     release                   active: VecDeque<ActiveSync>
//!                                                (FIFO, evict front at capacity)
//! ```
//!
//! A single claim is in flight at a time. The queue never talks to the scan
//! primitive itself; the service acts on the returned [`Dispatch`].

use le_audio_types::{AdvertisingSid, BroadcastId, DeviceAddress, SyncHandle};
use serde::Serialize;
use std::collections::{BinaryHeap, VecDeque};
use tracing::debug;

use super::value_objects::{ScanResult, SourceSyncRequest};

/// Registration that has been issued but not yet answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingClaim {
    pub device: DeviceAddress,
    pub adv_sid: AdvertisingSid,
    pub broadcast_id: BroadcastId,
    pub has_priority: bool,
}

/// The engine-wide registration token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum SyncClaim {
    #[default]
    Idle,
    Claiming(PendingClaim),
    /// The last claim resolved to this handle.
    Synced(SyncHandle),
}

impl SyncClaim {
    #[must_use]
    pub fn is_claiming(&self) -> bool {
        matches!(self, Self::Claiming(_))
    }
}

/// A live sync in activation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSync {
    pub handle: SyncHandle,
    pub device: DeviceAddress,
    pub broadcast_id: BroadcastId,
    /// Periodic reports left to find a BASE; `None` once found.
    pub bis_tries_left: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// A queued request for the same broadcast was promoted to priority.
    Upgraded,
    AlreadyQueued,
    AlreadyActive,
    AlreadyClaiming,
}

/// A registration to issue, possibly after evicting the oldest sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub request: SourceSyncRequest,
    pub evict: Option<ActiveSync>,
}

/// Result of feeding one periodic report into BIS discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BisDiscovery {
    NotActive,
    /// The report carried the BASE.
    Complete,
    /// The BASE had already been found.
    AlreadyComplete,
    Retry { left: u8 },
    /// Budget spent; the handle should be cancelled.
    Exhausted,
}

#[derive(Debug)]
pub struct SyncAdmissionQueue {
    queue: BinaryHeap<SourceSyncRequest>,
    claim: SyncClaim,
    active: VecDeque<ActiveSync>,
    max_active: usize,
    bis_tries: u8,
    next_sequence: u64,
}

impl SyncAdmissionQueue {
    #[must_use]
    pub fn new(max_active: usize, bis_tries: u8) -> Self {
        Self {
            queue: BinaryHeap::new(),
            claim: SyncClaim::Idle,
            active: VecDeque::with_capacity(max_active),
            max_active,
            bis_tries,
            next_sequence: 0,
        }
    }

    // =========================================================================
    // QUEUE
    // =========================================================================

    /// Queue a sync request unless the broadcast is already being handled.
    pub fn enqueue(
        &mut self,
        scan: ScanResult,
        broadcast_id: BroadcastId,
        has_priority: bool,
    ) -> EnqueueOutcome {
        if self.is_active(broadcast_id) {
            return EnqueueOutcome::AlreadyActive;
        }
        if let SyncClaim::Claiming(pending) = &self.claim {
            if pending.broadcast_id == broadcast_id {
                return EnqueueOutcome::AlreadyClaiming;
            }
        }

        if let Some(existing) = self.queue.iter().find(|r| r.broadcast_id == broadcast_id) {
            if !has_priority || existing.has_priority {
                return EnqueueOutcome::AlreadyQueued;
            }
            let mut requests = std::mem::take(&mut self.queue).into_vec();
            for request in requests.iter_mut().filter(|r| r.broadcast_id == broadcast_id) {
                request.has_priority = true;
            }
            self.queue = BinaryHeap::from(requests);
            debug!(broadcast_id = %broadcast_id, "Queued sync request promoted to priority");
            return EnqueueOutcome::Upgraded;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(SourceSyncRequest {
            scan,
            broadcast_id,
            has_priority,
            sequence,
        });
        EnqueueOutcome::Queued
    }

    /// Pop the best request and take the claim for it.
    ///
    /// Returns `None` while a claim is pending or when nothing is queued.
    /// At capacity the oldest active sync is removed and handed back for
    /// the caller to unregister.
    pub fn begin_dispatch(&mut self) -> Option<Dispatch> {
        if self.claim.is_claiming() {
            return None;
        }

        let request = loop {
            let candidate = self.queue.pop()?;
            if !self.is_active(candidate.broadcast_id) {
                break candidate;
            }
        };

        let evict = if self.active.len() >= self.max_active {
            self.active.pop_front()
        } else {
            None
        };

        self.claim = SyncClaim::Claiming(PendingClaim {
            device: request.scan.device,
            adv_sid: request.scan.adv_sid,
            broadcast_id: request.broadcast_id,
            has_priority: request.has_priority,
        });

        Some(Dispatch { request, evict })
    }

    /// Drop non-priority requests.
    pub fn retain_priority(&mut self) {
        self.queue.retain(|r| r.has_priority);
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// A request for the broadcast is queued or being claimed.
    #[must_use]
    pub fn has_pending_for(&self, broadcast_id: BroadcastId) -> bool {
        self.queue.iter().any(|r| r.broadcast_id == broadcast_id)
            || matches!(&self.claim, SyncClaim::Claiming(p) if p.broadcast_id == broadcast_id)
    }

    // =========================================================================
    // CLAIM
    // =========================================================================

    #[must_use]
    pub fn claim(&self) -> &SyncClaim {
        &self.claim
    }

    /// Withdraw a pending claim.
    pub fn release_claim(&mut self) -> Option<PendingClaim> {
        match std::mem::take(&mut self.claim) {
            SyncClaim::Claiming(pending) => Some(pending),
            other => {
                self.claim = other;
                None
            }
        }
    }

    /// The pending claim targets this advertising set.
    #[must_use]
    pub fn matches_claim(&self, device: DeviceAddress, adv_sid: AdvertisingSid) -> bool {
        matches!(&self.claim, SyncClaim::Claiming(p) if p.device == device && p.adv_sid == adv_sid)
    }

    /// Turn the pending claim into a live sync.
    pub fn resolve_claim(&mut self, handle: SyncHandle) -> Option<PendingClaim> {
        let SyncClaim::Claiming(pending) = std::mem::take(&mut self.claim) else {
            return None;
        };
        self.active.push_back(ActiveSync {
            handle,
            device: pending.device,
            broadcast_id: pending.broadcast_id,
            bis_tries_left: Some(self.bis_tries),
        });
        self.claim = SyncClaim::Synced(handle);
        Some(pending)
    }

    // =========================================================================
    // ACTIVE SET
    // =========================================================================

    pub fn remove_active(&mut self, handle: SyncHandle) -> Option<ActiveSync> {
        if self.claim == SyncClaim::Synced(handle) {
            self.claim = SyncClaim::Idle;
        }
        let index = self.active.iter().position(|a| a.handle == handle)?;
        self.active.remove(index)
    }

    /// Retire every live sync and withdraw any pending claim.
    pub fn cancel_all(&mut self) -> Vec<ActiveSync> {
        self.claim = SyncClaim::Idle;
        self.active.drain(..).collect()
    }

    #[must_use]
    pub fn is_active(&self, broadcast_id: BroadcastId) -> bool {
        self.active.iter().any(|a| a.broadcast_id == broadcast_id)
    }

    #[must_use]
    pub fn active(&self, handle: SyncHandle) -> Option<&ActiveSync> {
        self.active.iter().find(|a| a.handle == handle)
    }

    #[must_use]
    pub fn active_for_broadcast(&self, broadcast_id: BroadcastId) -> Option<&ActiveSync> {
        self.active.iter().find(|a| a.broadcast_id == broadcast_id)
    }

    /// Live handles, oldest first.
    #[must_use]
    pub fn active_handles(&self) -> Vec<SyncHandle> {
        self.active.iter().map(|a| a.handle).collect()
    }

    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    #[must_use]
    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Spend one BIS discovery try, or close the budget when `base_found`.
    pub fn record_bis_attempt(&mut self, handle: SyncHandle, base_found: bool) -> BisDiscovery {
        let Some(sync) = self.active.iter_mut().find(|a| a.handle == handle) else {
            return BisDiscovery::NotActive;
        };
        let Some(left) = sync.bis_tries_left else {
            return BisDiscovery::AlreadyComplete;
        };
        if base_found {
            sync.bis_tries_left = None;
            return BisDiscovery::Complete;
        }
        let left = left.saturating_sub(1);
        sync.bis_tries_left = Some(left);
        if left == 0 {
            BisDiscovery::Exhausted
        } else {
            BisDiscovery::Retry { left }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use le_audio_types::AddressType;
    use proptest::prelude::*;

    fn scan(n: u8, rssi: i8) -> ScanResult {
        ScanResult {
            device: DeviceAddress::new([0xA0, 0, 0, 0, 0, n]),
            address_type: AddressType::Random,
            adv_sid: n,
            rssi,
            pa_interval: None,
            advertising_data: Vec::new(),
        }
    }

    fn id(n: u8) -> BroadcastId {
        BroadcastId::new(u32::from(n) + 0x100).unwrap()
    }

    fn establish(queue: &mut SyncAdmissionQueue, handle: u16) -> Dispatch {
        let dispatch = queue.begin_dispatch().unwrap();
        queue.resolve_claim(SyncHandle(handle)).unwrap();
        dispatch
    }

    #[test]
    fn test_single_in_flight_claim() {
        let mut queue = SyncAdmissionQueue::new(4, 5);
        queue.enqueue(scan(1, -50), id(1), false);
        assert!(queue.begin_dispatch().is_some());

        assert_eq!(queue.enqueue(scan(2, -40), id(2), false), EnqueueOutcome::Queued);
        assert!(queue.begin_dispatch().is_none());
        assert_eq!(queue.queued_len(), 1);

        queue.resolve_claim(SyncHandle(1));
        assert_eq!(queue.begin_dispatch().unwrap().request.broadcast_id, id(2));
    }

    #[test]
    fn test_dispatch_order_priority_then_rssi() {
        let mut queue = SyncAdmissionQueue::new(4, 5);
        queue.enqueue(scan(1, -80), id(1), false);
        queue.enqueue(scan(2, -90), id(2), true);
        queue.enqueue(scan(3, -60), id(3), false);

        let mut order = Vec::new();
        while let Some(dispatch) = queue.begin_dispatch() {
            order.push((dispatch.request.has_priority, dispatch.request.scan.rssi));
            queue.release_claim();
        }
        assert_eq!(order, vec![(true, -90), (false, -60), (false, -80)]);
    }

    #[test]
    fn test_duplicate_requests() {
        let mut queue = SyncAdmissionQueue::new(4, 5);
        assert_eq!(queue.enqueue(scan(1, -50), id(1), false), EnqueueOutcome::Queued);
        assert_eq!(queue.enqueue(scan(1, -50), id(1), false), EnqueueOutcome::AlreadyQueued);
        assert_eq!(queue.enqueue(scan(1, -50), id(1), true), EnqueueOutcome::Upgraded);
        assert_eq!(queue.queued_len(), 1);

        queue.enqueue(scan(2, -30), id(2), false);
        let dispatch = queue.begin_dispatch().unwrap();
        assert_eq!(dispatch.request.broadcast_id, id(1));
        assert_eq!(queue.enqueue(scan(1, -50), id(1), true), EnqueueOutcome::AlreadyClaiming);

        queue.resolve_claim(SyncHandle(4));
        assert_eq!(queue.enqueue(scan(1, -50), id(1), true), EnqueueOutcome::AlreadyActive);
    }

    #[test]
    fn test_eviction_is_fifo_by_activation() {
        let mut queue = SyncAdmissionQueue::new(2, 5);
        for n in 1..=2 {
            queue.enqueue(scan(n, -50), id(n), false);
            assert!(establish(&mut queue, u16::from(n)).evict.is_none());
        }

        queue.enqueue(scan(3, -50), id(3), false);
        let dispatch = establish(&mut queue, 3);
        assert_eq!(dispatch.evict.map(|e| e.handle), Some(SyncHandle(1)));
        assert_eq!(queue.active_handles(), vec![SyncHandle(2), SyncHandle(3)]);
    }

    #[test]
    fn test_stray_establishment_does_not_match() {
        let mut queue = SyncAdmissionQueue::new(4, 5);
        queue.enqueue(scan(1, -50), id(1), false);
        queue.begin_dispatch();
        assert!(queue.matches_claim(scan(1, 0).device, 1));
        assert!(!queue.matches_claim(scan(2, 0).device, 2));
        assert!(queue.release_claim().is_some());
        assert!(queue.release_claim().is_none());
        assert!(queue.resolve_claim(SyncHandle(1)).is_none());
    }

    #[test]
    fn test_bis_budget_exhausts() {
        let mut queue = SyncAdmissionQueue::new(4, 2);
        queue.enqueue(scan(1, -50), id(1), false);
        establish(&mut queue, 7);

        assert_eq!(queue.record_bis_attempt(SyncHandle(7), false), BisDiscovery::Retry { left: 1 });
        assert_eq!(queue.record_bis_attempt(SyncHandle(7), false), BisDiscovery::Exhausted);
        assert_eq!(queue.record_bis_attempt(SyncHandle(8), false), BisDiscovery::NotActive);
    }

    #[test]
    fn test_bis_budget_closes_on_base() {
        let mut queue = SyncAdmissionQueue::new(4, 2);
        queue.enqueue(scan(1, -50), id(1), false);
        establish(&mut queue, 7);

        assert_eq!(queue.record_bis_attempt(SyncHandle(7), true), BisDiscovery::Complete);
        assert_eq!(queue.record_bis_attempt(SyncHandle(7), false), BisDiscovery::AlreadyComplete);
    }

    #[test]
    fn test_cancel_all_withdraws_claim() {
        let mut queue = SyncAdmissionQueue::new(4, 5);
        queue.enqueue(scan(1, -50), id(1), false);
        establish(&mut queue, 1);
        queue.enqueue(scan(2, -50), id(2), false);
        queue.begin_dispatch();

        assert_eq!(queue.cancel_all().len(), 1);
        assert_eq!(queue.claim(), &SyncClaim::Idle);
        assert!(!queue.has_pending_for(id(2)));
    }

    #[test]
    fn test_retain_priority() {
        let mut queue = SyncAdmissionQueue::new(4, 5);
        queue.enqueue(scan(1, -50), id(1), false);
        queue.enqueue(scan(2, -50), id(2), true);
        queue.retain_priority();
        assert_eq!(queue.queued_len(), 1);
        assert!(queue.has_pending_for(id(2)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue(u8, i8, bool),
        Establish(u16),
        Fail,
        Lose(u16),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..12, -100i8..0, any::<bool>()).prop_map(|(n, r, p)| Op::Enqueue(n, r, p)),
            (0u16..64).prop_map(Op::Establish),
            Just(Op::Fail),
            (0u16..64).prop_map(Op::Lose),
        ]
    }

    proptest! {
        #[test]
        fn prop_active_never_exceeds_capacity(
            max in 1usize..5,
            ops in proptest::collection::vec(op(), 1..80),
        ) {
            let mut queue = SyncAdmissionQueue::new(max, 5);
            for op in ops {
                match op {
                    Op::Enqueue(n, rssi, priority) => {
                        queue.enqueue(scan(n, rssi), id(n), priority);
                    }
                    Op::Establish(handle) => {
                        if queue.active(SyncHandle(handle)).is_none() {
                            queue.resolve_claim(SyncHandle(handle));
                        }
                    }
                    Op::Fail => {
                        queue.release_claim();
                    }
                    Op::Lose(handle) => {
                        queue.remove_active(SyncHandle(handle));
                    }
                }
                queue.begin_dispatch();
                prop_assert!(queue.active_len() <= max);
            }
        }
    }
}
