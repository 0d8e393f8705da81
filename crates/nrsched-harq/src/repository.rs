use nrsched_core::{DuUeIndex, HarqId, MAX_NOF_HARQS, HARQ_TIMEOUT_RING_SIZE, SlotPoint};

use crate::diag::{DiagnosticSink, DiscardCause, HarqEvent};
use crate::harq_process::{HarqDirection, HarqProcess, HarqState};
use crate::index_list::{IndexList, ListLinks, ListTag, NIL};
use crate::notifier::HarqTimeoutNotifier;
use crate::timeout_wheel::TimeoutWheel;

/// Per direction statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarqCounters {
    pub nof_new_txs: u64,
    pub nof_retxs: u64,
    pub nof_acks: u64,
    pub nof_nacks: u64,
    /// Processes dropped after their retransmission budget ran out or was cancelled
    pub nof_discards: u64,
    pub nof_timeouts: u64,
}

/// HARQ processes reserved by one UE
struct UeHarqEntry {
    active: bool,
    nof_harqs: u8,
    /// Pool slot of each h_id, NIL if the h_id is not in use
    harqs: [u32; MAX_NOF_HARQS],
    /// h_ids available for new transmissions. Popped from the back.
    free_harq_ids: Vec<HarqId>,
    /// NDI of the last transmission per h_id
    last_ndi: [bool; MAX_NOF_HARQS],
}

impl UeHarqEntry {
    fn new() -> Self {
        Self {
            active: false,
            nof_harqs: 0,
            harqs: [NIL; MAX_NOF_HARQS],
            free_harq_ids: Vec::with_capacity(MAX_NOF_HARQS),
            last_ndi: [false; MAX_NOF_HARQS],
        }
    }
}

/// Pool of HARQ processes of one direction, shared by all UEs of a cell.
///
/// Every non-empty record is linked into exactly one list: its timeout wheel bucket
/// while waiting for a HARQ-ACK, or the pending retransmission list after a NACK.
/// All storage is sized at construction.
pub struct HarqRepository<E: HarqDirection> {
    max_ack_wait_in_slots: u32,
    harqs: Vec<HarqProcess<E>>,
    links: Vec<ListLinks>,
    free_harqs: Vec<u32>,
    ues: Vec<UeHarqEntry>,
    timeout_wheel: TimeoutWheel,
    pending_retxs: IndexList,
    counters: HarqCounters,
    last_sl_ind: Option<SlotPoint>,
}

impl<E: HarqDirection> HarqRepository<E> {
    pub fn new(max_ues: usize, max_ack_wait_in_slots: u32) -> Self {
        assert!(max_ues > 0, "a HARQ repository needs room for at least one UE");
        assert!(
            max_ack_wait_in_slots > 0 && (max_ack_wait_in_slots as usize) < HARQ_TIMEOUT_RING_SIZE,
            "max_ack_wait_in_slots {} must be in range 1..{}",
            max_ack_wait_in_slots,
            HARQ_TIMEOUT_RING_SIZE
        );

        let capacity = max_ues * MAX_NOF_HARQS;
        let mut harqs = Vec::with_capacity(capacity);
        harqs.resize_with(capacity, HarqProcess::default);

        Self {
            max_ack_wait_in_slots,
            harqs,
            links: vec![ListLinks::detached(); capacity],
            // Reversed, so slot 0 is handed out first
            free_harqs: (0..capacity as u32).rev().collect(),
            ues: (0..max_ues).map(|_| UeHarqEntry::new()).collect(),
            timeout_wheel: TimeoutWheel::new(),
            pending_retxs: IndexList::new(ListTag::PendingRetx),
            counters: HarqCounters::default(),
            last_sl_ind: None,
        }
    }

    /// Expire every process whose HARQ-ACK deadline bucket is visited in `sl`
    pub fn slot_indication(
        &mut self,
        sl: SlotPoint,
        notifier: &mut dyn HarqTimeoutNotifier,
        diag: &mut dyn DiagnosticSink,
    ) {
        self.last_sl_ind = Some(sl);
        let bucket = TimeoutWheel::bucket_index(sl);
        while let Some(h) = self.timeout_wheel.front(bucket) {
            self.handle_harq_ack_timeout(h, sl, notifier, diag);
        }
    }

    fn handle_harq_ack_timeout(
        &mut self,
        h: u32,
        sl: SlotPoint,
        notifier: &mut dyn HarqTimeoutNotifier,
        diag: &mut dyn DiagnosticSink,
    ) {
        let harq = &self.harqs[h as usize];
        assert_eq!(harq.status, HarqState::WaitingAck, "only processes waiting for HARQ-ACK can time out");

        if harq.slot_ack_timeout != sl {
            diag.on_event(&HarqEvent::UnexpectedTimeoutSlot {
                ue_index: harq.ue_index,
                dir: E::DIRECTION,
                h_id: harq.h_id,
                deadline: harq.slot_ack_timeout,
                slot: sl,
            });
        }

        // With a one slot wait, every report arrives on the regular path
        if self.max_ack_wait_in_slots != 1 {
            diag.on_event(&HarqEvent::AckTimeout {
                ue_index: harq.ue_index,
                dir: E::DIRECTION,
                h_id: harq.h_id,
                slot: sl,
                wait_slots: self.max_ack_wait_in_slots,
                ack_on_timeout: harq.ack_on_timeout,
            });
            notifier.on_harq_timeout(harq.ue_index, E::DIRECTION, harq.ack_on_timeout);
        }

        self.counters.nof_timeouts += 1;
        self.dealloc_harq(h);
    }

    /// Allocate a HARQ process for a new transmission of `ue`.
    /// Returns None if the UE has no free h_id, the pool is exhausted or the
    /// HARQ-ACK deadline lies beyond the reach of the timeout wheel.
    pub fn alloc_harq(&mut self, ue: DuUeIndex, sl_tx: SlotPoint, sl_ack: SlotPoint, max_nof_harq_retxs: u8) -> Option<u32> {
        let deadline = self.ack_deadline(sl_ack);
        if !self.is_deadline_in_range(deadline) {
            return None;
        }

        let entry = &mut self.ues[ue as usize];
        assert!(entry.active, "ue={} has no HARQ processes reserved", ue);

        if self.free_harqs.is_empty() || entry.free_harq_ids.is_empty() {
            return None;
        }
        let h_id = entry.free_harq_ids.pop()?;
        let h = self.free_harqs.pop()?;
        entry.harqs[h_id as usize] = h;
        entry.last_ndi[h_id as usize] = !entry.last_ndi[h_id as usize];

        let harq = &mut self.harqs[h as usize];
        harq.ue_index = ue;
        harq.h_id = h_id;
        harq.status = HarqState::WaitingAck;
        harq.slot_tx = sl_tx;
        harq.slot_ack = sl_ack;
        harq.slot_ack_timeout = deadline;
        harq.nof_retxs = 0;
        harq.max_nof_harq_retxs = max_nof_harq_retxs;
        harq.retxs_cancelled = false;
        harq.ack_on_timeout = false;
        harq.ndi = entry.last_ndi[h_id as usize];
        harq.generation = harq.generation.wrapping_add(1);
        harq.ext = E::default();

        self.timeout_wheel.insert(&mut self.links, h, deadline);
        self.counters.nof_new_txs += 1;
        Some(h)
    }

    /// Return a process to its UE and to the pool. No-op on an empty record.
    pub fn dealloc_harq(&mut self, h: u32) {
        let harq = &mut self.harqs[h as usize];
        match harq.status {
            HarqState::Empty => return,
            HarqState::WaitingAck => self.timeout_wheel.remove(&mut self.links, h),
            HarqState::PendingRetx => self.pending_retxs.unlink(&mut self.links, h),
        }

        let entry = &mut self.ues[harq.ue_index as usize];
        entry.harqs[harq.h_id as usize] = NIL;
        entry.free_harq_ids.push(harq.h_id);
        self.free_harqs.push(h);
        harq.status = HarqState::Empty;
    }

    /// Final HARQ-ACK of a transmission. A NACK moves the process to pending
    /// retransmission unless its budget is spent, in which case it is discarded.
    pub fn handle_ack(&mut self, h: u32, ack: bool, diag: &mut dyn DiagnosticSink) {
        let harq = &self.harqs[h as usize];
        assert_eq!(harq.status, HarqState::WaitingAck, "HARQ-ACK for a process not waiting for one");

        if ack {
            self.counters.nof_acks += 1;
            self.dealloc_harq(h);
            return;
        }

        self.counters.nof_nacks += 1;
        if harq.nof_retxs >= harq.max_nof_harq_retxs {
            let cause = if harq.retxs_cancelled {
                DiscardCause::RetxsCancelled
            } else {
                DiscardCause::MaxRetxsExceeded(harq.max_nof_harq_retxs)
            };
            diag.on_event(&HarqEvent::HarqDiscarded {
                ue_index: harq.ue_index,
                dir: E::DIRECTION,
                h_id: harq.h_id,
                tbs_bytes: harq.ext.tbs_bytes(),
                cause,
            });
            self.counters.nof_discards += 1;
            self.dealloc_harq(h);
            return;
        }

        self.set_pending_retx(h);
    }

    fn set_pending_retx(&mut self, h: u32) {
        assert_eq!(self.harqs[h as usize].status, HarqState::WaitingAck);
        self.timeout_wheel.remove(&mut self.links, h);
        self.pending_retxs.push_back(&mut self.links, h);
        self.harqs[h as usize].status = HarqState::PendingRetx;
    }

    /// Start a retransmission of a NACKed process. Returns false if the process
    /// is not pending retransmission or the new HARQ-ACK deadline is out of range.
    pub fn new_retx(&mut self, h: u32, sl_tx: SlotPoint, sl_ack: SlotPoint) -> bool {
        if self.harqs[h as usize].status != HarqState::PendingRetx {
            return false;
        }
        let deadline = self.ack_deadline(sl_ack);
        if !self.is_deadline_in_range(deadline) {
            return false;
        }
        self.pending_retxs.unlink(&mut self.links, h);

        let harq = &mut self.harqs[h as usize];
        harq.status = HarqState::WaitingAck;
        harq.slot_tx = sl_tx;
        harq.slot_ack = sl_ack;
        harq.slot_ack_timeout = deadline;
        harq.nof_retxs += 1;
        harq.ack_on_timeout = false;

        self.timeout_wheel.insert(&mut self.links, h, deadline);
        self.counters.nof_retxs += 1;
        true
    }

    /// Stop retransmitting a process.
    ///
    /// A process waiting for HARQ-ACK keeps its slot until the outcome arrives and is
    /// dropped on its next NACK. A process already pending retransmission has no outcome
    /// left to wait for, so unlike the waiting case it is deallocated immediately.
    pub fn cancel_retxs(&mut self, h: u32, diag: &mut dyn DiagnosticSink) {
        let harq = &mut self.harqs[h as usize];
        match harq.status {
            HarqState::Empty => {}
            HarqState::WaitingAck => {
                harq.max_nof_harq_retxs = harq.nof_retxs;
                harq.retxs_cancelled = true;
            }
            HarqState::PendingRetx => {
                diag.on_event(&HarqEvent::HarqDiscarded {
                    ue_index: harq.ue_index,
                    dir: E::DIRECTION,
                    h_id: harq.h_id,
                    tbs_bytes: harq.ext.tbs_bytes(),
                    cause: DiscardCause::RetxsCancelled,
                });
                self.counters.nof_discards += 1;
                self.dealloc_harq(h);
            }
        }
    }

    /// Move the HARQ-ACK deadline of a process waiting for one
    pub fn reschedule_ack_timeout(&mut self, h: u32, deadline: SlotPoint) {
        assert_eq!(self.harqs[h as usize].status, HarqState::WaitingAck);
        self.timeout_wheel.remove(&mut self.links, h);
        self.harqs[h as usize].slot_ack_timeout = deadline;
        self.timeout_wheel.insert(&mut self.links, h, deadline);
    }

    /// Reserve h_ids 0..nof_harqs for a newly admitted UE
    pub fn reserve_ue_harqs(&mut self, ue: DuUeIndex, nof_harqs: u8) {
        assert!((ue as usize) < self.ues.len(), "ue={} exceeds the configured number of UEs", ue);
        assert!(
            nof_harqs > 0 && nof_harqs as usize <= MAX_NOF_HARQS,
            "invalid number of HARQ processes {}",
            nof_harqs
        );
        let entry = &mut self.ues[ue as usize];
        assert!(!entry.active, "ue={} already has HARQ processes reserved", ue);

        entry.active = true;
        entry.nof_harqs = nof_harqs;
        entry.harqs = [NIL; MAX_NOF_HARQS];
        entry.free_harq_ids.clear();
        // Reversed, so h_id 0 is handed out first
        entry.free_harq_ids.extend((0..nof_harqs).rev());
    }

    /// Release every process of `ue` and its h_id reservation. No-op for unknown UEs.
    pub fn destroy_ue_harqs(&mut self, ue: DuUeIndex) {
        let Some(entry) = self.ues.get(ue as usize) else {
            return;
        };
        if !entry.active {
            return;
        }
        let harqs = entry.harqs;
        for h in harqs.into_iter().filter(|&h| h != NIL) {
            self.dealloc_harq(h);
        }

        let entry = &mut self.ues[ue as usize];
        entry.active = false;
        entry.nof_harqs = 0;
        entry.free_harq_ids.clear();
    }

    /// Timeout deadline of a transmission acknowledged in `sl_ack`
    pub fn ack_deadline(&self, sl_ack: SlotPoint) -> SlotPoint {
        sl_ack.add_slots(self.max_ack_wait_in_slots as i32)
    }

    /// Whether the timeout wheel visits `deadline` no earlier than the deadline itself.
    /// Buckets repeat every `HARQ_TIMEOUT_RING_SIZE` slots, so the deadline must lie
    /// strictly after the last slot indication and less than a ring ahead of it.
    pub fn is_deadline_in_range(&self, deadline: SlotPoint) -> bool {
        self.last_sl_ind.is_none_or(|now| {
            let ahead = deadline.diff(now);
            ahead > 0 && (ahead as usize) < HARQ_TIMEOUT_RING_SIZE
        })
    }

    pub fn last_slot_indication(&self) -> Option<SlotPoint> {
        self.last_sl_ind
    }

    #[inline]
    pub fn harq(&self, h: u32) -> &HarqProcess<E> {
        &self.harqs[h as usize]
    }

    #[inline]
    pub fn harq_mut(&mut self, h: u32) -> &mut HarqProcess<E> {
        &mut self.harqs[h as usize]
    }

    /// Whether `h` still holds the allocation a view of the given generation was made for
    #[inline]
    pub fn is_same_generation(&self, h: u32, generation: u32) -> bool {
        self.harqs[h as usize].generation == generation
    }

    /// Pool slot of `ue`'s process `h_id`, if in use
    pub fn ue_harq(&self, ue: DuUeIndex, h_id: HarqId) -> Option<u32> {
        let entry = self.ues.get(ue as usize)?;
        let h = *entry.harqs.get(h_id as usize)?;
        if h == NIL { None } else { Some(h) }
    }

    /// Lowest h_id of `ue` in the given state
    pub fn find_ue_harq_in_state(&self, ue: DuUeIndex, state: HarqState) -> Option<u32> {
        self.find_ue_harq(ue, |h| h.status == state)
    }

    pub fn find_ue_harq<P>(&self, ue: DuUeIndex, pred: P) -> Option<u32>
    where
        P: Fn(&HarqProcess<E>) -> bool,
    {
        let entry = self.ues.get(ue as usize)?;
        entry.harqs[..entry.nof_harqs as usize]
            .iter()
            .copied()
            .filter(|&h| h != NIL)
            .find(|&h| pred(&self.harqs[h as usize]))
    }

    pub fn contains(&self, ue: DuUeIndex) -> bool {
        self.ues.get(ue as usize).is_some_and(|e| e.active)
    }

    /// Number of h_ids reserved for `ue`, 0 if it is not admitted
    pub fn nof_ue_harqs(&self, ue: DuUeIndex) -> u8 {
        self.ues.get(ue as usize).map_or(0, |e| e.nof_harqs)
    }

    pub fn nof_free_harqs(&self) -> usize {
        self.free_harqs.len()
    }

    pub fn capacity(&self) -> usize {
        self.harqs.len()
    }

    pub fn nof_pending_retxs(&self) -> usize {
        self.pending_retxs.len()
    }

    pub fn nof_waiting_ack(&self) -> usize {
        self.timeout_wheel.len()
    }

    pub fn max_ack_wait_in_slots(&self) -> u32 {
        self.max_ack_wait_in_slots
    }

    pub fn counters(&self) -> HarqCounters {
        self.counters
    }

    /// Panics if pool accounting or list membership is inconsistent
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let mut nof_busy = 0;
        for (h, harq) in self.harqs.iter().enumerate() {
            let member = self.links[h].member();
            match harq.status {
                HarqState::Empty => assert_eq!(member, ListTag::Detached, "empty slot {} is linked", h),
                HarqState::WaitingAck => {
                    nof_busy += 1;
                    let bucket = TimeoutWheel::bucket_index(harq.slot_ack_timeout) as u16;
                    assert_eq!(member, ListTag::TimeoutBucket(bucket), "slot {} in wrong bucket", h);
                }
                HarqState::PendingRetx => {
                    nof_busy += 1;
                    assert_eq!(member, ListTag::PendingRetx);
                }
            }
            if !harq.is_empty() {
                let entry = &self.ues[harq.ue_index as usize];
                assert!(entry.active);
                assert_eq!(entry.harqs[harq.h_id as usize], h as u32);
                assert!(harq.nof_retxs <= harq.max_nof_harq_retxs);
            }
        }
        assert_eq!(nof_busy + self.free_harqs.len(), self.capacity());
        assert_eq!(nof_busy, self.timeout_wheel.len() + self.pending_retxs.len());

        for entry in self.ues.iter().filter(|e| e.active) {
            let nof_used = entry.harqs.iter().filter(|&&h| h != NIL).count();
            assert_eq!(nof_used + entry.free_harq_ids.len(), entry.nof_harqs as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harq_process::{DlHarqExt, UlHarqExt};
    use nrsched_core::Direction;
    use proptest::prelude::*;

    type Timeouts = Vec<(DuUeIndex, Direction, bool)>;

    fn sl(count: u32) -> SlotPoint {
        SlotPoint::from_count(0, count)
    }

    fn noop_sink() -> impl FnMut(&HarqEvent) {
        |_: &HarqEvent| {}
    }

    #[test]
    fn test_alloc_until_exhausted() {
        let mut repo = HarqRepository::<UlHarqExt>::new(2, 8);
        repo.reserve_ue_harqs(0, 3);
        let h_ids: Vec<HarqId> = (0..3)
            .map(|_| repo.alloc_harq(0, sl(10), sl(14), 4).map(|h| repo.harq(h).h_id).unwrap())
            .collect();
        assert_eq!(h_ids, vec![0, 1, 2]);
        assert_eq!(repo.alloc_harq(0, sl(10), sl(14), 4), None);
        assert_eq!(repo.nof_free_harqs(), repo.capacity() - 3);
        repo.check_invariants();
    }

    #[test]
    fn test_timeout_fires_once_at_deadline() {
        let mut repo = HarqRepository::<DlHarqExt>::new(1, 8);
        repo.reserve_ue_harqs(0, 16);
        let h = repo.alloc_harq(0, sl(100), sl(104), 4).unwrap();
        assert_eq!(repo.harq(h).slot_ack_timeout, sl(112));

        let mut timeouts: Timeouts = vec![];
        let mut sink = noop_sink();
        for count in 100..160 {
            let mut notifier = |ue: DuUeIndex, dir: Direction, ack: bool| timeouts.push((ue, dir, ack));
            repo.slot_indication(sl(count), &mut notifier, &mut sink);
            if count == 111 {
                assert!(!repo.harq(h).is_empty());
            }
        }
        assert_eq!(timeouts, vec![(0, Direction::Dl, false)]);
        assert_eq!(repo.nof_free_harqs(), repo.capacity());
        assert_eq!(repo.counters().nof_timeouts, 1);
    }

    #[test]
    fn test_single_slot_wait_suppresses_notification() {
        let mut repo = HarqRepository::<UlHarqExt>::new(1, 1);
        repo.reserve_ue_harqs(0, 1);
        repo.alloc_harq(0, sl(5), sl(5), 0).unwrap();

        let mut nof_notified = 0;
        let mut events = vec![];
        let mut notifier = |_: DuUeIndex, _: Direction, _: bool| nof_notified += 1;
        let mut sink = |ev: &HarqEvent| events.push(ev.clone());
        repo.slot_indication(sl(6), &mut notifier, &mut sink);

        assert_eq!(nof_notified, 0);
        assert!(events.is_empty());
        assert_eq!(repo.counters().nof_timeouts, 1);
        assert_eq!(repo.nof_free_harqs(), repo.capacity());
    }

    #[test]
    fn test_retx_budget() {
        let mut repo = HarqRepository::<UlHarqExt>::new(1, 8);
        let mut events = vec![];
        let mut sink = |ev: &HarqEvent| events.push(ev.clone());
        repo.reserve_ue_harqs(0, 4);

        let h = repo.alloc_harq(0, sl(0), sl(0), 2).unwrap();
        for retx in 1..=2u32 {
            repo.handle_ack(h, false, &mut sink);
            assert!(repo.harq(h).has_pending_retx());
            assert_eq!(repo.find_ue_harq_in_state(0, HarqState::PendingRetx), Some(h));
            assert!(repo.new_retx(h, sl(retx * 10), sl(retx * 10)));
            assert_eq!(repo.harq(h).nof_retxs as u32, retx);
        }
        repo.handle_ack(h, false, &mut sink);
        assert!(repo.harq(h).is_empty());
        assert!(!repo.new_retx(h, sl(40), sl(40)));
        assert_eq!(
            events,
            vec![HarqEvent::HarqDiscarded {
                ue_index: 0,
                dir: Direction::Ul,
                h_id: 0,
                tbs_bytes: 0,
                cause: DiscardCause::MaxRetxsExceeded(2),
            }]
        );
        let counters = repo.counters();
        assert_eq!((counters.nof_nacks, counters.nof_retxs, counters.nof_discards), (3, 2, 1));
        repo.check_invariants();
    }

    #[test]
    fn test_deadline_beyond_wheel_is_rejected() {
        let mut repo = HarqRepository::<DlHarqExt>::new(1, 8);
        let mut sink = noop_sink();
        let mut notifier = |_: DuUeIndex, _: Direction, _: bool| {};
        repo.reserve_ue_harqs(0, 4);
        repo.slot_indication(sl(0), &mut notifier, &mut sink);

        // 35 + 8 slots ahead would land in the bucket visited at slot 3
        assert_eq!(repo.alloc_harq(0, sl(0), sl(35), 4), None);
        assert_eq!(repo.nof_free_harqs(), repo.capacity());
        assert_eq!(repo.ue_harq(0, 0), None);

        let h = repo.alloc_harq(0, sl(0), sl(31), 4).unwrap();
        assert_eq!(repo.harq(h).slot_ack_timeout, sl(39));
        for count in 1..39 {
            repo.slot_indication(sl(count), &mut notifier, &mut sink);
        }
        assert!(repo.harq(h).is_waiting_ack());
        repo.handle_ack(h, false, &mut sink);

        // A retransmission with an unreachable deadline leaves the process pending
        let now = sl(38);
        assert!(!repo.new_retx(h, now, now.add_slots(32)));
        assert!(repo.harq(h).has_pending_retx());
        assert!(!repo.new_retx(h, now, now.add_slots(-8)));
        assert!(repo.new_retx(h, now, now.add_slots(31)));
        assert_eq!(repo.harq(h).slot_ack_timeout, now.add_slots(39));
        repo.check_invariants();
    }

    #[test]
    fn test_cancel_retxs() {
        let mut repo = HarqRepository::<DlHarqExt>::new(1, 8);
        let mut sink = noop_sink();
        repo.reserve_ue_harqs(0, 2);

        // Waiting for HARQ-ACK: discarded on the next NACK
        let h0 = repo.alloc_harq(0, sl(0), sl(4), 4).unwrap();
        repo.cancel_retxs(h0, &mut sink);
        assert!(repo.harq(h0).is_waiting_ack());
        repo.handle_ack(h0, false, &mut sink);
        assert!(repo.harq(h0).is_empty());

        // Pending retransmission: discarded at once
        let h1 = repo.alloc_harq(0, sl(1), sl(5), 4).unwrap();
        repo.handle_ack(h1, false, &mut sink);
        repo.cancel_retxs(h1, &mut sink);
        assert!(repo.harq(h1).is_empty());
        assert_eq!(repo.nof_pending_retxs(), 0);
        repo.check_invariants();
    }

    #[test]
    fn test_destroy_ue_is_idempotent() {
        let mut repo = HarqRepository::<DlHarqExt>::new(2, 8);
        let mut sink = noop_sink();
        repo.reserve_ue_harqs(1, 8);
        for i in 0..8 {
            let h = repo.alloc_harq(1, sl(i), sl(i + 4), 4).unwrap();
            if i % 2 == 0 {
                repo.handle_ack(h, false, &mut sink);
            }
        }
        repo.destroy_ue_harqs(1);
        assert!(!repo.contains(1));
        assert_eq!(repo.nof_free_harqs(), repo.capacity());
        repo.destroy_ue_harqs(1);
        repo.destroy_ue_harqs(1000);
        assert_eq!(repo.nof_free_harqs(), repo.capacity());
        repo.check_invariants();

        // The UE can be admitted again
        repo.reserve_ue_harqs(1, 2);
        assert!(repo.alloc_harq(1, sl(0), sl(4), 4).is_some());
    }

    #[test]
    fn test_ndi_toggles_per_harq_id() {
        let mut repo = HarqRepository::<DlHarqExt>::new(1, 8);
        let mut sink = noop_sink();
        repo.reserve_ue_harqs(0, 1);
        let mut ndis = vec![];
        for i in 0..4 {
            let h = repo.alloc_harq(0, sl(i), sl(i + 4), 4).unwrap();
            ndis.push(repo.harq(h).ndi);
            repo.handle_ack(h, true, &mut sink);
        }
        assert_eq!(ndis, vec![true, false, true, false]);
    }

    #[test]
    #[should_panic(expected = "already has HARQ processes reserved")]
    fn test_double_reservation() {
        let mut repo = HarqRepository::<DlHarqExt>::new(1, 8);
        repo.reserve_ue_harqs(0, 4);
        repo.reserve_ue_harqs(0, 4);
    }

    #[test]
    #[should_panic(expected = "max_ack_wait_in_slots")]
    fn test_ack_wait_must_fit_ring() {
        HarqRepository::<DlHarqExt>::new(1, HARQ_TIMEOUT_RING_SIZE as u32);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Alloc { ue: u16, k: u8 },
        Ack { ue: u16, h_id: u8, ack: bool },
        Retx { ue: u16, k: u8 },
        Cancel { ue: u16, h_id: u8 },
        Slot,
        Destroy { ue: u16 },
        Reserve { ue: u16, n: u8 },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0..3u16, 1..12u8).prop_map(|(ue, k)| Op::Alloc { ue, k }),
            3 => (0..3u16, 0..16u8, any::<bool>()).prop_map(|(ue, h_id, ack)| Op::Ack { ue, h_id, ack }),
            2 => (0..3u16, 1..12u8).prop_map(|(ue, k)| Op::Retx { ue, k }),
            1 => (0..3u16, 0..16u8).prop_map(|(ue, h_id)| Op::Cancel { ue, h_id }),
            4 => Just(Op::Slot),
            1 => (0..3u16).prop_map(|ue| Op::Destroy { ue }),
            1 => (0..3u16, 1..=16u8).prop_map(|(ue, n)| Op::Reserve { ue, n }),
        ]
    }

    proptest! {
        #[test]
        fn prop_pool_conservation_and_membership(ops in proptest::collection::vec(op_strategy(), 1..400)) {
            let mut repo = HarqRepository::<DlHarqExt>::new(3, 6);
            let mut sink = noop_sink();
            let mut notifier = |_: DuUeIndex, _: Direction, _: bool| {};
            let mut now = sl(0);

            for op in ops {
                match op {
                    Op::Alloc { ue, k } => {
                        if repo.contains(ue) {
                            let budget = repo.nof_ue_harqs(ue) as usize;
                            let h = repo.alloc_harq(ue, now, now.add_slots(k as i32), 2);
                            let nof_in_use = (0..16).filter(|&id| repo.ue_harq(ue, id).is_some()).count();
                            prop_assert!(nof_in_use <= budget);
                            if let Some(h) = h {
                                prop_assert_eq!(repo.harq(h).slot_ack_timeout, now.add_slots(k as i32 + 6));
                            }
                        }
                    }
                    Op::Ack { ue, h_id, ack } => {
                        if let Some(h) = repo.ue_harq(ue, h_id) {
                            if repo.harq(h).is_waiting_ack() {
                                repo.handle_ack(h, ack, &mut sink);
                            }
                        }
                    }
                    Op::Retx { ue, k } => {
                        if let Some(h) = repo.find_ue_harq_in_state(ue, HarqState::PendingRetx) {
                            prop_assert!(repo.new_retx(h, now, now.add_slots(k as i32)));
                        }
                    }
                    Op::Cancel { ue, h_id } => {
                        if let Some(h) = repo.ue_harq(ue, h_id) {
                            repo.cancel_retxs(h, &mut sink);
                        }
                    }
                    Op::Slot => {
                        now = now.add_slots(1);
                        repo.slot_indication(now, &mut notifier, &mut sink);
                    }
                    Op::Destroy { ue } => repo.destroy_ue_harqs(ue),
                    Op::Reserve { ue, n } => {
                        if !repo.contains(ue) {
                            repo.reserve_ue_harqs(ue, n);
                        }
                    }
                }
                repo.check_invariants();
            }
        }
    }
}
