use std::cell::RefCell;
use std::rc::Rc;

use core::fmt;

use nrsched_config::SharedConfig;
use nrsched_core::{assert_warn, Direction, DuUeIndex, HarqAckStatus, Rnti, SHORT_ACK_TIMEOUT_DTX, SlotPoint};

use crate::diag::{DiagnosticSink, HarqEvent, TracingDiagnosticSink};
use crate::harq_process::{DlHarqExt, DlTxParams, HarqDirection, UlHarqExt, UlTxParams};
use crate::notifier::HarqTimeoutNotifier;
use crate::repository::{HarqCounters, HarqRepository};
use crate::ue_harq_entity::UniqueUeHarqEntity;

/// Outcome of a DL HARQ-ACK report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlHarqStatusUpdate {
    Acked,
    Nacked,
    /// More HARQ-ACK occasions are expected before a decision is made
    NoUpdate,
    /// The process was not waiting for a HARQ-ACK. Nothing changed.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqErr {
    NotWaitingAck,
    StaleProcess,
}

impl fmt::Display for HarqErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarqErr::NotWaitingAck => write!(f, "HARQ process is not waiting for an acknowledgment"),
            HarqErr::StaleProcess => write!(f, "HARQ process was reallocated"),
        }
    }
}

impl std::error::Error for HarqErr {}

/// Both HARQ repositories of a cell plus the collaborators they report to
pub(crate) struct CellHarqState {
    pub(crate) dl: HarqRepository<DlHarqExt>,
    pub(crate) ul: HarqRepository<UlHarqExt>,
    last_sl_ind: Option<SlotPoint>,
    notifier: Box<dyn HarqTimeoutNotifier>,
    diag: Box<dyn DiagnosticSink>,
}

/// Reports a call through a view whose record has been reallocated since
fn check_generation<E: HarqDirection>(
    repo: &HarqRepository<E>,
    diag: &mut dyn DiagnosticSink,
    h: u32,
    generation: u32,
) -> bool {
    if repo.is_same_generation(h, generation) {
        return true;
    }
    diag.on_event(&HarqEvent::StaleProcessView {
        dir: E::DIRECTION,
        h_id: repo.harq(h).h_id,
    });
    false
}

/// Reports a HARQ-ACK or CRC for a record that is not waiting for one
fn check_waiting_ack<E: HarqDirection>(repo: &HarqRepository<E>, diag: &mut dyn DiagnosticSink, h: u32) -> bool {
    let harq = repo.harq(h);
    if harq.is_waiting_ack() {
        return true;
    }
    diag.on_event(&HarqEvent::AckForInactiveHarq {
        ue_index: harq.ue_index,
        dir: E::DIRECTION,
        h_id: harq.h_id,
        status: harq.status,
    });
    false
}

/// Reports a transmission whose HARQ-ACK deadline the timeout wheel would visit too early
fn check_ack_deadline<E: HarqDirection>(
    repo: &HarqRepository<E>,
    diag: &mut dyn DiagnosticSink,
    ue_index: DuUeIndex,
    slot_ack: SlotPoint,
) -> bool {
    let deadline = repo.ack_deadline(slot_ack);
    if repo.is_deadline_in_range(deadline) {
        return true;
    }
    diag.on_event(&HarqEvent::AckDeadlineOutOfRange {
        ue_index,
        dir: E::DIRECTION,
        deadline,
        slot: repo.last_slot_indication().unwrap_or(deadline),
    });
    false
}

impl CellHarqState {
    fn slot_indication(&mut self, sl: SlotPoint) {
        self.last_sl_ind = Some(sl);
        self.dl.slot_indication(sl, self.notifier.as_mut(), self.diag.as_mut());
        self.ul.slot_indication(sl, self.notifier.as_mut(), self.diag.as_mut());
    }

    fn add_ue(&mut self, ue_index: DuUeIndex, crnti: Rnti, nof_dl_harqs: u8, nof_ul_harqs: u8) {
        assert_warn!(crnti.is_crnti(), "ue={} admitted with {} outside the C-RNTI range", ue_index, crnti);
        self.dl.reserve_ue_harqs(ue_index, nof_dl_harqs);
        self.ul.reserve_ue_harqs(ue_index, nof_ul_harqs);
        self.diag.on_event(&HarqEvent::UeAdded {
            ue_index,
            crnti,
            nof_dl_harqs,
            nof_ul_harqs,
        });
    }

    pub(crate) fn destroy_ue(&mut self, ue_index: DuUeIndex) {
        if !self.dl.contains(ue_index) && !self.ul.contains(ue_index) {
            return;
        }
        self.dl.destroy_ue_harqs(ue_index);
        self.ul.destroy_ue_harqs(ue_index);
        self.diag.on_event(&HarqEvent::UeRemoved { ue_index });
    }

    pub(crate) fn new_dl_tx(
        &mut self,
        ue_index: DuUeIndex,
        pdsch_slot: SlotPoint,
        k1: u32,
        max_harq_nof_retxs: u8,
        harq_bit_idx: u8,
    ) -> Option<u32> {
        let uci_slot = pdsch_slot.add_slots(k1 as i32);
        if !check_ack_deadline(&self.dl, self.diag.as_mut(), ue_index, uci_slot) {
            return None;
        }
        let h = self.dl.alloc_harq(ue_index, pdsch_slot, uci_slot, max_harq_nof_retxs)?;
        let ext = &mut self.dl.harq_mut(h).ext;
        ext.harq_bit_idx = harq_bit_idx;
        ext.pucch_ack_to_receive = 0;
        Some(h)
    }

    pub(crate) fn new_ul_tx(&mut self, ue_index: DuUeIndex, pusch_slot: SlotPoint, max_harq_nof_retxs: u8) -> Option<u32> {
        if !check_ack_deadline(&self.ul, self.diag.as_mut(), ue_index, pusch_slot) {
            return None;
        }
        self.ul.alloc_harq(ue_index, pusch_slot, pusch_slot, max_harq_nof_retxs)
    }

    pub(crate) fn new_dl_retx(
        &mut self,
        h: u32,
        generation: u32,
        pdsch_slot: SlotPoint,
        k1: u32,
        harq_bit_idx: u8,
    ) -> bool {
        if !check_generation(&self.dl, self.diag.as_mut(), h, generation) {
            return false;
        }
        let uci_slot = pdsch_slot.add_slots(k1 as i32);
        let harq = self.dl.harq(h);
        if harq.has_pending_retx() && !check_ack_deadline(&self.dl, self.diag.as_mut(), harq.ue_index, uci_slot) {
            return false;
        }
        if !self.dl.new_retx(h, pdsch_slot, uci_slot) {
            return false;
        }
        let ext = &mut self.dl.harq_mut(h).ext;
        ext.harq_bit_idx = harq_bit_idx;
        ext.pucch_ack_to_receive = 0;
        ext.chosen_ack = HarqAckStatus::Dtx;
        ext.last_pucch_snr = None;
        true
    }

    pub(crate) fn new_ul_retx(&mut self, h: u32, generation: u32, pusch_slot: SlotPoint) -> bool {
        if !check_generation(&self.ul, self.diag.as_mut(), h, generation) {
            return false;
        }
        let harq = self.ul.harq(h);
        if harq.has_pending_retx() && !check_ack_deadline(&self.ul, self.diag.as_mut(), harq.ue_index, pusch_slot) {
            return false;
        }
        self.ul.new_retx(h, pusch_slot, pusch_slot)
    }

    /// Merge one DL HARQ-ACK occasion into the process and decide once the last one arrived
    pub(crate) fn dl_ack_info(
        &mut self,
        h: u32,
        generation: u32,
        ack: HarqAckStatus,
        pucch_snr: Option<f32>,
    ) -> DlHarqStatusUpdate {
        if !check_generation(&self.dl, self.diag.as_mut(), h, generation)
            || !check_waiting_ack(&self.dl, self.diag.as_mut(), h)
        {
            return DlHarqStatusUpdate::Error;
        }

        let harq = self.dl.harq_mut(h);
        harq.ext.merge_ack(ack, pucch_snr);

        if harq.ext.pucch_ack_to_receive <= 1 {
            let final_ack = harq.ext.chosen_ack.is_ack();
            self.dl.handle_ack(h, final_ack, self.diag.as_mut());
            return if final_ack { DlHarqStatusUpdate::Acked } else { DlHarqStatusUpdate::Nacked };
        }

        // Remaining occasions are due shortly, don't hold the process for the full wait
        harq.ext.pucch_ack_to_receive -= 1;
        harq.ack_on_timeout = harq.ext.chosen_ack.is_ack();
        let deadline = self
            .last_sl_ind
            .unwrap_or(harq.slot_ack)
            .add_slots(SHORT_ACK_TIMEOUT_DTX as i32);
        self.dl.reschedule_ack_timeout(h, deadline);
        DlHarqStatusUpdate::NoUpdate
    }

    /// Returns the TBS delivered on CRC pass and 0 on CRC fail
    pub(crate) fn ul_crc_info(&mut self, h: u32, generation: u32, ack: bool) -> Result<u32, HarqErr> {
        if !check_generation(&self.ul, self.diag.as_mut(), h, generation) {
            return Err(HarqErr::StaleProcess);
        }
        if !check_waiting_ack(&self.ul, self.diag.as_mut(), h) {
            return Err(HarqErr::NotWaitingAck);
        }

        let tbs = self.ul.harq(h).ext.prev_tx_params.tbs_bytes;
        self.ul.handle_ack(h, ack, self.diag.as_mut());
        Ok(if ack { tbs } else { 0 })
    }

    pub(crate) fn increment_pucch_counter(&mut self, h: u32, generation: u32) {
        if check_generation(&self.dl, self.diag.as_mut(), h, generation) && !self.dl.harq(h).is_empty() {
            let ext = &mut self.dl.harq_mut(h).ext;
            ext.pucch_ack_to_receive = ext.pucch_ack_to_receive.saturating_add(1);
        }
    }

    pub(crate) fn save_dl_alloc_params(&mut self, h: u32, generation: u32, params: DlTxParams) {
        if check_generation(&self.dl, self.diag.as_mut(), h, generation) && !self.dl.harq(h).is_empty() {
            self.dl.harq_mut(h).ext.prev_tx_params = params;
        }
    }

    pub(crate) fn save_ul_alloc_params(&mut self, h: u32, generation: u32, params: UlTxParams) {
        if check_generation(&self.ul, self.diag.as_mut(), h, generation) && !self.ul.harq(h).is_empty() {
            self.ul.harq_mut(h).ext.prev_tx_params = params;
        }
    }

    pub(crate) fn cancel_retxs(&mut self, dir: Direction, h: u32, generation: u32) {
        match dir {
            Direction::Dl => {
                if check_generation(&self.dl, self.diag.as_mut(), h, generation) {
                    self.dl.cancel_retxs(h, self.diag.as_mut());
                }
            }
            Direction::Ul => {
                if check_generation(&self.ul, self.diag.as_mut(), h, generation) {
                    self.ul.cancel_retxs(h, self.diag.as_mut());
                }
            }
        }
    }
}

/// HARQ processes of all UEs of one cell.
///
/// Cheap to clone: clones share the same state. The manager is driven from a single
/// execution context, which `Rc` enforces by making it `!Send`. None of the calls are
/// reentrant, so the timeout notifier and diagnostic sink must not call back into it.
/// The one exception is releasing a UE: a UE entity dropped from inside a callback is
/// queued and released at the next slot indication or admission.
#[derive(Clone)]
pub struct CellHarqManager {
    pub(crate) state: Rc<RefCell<CellHarqState>>,
    /// UEs whose entity was dropped while the state was borrowed. Sized for every UE.
    deferred_removals: Rc<RefCell<Vec<DuUeIndex>>>,
}

impl CellHarqManager {
    pub fn new<N>(max_ues: usize, max_ack_wait_in_slots: u32, notifier: N) -> Self
    where
        N: HarqTimeoutNotifier + 'static,
    {
        Self::with_diagnostic_sink(max_ues, max_ack_wait_in_slots, notifier, TracingDiagnosticSink::new(0))
    }

    pub fn with_diagnostic_sink<N, D>(max_ues: usize, max_ack_wait_in_slots: u32, notifier: N, diag: D) -> Self
    where
        N: HarqTimeoutNotifier + 'static,
        D: DiagnosticSink + 'static,
    {
        let state = CellHarqState {
            dl: HarqRepository::new(max_ues, max_ack_wait_in_slots),
            ul: HarqRepository::new(max_ues, max_ack_wait_in_slots),
            last_sl_ind: None,
            notifier: Box::new(notifier),
            diag: Box::new(diag),
        };
        Self {
            state: Rc::new(RefCell::new(state)),
            deferred_removals: Rc::new(RefCell::new(Vec::with_capacity(max_ues))),
        }
    }

    /// Builds the HARQ manager of the configured cell, logging through `tracing`
    pub fn from_config<N>(config: &SharedConfig, notifier: N) -> Self
    where
        N: HarqTimeoutNotifier + 'static,
    {
        let cfg = config.config();
        Self::with_diagnostic_sink(
            cfg.harq.max_ues,
            cfg.harq.max_ack_wait_slots,
            notifier,
            TracingDiagnosticSink::new(cfg.cell.cell_index),
        )
    }

    /// Advance the slot clock. Must be called once for every slot, in order.
    pub fn slot_indication(&self, sl: SlotPoint) {
        let mut state = self.state.borrow_mut();
        self.release_deferred_ues(&mut state);
        state.slot_indication(sl);
    }

    /// Admit a UE and reserve its HARQ processes. The processes are released when the
    /// returned entity is dropped or reset. Panics if the UE is already admitted.
    pub fn add_ue(&self, ue_index: DuUeIndex, crnti: Rnti, nof_dl_harqs: u8, nof_ul_harqs: u8) -> UniqueUeHarqEntity {
        let mut state = self.state.borrow_mut();
        self.release_deferred_ues(&mut state);
        state.add_ue(ue_index, crnti, nof_dl_harqs, nof_ul_harqs);
        drop(state);
        UniqueUeHarqEntity::new(self.clone(), ue_index, crnti)
    }

    /// False once the UE entity is gone, even if its release is still queued
    pub fn contains(&self, ue_index: DuUeIndex) -> bool {
        self.state.borrow().dl.contains(ue_index) && !self.deferred_removals.borrow().contains(&ue_index)
    }

    /// Release every process of a UE, now if possible, else at the next slot indication
    pub(crate) fn release_ue(&self, ue_index: DuUeIndex) {
        match self.state.try_borrow_mut() {
            Ok(mut state) => state.destroy_ue(ue_index),
            Err(_) => {
                tracing::debug!("ue={}: cell busy, HARQ release deferred", ue_index);
                self.deferred_removals.borrow_mut().push(ue_index);
            }
        }
    }

    fn release_deferred_ues(&self, state: &mut CellHarqState) {
        if self.deferred_removals.borrow().is_empty() {
            return;
        }
        // Taken out so that entities dropped by the diagnostic sink can queue themselves
        let mut ues = std::mem::take(&mut *self.deferred_removals.borrow_mut());
        for ue_index in ues.drain(..) {
            state.destroy_ue(ue_index);
        }
        let mut deferred = self.deferred_removals.borrow_mut();
        if deferred.is_empty() {
            // Keep the preallocated buffer
            *deferred = ues;
        }
    }

    pub fn last_slot_indication(&self) -> Option<SlotPoint> {
        self.state.borrow().last_sl_ind
    }

    pub fn nof_free_dl_harqs(&self) -> usize {
        self.state.borrow().dl.nof_free_harqs()
    }

    pub fn nof_free_ul_harqs(&self) -> usize {
        self.state.borrow().ul.nof_free_harqs()
    }

    /// Size of each of the DL and UL pools
    pub fn harq_pool_capacity(&self) -> usize {
        self.state.borrow().dl.capacity()
    }

    pub fn nof_pending_dl_retxs(&self) -> usize {
        self.state.borrow().dl.nof_pending_retxs()
    }

    pub fn nof_pending_ul_retxs(&self) -> usize {
        self.state.borrow().ul.nof_pending_retxs()
    }

    pub fn dl_counters(&self) -> HarqCounters {
        self.state.borrow().dl.counters()
    }

    pub fn ul_counters(&self) -> HarqCounters {
        self.state.borrow().ul.counters()
    }

    pub(crate) fn same_cell(&self, other: &CellHarqManager) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for CellHarqManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow() {
            Ok(s) => f
                .debug_struct("CellHarqManager")
                .field("last_sl_ind", &s.last_sl_ind)
                .field("free_dl_harqs", &s.dl.nof_free_harqs())
                .field("free_ul_harqs", &s.ul.nof_free_harqs())
                .finish(),
            Err(_) => f.write_str("CellHarqManager { <borrowed> }"),
        }
    }
}
