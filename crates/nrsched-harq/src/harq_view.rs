//! Handles to single HARQ processes.
//!
//! A view is a pool index plus the allocation generation it was created for. It owns no
//! process state; reports made through it are forwarded to the cell. When the process is
//! released and its pool slot reused, the view turns stale and its mutating calls are
//! rejected.
//!
//! `id`, `ue_index` and `ndi` are fixed for the lifetime of an allocation and are captured
//! when the view is made, so they stay correct on a stale view. The remaining getters read
//! the live record and, on a stale view, describe whatever now occupies the pool slot.
//! Check `is_stale` or `empty` before relying on them.

use core::fmt;

use nrsched_core::{Direction, DuUeIndex, HarqAckStatus, HarqId, SlotPoint};

use crate::cell_harq_manager::{CellHarqManager, DlHarqStatusUpdate, HarqErr};
use crate::harq_process::{DlTxParams, HarqState, UlTxParams};

/// Getters shared by the DL and UL views. `$repo` names the repository field.
macro_rules! common_view_getters {
    ($repo:ident) => {
        /// HARQ process identifier, unique per UE and direction
        pub fn id(&self) -> HarqId {
            self.h_id
        }

        pub fn ue_index(&self) -> DuUeIndex {
            self.ue_index
        }

        pub fn ndi(&self) -> bool {
            self.ndi
        }

        pub fn nof_retxs(&self) -> u8 {
            self.cell.state.borrow().$repo.harq(self.h_ref).nof_retxs
        }

        pub fn max_nof_retxs(&self) -> u8 {
            self.cell.state.borrow().$repo.harq(self.h_ref).max_nof_harq_retxs
        }

        pub fn is_waiting_ack(&self) -> bool {
            !self.is_stale() && self.status() == HarqState::WaitingAck
        }

        pub fn has_pending_retx(&self) -> bool {
            !self.is_stale() && self.status() == HarqState::PendingRetx
        }

        /// True once the process was released, whether or not its slot was reused
        pub fn empty(&self) -> bool {
            self.is_stale() || self.status() == HarqState::Empty
        }

        /// True if the pool slot now holds a different allocation
        pub fn is_stale(&self) -> bool {
            !self.cell.state.borrow().$repo.is_same_generation(self.h_ref, self.generation)
        }

        pub fn ack_timeout_slot(&self) -> SlotPoint {
            self.cell.state.borrow().$repo.harq(self.h_ref).slot_ack_timeout
        }

        fn status(&self) -> HarqState {
            self.cell.state.borrow().$repo.harq(self.h_ref).status
        }
    };
}

#[derive(Clone)]
pub struct DlHarqProcessView {
    cell: CellHarqManager,
    h_ref: u32,
    generation: u32,
    ue_index: DuUeIndex,
    h_id: HarqId,
    ndi: bool,
}

impl DlHarqProcessView {
    pub(crate) fn new(cell: CellHarqManager, h_ref: u32) -> Self {
        let (generation, ue_index, h_id, ndi) = {
            let state = cell.state.borrow();
            let harq = state.dl.harq(h_ref);
            (harq.generation, harq.ue_index, harq.h_id, harq.ndi)
        };
        Self {
            cell,
            h_ref,
            generation,
            ue_index,
            h_id,
            ndi,
        }
    }

    common_view_getters!(dl);

    pub fn pdsch_slot(&self) -> SlotPoint {
        self.cell.state.borrow().dl.harq(self.h_ref).slot_tx
    }

    /// Slot of the UCI carrying the HARQ-ACK
    pub fn uci_slot(&self) -> SlotPoint {
        self.cell.state.borrow().dl.harq(self.h_ref).slot_ack
    }

    pub fn harq_bit_idx(&self) -> u8 {
        self.cell.state.borrow().dl.harq(self.h_ref).ext.harq_bit_idx
    }

    pub fn pucch_ack_to_receive(&self) -> u8 {
        self.cell.state.borrow().dl.harq(self.h_ref).ext.pucch_ack_to_receive
    }

    pub fn chosen_ack(&self) -> HarqAckStatus {
        self.cell.state.borrow().dl.harq(self.h_ref).ext.chosen_ack
    }

    pub fn prev_tx_params(&self) -> DlTxParams {
        self.cell.state.borrow().dl.harq(self.h_ref).ext.prev_tx_params
    }

    /// Report the HARQ-ACK received on one PUCCH/PUSCH occasion, with its SNR if known
    pub fn dl_ack_info(&self, ack: HarqAckStatus, pucch_snr: Option<f32>) -> DlHarqStatusUpdate {
        self.cell
            .state
            .borrow_mut()
            .dl_ack_info(self.h_ref, self.generation, ack, pucch_snr)
    }

    /// Retransmit a NACKed process. Returns false if it is not pending retransmission.
    pub fn new_retx(&self, pdsch_slot: SlotPoint, k1: u32, harq_bit_idx: u8) -> bool {
        self.cell
            .state
            .borrow_mut()
            .new_dl_retx(self.h_ref, self.generation, pdsch_slot, k1, harq_bit_idx)
    }

    /// Register one more UCI occasion expected to carry this process' HARQ-ACK bit
    pub fn increment_pucch_counter(&self) {
        self.cell
            .state
            .borrow_mut()
            .increment_pucch_counter(self.h_ref, self.generation);
    }

    pub fn cancel_retxs(&self) {
        self.cell
            .state
            .borrow_mut()
            .cancel_retxs(Direction::Dl, self.h_ref, self.generation);
    }

    pub fn save_alloc_params(&self, params: DlTxParams) {
        self.cell
            .state
            .borrow_mut()
            .save_dl_alloc_params(self.h_ref, self.generation, params);
    }
}

#[derive(Clone)]
pub struct UlHarqProcessView {
    cell: CellHarqManager,
    h_ref: u32,
    generation: u32,
    ue_index: DuUeIndex,
    h_id: HarqId,
    ndi: bool,
}

impl UlHarqProcessView {
    pub(crate) fn new(cell: CellHarqManager, h_ref: u32) -> Self {
        let (generation, ue_index, h_id, ndi) = {
            let state = cell.state.borrow();
            let harq = state.ul.harq(h_ref);
            (harq.generation, harq.ue_index, harq.h_id, harq.ndi)
        };
        Self {
            cell,
            h_ref,
            generation,
            ue_index,
            h_id,
            ndi,
        }
    }

    common_view_getters!(ul);

    pub fn pusch_slot(&self) -> SlotPoint {
        self.cell.state.borrow().ul.harq(self.h_ref).slot_tx
    }

    pub fn prev_tx_params(&self) -> UlTxParams {
        self.cell.state.borrow().ul.harq(self.h_ref).ext.prev_tx_params
    }

    /// Report the PUSCH CRC. Returns the bytes delivered, 0 on CRC failure.
    pub fn ul_crc_info(&self, ack: bool) -> Result<u32, HarqErr> {
        self.cell
            .state
            .borrow_mut()
            .ul_crc_info(self.h_ref, self.generation, ack)
    }

    pub fn new_retx(&self, pusch_slot: SlotPoint) -> bool {
        self.cell
            .state
            .borrow_mut()
            .new_ul_retx(self.h_ref, self.generation, pusch_slot)
    }

    pub fn cancel_retxs(&self) {
        self.cell
            .state
            .borrow_mut()
            .cancel_retxs(Direction::Ul, self.h_ref, self.generation);
    }

    pub fn save_alloc_params(&self, params: UlTxParams) {
        self.cell
            .state
            .borrow_mut()
            .save_ul_alloc_params(self.h_ref, self.generation, params);
    }
}

impl PartialEq for DlHarqProcessView {
    fn eq(&self, other: &Self) -> bool {
        self.cell.same_cell(&other.cell) && self.h_ref == other.h_ref && self.generation == other.generation
    }
}

impl Eq for DlHarqProcessView {}

impl PartialEq for UlHarqProcessView {
    fn eq(&self, other: &Self) -> bool {
        self.cell.same_cell(&other.cell) && self.h_ref == other.h_ref && self.generation == other.generation
    }
}

impl Eq for UlHarqProcessView {}

impl fmt::Debug for DlHarqProcessView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DlHarqProcessView")
            .field("ue_index", &self.ue_index)
            .field("h_id", &self.h_id)
            .field("h_ref", &self.h_ref)
            .field("generation", &self.generation)
            .finish()
    }
}

impl fmt::Debug for UlHarqProcessView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UlHarqProcessView")
            .field("ue_index", &self.ue_index)
            .field("h_id", &self.h_id)
            .field("h_ref", &self.h_ref)
            .field("generation", &self.generation)
            .finish()
    }
}
