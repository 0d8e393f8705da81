use nrsched_core::{DuUeIndex, HarqId, Rnti, SlotPoint};

use crate::cell_harq_manager::CellHarqManager;
use crate::harq_process::{DlHarqExt, HarqProcess, HarqState, UlHarqExt};
use crate::harq_view::{DlHarqProcessView, UlHarqProcessView};

/// HARQ processes of one UE in one cell.
///
/// Created by [`CellHarqManager::add_ue`]. Not clonable: when the entity is dropped or
/// reset, every HARQ process of the UE is released, exactly once.
pub struct UniqueUeHarqEntity {
    /// None after reset
    cell: Option<CellHarqManager>,
    ue_index: DuUeIndex,
    crnti: Rnti,
}

impl UniqueUeHarqEntity {
    pub(crate) fn new(cell: CellHarqManager, ue_index: DuUeIndex, crnti: Rnti) -> Self {
        Self {
            cell: Some(cell),
            ue_index,
            crnti,
        }
    }

    fn cell(&self) -> &CellHarqManager {
        let Some(cell) = &self.cell else {
            panic!("ue={}: HARQ entity used after reset", self.ue_index);
        };
        cell
    }

    pub fn ue_index(&self) -> DuUeIndex {
        self.ue_index
    }

    pub fn crnti(&self) -> Rnti {
        self.crnti
    }

    /// False once the entity has been reset
    pub fn is_valid(&self) -> bool {
        self.cell.is_some()
    }

    /// Release all HARQ processes of the UE. Called from inside a cell callback, the release
    /// happens at the next slot indication. Further use of the entity panics.
    pub fn reset(&mut self) {
        if let Some(cell) = self.cell.take() {
            cell.release_ue(self.ue_index);
        }
    }

    pub fn nof_dl_harqs(&self) -> u8 {
        self.cell().state.borrow().dl.nof_ue_harqs(self.ue_index)
    }

    pub fn nof_ul_harqs(&self) -> u8 {
        self.cell().state.borrow().ul.nof_ue_harqs(self.ue_index)
    }

    /// Allocate a DL HARQ process for a new PDSCH in `pdsch_slot`, acknowledged `k1` slots later
    pub fn alloc_dl_harq(
        &mut self,
        pdsch_slot: SlotPoint,
        k1: u32,
        max_harq_nof_retxs: u8,
        harq_bit_idx: u8,
    ) -> Option<DlHarqProcessView> {
        let cell = self.cell();
        let h = cell
            .state
            .borrow_mut()
            .new_dl_tx(self.ue_index, pdsch_slot, k1, max_harq_nof_retxs, harq_bit_idx)?;
        Some(DlHarqProcessView::new(cell.clone(), h))
    }

    pub fn alloc_ul_harq(&mut self, pusch_slot: SlotPoint, max_harq_nof_retxs: u8) -> Option<UlHarqProcessView> {
        let cell = self.cell();
        let h = cell
            .state
            .borrow_mut()
            .new_ul_tx(self.ue_index, pusch_slot, max_harq_nof_retxs)?;
        Some(UlHarqProcessView::new(cell.clone(), h))
    }

    fn find_dl<P>(&self, pred: P) -> Option<DlHarqProcessView>
    where
        P: Fn(&HarqProcess<DlHarqExt>) -> bool,
    {
        let cell = self.cell();
        let h = cell.state.borrow().dl.find_ue_harq(self.ue_index, pred)?;
        Some(DlHarqProcessView::new(cell.clone(), h))
    }

    fn find_ul<P>(&self, pred: P) -> Option<UlHarqProcessView>
    where
        P: Fn(&HarqProcess<UlHarqExt>) -> bool,
    {
        let cell = self.cell();
        let h = cell.state.borrow().ul.find_ue_harq(self.ue_index, pred)?;
        Some(UlHarqProcessView::new(cell.clone(), h))
    }

    /// Lowest h_id waiting for a DL retransmission
    pub fn find_pending_dl_retx(&self) -> Option<DlHarqProcessView> {
        self.find_dl(|h| h.status == HarqState::PendingRetx)
    }

    pub fn find_pending_ul_retx(&self) -> Option<UlHarqProcessView> {
        self.find_ul(|h| h.status == HarqState::PendingRetx)
    }

    pub fn find_dl_harq_waiting_ack(&self) -> Option<DlHarqProcessView> {
        self.find_dl(|h| h.status == HarqState::WaitingAck)
    }

    pub fn find_ul_harq_waiting_ack(&self) -> Option<UlHarqProcessView> {
        self.find_ul(|h| h.status == HarqState::WaitingAck)
    }

    /// DL process whose HARQ-ACK is expected in `uci_slot` on codebook bit `harq_bit_idx`
    pub fn find_dl_harq(&self, uci_slot: SlotPoint, harq_bit_idx: u8) -> Option<DlHarqProcessView> {
        self.find_dl(|h| {
            h.status == HarqState::WaitingAck && h.slot_ack == uci_slot && h.ext.harq_bit_idx == harq_bit_idx
        })
    }

    /// UL process transmitted in `pusch_slot`
    pub fn find_ul_harq(&self, pusch_slot: SlotPoint) -> Option<UlHarqProcessView> {
        self.find_ul(|h| h.status == HarqState::WaitingAck && h.slot_tx == pusch_slot)
    }

    pub fn dl_harq(&self, h_id: HarqId) -> Option<DlHarqProcessView> {
        let cell = self.cell();
        let h = cell.state.borrow().dl.ue_harq(self.ue_index, h_id)?;
        Some(DlHarqProcessView::new(cell.clone(), h))
    }

    pub fn ul_harq(&self, h_id: HarqId) -> Option<UlHarqProcessView> {
        let cell = self.cell();
        let h = cell.state.borrow().ul.ue_harq(self.ue_index, h_id)?;
        Some(UlHarqProcessView::new(cell.clone(), h))
    }
}

impl Drop for UniqueUeHarqEntity {
    fn drop(&mut self) {
        self.reset();
    }
}

impl std::fmt::Debug for UniqueUeHarqEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniqueUeHarqEntity")
            .field("ue_index", &self.ue_index)
            .field("crnti", &self.crnti)
            .field("valid", &self.is_valid())
            .finish()
    }
}
