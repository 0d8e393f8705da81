use nrsched_core::SlotPoint;
use nrsched_harq::CellHarqManager;

use super::recorder::Recorder;

/// A cell HARQ manager with recording collaborators and a slot clock that is
/// advanced one slot at a time, as the scheduler does.
pub struct CellTest {
    pub cell: CellHarqManager,
    pub rec: Recorder,
    now: SlotPoint,
}

impl CellTest {
    /// Creates the cell and delivers the first slot indication for `start`
    pub fn new(max_ues: usize, max_ack_wait_in_slots: u32, start: SlotPoint) -> Self {
        let rec = Recorder::new();
        let cell = CellHarqManager::with_diagnostic_sink(max_ues, max_ack_wait_in_slots, rec.clone(), rec.clone());
        cell.slot_indication(start);
        Self { cell, rec, now: start }
    }

    /// Numerology 0 cell starting at the given slot count
    pub fn at_slot(max_ues: usize, max_ack_wait_in_slots: u32, count: u32) -> Self {
        Self::new(max_ues, max_ack_wait_in_slots, SlotPoint::from_count(0, count))
    }

    pub fn now(&self) -> SlotPoint {
        self.now
    }

    /// Deliver slot indications for the next `nof_slots` slots
    pub fn advance(&mut self, nof_slots: u32) {
        for _ in 0..nof_slots {
            self.now = self.now.add_slots(1);
            self.cell.slot_indication(self.now);
        }
    }

    /// Deliver slot indications up to and including `target`
    pub fn run_until(&mut self, target: SlotPoint) {
        let nof_slots = target.diff(self.now);
        assert!(nof_slots >= 0, "cannot run backwards from {} to {}", self.now, target);
        self.advance(nof_slots as u32);
    }
}
