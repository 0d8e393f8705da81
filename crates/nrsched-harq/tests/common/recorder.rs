use std::cell::RefCell;
use std::rc::Rc;

use nrsched_core::{Direction, DuUeIndex};
use nrsched_harq::{DiagnosticSink, HarqEvent, HarqTimeoutNotifier};

pub type TimeoutRecord = (DuUeIndex, Direction, bool);

/// Collects HARQ timeout notifications and diagnostic events for later inspection.
/// Clones share the same storage, so one clone can be handed to the cell.
#[derive(Clone, Default)]
pub struct Recorder {
    timeouts: Rc<RefCell<Vec<TimeoutRecord>>>,
    events: Rc<RefCell<Vec<HarqEvent>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_timeouts(&self) -> Vec<TimeoutRecord> {
        std::mem::take(&mut *self.timeouts.borrow_mut())
    }

    pub fn take_events(&self) -> Vec<HarqEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn count_events(&self, pred: impl Fn(&HarqEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|ev| pred(ev)).count()
    }
}

impl HarqTimeoutNotifier for Recorder {
    fn on_harq_timeout(&mut self, ue_index: DuUeIndex, dir: Direction, ack: bool) {
        tracing::debug!("on_harq_timeout: ue={} {} ack={}", ue_index, dir, ack);
        self.timeouts.borrow_mut().push((ue_index, dir, ack));
    }
}

impl DiagnosticSink for Recorder {
    fn on_event(&mut self, event: &HarqEvent) {
        tracing::debug!("on_event: {}", event);
        self.events.borrow_mut().push(event.clone());
    }
}
