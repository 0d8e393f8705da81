use nrsched_core::{Direction, DuUeIndex};

/// Receives HARQ processes that expired without a final HARQ-ACK or CRC.
///
/// `ack` is the value assumed for the lost report: true if a positive HARQ-ACK was
/// already received on an earlier occasion of the same process.
/// Implementations must not call back into the manager that invokes them.
pub trait HarqTimeoutNotifier {
    fn on_harq_timeout(&mut self, ue_index: DuUeIndex, dir: Direction, ack: bool);
}

impl<F> HarqTimeoutNotifier for F
where
    F: FnMut(DuUeIndex, Direction, bool),
{
    fn on_harq_timeout(&mut self, ue_index: DuUeIndex, dir: Direction, ack: bool) {
        self(ue_index, dir, ack)
    }
}

/// Notifier for cells that do not act on HARQ timeouts
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTimeoutNotifier;

impl HarqTimeoutNotifier for NullTimeoutNotifier {
    fn on_harq_timeout(&mut self, _ue_index: DuUeIndex, _dir: Direction, _ack: bool) {}
}
