//! Diagnostics emitted by the HARQ core.
//!
//! The core reports noteworthy events through an injected [`DiagnosticSink`] instead of
//! logging on its own. [`TracingDiagnosticSink`] is the sink used outside of tests.

use core::fmt;

use nrsched_core::{Direction, DuCellIndex, DuUeIndex, HarqId, Rnti, SlotPoint};
use tracing::Level;

use crate::harq_process::HarqState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardCause {
    RetxsCancelled,
    /// Retransmission budget of the given size exhausted
    MaxRetxsExceeded(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HarqEvent {
    UeAdded {
        ue_index: DuUeIndex,
        crnti: Rnti,
        nof_dl_harqs: u8,
        nof_ul_harqs: u8,
    },
    UeRemoved {
        ue_index: DuUeIndex,
    },
    /// HARQ-ACK or CRC for a process that is not waiting for one
    AckForInactiveHarq {
        ue_index: DuUeIndex,
        dir: Direction,
        h_id: HarqId,
        status: HarqState,
    },
    /// Call through a process view whose pool slot was reallocated since
    StaleProcessView {
        dir: Direction,
        h_id: HarqId,
    },
    HarqDiscarded {
        ue_index: DuUeIndex,
        dir: Direction,
        h_id: HarqId,
        tbs_bytes: u32,
        cause: DiscardCause,
    },
    AckTimeout {
        ue_index: DuUeIndex,
        dir: Direction,
        h_id: HarqId,
        slot: SlotPoint,
        wait_slots: u32,
        ack_on_timeout: bool,
    },
    UnexpectedTimeoutSlot {
        ue_index: DuUeIndex,
        dir: Direction,
        h_id: HarqId,
        deadline: SlotPoint,
        slot: SlotPoint,
    },
    /// Transmission refused because its HARQ-ACK deadline is a full timeout ring or
    /// more ahead of `slot`
    AckDeadlineOutOfRange {
        ue_index: DuUeIndex,
        dir: Direction,
        deadline: SlotPoint,
        slot: SlotPoint,
    },
}

impl HarqEvent {
    pub fn level(&self) -> Level {
        match self {
            HarqEvent::UeAdded { .. } | HarqEvent::UeRemoved { .. } => Level::DEBUG,
            HarqEvent::AckForInactiveHarq { .. } => Level::WARN,
            HarqEvent::StaleProcessView { .. } => Level::WARN,
            HarqEvent::HarqDiscarded { .. } => Level::INFO,
            // A lost report after a positive one is expected with multiple PUCCH occasions
            HarqEvent::AckTimeout { ack_on_timeout, .. } => {
                if *ack_on_timeout { Level::DEBUG } else { Level::WARN }
            }
            HarqEvent::UnexpectedTimeoutSlot { .. } | HarqEvent::AckDeadlineOutOfRange { .. } => Level::WARN,
        }
    }

    /// Slot the event relates to, if any
    pub fn slot(&self) -> Option<SlotPoint> {
        match self {
            HarqEvent::AckTimeout { slot, .. }
            | HarqEvent::UnexpectedTimeoutSlot { slot, .. }
            | HarqEvent::AckDeadlineOutOfRange { slot, .. } => Some(*slot),
            _ => None,
        }
    }
}

impl fmt::Display for HarqEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarqEvent::UeAdded {
                ue_index,
                crnti,
                nof_dl_harqs,
                nof_ul_harqs,
            } => write!(
                f,
                "ue={} rnti={}: HARQ entity created with {} DL and {} UL processes",
                ue_index, crnti, nof_dl_harqs, nof_ul_harqs
            ),
            HarqEvent::UeRemoved { ue_index } => write!(f, "ue={}: HARQ entity removed", ue_index),
            HarqEvent::AckForInactiveHarq {
                ue_index,
                dir,
                h_id,
                status,
            } => write!(
                f,
                "ue={} {} h_id={}: discarding HARQ-ACK, process is {}",
                ue_index, dir, h_id, status
            ),
            HarqEvent::StaleProcessView { dir, h_id } => {
                write!(f, "{} h_id={}: process view refers to a reallocated process", dir, h_id)
            }
            HarqEvent::HarqDiscarded {
                ue_index,
                dir,
                h_id,
                tbs_bytes,
                cause,
            } => match cause {
                DiscardCause::RetxsCancelled => write!(
                    f,
                    "ue={} {} h_id={}: discarding process with tbs={}, retxs were cancelled",
                    ue_index, dir, h_id, tbs_bytes
                ),
                DiscardCause::MaxRetxsExceeded(max) => write!(
                    f,
                    "ue={} {} h_id={}: discarding process with tbs={}, max retxs ({}) exceeded",
                    ue_index, dir, h_id, tbs_bytes, max
                ),
            },
            HarqEvent::AckTimeout {
                ue_index,
                dir,
                h_id,
                wait_slots,
                ack_on_timeout,
                ..
            } => write!(
                f,
                "ue={} {} h_id={}: HARQ-ACK not received within {} slots (assumed ack={})",
                ue_index, dir, h_id, wait_slots, ack_on_timeout
            ),
            HarqEvent::UnexpectedTimeoutSlot {
                ue_index,
                dir,
                h_id,
                deadline,
                ..
            } => write!(
                f,
                "ue={} {} h_id={}: timeout handled outside its deadline {}",
                ue_index, dir, h_id, deadline
            ),
            HarqEvent::AckDeadlineOutOfRange {
                ue_index, dir, deadline, ..
            } => write!(
                f,
                "ue={} {}: HARQ-ACK deadline {} is beyond the timeout wheel, transmission refused",
                ue_index, dir, deadline
            ),
        }
    }
}

pub trait DiagnosticSink {
    fn on_event(&mut self, event: &HarqEvent);
}

impl<F> DiagnosticSink for F
where
    F: FnMut(&HarqEvent),
{
    fn on_event(&mut self, event: &HarqEvent) {
        self(event)
    }
}

/// Forwards events to `tracing` at their level
#[derive(Debug, Clone, Copy)]
pub struct TracingDiagnosticSink {
    cell_index: DuCellIndex,
}

impl TracingDiagnosticSink {
    pub fn new(cell_index: DuCellIndex) -> Self {
        Self { cell_index }
    }
}

impl DiagnosticSink for TracingDiagnosticSink {
    fn on_event(&mut self, event: &HarqEvent) {
        let cell = self.cell_index;
        match (event.level(), event.slot()) {
            (Level::ERROR, _) => tracing::error!(cell, "{}", event),
            (Level::WARN, Some(slot)) => tracing::warn!(slot = %slot, cell, "{}", event),
            (Level::WARN, None) => tracing::warn!(cell, "{}", event),
            (Level::INFO, _) => tracing::info!(cell, "{}", event),
            (Level::DEBUG, Some(slot)) => tracing::debug!(slot = %slot, cell, "{}", event),
            (Level::DEBUG, None) => tracing::debug!(cell, "{}", event),
            _ => tracing::trace!(cell, "{}", event),
        }
    }
}
