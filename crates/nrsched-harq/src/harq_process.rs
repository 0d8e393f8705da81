use core::fmt;

use nrsched_core::{Direction, DuUeIndex, HarqAckStatus, HarqId, SlotPoint};

/// Lifecycle of a HARQ process record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HarqState {
    #[default]
    Empty,
    /// Transmitted, HARQ-ACK (DL) or CRC (UL) not yet received
    WaitingAck,
    /// NACKed and waiting for the scheduler to pick it up for retransmission
    PendingRetx,
}

impl fmt::Display for HarqState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarqState::Empty => write!(f, "empty"),
            HarqState::WaitingAck => write!(f, "waiting_ack"),
            HarqState::PendingRetx => write!(f, "pending_retx"),
        }
    }
}

/// Direction specific part of a HARQ process record
pub trait HarqDirection: Default {
    const DIRECTION: Direction;

    /// Transport block size of the last transmission, in bytes
    fn tbs_bytes(&self) -> u32;
}

/// PDSCH parameters of the last transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DlTxParams {
    pub tbs_bytes: u32,
    pub mcs: u8,
    pub nof_prbs: u16,
    pub nof_layers: u8,
}

/// PUSCH parameters of the last transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UlTxParams {
    pub tbs_bytes: u32,
    pub mcs: u8,
    pub nof_prbs: u16,
}

#[derive(Debug, Clone, Default)]
pub struct DlHarqExt {
    /// Bit of the HARQ-ACK codebook carrying this process
    pub harq_bit_idx: u8,
    /// PUCCH/PUSCH occasions still expected to carry this process' HARQ-ACK bit
    pub pucch_ack_to_receive: u8,
    /// Best HARQ-ACK value received so far in this cycle
    pub chosen_ack: HarqAckStatus,
    /// Quality (SNR) of the report `chosen_ack` was taken from
    pub last_pucch_snr: Option<f32>,
    pub prev_tx_params: DlTxParams,
}

impl DlHarqExt {
    /// Codebook merge rule. A DTX never replaces anything. Otherwise the report is
    /// adopted when nothing was decided yet or when it carries strictly better quality.
    /// A report without a quality ranks below any report with one.
    pub fn merge_ack(&mut self, ack: HarqAckStatus, snr: Option<f32>) {
        if ack.is_dtx() {
            return;
        }
        let better = match (snr, self.last_pucch_snr) {
            (Some(new), Some(old)) => new > old,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if self.chosen_ack.is_dtx() || better {
            self.chosen_ack = ack;
            self.last_pucch_snr = snr;
        }
    }
}

impl HarqDirection for DlHarqExt {
    const DIRECTION: Direction = Direction::Dl;

    fn tbs_bytes(&self) -> u32 {
        self.prev_tx_params.tbs_bytes
    }
}

#[derive(Debug, Clone, Default)]
pub struct UlHarqExt {
    pub prev_tx_params: UlTxParams,
}

impl HarqDirection for UlHarqExt {
    const DIRECTION: Direction = Direction::Ul;

    fn tbs_bytes(&self) -> u32 {
        self.prev_tx_params.tbs_bytes
    }
}

/// One slot of the HARQ pool. Its position in the pool is unrelated to `h_id`, which is
/// only meaningful within the owning UE.
#[derive(Debug, Clone, Default)]
pub struct HarqProcess<E: HarqDirection> {
    pub ue_index: DuUeIndex,
    pub h_id: HarqId,
    pub status: HarqState,
    /// PDSCH slot (DL) or PUSCH slot (UL)
    pub slot_tx: SlotPoint,
    /// Slot in which the HARQ-ACK (DL) or CRC (UL) is expected
    pub slot_ack: SlotPoint,
    pub slot_ack_timeout: SlotPoint,
    pub nof_retxs: u8,
    pub max_nof_harq_retxs: u8,
    pub retxs_cancelled: bool,
    /// Value reported to the timeout notifier if the last expected report never arrives
    pub ack_on_timeout: bool,
    pub ndi: bool,
    /// Bumped on every allocation of this pool slot, so views can detect reuse
    pub generation: u32,
    pub ext: E,
}

impl<E: HarqDirection> HarqProcess<E> {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.status == HarqState::Empty
    }

    #[inline]
    pub fn is_waiting_ack(&self) -> bool {
        self.status == HarqState::WaitingAck
    }

    #[inline]
    pub fn has_pending_retx(&self) -> bool {
        self.status == HarqState::PendingRetx
    }
}
