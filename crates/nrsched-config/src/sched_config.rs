use std::sync::Arc;

use nrsched_core::slot_point::MAX_NUMEROLOGY;
use nrsched_core::{DuCellIndex, HARQ_TIMEOUT_RING_SIZE, MAX_NOF_DU_UES, MAX_NOF_HARQS};

#[derive(Debug, Clone)]
pub struct CfgCell {
    pub cell_index: DuCellIndex,
    /// Numerology (mu) of the active BWP, 0..=4
    pub numerology: u8,
}

impl Default for CfgCell {
    fn default() -> Self {
        Self {
            cell_index: 0,
            numerology: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CfgHarq {
    /// Number of UEs the cell HARQ pools are dimensioned for
    pub max_ues: usize,
    /// Slots to wait past the expected HARQ-ACK slot before a process is timed out.
    /// The value 1 disables timeout notifications (NTN-style operation).
    pub max_ack_wait_slots: u32,
    /// DL HARQ processes reserved per UE
    pub nof_dl_harqs: u8,
    /// UL HARQ processes reserved per UE
    pub nof_ul_harqs: u8,
    /// Retransmissions allowed per transport block before it is discarded
    pub max_nof_harq_retxs: u8,
}

impl Default for CfgHarq {
    fn default() -> Self {
        Self {
            max_ues: 32,
            max_ack_wait_slots: 8,
            nof_dl_harqs: MAX_NOF_HARQS as u8,
            nof_ul_harqs: MAX_NOF_HARQS as u8,
            max_nof_harq_retxs: 4,
        }
    }
}

/// Traffic model for the slot simulator
#[derive(Debug, Clone)]
pub struct CfgSim {
    pub nof_ues: usize,
    /// PDSCH to HARQ-ACK delay in slots
    pub k1: u32,
    /// PDCCH to PUSCH delay in slots
    pub k2: u32,
    /// HARQ-ACK occasions reported per DL transmission (1 or 2)
    pub nof_pucch_occasions: u8,
    pub nack_probability: f64,
    pub dtx_probability: f64,
    /// Per slot probability that a UE leaves and is re-admitted
    pub ue_churn_probability: f64,
    pub tbs_bytes: u32,
}

impl Default for CfgSim {
    fn default() -> Self {
        Self {
            nof_ues: 8,
            k1: 4,
            k2: 4,
            nof_pucch_occasions: 1,
            nack_probability: 0.1,
            dtx_probability: 0.01,
            ue_churn_probability: 0.0005,
            tbs_bytes: 1500,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchedConfig {
    pub debug_log: Option<String>,
    pub cell: CfgCell,
    pub harq: CfgHarq,
    /// Only used by the simulator binary
    pub sim: Option<CfgSim>,
}

fn is_probability(p: f64) -> bool {
    (0.0..=1.0).contains(&p)
}

impl SchedConfig {
    /// Validate that all configuration fields are within range.
    pub fn validate(&self) -> Result<(), &str> {
        if self.cell.numerology > MAX_NUMEROLOGY {
            return Err("cell numerology must be in range 0..=4");
        }

        let harq = &self.harq;
        if harq.max_ues == 0 || harq.max_ues > MAX_NOF_DU_UES {
            return Err("harq max_ues must be in range 1..=1024");
        }
        // A deadline further away than the wheel would alias onto an earlier bucket
        if harq.max_ack_wait_slots == 0 || harq.max_ack_wait_slots as usize >= HARQ_TIMEOUT_RING_SIZE {
            return Err("harq max_ack_wait_slots must be in range 1..40");
        }
        if harq.nof_dl_harqs == 0 || harq.nof_dl_harqs as usize > MAX_NOF_HARQS {
            return Err("harq nof_dl_harqs must be in range 1..=16");
        }
        if harq.nof_ul_harqs == 0 || harq.nof_ul_harqs as usize > MAX_NOF_HARQS {
            return Err("harq nof_ul_harqs must be in range 1..=16");
        }
        if harq.max_nof_harq_retxs as usize > MAX_NOF_HARQS {
            return Err("harq max_nof_harq_retxs must be at most 16");
        }

        if let Some(ref sim) = self.sim {
            if sim.nof_ues > harq.max_ues {
                return Err("sim nof_ues exceeds harq max_ues");
            }
            // HARQ-ACK deadlines lie k1 (DL) or k2 (UL) plus the ACK wait ahead of the current slot
            if sim.k1 == 0 || (sim.k1 + harq.max_ack_wait_slots) as usize >= HARQ_TIMEOUT_RING_SIZE {
                return Err("sim k1 + harq max_ack_wait_slots must be in range 1..40");
            }
            if (sim.k2 + harq.max_ack_wait_slots) as usize >= HARQ_TIMEOUT_RING_SIZE {
                return Err("sim k2 + harq max_ack_wait_slots must be below 40");
            }
            if !(1..=2).contains(&sim.nof_pucch_occasions) {
                return Err("sim nof_pucch_occasions must be 1 or 2");
            }
            if !is_probability(sim.nack_probability)
                || !is_probability(sim.dtx_probability)
                || !is_probability(sim.ue_churn_probability)
            {
                return Err("sim probabilities must be in range 0.0..=1.0");
            }
        }

        Ok(())
    }
}

/// Global shared configuration. Immutable after construction and cheap to clone.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    cfg: Arc<SchedConfig>,
}

impl SharedConfig {
    /// Wraps a configuration. Panics if the configuration is invalid;
    /// use `validate` first when the input is untrusted.
    pub fn from_config(cfg: SchedConfig) -> Self {
        if let Err(e) = cfg.validate() {
            panic!("Invalid scheduler configuration: {}", e);
        }
        Self { cfg: Arc::new(cfg) }
    }

    /// Access immutable config.
    pub fn config(&self) -> Arc<SchedConfig> {
        Arc::clone(&self.cfg)
    }
}
