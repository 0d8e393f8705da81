use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nrsched_config::{CfgSim, SharedConfig};
use nrsched_core::{Direction, DuUeIndex, HarqAckStatus, Rnti, SlotPoint};
use nrsched_harq::{CellHarqManager, DlHarqStatusUpdate, DlTxParams, UlTxParams, UniqueUeHarqEntity};

/// Slots between two statistics reports
const STATS_PERIOD_SLOTS: u64 = 10240;

/// A HARQ-ACK bit the PHY will report in `uci_slot`
struct DlReport {
    ue_index: DuUeIndex,
    uci_slot: SlotPoint,
    harq_bit_idx: u8,
}

/// A PUSCH whose CRC the PHY will report in `pusch_slot`
struct UlReport {
    ue_index: DuUeIndex,
    pusch_slot: SlotPoint,
}

#[derive(Debug, Default)]
struct TimeoutStats {
    dl: u64,
    dl_assumed_ack: u64,
    ul: u64,
}

#[derive(Debug, Default)]
struct SimStats {
    dl_bytes_acked: u64,
    ul_bytes_delivered: u64,
    nof_dl_alloc_failures: u64,
    nof_ul_alloc_failures: u64,
    nof_ue_churns: u64,
}

/// Drives one cell HARQ manager the way a slot scheduler and PHY would, with
/// randomised HARQ-ACK and CRC outcomes.
pub struct CellSim {
    sim: CfgSim,
    max_nof_harq_retxs: u8,
    nof_dl_harqs: u8,
    nof_ul_harqs: u8,
    cell: CellHarqManager,
    ues: Vec<UniqueUeHarqEntity>,
    dl_reports: VecDeque<DlReport>,
    ul_reports: VecDeque<UlReport>,
    rng: StdRng,
    next_slot: SlotPoint,
    nof_slots: u64,
    timeouts: Rc<RefCell<TimeoutStats>>,
    stats: SimStats,
}

fn crnti_for(ue_index: DuUeIndex) -> Rnti {
    Rnti(0x4601 + ue_index)
}

impl CellSim {
    pub fn new(config: &SharedConfig, seed: u64) -> Self {
        let cfg = config.config();
        let sim = cfg.sim.clone().unwrap_or_default();

        let timeouts = Rc::new(RefCell::new(TimeoutStats::default()));
        let t = timeouts.clone();
        let notifier = move |ue_index: DuUeIndex, dir: Direction, ack: bool| {
            tracing::trace!("timeout ue={} {} ack={}", ue_index, dir, ack);
            let mut t = t.borrow_mut();
            match dir {
                Direction::Dl => {
                    t.dl += 1;
                    if ack {
                        t.dl_assumed_ack += 1;
                    }
                }
                Direction::Ul => t.ul += 1,
            }
        };
        let cell = CellHarqManager::from_config(config, notifier);

        // Without a [sim] section the defaults may exceed the configured UE count
        let nof_ues = sim.nof_ues.min(cfg.harq.max_ues);
        let ues = (0..nof_ues as DuUeIndex)
            .map(|i| cell.add_ue(i, crnti_for(i), cfg.harq.nof_dl_harqs, cfg.harq.nof_ul_harqs))
            .collect();

        Self {
            max_nof_harq_retxs: cfg.harq.max_nof_harq_retxs,
            nof_dl_harqs: cfg.harq.nof_dl_harqs,
            nof_ul_harqs: cfg.harq.nof_ul_harqs,
            cell,
            ues,
            dl_reports: VecDeque::new(),
            ul_reports: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
            next_slot: SlotPoint::new(cfg.cell.numerology, 0, 0),
            nof_slots: 0,
            timeouts,
            stats: SimStats::default(),
            sim,
        }
    }

    /// Runs until `num_slots` slots were processed or `running` is cleared
    pub fn run(&mut self, num_slots: Option<u64>, running: &Arc<AtomicBool>, realtime: bool) {
        let slot_duration = Duration::from_micros(1000 >> self.next_slot.numerology());
        while running.load(Ordering::SeqCst) {
            if num_slots.is_some_and(|n| self.nof_slots >= n) {
                break;
            }
            self.step();
            if self.nof_slots % STATS_PERIOD_SLOTS == 0 {
                self.log_stats();
            }
            if realtime {
                std::thread::sleep(slot_duration);
            }
        }
    }

    /// Process one slot
    pub fn step(&mut self) {
        let now = self.next_slot;
        self.cell.slot_indication(now);

        self.deliver_dl_reports(now);
        self.deliver_ul_reports(now);
        self.churn_ues();
        for i in 0..self.ues.len() {
            self.schedule_dl(i, now);
            self.schedule_ul(i, now);
        }

        self.next_slot = now.add_slots(1);
        self.nof_slots += 1;
    }

    fn deliver_dl_reports(&mut self, now: SlotPoint) {
        while let Some(report) = self.dl_reports.front() {
            if report.uci_slot.diff(now) > 0 {
                break;
            }
            let Some(report) = self.dl_reports.pop_front() else {
                break;
            };
            // Nothing detected on PUCCH, the process is left to time out
            if self.rng.random_bool(self.sim.dtx_probability) {
                continue;
            }
            let Some(h) = self
                .ues
                .get(report.ue_index as usize)
                .and_then(|ue| ue.find_dl_harq(report.uci_slot, report.harq_bit_idx))
            else {
                // UE left the cell since
                continue;
            };

            let ack = HarqAckStatus::from_bool(!self.rng.random_bool(self.sim.nack_probability));
            let snr = self.rng.random_range(-5.0f32..30.0);
            let tbs = h.prev_tx_params().tbs_bytes;
            match h.dl_ack_info(ack, Some(snr)) {
                DlHarqStatusUpdate::Acked => self.stats.dl_bytes_acked += tbs as u64,
                DlHarqStatusUpdate::Error => {
                    tracing::warn!(slot = %now, "unexpected HARQ-ACK error for ue={} h_id={}", report.ue_index, h.id())
                }
                DlHarqStatusUpdate::Nacked | DlHarqStatusUpdate::NoUpdate => {}
            }
        }
    }

    fn deliver_ul_reports(&mut self, now: SlotPoint) {
        while let Some(report) = self.ul_reports.front() {
            if report.pusch_slot.diff(now) > 0 {
                break;
            }
            let Some(report) = self.ul_reports.pop_front() else {
                break;
            };
            if self.rng.random_bool(self.sim.dtx_probability) {
                continue;
            }
            let Some(h) = self
                .ues
                .get(report.ue_index as usize)
                .and_then(|ue| ue.find_ul_harq(report.pusch_slot))
            else {
                continue;
            };

            let crc = !self.rng.random_bool(self.sim.nack_probability);
            match h.ul_crc_info(crc) {
                Ok(bytes) => self.stats.ul_bytes_delivered += bytes as u64,
                Err(e) => tracing::warn!(slot = %now, "unexpected CRC error for ue={}: {}", report.ue_index, e),
            }
        }
    }

    /// UEs occasionally leave and are admitted again, which releases all their processes
    fn churn_ues(&mut self) {
        for i in 0..self.ues.len() {
            if !self.rng.random_bool(self.sim.ue_churn_probability) {
                continue;
            }
            let ue_index = i as DuUeIndex;
            tracing::debug!("ue={} leaves and rejoins", ue_index);
            // The old entity must release its processes before the index is admitted again
            self.ues[i].reset();
            self.ues[i] = self
                .cell
                .add_ue(ue_index, crnti_for(ue_index), self.nof_dl_harqs, self.nof_ul_harqs);
            self.stats.nof_ue_churns += 1;
        }
    }

    /// Retransmissions take precedence over new data
    fn schedule_dl(&mut self, i: usize, now: SlotPoint) {
        let k1 = self.sim.k1;
        let ue = &mut self.ues[i];
        let h = match ue.find_pending_dl_retx() {
            Some(h) => {
                h.new_retx(now, k1, 0);
                h
            }
            None => match ue.alloc_dl_harq(now, k1, self.max_nof_harq_retxs, 0) {
                Some(h) => {
                    h.save_alloc_params(DlTxParams {
                        tbs_bytes: self.sim.tbs_bytes,
                        mcs: 20,
                        nof_prbs: 52,
                        nof_layers: 1,
                    });
                    h
                }
                None => {
                    self.stats.nof_dl_alloc_failures += 1;
                    return;
                }
            },
        };
        for _ in 0..self.sim.nof_pucch_occasions {
            h.increment_pucch_counter();
            self.dl_reports.push_back(DlReport {
                ue_index: ue.ue_index(),
                uci_slot: h.uci_slot(),
                harq_bit_idx: h.harq_bit_idx(),
            });
        }
    }

    fn schedule_ul(&mut self, i: usize, now: SlotPoint) {
        let pusch_slot = now.add_slots(self.sim.k2 as i32);
        let ue = &mut self.ues[i];
        let h = match ue.find_pending_ul_retx() {
            Some(h) => {
                h.new_retx(pusch_slot);
                h
            }
            None => match ue.alloc_ul_harq(pusch_slot, self.max_nof_harq_retxs) {
                Some(h) => {
                    h.save_alloc_params(UlTxParams {
                        tbs_bytes: self.sim.tbs_bytes,
                        mcs: 16,
                        nof_prbs: 24,
                    });
                    h
                }
                None => {
                    self.stats.nof_ul_alloc_failures += 1;
                    return;
                }
            },
        };
        self.ul_reports.push_back(UlReport {
            ue_index: ue.ue_index(),
            pusch_slot: h.pusch_slot(),
        });
    }

    pub fn log_stats(&self) {
        let dl = self.cell.dl_counters();
        let ul = self.cell.ul_counters();
        let timeouts = self.timeouts.borrow();
        tracing::info!(
            slot = %self.next_slot.add_slots(-1),
            "DL: new={} retx={} ack={} nack={} discard={} timeout={} (assumed ack {}) bytes_acked={} alloc_fail={}",
            dl.nof_new_txs,
            dl.nof_retxs,
            dl.nof_acks,
            dl.nof_nacks,
            dl.nof_discards,
            timeouts.dl,
            timeouts.dl_assumed_ack,
            self.stats.dl_bytes_acked,
            self.stats.nof_dl_alloc_failures,
        );
        tracing::info!(
            slot = %self.next_slot.add_slots(-1),
            "UL: new={} retx={} ack={} nack={} discard={} timeout={} bytes={} alloc_fail={}",
            ul.nof_new_txs,
            ul.nof_retxs,
            ul.nof_acks,
            ul.nof_nacks,
            ul.nof_discards,
            timeouts.ul,
            self.stats.ul_bytes_delivered,
            self.stats.nof_ul_alloc_failures,
        );
        tracing::info!(
            "slots={} ue_churns={} free DL/UL HARQs {}/{} of {}",
            self.nof_slots,
            self.stats.nof_ue_churns,
            self.cell.nof_free_dl_harqs(),
            self.cell.nof_free_ul_harqs(),
            self.cell.harq_pool_capacity(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrsched_config::SchedConfig;
    use nrsched_core::debug;

    fn sim_config(sim: CfgSim) -> SharedConfig {
        let mut cfg = SchedConfig::default();
        cfg.harq.max_ues = 4;
        cfg.sim = Some(sim);
        SharedConfig::from_config(cfg)
    }

    #[test]
    fn test_lossless_link_delivers_everything() {
        debug::setup_logging_verbose();
        let cfg = sim_config(CfgSim {
            nof_ues: 2,
            nack_probability: 0.0,
            dtx_probability: 0.0,
            ue_churn_probability: 0.0,
            ..Default::default()
        });
        let mut sim = CellSim::new(&cfg, 1);
        let running = Arc::new(AtomicBool::new(true));
        sim.run(Some(200), &running, false);

        let dl = sim.cell.dl_counters();
        assert_eq!(dl.nof_retxs, 0);
        assert_eq!(dl.nof_timeouts, 0);
        // Everything but the last k1 slots of transmissions is acknowledged
        assert_eq!(dl.nof_acks, dl.nof_new_txs - 2 * sim.sim.k1 as u64);
        assert_eq!(sim.stats.ul_bytes_delivered, sim.cell.ul_counters().nof_acks * 1500);
    }

    #[test]
    fn test_lossy_link_keeps_pool_consistent() {
        debug::setup_logging_verbose();
        let cfg = sim_config(CfgSim {
            nof_ues: 4,
            nof_pucch_occasions: 2,
            nack_probability: 0.3,
            dtx_probability: 0.1,
            ue_churn_probability: 0.01,
            ..Default::default()
        });
        let mut sim = CellSim::new(&cfg, 7);
        for _ in 0..5000 {
            sim.step();
        }
        assert!(sim.cell.dl_counters().nof_timeouts > 0);
        assert!(sim.cell.ul_counters().nof_retxs > 0);

        // Every UE leaving returns the whole pool
        sim.ues.clear();
        assert_eq!(sim.cell.nof_free_dl_harqs(), sim.cell.harq_pool_capacity());
        assert_eq!(sim.cell.nof_free_ul_harqs(), sim.cell.harq_pool_capacity());
    }
}
