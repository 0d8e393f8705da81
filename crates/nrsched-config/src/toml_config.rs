use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use toml::Value;

use super::sched_config::{CfgCell, CfgHarq, CfgSim, SchedConfig, SharedConfig};

const EXPECTED_CONFIG_VERSION: &str = "0.1";

/// Build `SharedConfig` from a TOML configuration string
pub fn from_toml_str(toml_str: &str) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let root: TomlConfigRoot = toml::from_str(toml_str)?;

    if root.config_version != EXPECTED_CONFIG_VERSION {
        return Err(format!(
            "Unrecognized config_version: {}, expect {}",
            root.config_version, EXPECTED_CONFIG_VERSION
        )
        .into());
    }
    if !root.extra.is_empty() {
        return Err(format!("Unrecognized top-level fields: {:?}", sorted_keys(&root.extra)).into());
    }
    if let Some(ref cell) = root.cell {
        if !cell.extra.is_empty() {
            return Err(format!("Unrecognized fields in cell: {:?}", sorted_keys(&cell.extra)).into());
        }
    }
    if let Some(ref harq) = root.harq {
        if !harq.extra.is_empty() {
            return Err(format!("Unrecognized fields in harq: {:?}", sorted_keys(&harq.extra)).into());
        }
    }
    if let Some(ref sim) = root.sim {
        if !sim.extra.is_empty() {
            return Err(format!("Unrecognized fields in sim: {:?}", sorted_keys(&sim.extra)).into());
        }
    }

    let mut cfg = SchedConfig {
        debug_log: root.debug_log,
        ..Default::default()
    };
    if let Some(cell) = root.cell {
        apply_cell_patch(&mut cfg.cell, cell);
    }
    if let Some(harq) = root.harq {
        apply_harq_patch(&mut cfg.harq, harq);
    }
    if let Some(sim) = root.sim {
        let mut sim_cfg = CfgSim::default();
        apply_sim_patch(&mut sim_cfg, sim);
        cfg.sim = Some(sim_cfg);
    }

    // Report invalid settings as a load error rather than the panic in SharedConfig::from_config
    if let Err(e) = cfg.validate() {
        return Err(format!("Invalid configuration: {}", e).into());
    }

    Ok(SharedConfig::from_config(cfg))
}

/// Build `SharedConfig` from any reader.
pub fn from_reader<R: Read>(reader: R) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let mut contents = String::new();
    let mut reader = BufReader::new(reader);
    reader.read_to_string(&mut contents)?;
    from_toml_str(&contents)
}

/// Build `SharedConfig` from a file path.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SharedConfig, Box<dyn std::error::Error>> {
    let f = File::open(path)?;
    from_reader(f)
}

fn apply_cell_patch(dst: &mut CfgCell, src: CellDto) {
    if let Some(v) = src.cell_index {
        dst.cell_index = v;
    }
    if let Some(v) = src.numerology {
        dst.numerology = v;
    }
}

fn apply_harq_patch(dst: &mut CfgHarq, src: HarqDto) {
    if let Some(v) = src.max_ues {
        dst.max_ues = v;
    }
    if let Some(v) = src.max_ack_wait_slots {
        dst.max_ack_wait_slots = v;
    }
    if let Some(v) = src.nof_dl_harqs {
        dst.nof_dl_harqs = v;
    }
    if let Some(v) = src.nof_ul_harqs {
        dst.nof_ul_harqs = v;
    }
    if let Some(v) = src.max_nof_harq_retxs {
        dst.max_nof_harq_retxs = v;
    }
}

fn apply_sim_patch(dst: &mut CfgSim, src: SimDto) {
    if let Some(v) = src.nof_ues {
        dst.nof_ues = v;
    }
    if let Some(v) = src.k1 {
        dst.k1 = v;
    }
    if let Some(v) = src.k2 {
        dst.k2 = v;
    }
    if let Some(v) = src.nof_pucch_occasions {
        dst.nof_pucch_occasions = v;
    }
    if let Some(v) = src.nack_probability {
        dst.nack_probability = v;
    }
    if let Some(v) = src.dtx_probability {
        dst.dtx_probability = v;
    }
    if let Some(v) = src.ue_churn_probability {
        dst.ue_churn_probability = v;
    }
    if let Some(v) = src.tbs_bytes {
        dst.tbs_bytes = v;
    }
}

fn sorted_keys(map: &HashMap<String, Value>) -> Vec<&str> {
    let mut v: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
    v.sort_unstable();
    v
}

/// ----------------------- DTOs for input shape -----------------------

#[derive(Deserialize)]
struct TomlConfigRoot {
    config_version: String,
    debug_log: Option<String>,

    #[serde(default)]
    cell: Option<CellDto>,

    #[serde(default)]
    harq: Option<HarqDto>,

    #[serde(default)]
    sim: Option<SimDto>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct CellDto {
    pub cell_index: Option<u16>,
    pub numerology: Option<u8>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct HarqDto {
    pub max_ues: Option<usize>,
    pub max_ack_wait_slots: Option<u32>,
    pub nof_dl_harqs: Option<u8>,
    pub nof_ul_harqs: Option<u8>,
    pub max_nof_harq_retxs: Option<u8>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Deserialize)]
struct SimDto {
    pub nof_ues: Option<usize>,
    pub k1: Option<u32>,
    pub k2: Option<u32>,
    pub nof_pucch_occasions: Option<u8>,
    pub nack_probability: Option<f64>,
    pub dtx_probability: Option<f64>,
    pub ue_churn_probability: Option<f64>,
    pub tbs_bytes: Option<u32>,

    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = from_toml_str("config_version = \"0.1\"\n").unwrap().config();
        assert_eq!(cfg.harq.max_ues, 32);
        assert_eq!(cfg.harq.max_ack_wait_slots, 8);
        assert_eq!(cfg.cell.numerology, 1);
        assert!(cfg.sim.is_none());
    }

    #[test]
    fn test_full_config() {
        let toml_str = r#"
            config_version = "0.1"
            debug_log = "sched.log"

            [cell]
            cell_index = 2
            numerology = 0

            [harq]
            max_ues = 4
            max_ack_wait_slots = 1
            nof_dl_harqs = 8
            nof_ul_harqs = 4
            max_nof_harq_retxs = 2

            [sim]
            nof_ues = 3
            k1 = 6
            nof_pucch_occasions = 2
            nack_probability = 0.5
        "#;
        let cfg = from_toml_str(toml_str).unwrap().config();
        assert_eq!(cfg.debug_log.as_deref(), Some("sched.log"));
        assert_eq!(cfg.cell.cell_index, 2);
        assert_eq!(cfg.harq.max_ack_wait_slots, 1);
        assert_eq!(cfg.harq.nof_dl_harqs, 8);
        let sim = cfg.sim.as_ref().unwrap();
        assert_eq!(sim.nof_ues, 3);
        assert_eq!(sim.k1, 6);
        assert_eq!(sim.k2, 4);
        assert_eq!(sim.nof_pucch_occasions, 2);
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = from_toml_str("config_version = \"0.1\"\n[harq]\nmax_uez = 3\n").unwrap_err();
        assert!(err.to_string().contains("max_uez"));
        assert!(from_toml_str("config_version = \"0.1\"\nfoo = 1\n").is_err());
    }

    #[test]
    fn test_rejects_wrong_version_and_invalid_values() {
        assert!(from_toml_str("config_version = \"0.0\"\n").is_err());
        let err = from_toml_str("config_version = \"0.1\"\n[harq]\nmax_ack_wait_slots = 40\n").unwrap_err();
        assert!(err.to_string().contains("max_ack_wait_slots"));
    }
}
