use clap::Parser;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nrsched_config::{SharedConfig, toml_config};
use nrsched_core::debug;

mod sim;

use sim::CellSim;

/// Load configuration file
fn load_config_from_toml(cfg_path: &str) -> SharedConfig {
    match toml_config::from_file(cfg_path) {
        Ok(c) => c,
        Err(e) => {
            println!("Failed to load configuration from {}: {}", cfg_path, e);
            std::process::exit(1);
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "NR cell HARQ simulator",
    long_about = "Drives a cell HARQ manager slot by slot with simulated UEs and randomised HARQ-ACK/CRC feedback"
)]
struct Args {
    /// Config file (required)
    #[arg(help = "TOML config with cell, HARQ and traffic parameters")]
    config: String,

    /// Stop after this many slots instead of running until Ctrl+C
    #[arg(long)]
    slots: Option<u64>,

    /// Seed for the feedback generator. Random if omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Pace the simulation at the slot duration of the configured numerology
    #[arg(long)]
    realtime: bool,
}

fn main() {
    let args = Args::parse();
    let cfg = load_config_from_toml(&args.config);
    let _log_guard = debug::setup_logging_default(cfg.config().debug_log.clone());

    let seed = args.seed.unwrap_or_else(rand::random);
    tracing::info!("Starting HARQ simulation of cell {} with seed {}", cfg.config().cell.cell_index, seed);
    let mut sim = CellSim::new(&cfg, seed);

    // Set up Ctrl+C handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("failed to set Ctrl+C handler");

    sim.run(args.slots, &running, args.realtime);
    sim.log_stats();
    // sim drops here, every UE entity releases its HARQ processes
}
