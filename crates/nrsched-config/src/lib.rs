//! Scheduler configuration management
//!
//! This crate provides configuration structures and loading for the cell scheduler:
//! - Cell and HARQ configuration structures with validation
//! - Optional traffic simulation parameters
//! - TOML configuration file parsing

pub mod sched_config;
pub mod toml_config;

pub use sched_config::*;
pub use toml_config::*;
