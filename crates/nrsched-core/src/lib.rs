//! Core utilities for the NR cell scheduler
//!
//! This crate provides fundamental types and utilities used across the scheduler crates:
//! - SlotPoint for NR frame/slot timing
//! - UE, RNTI and HARQ process identifiers
//! - HARQ-ACK report values as decoded by the PHY
//! - Logging setup and debug macros

pub mod debug;
pub mod direction;
pub mod harq_ack;
pub mod slot_point;
pub mod ue_types;

// Re-export commonly used items
pub use direction::Direction;
pub use harq_ack::HarqAckStatus;
pub use slot_point::SlotPoint;
pub use ue_types::*;

/// Maximum number of HARQ processes per UE and direction
pub const MAX_NOF_HARQS: usize = 16;

/// Maximum number of UEs a single cell may admit
pub const MAX_NOF_DU_UES: usize = 1024;

/// Number of buckets in the HARQ-ACK timeout wheel.
/// Divides every slot hyper-period length (10240 * 2^numerology), so bucket
/// indices stay continuous when the slot counter wraps.
pub const HARQ_TIMEOUT_RING_SIZE: usize = 40;

/// Wait, in slots, for the remaining HARQ-ACK occasions once one of several
/// expected occasions for a DL HARQ process has been received.
pub const SHORT_ACK_TIMEOUT_DTX: u32 = 8;
