//! HARQ process management for one NR cell
//!
//! - Per direction repositories: a pre-sized pool of HARQ processes, per UE h_id
//!   reservations, a slot-indexed HARQ-ACK timeout wheel and a pending retransmission list
//! - The cell manager, which drives both repositories from the slot clock and merges
//!   DL HARQ-ACK occasions and UL CRC results
//! - RAII UE entities and lightweight process views used by the scheduler and PHY report paths

pub mod cell_harq_manager;
pub mod diag;
pub mod harq_process;
pub mod harq_view;
pub mod index_list;
pub mod notifier;
pub mod repository;
pub mod timeout_wheel;
pub mod ue_harq_entity;

pub use cell_harq_manager::{CellHarqManager, DlHarqStatusUpdate, HarqErr};
pub use diag::{DiagnosticSink, DiscardCause, HarqEvent, TracingDiagnosticSink};
pub use harq_process::{DlTxParams, HarqState, UlTxParams};
pub use harq_view::{DlHarqProcessView, UlHarqProcessView};
pub use notifier::{HarqTimeoutNotifier, NullTimeoutNotifier};
pub use repository::HarqCounters;
pub use ue_harq_entity::UniqueUeHarqEntity;
