#![allow(dead_code)]

mod cell_test;
mod recorder;

pub use cell_test::CellTest;
pub use recorder::Recorder;
