//! Use cases: turn orchestration and scene post-processing.

pub mod postprocess;
pub mod turn;
