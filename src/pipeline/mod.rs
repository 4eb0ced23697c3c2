//! Per-turn processing of recorded answers.

pub mod turn;

pub use turn::{TurnError, TurnPipeline};
