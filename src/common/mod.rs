//! Shared constants, angle helpers and the synthetic event generator.

pub mod constants;
pub mod simulation;
pub mod utils;
