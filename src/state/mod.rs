//! Track state estimation
//!
//! The engines only talk to a state through the [`TrackState`] contract.
//! [`HelixState`] is the stock implementation: a five-parameter Kalman helix
//! in the local frame of a sector.

mod helix;
mod traits;

pub use helix::{HelixModel, HelixState};
pub use traits::{SeedParameters, TrackState};
