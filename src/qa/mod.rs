//! Quality-assurance annotations for finished tracks
//!
//! - [`cook_label`]: truth label by majority vote over associated clusters
//! - [`truncated_mean`]: dE/dx estimate from the per-cluster charge samples
//! - [`ParticleMass::classify`]: rough mass hypothesis from dE/dx and momentum

mod dedx;
mod label;

pub use dedx::{momentum, truncated_mean, ParticleMass};
pub use label::cook_label;
