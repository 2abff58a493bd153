//! Cluster position resolution model
//!
//! Parametrised as a function of the row radius, the dip tangent and (for
//! the pad direction) the transverse momentum. Both widths are floored and
//! scaled by the factors in [`ProlongationConfig`].

use crate::config::ProlongationConfig;

/// Expected variance along the pad row
pub fn sigma_y2(x: f64, tgl: f64, pt: f64, config: &ProlongationConfig) -> f64 {
    let pt = pt.abs();
    let u = if pt.is_finite() && pt > 0.0 { x / (1000.0 * pt) } else { 0.0 };
    let s = 0.41818e-2 - 0.17460e-4 * x * tgl.abs() + 0.30993e-2 * u * u + 0.41061e-3 * u;
    scale(s, config)
}

/// Expected variance along the drift direction
pub fn sigma_z2(x: f64, tgl: f64, config: &ProlongationConfig) -> f64 {
    let s = 0.39614e-2 - 0.22443e-4 * x * tgl.abs() + 0.51504e-1 * tgl * tgl;
    scale(s, config)
}

#[inline]
fn scale(s: f64, config: &ProlongationConfig) -> f64 {
    s.max(config.resolution_floor) * config.resolution_scale
}
