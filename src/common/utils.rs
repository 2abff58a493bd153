//! Angle helpers

use std::f64::consts::PI;

/// Wrap an angle into `[0, 2*pi)`
#[inline]
pub fn wrap_two_pi(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    // rem_euclid may round up to exactly 2*pi for tiny negative inputs
    if wrapped >= 2.0 * PI {
        0.0
    } else {
        wrapped
    }
}
