//! Energy-loss estimate and mass hypothesis

use serde::{Deserialize, Serialize};

use crate::common::constants::{KAON_MASS, PION_MASS, PROTON_MASS};

/// Mean of the sorted samples between the `low` and `up` quantiles.
///
/// The kept slice is `[floor(low*n) ..= floor(up*n)]` with the upper index
/// clamped to `n-1`. Returns 0 for no samples.
pub fn truncated_mean(samples: &[f64], low: f64, up: f64) -> f64 {
    let n = samples.len();
    if n == 0 {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let nu = ((up * n as f64) as usize).min(n - 1);
    let nl = ((low * n as f64) as usize).min(nu);
    let kept = &sorted[nl..=nu];
    kept.iter().sum::<f64>() / kept.len() as f64
}

/// Total momentum from the dip tangent and the signed inverse pt
#[inline]
pub fn momentum(tgl: f64, one_over_pt: f64) -> f64 {
    ((1.0 + tgl * tgl) / (one_over_pt * one_over_pt)).sqrt()
}

/// Mass hypothesis of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParticleMass {
    /// Charged pion
    #[default]
    Pion,
    /// Charged kaon
    Kaon,
    /// Proton
    Proton,
}

/// Energy-loss band `34 + 30/(p+k)^2 + 24 ln(p+k)`
fn band(p: f64, k: f64) -> f64 {
    34.0 + 30.0 / ((p + k) * (p + k)) + 24.0 * (p + k).ln()
}

impl ParticleMass {
    /// Mass in GeV
    pub fn mass(self) -> f64 {
        match self {
            ParticleMass::Pion => PION_MASS,
            ParticleMass::Kaon => KAON_MASS,
            ParticleMass::Proton => PROTON_MASS,
        }
    }

    /// Rough classification from dE/dx at total momentum `p`
    pub fn classify(dedx: f64, p: f64) -> Self {
        if p < 0.6 {
            if dedx < band(p, 0.45) {
                ParticleMass::Pion
            } else if dedx < band(p, 0.12) {
                ParticleMass::Kaon
            } else {
                ParticleMass::Proton
            }
        } else if p < 1.2 {
            if dedx < band(p, 0.12) {
                ParticleMass::Pion
            } else {
                ParticleMass::Proton
            }
        } else {
            ParticleMass::Pion
        }
    }
}
