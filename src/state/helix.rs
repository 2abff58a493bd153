//! Five-parameter Kalman helix
//!
//! Parameters `[y, z, eta, tgl, C]` are defined at reference radius `x` in a
//! sector frame rotated by `alpha` about the beam axis. The local direction
//! satisfies `sin(phi) = C * x - eta`; positive `C` turns counterclockwise.

use nalgebra::{Matrix2, Matrix5, Vector2, Vector5};
use serde::{Deserialize, Serialize};

use super::traits::{SeedParameters, TrackState};
use crate::cluster::Cluster;
use crate::common::constants::{
    CHI2_SINGULAR, DET_EPS, GAS_DENSITY, GAS_RADIATION_LENGTH, MAX_SIN_PHI, MIN_CURVATURE,
    PION_MASS, SPEED_OF_LIGHT,
};
use crate::common::utils::wrap_two_pi;
use crate::config::DetectorConfig;

const Y: usize = 0;
const Z: usize = 1;
const ETA: usize = 2;
const TGL: usize = 3;
const C: usize = 4;

/// Largest `beta^2` used in the energy-loss formula
const MAX_BETA2: f64 = 0.99999999999;

/// Step for the numerical arc-length derivatives
const ARC_STEP: f64 = 1e-7;

/// Physics parameters shared by every [`HelixState`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HelixModel {
    /// Solenoid field (T)
    pub field_tesla: f64,
    /// Radiation length of the gas (cm)
    pub radiation_length: f64,
    /// Density of the gas (g/cm^3); zero disables material effects
    pub density: f64,
    /// Mass hypothesis for material effects (GeV)
    pub mass: f64,
}

impl HelixModel {
    /// Model for a field, with the default gas and the pion mass
    pub fn new(field_tesla: f64) -> Self {
        Self {
            field_tesla,
            radiation_length: GAS_RADIATION_LENGTH,
            density: GAS_DENSITY,
            mass: PION_MASS,
        }
    }

    /// Same model without multiple scattering or energy loss
    pub fn without_material(mut self) -> Self {
        self.density = 0.0;
        self
    }

    /// Curvature to inverse-pt conversion: `1/pt = C * conv`
    #[inline]
    pub fn conv_const(&self) -> f64 {
        100.0 / (SPEED_OF_LIGHT * self.field_tesla)
    }
}

impl Default for HelixModel {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl From<&DetectorConfig> for HelixModel {
    fn from(detector: &DetectorConfig) -> Self {
        Self::new(detector.field_tesla)
    }
}

/// Kalman helix state
#[derive(Debug, Clone, PartialEq)]
pub struct HelixState {
    x: f64,
    alpha: f64,
    params: Vector5<f64>,
    cov: Matrix5<f64>,
    model: HelixModel,
}

/// Transverse arc length between `x1` and `x2` for a helix with the given
/// `eta` and `C`, signed like `x2 - x1`.
fn arc_length(x1: f64, x2: f64, eta: f64, c: f64) -> Option<f64> {
    let s1 = c * x1 - eta;
    let s2 = c * x2 - eta;
    if s1.abs() >= 1.0 || s2.abs() >= 1.0 {
        return None;
    }
    let a1 = s1.asin();
    let a2 = s2.asin();
    let half = 0.5 * (a2 - a1);
    let chord_factor = if half.abs() < 1e-9 { 1.0 } else { half / half.sin() };
    Some((x2 - x1) / (0.5 * (a1 + a2)).cos() * chord_factor)
}

impl HelixState {
    /// Build a state directly
    pub fn new(x: f64, alpha: f64, params: Vector5<f64>, cov: Matrix5<f64>, model: HelixModel) -> Self {
        Self {
            x,
            alpha: wrap_two_pi(alpha),
            params,
            cov,
            model,
        }
    }

    /// `C * x0`, curvature times the local x of the circle centre
    #[inline]
    pub fn eta(&self) -> f64 {
        self.params[ETA]
    }

    /// `sin(phi)` of the local direction
    #[inline]
    pub fn sin_phi(&self) -> f64 {
        self.params[C] * self.x - self.params[ETA]
    }

    /// Parameter vector `[y, z, eta, tgl, C]`
    #[inline]
    pub fn params(&self) -> &Vector5<f64> {
        &self.params
    }

    /// Covariance of the parameters
    #[inline]
    pub fn covariance(&self) -> &Matrix5<f64> {
        &self.cov
    }

    /// Physics model
    #[inline]
    pub fn model(&self) -> &HelixModel {
        &self.model
    }

    /// Total momentum (GeV)
    pub fn momentum(&self) -> f64 {
        let tgl = self.params[TGL];
        ((1.0 + tgl * tgl) / self.one_over_pt().powi(2)).sqrt()
    }

    /// Position in the global frame `(X, Y, z)`
    pub fn global_position(&self) -> [f64; 3] {
        let (sa, ca) = self.alpha.sin_cos();
        let y = self.params[Y];
        [self.x * ca - y * sa, self.x * sa + y * ca, self.params[Z]]
    }

    /// Multiple scattering and energy loss over a step of length `d`
    fn apply_material(&mut self, d: f64, outward: bool) {
        let m = self.model;
        if self.params[C].abs() < MIN_CURVATURE || m.density <= 0.0 || d <= 0.0 {
            return;
        }
        let tgl = self.params[TGL];
        let one_over_pt = self.one_over_pt();
        let p2 = (1.0 + tgl * tgl) / (one_over_pt * one_over_pt);
        let mass2 = m.mass * m.mass;
        let beta2 = (p2 / (p2 + mass2)).min(MAX_BETA2);
        let theta2 = 14.1 * 14.1 / (beta2 * p2 * 1e6) * d / m.radiation_length * m.density;

        let eta = self.params[ETA];
        let ey = self.params[C] * self.x - eta;
        let ez = tgl;
        let xz = self.params[C] * ez;
        let zz1 = ez * ez + 1.0;
        let xy = eta + ey;

        self.cov[(ETA, ETA)] +=
            (2.0 * ey * ez * ez * eta + 1.0 - ey * ey + ez * ez + eta * eta * ez * ez) * theta2;
        let te = ez * zz1 * xy * theta2;
        self.cov[(TGL, ETA)] += te;
        self.cov[(ETA, TGL)] += te;
        self.cov[(TGL, TGL)] += zz1 * zz1 * theta2;
        let ce = xz * ez * xy * theta2;
        self.cov[(C, ETA)] += ce;
        self.cov[(ETA, C)] += ce;
        let ct = xz * zz1 * theta2;
        self.cov[(C, TGL)] += ct;
        self.cov[(TGL, C)] += ct;
        self.cov[(C, C)] += xz * xz * theta2;

        let mut de = 0.153e-3 / beta2 * ((5940.0 * beta2 / (1.0 - beta2)).ln() - beta2) * d * m.density;
        if outward {
            de = -de;
        }
        let old_c = self.params[C];
        self.params[C] *= 1.0 - (p2 + mass2).sqrt() / p2 * de;
        self.params[ETA] += self.x * (self.params[C] - old_c);
    }

    fn innovation(&self, cluster: &Cluster) -> (Vector2<f64>, Matrix2<f64>) {
        let residual = Vector2::new(cluster.y - self.params[Y], cluster.z - self.params[Z]);
        let r = Matrix2::new(
            self.cov[(Y, Y)] + cluster.sigma_y2,
            self.cov[(Y, Z)],
            self.cov[(Z, Y)],
            self.cov[(Z, Z)] + cluster.sigma_z2,
        );
        (residual, r)
    }
}

impl TrackState for HelixState {
    type Model = HelixModel;

    fn from_seed(seed: &SeedParameters, model: &HelixModel) -> Self {
        Self::new(seed.x, seed.alpha, seed.params, seed.covariance, *model)
    }

    #[inline]
    fn x(&self) -> f64 {
        self.x
    }

    #[inline]
    fn alpha(&self) -> f64 {
        self.alpha
    }

    #[inline]
    fn y(&self) -> f64 {
        self.params[Y]
    }

    #[inline]
    fn z(&self) -> f64 {
        self.params[Z]
    }

    #[inline]
    fn tgl(&self) -> f64 {
        self.params[TGL]
    }

    #[inline]
    fn curvature(&self) -> f64 {
        self.params[C]
    }

    #[inline]
    fn one_over_pt(&self) -> f64 {
        self.params[C] * self.model.conv_const()
    }

    #[inline]
    fn sigma_y2(&self) -> f64 {
        self.cov[(Y, Y)]
    }

    #[inline]
    fn sigma_z2(&self) -> f64 {
        self.cov[(Z, Z)]
    }

    fn propagate_to(&mut self, xk: f64) -> bool {
        let x1 = self.x;
        let dx = xk - x1;
        let eta = self.params[ETA];
        let c = self.params[C];
        let tgl = self.params[TGL];

        let c1 = c * x1 - eta;
        let c2 = c * xk - eta;
        if c1.abs() >= MAX_SIN_PHI || c2.abs() >= MAX_SIN_PHI {
            return false;
        }
        let Some(s) = arc_length(x1, xk, eta, c) else {
            return false;
        };
        let r1 = (1.0 - c1 * c1).sqrt();
        let r2 = (1.0 - c2 * c2).sqrt();
        let cc = c1 + c2;
        let rr = r1 + r2;

        let y_old = self.params[Y];
        let z_old = self.params[Z];

        // Jacobian of (y, z) with respect to (eta, tgl, C)
        let f02 = -dx * (2.0 * rr + cc * (c1 / r1 + c2 / r2)) / (rr * rr);
        let f04 = dx * ((x1 + xk) * rr + cc * (c1 * x1 / r1 + c2 * xk / r2)) / (rr * rr);
        let ds_deta = match (
            arc_length(x1, xk, eta + ARC_STEP, c),
            arc_length(x1, xk, eta - ARC_STEP, c),
        ) {
            (Some(a), Some(b)) => (a - b) / (2.0 * ARC_STEP),
            _ => 0.0,
        };
        let c_step = ARC_STEP / xk.abs().max(x1.abs()).max(1.0);
        let ds_dc = match (
            arc_length(x1, xk, eta, c + c_step),
            arc_length(x1, xk, eta, c - c_step),
        ) {
            (Some(a), Some(b)) => (a - b) / (2.0 * c_step),
            _ => 0.0,
        };

        let mut f = Matrix5::identity();
        f[(Y, ETA)] = f02;
        f[(Y, C)] = f04;
        f[(Z, ETA)] = tgl * ds_deta;
        f[(Z, TGL)] = s;
        f[(Z, C)] = tgl * ds_dc;

        self.params[Y] += dx * cc / rr;
        self.params[Z] += tgl * s;
        self.x = xk;
        self.cov = f * self.cov * f.transpose();

        let dy = self.params[Y] - y_old;
        let dz = self.params[Z] - z_old;
        let d = (dx * dx + dy * dy + dz * dz).sqrt();
        self.apply_material(d, x1 < xk);
        true
    }

    fn rotate(&mut self, dalpha: f64) -> bool {
        let (sa, ca) = dalpha.sin_cos();
        let x1 = self.x;
        let y1 = self.params[Y];
        let eta = self.params[ETA];
        let c = self.params[C];

        let r1 = c * x1 - eta;
        if r1.abs() >= MAX_SIN_PHI {
            return false;
        }
        let sq1 = (1.0 - r1 * r1).sqrt();

        let x2 = x1 * ca + y1 * sa;
        let y2 = -x1 * sa + y1 * ca;
        let eta2 = eta * ca + (c * y1 + sq1) * sa;
        let r2 = c * x2 - eta2;
        if r2.abs() >= MAX_SIN_PHI {
            return false;
        }
        // Direction must stay pointing along +x of the new frame
        if sq1 * ca + r1 * sa <= 0.0 {
            return false;
        }

        let mut f = Matrix5::identity();
        f[(Y, Y)] = ca;
        f[(ETA, Y)] = c * sa;
        f[(ETA, ETA)] = ca + sa * r1 / sq1;
        f[(ETA, C)] = (y1 - r1 * x1 / sq1) * sa;

        self.x = x2;
        self.params[Y] = y2;
        self.params[ETA] = eta2;
        self.alpha = wrap_two_pi(self.alpha + dalpha);
        self.cov = f * self.cov * f.transpose();
        true
    }

    fn predicted_chi2(&self, cluster: &Cluster) -> f64 {
        let (res, r) = self.innovation(cluster);
        let det = r.determinant();
        if det.abs() < DET_EPS {
            return CHI2_SINGULAR;
        }
        (res[0] * res[0] * r[(1, 1)] - 2.0 * res[0] * res[1] * r[(0, 1)] + res[1] * res[1] * r[(0, 0)])
            / det
    }

    fn update(&mut self, cluster: &Cluster) -> bool {
        let (res, r) = self.innovation(cluster);
        if r.determinant().abs() < DET_EPS {
            return false;
        }
        let Some(r_inv) = r.try_inverse() else {
            return false;
        };
        let gain = self.cov.fixed_columns::<2>(0) * r_inv;
        let params = self.params + gain * res;
        if (params[C] * self.x - params[ETA]).abs() >= MAX_SIN_PHI {
            return false;
        }
        let cov = self.cov - gain * self.cov.fixed_rows::<2>(0);
        self.params = params;
        self.cov = 0.5 * (cov + cov.transpose());
        true
    }

    fn reset_covariance(&mut self) {
        let diagonal = self.cov.diagonal() * 10.0;
        self.cov = Matrix5::from_diagonal(&diagonal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> HelixModel {
        HelixModel::default().without_material()
    }

    fn state(eta: f64, c: f64, tgl: f64) -> HelixState {
        let cov = Matrix5::from_diagonal(&Vector5::new(0.01, 0.01, 1e-6, 1e-6, 1e-10));
        HelixState::new(100.0, 0.0, Vector5::new(1.0, 5.0, eta, tgl, c), cov, model())
    }

    /// `y` of the circle through the state at radius `xk`
    fn circle_y(s: &HelixState, xk: f64) -> f64 {
        let c = s.curvature();
        let r1 = s.sin_phi();
        let y0 = s.y() + (1.0 - r1 * r1).sqrt() / c;
        let x0 = s.eta() / c;
        let dx = xk - x0;
        y0 - (1.0 - (c * dx).powi(2)).sqrt() / c
    }

    #[test]
    fn test_propagation_follows_circle() {
        for &(eta, c) in &[(0.1, 0.002), (-0.2, -0.003), (0.0, 0.0005)] {
            let mut s = state(eta, c, 0.5);
            let expected = circle_y(&s, 150.0);
            assert!(s.propagate_to(150.0));
            assert!((s.y() - expected).abs() < 1e-9, "y {} vs {}", s.y(), expected);
            assert_eq!(s.x(), 150.0);
        }
    }

    #[test]
    fn test_propagation_round_trip() {
        let mut s = state(0.15, 0.003, 0.8);
        let start = s.clone();
        assert!(s.propagate_to(180.0));
        assert!(s.propagate_to(100.0));
        assert!((s.params() - start.params()).norm() < 1e-9);
        assert!((s.covariance() - start.covariance()).norm() < 1e-9);
    }

    #[test]
    fn test_straight_track_z() {
        let mut s = state(0.0, 0.0, 0.5);
        assert!(s.propagate_to(120.0));
        assert!((s.y() - 1.0).abs() < 1e-12);
        assert!((s.z() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_z_uses_arc_length() {
        // Half-way around a circle of radius 1/C starting tangent to x
        let c = 0.005;
        let x1 = 100.0;
        let mut s = state(c * x1, c, 1.0);
        assert!(s.sin_phi().abs() < 1e-12);
        assert!(s.propagate_to(x1 + 150.0));
        let turned = (c * 150.0).asin();
        let arc = turned / c;
        assert!((s.z() - (5.0 + arc)).abs() < 1e-6);
    }

    #[test]
    fn test_propagation_jacobian_matches_numerical() {
        let base = state(0.12, 0.0025, 0.7);
        let xk = 170.0;
        for (k, h) in [(ETA, 1e-6), (TGL, 1e-6), (C, 1e-8)] {
            let mut plus = base.clone();
            plus.params[k] += h;
            let mut minus = base.clone();
            minus.params[k] -= h;
            assert!(plus.propagate_to(xk) && minus.propagate_to(xk));
            let numerical = (plus.params() - minus.params()) / (2.0 * h);

            // Unit variance in parameter k transports as the Jacobian column
            let mut probe = base.clone();
            probe.cov = Matrix5::zeros();
            probe.cov[(k, k)] = 1.0;
            assert!(probe.propagate_to(xk));
            for i in [Y, Z] {
                let analytic = probe.cov[(i, k)];
                let tolerance = 1e-4 * numerical[i].abs().max(1.0);
                assert!(
                    (analytic - numerical[i]).abs() < tolerance,
                    "d{}/d{}: {} vs {}",
                    i,
                    k,
                    analytic,
                    numerical[i]
                );
            }
        }
    }

    #[test]
    fn test_propagation_rejects_unphysical() {
        let mut s = state(0.0, 0.006, 0.1);
        let before = s.clone();
        // sin(phi) at x = 170 would be 1.02
        assert!(!s.propagate_to(170.0));
        assert_eq!(s, before);
    }

    #[test]
    fn test_rotation_preserves_global_position() {
        let mut s = state(0.1, 0.002, 0.3);
        let before = s.global_position();
        let dalpha = 20.0_f64.to_radians();
        assert!(s.rotate(dalpha));
        let after = s.global_position();
        for k in 0..3 {
            assert!((before[k] - after[k]).abs() < 1e-9);
        }
        assert!((s.alpha() - dalpha).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_preserves_circle() {
        // The circle centre in global coordinates is frame independent
        let centre = |s: &HelixState| {
            let c = s.curvature();
            let r1 = s.sin_phi();
            let x0 = s.eta() / c;
            let y0 = s.y() + (1.0 - r1 * r1).sqrt() / c;
            let (sa, ca) = s.alpha().sin_cos();
            (x0 * ca - y0 * sa, x0 * sa + y0 * ca)
        };
        let mut s = state(0.1, 0.002, 0.3);
        let before = centre(&s);
        assert!(s.rotate(-0.3));
        let after = centre(&s);
        assert!((before.0 - after.0).abs() < 1e-6);
        assert!((before.1 - after.1).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_round_trip() {
        let mut s = state(0.1, 0.002, 0.3);
        let start = s.clone();
        assert!(s.rotate(0.35));
        assert!(s.rotate(-0.35));
        assert!((s.params() - start.params()).norm() < 1e-9);
        assert!((s.covariance() - start.covariance()).norm() < 1e-9);
        assert!((s.x() - start.x()).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_rejects_backward_direction() {
        let mut s = state(0.0, 0.0, 0.0);
        assert!(!s.rotate(100.0_f64.to_radians()));
    }

    #[test]
    fn test_predicted_chi2() {
        let s = state(0.0, 0.001, 0.0);
        let on_track = Cluster::new(1.0, 5.0, 1.0, 0.01, 0.01);
        assert!(s.predicted_chi2(&on_track).abs() < 1e-12);

        // Variance 0.02 in y: one sigma offset gives chi2 of 1
        let offset = Cluster::new(1.0 + 0.02_f64.sqrt(), 5.0, 1.0, 0.01, 0.01);
        assert!((s.predicted_chi2(&offset) - 1.0).abs() < 1e-9);

        let mut exact = s.clone();
        exact.cov = Matrix5::zeros();
        let perfect = Cluster::new(1.0, 5.0, 1.0, 0.0, 0.0);
        assert_eq!(exact.predicted_chi2(&perfect), CHI2_SINGULAR);
    }

    #[test]
    fn test_update_pulls_towards_cluster() {
        let mut s = state(0.0, 0.001, 0.0);
        let cluster = Cluster::new(1.2, 5.0, 1.0, 0.01, 0.01);
        assert!(s.update(&cluster));
        assert!((s.y() - 1.1).abs() < 1e-9);
        assert!((s.sigma_y2() - 0.005).abs() < 1e-12);
        let cov = s.covariance();
        assert!((cov - cov.transpose()).norm() < 1e-15);
    }

    #[test]
    fn test_reset_covariance() {
        let mut s = state(0.0, 0.001, 0.0);
        s.cov[(0, 2)] = 1e-4;
        s.cov[(2, 0)] = 1e-4;
        s.reset_covariance();
        assert_eq!(s.covariance()[(0, 2)], 0.0);
        assert!((s.sigma_y2() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_energy_loss_direction() {
        let material = HelixModel::default();
        let cov = Matrix5::from_diagonal(&Vector5::new(0.01, 0.01, 1e-6, 1e-6, 1e-10));
        let params = Vector5::new(0.0, 0.0, 0.0, 0.2, 0.002);

        let mut outward = HelixState::new(100.0, 0.0, params, cov, material);
        assert!(outward.propagate_to(150.0));
        assert!(outward.curvature().abs() > 0.002);
        assert!(outward.covariance()[(TGL, TGL)] > 1e-6);

        let mut inward = HelixState::new(150.0, 0.0, params, cov, material);
        assert!(inward.propagate_to(100.0));
        assert!(inward.curvature().abs() < 0.002);
    }

    #[test]
    fn test_conversion_constant() {
        let m = HelixModel::new(0.5);
        assert!((m.conv_const() - 100.0 / (0.299792458 * 0.5)).abs() < 1e-12);
        let s = HelixState::new(100.0, 0.0, Vector5::new(0.0, 0.0, 0.0, 0.0, 0.001), Matrix5::identity(), m);
        assert!((s.one_over_pt() - 0.001 * m.conv_const()).abs() < 1e-12);
    }
}
