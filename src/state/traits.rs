//! State estimator contract

use std::fmt::Debug;

use nalgebra::{Matrix5, Vector5};

use crate::cluster::Cluster;

/// Initial state handed from the seed finder to a [`TrackState`].
///
/// Parameters are `[y, z, eta, tgl, C]` at reference radius `x` in the frame
/// rotated by `alpha`, where `C` is the signed curvature and `eta = C * x0`
/// with `x0` the local x of the circle centre.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedParameters {
    /// Reference radius
    pub x: f64,
    /// Frame angle
    pub alpha: f64,
    /// `[y, z, eta, tgl, C]`
    pub params: Vector5<f64>,
    /// Covariance of `params`
    pub covariance: Matrix5<f64>,
}

/// Trajectory state estimator used by seeding, prolongation and refits.
///
/// Failure of `propagate_to`, `rotate` or `update` is reported as `false`
/// and leaves the state unchanged; it ends the current prolongation of the
/// track but is not an error.
pub trait TrackState: Clone + Debug + Send + Sync {
    /// Shared physics parameters (field, material, mass hypothesis)
    type Model: Clone + Debug + Send + Sync;

    /// Build a state from seed parameters
    fn from_seed(seed: &SeedParameters, model: &Self::Model) -> Self;

    /// Reference radius
    fn x(&self) -> f64;

    /// Frame angle
    fn alpha(&self) -> f64;

    /// Position along the row
    fn y(&self) -> f64;

    /// Position along the drift direction
    fn z(&self) -> f64;

    /// Tangent of the dip angle
    fn tgl(&self) -> f64;

    /// Signed curvature
    fn curvature(&self) -> f64;

    /// Signed inverse transverse momentum (1/GeV)
    fn one_over_pt(&self) -> f64;

    /// Signed transverse momentum, infinite for a straight track
    fn pt(&self) -> f64 {
        1.0 / self.one_over_pt()
    }

    /// Variance of `y`
    fn sigma_y2(&self) -> f64;

    /// Variance of `z`
    fn sigma_z2(&self) -> f64;

    /// Transport the state to reference radius `x`
    fn propagate_to(&mut self, x: f64) -> bool;

    /// Rotate the frame by `dalpha`
    fn rotate(&mut self, dalpha: f64) -> bool;

    /// Chi-square of a cluster against the current prediction
    fn predicted_chi2(&self, cluster: &Cluster) -> f64;

    /// Filter a cluster into the state
    fn update(&mut self, cluster: &Cluster) -> bool;

    /// Inflate the covariance before a refit
    fn reset_covariance(&mut self);
}
