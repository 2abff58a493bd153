//! Numerical constants shared by the state estimator and the engines
//!
//! Geometry and cut values that a user may want to tune live in
//! [`crate::config`]; the values here are physics constants and numerical
//! guards.

/// Largest `|sin(phi)|` a track state may reach
///
/// Propagation, rotation and update fail beyond this value.
pub const MAX_SIN_PHI: f64 = 0.99999;

/// Speed of light in the units of the curvature conversion (GeV / (T m))
pub const SPEED_OF_LIGHT: f64 = 0.299792458;

/// Charged pion mass (GeV)
pub const PION_MASS: f64 = 0.13957;

/// Charged kaon mass (GeV)
pub const KAON_MASS: f64 = 0.49368;

/// Proton mass (GeV)
pub const PROTON_MASS: f64 = 0.93827;

/// Chi-square reported for a singular innovation covariance
pub const CHI2_SINGULAR: f64 = 1e10;

/// Determinant magnitude below which a 2x2 innovation covariance is singular
pub const DET_EPS: f64 = 1e-10;

/// Curvature magnitude below which energy-loss corrections are skipped
pub const MIN_CURVATURE: f64 = 1e-12;

/// Gas radiation length (cm)
pub const GAS_RADIATION_LENGTH: f64 = 28.94;

/// Gas density (g/cm^3)
pub const GAS_DENSITY: f64 = 0.9e-3;
