//! Configuration types
//!
//! Detector geometry ([`DetectorConfig`]) is read-only input supplied by the
//! caller; reconstruction cuts ([`TrackerConfig`]) are grouped per stage.
//! Both are plain serde structs and can be loaded from JSON.

use std::f64::consts::PI;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterId;
use crate::error::TrackerError;

/// A run of pad rows sharing the same pad length and dE/dx correction.
///
/// Regions apply from `first_row` up to the next region's `first_row`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PadRegion {
    /// First row of the region
    pub first_row: usize,
    /// Pad length (radial pitch between row centres)
    pub pad_length: f64,
    /// Multiplier applied to charge samples taken in this region
    pub dedx_correction: f64,
}

impl PadRegion {
    /// Create a pad region
    pub fn new(first_row: usize, pad_length: f64, dedx_correction: f64) -> Self {
        Self {
            first_row,
            pad_length,
            dedx_correction,
        }
    }
}

/// Geometry of one radial section (inner or outer sectors)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionConfig {
    /// Number of azimuthal sectors (one detector half)
    pub n_sectors: usize,
    /// Angular width of a sector (radians)
    pub alpha: f64,
    /// Angle of the centre of sector 0 (radians)
    pub alpha_shift: f64,
    /// Pad width along the row
    pub pad_pitch_width: f64,
    /// Pad-length regions ordered by `first_row`, the first starting at row 0
    pub regions: Vec<PadRegion>,
    /// Radius of each pad row
    pub row_radii: Vec<f64>,
}

impl SectionConfig {
    /// Build a section whose rows are laid out from `first_radius` outward,
    /// each row spaced by the mean pad length of it and its predecessor.
    pub fn with_pad_rows(
        n_sectors: usize,
        alpha_shift: f64,
        pad_pitch_width: f64,
        first_radius: f64,
        n_rows: usize,
        regions: Vec<PadRegion>,
    ) -> Self {
        let mut section = Self {
            n_sectors,
            alpha: 2.0 * PI / n_sectors as f64,
            alpha_shift,
            pad_pitch_width,
            regions,
            row_radii: Vec::with_capacity(n_rows),
        };
        let mut radius = first_radius;
        for row in 0..n_rows {
            if row > 0 {
                radius += 0.5 * (section.pad_length(row - 1) + section.pad_length(row));
            }
            section.row_radii.push(radius);
        }
        section
    }

    /// Number of pad rows
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.row_radii.len()
    }

    /// Region a row belongs to
    pub fn region(&self, row: usize) -> Option<&PadRegion> {
        self.regions.iter().rev().find(|r| r.first_row <= row)
    }

    /// Pad length of a row
    pub fn pad_length(&self, row: usize) -> f64 {
        self.region(row).map_or(0.0, |r| r.pad_length)
    }

    /// dE/dx correction of a row
    pub fn dedx_correction(&self, row: usize) -> f64 {
        self.region(row).map_or(1.0, |r| r.dedx_correction)
    }

    fn validate(&self, name: &str, max_sectors: usize) -> Result<(), TrackerError> {
        if self.n_sectors == 0 || self.n_sectors > max_sectors {
            return Err(TrackerError::configuration(format!(
                "{} section: sector count {} out of range 1..={}",
                name, self.n_sectors, max_sectors
            )));
        }
        if self.row_radii.is_empty() || self.n_rows() > ClusterId::MAX_ROW + 1 {
            return Err(TrackerError::configuration(format!(
                "{} section: row count {} out of range 1..={}",
                name,
                self.n_rows(),
                ClusterId::MAX_ROW + 1
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < PI) {
            return Err(TrackerError::configuration(format!(
                "{} section: sector angle {} must be in (0, pi)",
                name, self.alpha
            )));
        }
        if self.row_radii.windows(2).any(|w| w[1] <= w[0]) || self.row_radii[0] <= 0.0 {
            return Err(TrackerError::configuration(format!(
                "{} section: row radii must be positive and strictly increasing",
                name
            )));
        }
        if self.regions.first().map(|r| r.first_row) != Some(0)
            || self.regions.windows(2).any(|w| w[1].first_row <= w[0].first_row)
        {
            return Err(TrackerError::configuration(format!(
                "{} section: pad regions must start at row 0 and be ordered",
                name
            )));
        }
        if self.pad_pitch_width <= 0.0 {
            return Err(TrackerError::configuration(format!(
                "{} section: pad pitch width must be positive",
                name
            )));
        }
        Ok(())
    }
}

/// Read-only description of the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Inner sectors
    pub inner: SectionConfig,
    /// Outer sectors
    pub outer: SectionConfig,
    /// Reference radius inside the first inner row (end point of inward refits)
    pub inner_radius_low: f64,
    /// Reference radius outside the last outer row (end point of outward refits)
    pub outer_radius_up: f64,
    /// Solenoid field in tesla
    pub field_tesla: f64,
    /// Capacity of a single pad row
    pub max_clusters_per_row: usize,
}

impl DetectorConfig {
    /// 18 sectors per half; 63 inner rows of 0.75 pads, 64 outer rows of
    /// 1.0 pads followed by 32 rows of 1.5 pads; 0.2 T field.
    pub fn standard() -> Self {
        let shift = 10.0_f64.to_radians();
        let inner = SectionConfig::with_pad_rows(
            18,
            shift,
            0.4,
            85.225,
            63,
            vec![PadRegion::new(0, 0.75, 1.0)],
        );
        let outer = SectionConfig::with_pad_rows(
            18,
            shift,
            0.6,
            135.1,
            96,
            vec![PadRegion::new(0, 1.0, 1.0), PadRegion::new(64, 1.5, 0.67)],
        );
        Self {
            inner,
            outer,
            inner_radius_low: 84.85,
            outer_radius_up: 246.6,
            field_tesla: 0.2,
            max_clusters_per_row: 3500,
        }
    }

    /// Load from a JSON string and validate
    pub fn from_json_str(json: &str) -> Result<Self, TrackerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file and validate
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Total number of pad rows crossed by a radial track
    #[inline]
    pub fn total_rows(&self) -> usize {
        self.inner.n_rows() + self.outer.n_rows()
    }

    /// Check that the layout fits the packed locator and is geometrically sane
    pub fn validate(&self) -> Result<(), TrackerError> {
        let max_sectors = ClusterId::MAX_SECTOR + 1;
        self.inner.validate("inner", max_sectors)?;
        self.outer.validate("outer", max_sectors)?;
        if self.inner.n_sectors + self.outer.n_sectors > max_sectors {
            return Err(TrackerError::configuration(
                "inner plus outer sector count does not fit the cluster locator",
            ));
        }
        if self.inner.row_radii[self.inner.n_rows() - 1] >= self.outer.row_radii[0] {
            return Err(TrackerError::configuration(
                "inner rows must lie inside the outer rows",
            ));
        }
        if self.max_clusters_per_row == 0 || self.max_clusters_per_row > ClusterId::MAX_SLOT + 1 {
            return Err(TrackerError::configuration(format!(
                "row capacity {} out of range 1..={}",
                self.max_clusters_per_row,
                ClusterId::MAX_SLOT + 1
            )));
        }
        if self.field_tesla == 0.0 || !self.field_tesla.is_finite() {
            return Err(TrackerError::configuration("field must be finite and nonzero"));
        }
        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Cuts of the triplet seed finder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedingConfig {
    /// Max |z| mismatch of the far cluster against the near/vertex line
    pub max_z_deviation: f64,
    /// Max |curvature|
    pub max_curvature: f64,
    /// Max |tan(dip)|
    pub max_tgl: f64,
    /// Max |z| mismatch of the reconstructed vertex
    pub max_vertex_z_deviation: f64,
    /// Finite-difference step for `y` sensitivities
    pub sigma_y: f64,
    /// Finite-difference step for `z` sensitivities
    pub sigma_z: f64,
    /// Reference point (global x, y, z)
    pub vertex: [f64; 3],
    /// Row gap between near and far seeding rows, as a fraction of all rows
    pub gap_fraction: f64,
    /// Min clusters after seeding prolongation, as a fraction of the row gap
    pub min_cluster_fraction: f64,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            max_z_deviation: 5.0,
            max_curvature: 0.0066,
            max_tgl: 1.2,
            max_vertex_z_deviation: 10.0,
            sigma_y: 0.1,
            sigma_z: 0.1,
            vertex: [0.0; 3],
            gap_fraction: 0.125,
            min_cluster_fraction: 0.5,
        }
    }
}

/// Cuts of the row-by-row prolongation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProlongationConfig {
    /// Max predicted chi-square of an attached cluster
    pub max_chi2: f64,
    /// Max search road half-width
    pub max_road: f64,
    /// Road half-width in standard deviations
    pub road_sigmas: f64,
    /// Squared drift-direction gate in standard deviations
    pub z_gate_sigmas2: f64,
    /// Miss budget of short candidates
    pub rows_to_skip: usize,
    /// Cluster count from which a candidate counts as established
    pub established_min_clusters: usize,
    /// Miss budget of established candidates, as a fraction of the section's rows
    pub established_skip_fraction: f64,
    /// Cluster count from which back-propagation searches rows without a known association
    pub gap_fill_min_clusters: usize,
    /// Empirical scale of the cluster resolution model
    pub resolution_scale: f64,
    /// Floor of the cluster resolution model (variance)
    pub resolution_floor: f64,
}

impl Default for ProlongationConfig {
    fn default() -> Self {
        Self {
            max_chi2: 12.0,
            max_road: 30.0,
            road_sigmas: 4.0,
            z_gate_sigmas2: 16.0,
            rows_to_skip: 10,
            established_min_clusters: 10,
            established_skip_fraction: 0.5,
            gap_fill_min_clusters: 27,
            resolution_scale: 1.3,
            resolution_floor: 0.4e-3,
        }
    }
}

/// Truncation of the dE/dx sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedxConfig {
    /// Lower fraction of sorted samples to drop
    pub low: f64,
    /// Upper edge (fraction) of the retained slice
    pub up: f64,
}

impl Default for DedxConfig {
    fn default() -> Self {
        Self { low: 0.0, up: 1.0 }
    }
}

/// All reconstruction cuts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seed finder cuts
    pub seeding: SeedingConfig,
    /// Prolongation cuts
    pub prolongation: ProlongationConfig,
    /// dE/dx truncation
    pub dedx: DedxConfig,
    /// Tolerated fraction of foreign clusters before a label is flagged fake
    pub label_wrong_fraction: f64,
    /// Min clusters of an accepted track, as a fraction of all rows
    pub min_track_fraction: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            seeding: SeedingConfig::default(),
            prolongation: ProlongationConfig::default(),
            dedx: DedxConfig::default(),
            label_wrong_fraction: 0.1,
            min_track_fraction: 0.4,
        }
    }
}

impl TrackerConfig {
    /// Reference configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON string; absent fields take reference values
    pub fn from_json_str(json: &str) -> Result<Self, TrackerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), TrackerError> {
        let d = &self.dedx;
        if !(0.0..=1.0).contains(&d.low) || !(0.0..=1.0).contains(&d.up) || d.low > d.up {
            return Err(TrackerError::configuration(format!(
                "dE/dx truncation [{}, {}] must satisfy 0 <= low <= up <= 1",
                d.low, d.up
            )));
        }
        if self.prolongation.max_chi2 <= 0.0 || self.prolongation.max_road <= 0.0 {
            return Err(TrackerError::configuration(
                "chi-square and road limits must be positive",
            ));
        }
        if !(0.0..1.0).contains(&self.seeding.gap_fraction) {
            return Err(TrackerError::configuration(
                "seeding gap fraction must be in [0, 1)",
            ));
        }
        Ok(())
    }
}
