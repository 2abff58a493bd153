//! Synthetic event generation
//!
//! Helical particles from a vertex on the beam axis are intersected with
//! every pad row of both sections. Each crossing inside a sector becomes a
//! smeared, labelled cluster in that sector's readout segment. Used by the
//! integration tests and benchmarks.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::cluster::{Cluster, ClusterSegment, NO_LABEL};
use crate::common::utils::wrap_two_pi;
use crate::config::DetectorConfig;
use crate::error::TrackerError;
use crate::sector::{ClusterStore, Section, SectorTable, Side};
use crate::state::HelixModel;

/// One simulated particle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleSpec {
    /// Transverse momentum (GeV)
    pub pt: f64,
    /// Azimuth of the momentum at the vertex
    pub phi0: f64,
    /// Dip tangent
    pub tgl: f64,
    /// Charge sign, `+1` or `-1`
    pub charge: f64,
    /// Vertex `z`
    pub z0: f64,
    /// Truth label, positive
    pub label: i32,
}

impl ParticleSpec {
    /// Particle from the origin
    pub fn new(pt: f64, phi0: f64, tgl: f64, charge: f64, label: i32) -> Self {
        Self {
            pt,
            phi0,
            tgl,
            charge,
            z0: 0.0,
            label,
        }
    }

    /// Signed curvature in a field with conversion constant `conv`
    #[inline]
    pub fn curvature(&self, conv: f64) -> f64 {
        self.charge.signum() / (self.pt * conv)
    }
}

/// Detector response of the simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Resolution along the pad row
    pub sigma_y: f64,
    /// Resolution along the drift direction
    pub sigma_z: f64,
    /// Probability that a crossing yields a cluster
    pub efficiency: f64,
    /// Unlabelled clusters per event spread uniformly over all rows
    pub noise_clusters: usize,
    /// Mean cluster charge
    pub charge_mean: f64,
    /// Relative spread of the cluster charge
    pub charge_spread: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sigma_y: 0.05,
            sigma_z: 0.05,
            efficiency: 1.0,
            noise_clusters: 0,
            charge_mean: 30.0,
            charge_spread: 0.1,
        }
    }
}

/// Generated event
#[derive(Debug, Clone)]
pub struct SimulatedEvent {
    /// Readout segments in ascending id order
    pub segments: Vec<ClusterSegment>,
    /// Particles the event was generated from
    pub particles: Vec<ParticleSpec>,
}

impl SimulatedEvent {
    /// Number of clusters carrying a label
    pub fn n_labelled(&self, label: i32) -> usize {
        self.segments
            .iter()
            .flat_map(|s| s.clusters.iter())
            .filter(|c| c.labels[0] == label)
            .count()
    }
}

/// Local `(y, z)` where a particle leaves a row of a sector, if it does so
/// within the sector and within the first half turn.
pub fn row_crossing(p: &ParticleSpec, c: f64, frame: f64, x: f64) -> Option<(f64, f64)> {
    let (sp, cp) = p.phi0.sin_cos();
    let (xc, yc) = (-sp / c, cp / c);
    let (sa, ca) = frame.sin_cos();
    let xl = xc * ca + yc * sa;
    let yl = -xc * sa + yc * ca;

    let u = c * (x - xl);
    if !(u.abs() < 1.0) {
        return None;
    }
    let psi = u.asin();
    // Turning angle from the vertex, same sign as the curvature
    let turn = if c > 0.0 {
        wrap_two_pi(frame + psi - p.phi0)
    } else {
        -wrap_two_pi(p.phi0 - frame - psi)
    };
    if !(turn.abs() < PI) {
        return None;
    }
    let s = turn / c;
    let y = yl - psi.cos() / c;
    Some((y, p.z0 + p.tgl * s))
}

/// Generate an event from a fixed seed.
///
/// Crossings are visited per section, sector and row; clusters of one
/// segment keep the particle order.
///
/// # Errors
///
/// Returns [`TrackerError::Configuration`] for an invalid detector layout
/// or negative resolutions.
pub fn generate_event(
    detector: &DetectorConfig,
    particles: &[ParticleSpec],
    config: &SimulationConfig,
    seed: u64,
) -> Result<SimulatedEvent, TrackerError> {
    let store = ClusterStore::new(detector)?;
    let conv = HelixModel::from(detector).conv_const();
    let mut rng = StdRng::seed_from_u64(seed);
    let noise_y = Normal::new(0.0, config.sigma_y)
        .map_err(|e| TrackerError::configuration(format!("pad resolution: {}", e)))?;
    let noise_z = Normal::new(0.0, config.sigma_z)
        .map_err(|e| TrackerError::configuration(format!("drift resolution: {}", e)))?;
    let noise_q = Normal::new(1.0, config.charge_spread)
        .map_err(|e| TrackerError::configuration(format!("charge spread: {}", e)))?;

    let mut segments: BTreeMap<usize, Vec<Cluster>> = BTreeMap::new();
    let sigma_y2 = config.sigma_y * config.sigma_y;
    let sigma_z2 = config.sigma_z * config.sigma_z;

    for section in [Section::Inner, Section::Outer] {
        let table = store.section(section);
        for sector in 0..table.n_sectors() {
            let frame = table.frame_angle(sector);
            for row in 0..table.n_rows() {
                for p in particles {
                    let c = p.curvature(conv);
                    let Some((y, z)) = row_crossing(p, c, frame, table.x(row)) else {
                        continue;
                    };
                    if y.abs() > table.max_y(row) || rng.gen::<f64>() >= config.efficiency {
                        continue;
                    }
                    let q = (config.charge_mean * noise_q.sample(&mut rng)).max(0.0);
                    let cluster = Cluster::new(
                        y + noise_y.sample(&mut rng),
                        z + noise_z.sample(&mut rng),
                        q,
                        sigma_y2,
                        sigma_z2,
                    )
                    .with_labels([p.label, NO_LABEL, NO_LABEL]);
                    let id = store.segment_id(section, sector, row, Side::of_z(z));
                    segments.entry(id).or_default().push(cluster);
                }
            }
        }
    }

    for _ in 0..config.noise_clusters {
        let section = if rng.gen_bool(0.5) { Section::Inner } else { Section::Outer };
        let table = store.section(section);
        let sector = rng.gen_range(0..table.n_sectors());
        let row = rng.gen_range(0..table.n_rows());
        let cluster = random_cluster(table, row, config, &mut rng);
        let id = store.segment_id(section, sector, row, Side::of_z(cluster.z));
        segments.entry(id).or_default().push(cluster);
    }

    log::debug!(
        "Generated {} particles in {} segments",
        particles.len(),
        segments.len()
    );
    Ok(SimulatedEvent {
        segments: segments
            .into_iter()
            .map(|(id, clusters)| ClusterSegment::new(id, clusters))
            .collect(),
        particles: particles.to_vec(),
    })
}

fn random_cluster(table: &SectorTable, row: usize, config: &SimulationConfig, rng: &mut StdRng) -> Cluster {
    let y_max = table.max_y(row);
    let y = rng.gen_range(-y_max..y_max);
    let z = rng.gen_range(-200.0..200.0);
    Cluster::new(
        y,
        z,
        config.charge_mean,
        config.sigma_y * config.sigma_y,
        config.sigma_z * config.sigma_z,
    )
}

/// Random primaries with labels `1..=n`: `pt` in `[pt_min, pt_max)`, any
/// azimuth, `|tgl| < tgl_max`, random charge.
pub fn random_particles(n: usize, pt_min: f64, pt_max: f64, tgl_max: f64, seed: u64) -> Vec<ParticleSpec> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=n)
        .map(|label| {
            let pt = rng.gen_range(pt_min..pt_max);
            let phi0 = rng.gen_range(0.0..2.0 * PI);
            let tgl = rng.gen_range(-tgl_max..tgl_max);
            let charge = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            ParticleSpec::new(pt, phi0, tgl, charge, label as i32)
        })
        .collect()
}
