//! Triplet seed finder
//!
//! Seeds are built in the outer sector table from a cluster in a `near` row,
//! a cluster in a `far` row (searched in the same and both adjacent sectors)
//! and the reference point. The circle through the three points gives the
//! curvature and the centre term; the near/far pair gives the dip. Every
//! triplet passing the cuts is prolonged down to the far row at once and
//! kept if it collected enough clusters.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use smallvec::SmallVec;

use nalgebra::{Matrix5, Vector5};

use crate::cluster::{Cluster, ClusterId};
use crate::config::{ProlongationConfig, SeedingConfig};
use crate::prolongation::ProlongationEngine;
use crate::row::Row;
use crate::sector::SectorTable;
use crate::state::{SeedParameters, TrackState};
use crate::track::TrackCandidate;

/// Signed curvature of the circle through three points
pub fn curvature(x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) -> f64 {
    let (d, a, b) = circle_terms(x1, y1, x2, y2, x3, y3);
    let xr = (d / (d * x1 - a)).abs();
    let yr = d / (d * y1 - b);
    -xr * yr / (xr * xr + yr * yr).sqrt()
}

/// Curvature times the x of the centre of the circle through three points
pub fn curvature_center(x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) -> f64 {
    let (d, a, b) = circle_terms(x1, y1, x2, y2, x3, y3);
    let xr = (d / (d * x1 - a)).abs();
    let yr = d / (d * y1 - b);
    -a / (d * y1 - b) * xr / (xr * xr + yr * yr).sqrt()
}

/// Dip tangent of the segment between two points
pub fn dip_tangent(x1: f64, y1: f64, x2: f64, y2: f64, z1: f64, z2: f64) -> f64 {
    (z1 - z2) / ((x1 - x2) * (x1 - x2) + (y1 - y2) * (y1 - y2)).sqrt()
}

/// Determinant and scaled centre `(d, a, b)`; the centre is `(a/d, b/d)`
#[inline]
fn circle_terms(x1: f64, y1: f64, x2: f64, y2: f64, x3: f64, y3: f64) -> (f64, f64, f64) {
    let d = (x2 - x1) * (y3 - y2) - (x3 - x2) * (y2 - y1);
    let a = 0.5
        * ((y3 - y2) * (y2 * y2 - y1 * y1 + x2 * x2 - x1 * x1)
            - (y2 - y1) * (y3 * y3 - y2 * y2 + x3 * x3 - x2 * x2));
    let b = 0.5
        * ((x2 - x1) * (y3 * y3 - y2 * y2 + x3 * x3 - x2 * x2)
            - (x3 - x2) * (y2 * y2 - y1 * y1 + x2 * x2 - x1 * x1));
    (d, a, b)
}

/// A triplet that passed the geometric cuts
#[derive(Debug, Clone, PartialEq)]
pub struct SeedTriplet {
    /// Sector the seed is built in
    pub sector: usize,
    /// Near-row cluster, the seed's first association
    pub near: ClusterId,
    /// Far-row cluster
    pub far: ClusterId,
    /// Initial state at the near row
    pub params: SeedParameters,
    /// Charge sample of the near cluster
    pub dedx_sample: f64,
}

/// Far-row cluster moved into the frame of the seeding sector
#[derive(Debug, Clone, Copy)]
struct FarPoint<'c> {
    id: ClusterId,
    x: f64,
    y: f64,
    cluster: &'c Cluster,
}

/// Seed finder over the outer sector table
#[derive(Debug, Clone, Copy)]
pub struct SeedFinder<'a> {
    config: &'a SeedingConfig,
    engine: ProlongationEngine<'a>,
}

impl<'a> SeedFinder<'a> {
    /// Create a seed finder
    pub fn new(config: &'a SeedingConfig, prolongation: &'a ProlongationConfig) -> Self {
        Self {
            config,
            engine: ProlongationEngine::new(prolongation),
        }
    }

    /// `(near, far)` row pairs seeded per event.
    ///
    /// With `gap = floor(gap_fraction * total_rows)` and `shift = gap / 2`:
    /// `(n-1, n-1-gap)` then `(n-1-shift, n-1-shift-gap)`, `n` being the
    /// rows of the seeding table. Pairs that do not fit are skipped.
    pub fn schedule(table_rows: usize, total_rows: usize, gap_fraction: f64) -> SmallVec<[(usize, usize); 2]> {
        let gap = (gap_fraction * total_rows as f64) as usize;
        let shift = gap / 2;
        let mut pairs = SmallVec::new();
        if gap == 0 {
            return pairs;
        }
        for offset in [0, shift] {
            let Some(near) = table_rows.checked_sub(1 + offset) else {
                continue;
            };
            if let Some(far) = near.checked_sub(gap) {
                pairs.push((near, far));
            }
        }
        pairs
    }

    /// Reference point in the frame of a sector
    fn reference_in_frame(&self, table: &SectorTable, sector: usize) -> (f64, f64, f64) {
        let [gx, gy, gz] = self.config.vertex;
        let (sa, ca) = table.frame_angle(sector).sin_cos();
        (gx * ca + gy * sa, -gx * sa + gy * ca, gz)
    }

    /// Far-row clusters of a sector and its two neighbours, in its frame
    fn far_points<'t>(&self, table: &'t SectorTable, sector: usize, far: usize) -> Vec<FarPoint<'t>> {
        let xx2 = table.x(far);
        let neighbours: SmallVec<[(isize, &Row); 3]> = [-1, 0, 1]
            .into_iter()
            .map(|step| (step, table.row(table.neighbour(sector, step), far)))
            .collect();
        let mut points = Vec::with_capacity(neighbours.iter().map(|(_, r)| r.len()).sum());
        for (step, row) in neighbours {
            let (sn, cs) = (step as f64 * table.alpha()).sin_cos();
            for (id, c) in row.iter() {
                points.push(FarPoint {
                    id,
                    x: xx2 * cs - c.y * sn,
                    y: xx2 * sn + c.y * cs,
                    cluster: c,
                });
            }
        }
        points
    }

    /// Triplets of one sector passing the geometric cuts
    pub fn sector_triplets(&self, table: &SectorTable, sector: usize, near: usize, far: usize) -> Vec<SeedTriplet> {
        let cfg = self.config;
        let x1 = table.x(near);
        let (x3, y3, z3) = self.reference_in_frame(table, sector);
        let far_points = self.far_points(table, sector, far);
        let mut triplets = Vec::new();

        for (near_id, c1) in table.row(sector, near).iter() {
            let (y1, z1) = (c1.y, c1.z);
            for p in &far_points {
                let (x2, y2, z2) = (p.x, p.y, p.cluster.z);

                let zz = z1 - (z1 - z3) / (x1 - x3) * (x1 - x2);
                if !((zz - z2).abs() <= cfg.max_z_deviation) {
                    continue;
                }

                let (d, _, _) = circle_terms(x1, y1, x2, y2, x3, y3);
                if d == 0.0 {
                    log::debug!("Straight seed skipped: {} / {}", near_id, p.id);
                    continue;
                }

                let c = curvature(x1, y1, x2, y2, x3, y3);
                if !(c.abs() < cfg.max_curvature) {
                    continue;
                }
                let eta = curvature_center(x1, y1, x2, y2, x3, y3);
                let tgl = dip_tangent(x1, y1, x2, y2, z1, z2);
                if !(tgl.abs() <= cfg.max_tgl) {
                    continue;
                }
                let zv = z1 - tgl / c * (eta.asin() + (c * x1 - eta).asin());
                if !((zv - z3).abs() <= cfg.max_vertex_z_deviation) {
                    continue;
                }

                let covariance = self.seed_covariance(c1, p.cluster, [x1, y1, x2, y2, x3, y3, z1, z2], c, eta, tgl);
                triplets.push(SeedTriplet {
                    sector,
                    near: near_id,
                    far: p.id,
                    params: SeedParameters {
                        x: x1,
                        alpha: table.frame_angle(sector),
                        params: Vector5::new(y1, z1, eta, tgl, c),
                        covariance,
                    },
                    dedx_sample: c1.q / table.pad_pitch_width(),
                });
            }
        }
        triplets
    }

    /// Covariance from finite-difference sensitivities of the circle
    /// parameters to the measured coordinates
    fn seed_covariance(
        &self,
        near: &Cluster,
        far: &Cluster,
        points: [f64; 8],
        c: f64,
        eta: f64,
        tgl: f64,
    ) -> Matrix5<f64> {
        let [x1, y1, x2, y2, x3, y3, z1, z2] = points;
        let (sy, sz) = (self.config.sigma_y, self.config.sigma_z);
        let (sy1, sz1) = (near.sigma_y2, near.sigma_z2);
        let (sy2, sz2) = (far.sigma_y2, far.sigma_z2);
        let sy3 = 25000.0 * c * c + 0.1;

        let f40 = (curvature(x1, y1 + sy, x2, y2, x3, y3) - c) / sy;
        let f42 = (curvature(x1, y1, x2, y2 + sy, x3, y3) - c) / sy;
        let f43 = (curvature(x1, y1, x2, y2, x3, y3 + sy) - c) / sy;
        let f20 = (curvature_center(x1, y1 + sy, x2, y2, x3, y3) - eta) / sy;
        let f22 = (curvature_center(x1, y1, x2, y2 + sy, x3, y3) - eta) / sy;
        let f23 = (curvature_center(x1, y1, x2, y2, x3, y3 + sy) - eta) / sy;
        let f30 = (dip_tangent(x1, y1 + sy, x2, y2, z1, z2) - tgl) / sy;
        let f31 = (dip_tangent(x1, y1, x2, y2, z1 + sz, z2) - tgl) / sz;
        let f32 = (dip_tangent(x1, y1, x2, y2 + sy, z1, z2) - tgl) / sy;
        let f34 = (dip_tangent(x1, y1, x2, y2, z1, z2 + sz) - tgl) / sz;

        let c00 = sy1;
        let c11 = sz1;
        let c20 = f20 * sy1;
        let c22 = f20 * sy1 * f20 + f22 * sy2 * f22 + f23 * sy3 * f23;
        let c30 = f30 * sy1;
        let c31 = f31 * sz1;
        let c32 = f30 * sy1 * f20 + f32 * sy2 * f22;
        let c33 = f30 * sy1 * f30 + f31 * sz1 * f31 + f32 * sy2 * f32 + f34 * sz2 * f34;
        let c40 = f40 * sy1;
        let c42 = f40 * sy1 * f20 + f42 * sy2 * f22 + f43 * sy3 * f23;
        let c43 = f30 * sy1 * f40 + f32 * sy2 * f42;
        let c44 = f40 * sy1 * f40 + f42 * sy2 * f42 + f43 * sy3 * f43;

        #[rustfmt::skip]
        let cov = Matrix5::new(
            c00, 0.0, c20, c30, c40,
            0.0, c11, 0.0, c31, 0.0,
            c20, 0.0, c22, c32, c42,
            c30, c31, c32, c33, c43,
            c40, 0.0, c42, c43, c44,
        );
        cov
    }

    /// Triplets of every sector, in sector order
    pub fn find_triplets(&self, table: &SectorTable, near: usize, far: usize) -> Vec<SeedTriplet> {
        (0..table.n_sectors())
            .flat_map(|s| self.sector_triplets(table, s, near, far))
            .collect()
    }

    /// Prolong the triplets of one sector down to the far row
    fn sector_seeds<S: TrackState>(
        &self,
        table: &SectorTable,
        sector: usize,
        near: usize,
        far: usize,
        model: &S::Model,
    ) -> (usize, Vec<TrackCandidate<S>>) {
        let min_clusters = (self.config.min_cluster_fraction * (near - far) as f64) as usize;
        let triplets = self.sector_triplets(table, sector, near, far);
        let tried = triplets.len();
        let seeds = triplets
            .into_iter()
            .filter_map(|t| {
                let state = S::from_seed(&t.params, model);
                let mut candidate = TrackCandidate::from_seed(state, t.near, t.dedx_sample);
                let outcome = self.engine.follow(&mut candidate, table, far);
                if outcome.is_completed() && candidate.n_clusters() >= min_clusters {
                    Some(candidate)
                } else {
                    log::trace!(
                        "Seed {}/{} dropped: {:?} with {} clusters",
                        t.near,
                        t.far,
                        outcome,
                        candidate.n_clusters()
                    );
                    None
                }
            })
            .collect();
        (tried, seeds)
    }

    /// Seeds of one `(near, far)` row pair with the number of triplets tried.
    ///
    /// Seeding only reads the store, so sectors are independent; with the
    /// `parallel` feature they run in parallel and are concatenated in sector
    /// order.
    pub fn make_seeds<S: TrackState>(
        &self,
        table: &SectorTable,
        near: usize,
        far: usize,
        model: &S::Model,
    ) -> (usize, Vec<TrackCandidate<S>>) {
        #[cfg(feature = "parallel")]
        let per_sector: Vec<(usize, Vec<TrackCandidate<S>>)> = (0..table.n_sectors())
            .into_par_iter()
            .map(|s| self.sector_seeds(table, s, near, far, model))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let per_sector: Vec<(usize, Vec<TrackCandidate<S>>)> = (0..table.n_sectors())
            .map(|s| self.sector_seeds(table, s, near, far, model))
            .collect();

        let mut tried = 0;
        let mut seeds = Vec::new();
        for (n, mut sector_seeds) in per_sector {
            tried += n;
            seeds.append(&mut sector_seeds);
        }
        log::debug!(
            "Seeding rows {} -> {}: {} triplets, {} seeds",
            near,
            far,
            tried,
            seeds.len()
        );
        (tried, seeds)
    }
}
