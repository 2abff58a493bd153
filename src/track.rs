//! Track candidates
//!
//! A [`TrackCandidate`] is a seed while it is being prolonged and a track
//! once accepted. It owns its state estimate and the ordered list of
//! associated cluster locators; it never borrows cluster storage.

use std::fmt;

use serde::Serialize;

use crate::cluster::{Cluster, ClusterId};
use crate::config::DedxConfig;
use crate::qa::{momentum, truncated_mean, ParticleMass};
use crate::state::TrackState;

/// Where a candidate stands in its current prolongation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum TrackPhase {
    /// No cluster attached in the current pass yet
    #[default]
    Searching,
    /// Last visited row yielded a cluster
    Extending,
    /// Just handed over to a neighbouring sector
    SectorCrossing,
    /// Miss budget used up; prolongation stopped with what was found
    Exhausted,
}

impl fmt::Display for TrackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackPhase::Searching => "searching",
            TrackPhase::Extending => "extending",
            TrackPhase::SectorCrossing => "sector-crossing",
            TrackPhase::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// A seed or track
#[derive(Debug, Clone)]
pub struct TrackCandidate<S> {
    /// Current state estimate
    pub state: S,
    clusters: Vec<ClusterId>,
    dedx_samples: Vec<f64>,
    chi2: f64,
    skip_budget: usize,
    misses: usize,
    phase: TrackPhase,
    label: i32,
    dedx: f64,
    mass: ParticleMass,
    cursor: Option<usize>,
}

impl<S: TrackState> TrackCandidate<S> {
    /// Candidate without clusters
    pub fn new(state: S) -> Self {
        Self {
            state,
            clusters: Vec::new(),
            dedx_samples: Vec::new(),
            chi2: 0.0,
            skip_budget: 0,
            misses: 0,
            phase: TrackPhase::Searching,
            label: 0,
            dedx: 0.0,
            mass: ParticleMass::default(),
            cursor: None,
        }
    }

    /// Candidate seeded from one cluster already folded into `state`
    pub fn from_seed(state: S, first: ClusterId, dedx_sample: f64) -> Self {
        let mut candidate = Self::new(state);
        candidate.clusters.push(first);
        candidate.dedx_samples.push(dedx_sample);
        candidate
    }

    /// Fresh candidate restarting from another track's state
    pub fn restart_from(other: &TrackCandidate<S>) -> Self {
        let mut candidate = Self::new(other.state.clone());
        candidate.label = other.label;
        candidate.mass = other.mass;
        candidate
    }

    /// Filter a cluster into the state and record it.
    ///
    /// On update failure nothing is recorded and `false` is returned.
    pub fn accept(&mut self, cluster: &Cluster, chi2: f64, id: ClusterId, dedx_sample: f64) -> bool {
        if !self.state.update(cluster) {
            return false;
        }
        self.clusters.push(id);
        self.dedx_samples.push(dedx_sample);
        self.chi2 += chi2;
        true
    }

    /// Associated clusters, earliest found first
    #[inline]
    pub fn clusters(&self) -> &[ClusterId] {
        &self.clusters
    }

    /// Number of associated clusters
    #[inline]
    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    /// Per-cluster charge samples
    #[inline]
    pub fn dedx_samples(&self) -> &[f64] {
        &self.dedx_samples
    }

    /// Accumulated chi-square of attached clusters
    #[inline]
    pub fn chi2(&self) -> f64 {
        self.chi2
    }

    /// Signed truth label; negative marks a fake track
    #[inline]
    pub fn label(&self) -> i32 {
        self.label
    }

    /// Set the truth label
    #[inline]
    pub fn set_label(&mut self, label: i32) {
        self.label = label;
    }

    /// Truncated-mean dE/dx
    #[inline]
    pub fn dedx(&self) -> f64 {
        self.dedx
    }

    /// Mass hypothesis
    #[inline]
    pub fn mass(&self) -> ParticleMass {
        self.mass
    }

    /// Prolongation phase
    #[inline]
    pub fn phase(&self) -> TrackPhase {
        self.phase
    }

    #[inline]
    pub(crate) fn set_phase(&mut self, phase: TrackPhase) {
        self.phase = phase;
    }

    /// Remaining miss budget
    #[inline]
    pub fn skip_budget(&self) -> usize {
        self.skip_budget
    }

    #[inline]
    pub(crate) fn set_skip_budget(&mut self, budget: usize) {
        self.skip_budget = budget;
    }

    /// Consume one unit of miss budget; `false` if none was left
    pub(crate) fn consume_budget(&mut self) -> bool {
        match self.skip_budget.checked_sub(1) {
            Some(left) => {
                self.skip_budget = left;
                true
            }
            None => false,
        }
    }

    /// Rows passed without a matching cluster
    #[inline]
    pub fn misses(&self) -> usize {
        self.misses
    }

    #[inline]
    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Position in the reference track's locator list during refits
    #[inline]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    #[inline]
    pub(crate) fn set_cursor(&mut self, cursor: Option<usize>) {
        self.cursor = cursor;
    }

    /// Total momentum
    pub fn momentum(&self) -> f64 {
        momentum(self.state.tgl(), self.state.one_over_pt())
    }

    /// Compute dE/dx from the samples and derive the mass hypothesis
    pub fn cook_dedx(&mut self, config: &DedxConfig) {
        self.dedx = truncated_mean(&self.dedx_samples, config.low, config.up);
        self.mass = ParticleMass::classify(self.dedx, self.momentum());
    }
}

/// Serializable summary of a finished track
#[derive(Debug, Clone, Serialize)]
pub struct TrackSnapshot {
    /// Signed truth label
    pub label: i32,
    /// Packed cluster locators
    pub clusters: Vec<u32>,
    /// Reference radius
    pub x: f64,
    /// Frame angle
    pub alpha: f64,
    /// Local `y`
    pub y: f64,
    /// Local `z`
    pub z: f64,
    /// Dip tangent
    pub tgl: f64,
    /// Signed inverse transverse momentum
    pub one_over_pt: f64,
    /// Accumulated chi-square
    pub chi2: f64,
    /// Truncated-mean dE/dx
    pub dedx: f64,
    /// Mass hypothesis
    pub mass: ParticleMass,
}

impl<S: TrackState> From<&TrackCandidate<S>> for TrackSnapshot {
    fn from(t: &TrackCandidate<S>) -> Self {
        Self {
            label: t.label,
            clusters: t.clusters.iter().map(|id| id.raw()).collect(),
            x: t.state.x(),
            alpha: t.state.alpha(),
            y: t.state.y(),
            z: t.state.z(),
            tgl: t.state.tgl(),
            one_over_pt: t.state.one_over_pt(),
            chi2: t.chi2,
            dedx: t.dedx,
            mass: t.mass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{HelixModel, HelixState};
    use nalgebra::{Matrix5, Vector5};

    fn candidate() -> TrackCandidate<HelixState> {
        let cov = Matrix5::from_diagonal(&Vector5::new(0.01, 0.01, 1e-6, 1e-6, 1e-10));
        let state = HelixState::new(
            100.0,
            0.0,
            Vector5::new(0.0, 0.0, 0.0, 0.0, 1e-4),
            cov,
            HelixModel::default(),
        );
        TrackCandidate::from_seed(state, ClusterId::new(20, 10, 0).unwrap(), 50.0)
    }

    #[test]
    fn test_accept_records_cluster() {
        let mut t = candidate();
        let id = ClusterId::new(20, 9, 3).unwrap();
        let c = Cluster::new(0.05, 0.0, 30.0, 0.01, 0.01);
        assert!(t.accept(&c, 0.2, id, 75.0));
        assert_eq!(t.clusters(), &[ClusterId::new(20, 10, 0).unwrap(), id]);
        assert_eq!(t.dedx_samples(), &[50.0, 75.0]);
        assert!((t.chi2() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_budget() {
        let mut t = candidate();
        t.set_skip_budget(1);
        assert!(t.consume_budget());
        assert_eq!(t.skip_budget(), 0);
        assert!(!t.consume_budget());
    }

    #[test]
    fn test_cook_dedx_sets_mass() {
        let mut t = candidate();
        t.cook_dedx(&DedxConfig::default());
        assert!((t.dedx() - 50.0).abs() < 1e-12);
        // p is well above 1.2 GeV for this curvature
        assert_eq!(t.mass(), ParticleMass::Pion);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut t = candidate();
        t.set_label(12);
        let snapshot = TrackSnapshot::from(&t);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"label\":12"));
        assert_eq!(snapshot.clusters, vec![(20 << 24) | (10 << 16)]);
    }
}
