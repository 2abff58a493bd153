//! Observability for reconstruction passes.
//!
//! This module provides the [`StepReporter`] trait. Reporters receive
//! callbacks at key points of a [`Tracker`](crate::tracker::Tracker) pass
//! without touching the reconstruction logic.
//!
//! The default [`NoOpReporter`] has empty callbacks that compile away.
//! [`LoggingReporter`] forwards events to the `log` facade and
//! [`DebugReporter`] stores them for inspection in tests.
//!
//! # Example
//!
//! ```
//! use tpc_tracker::reporter::{DebugReporter, StepReporter};
//!
//! let mut reporter = DebugReporter::new();
//! reporter.on_clusters_loaded(1200);
//! reporter.on_seeds(95, 76, 40, 12);
//!
//! assert_eq!(reporter.load_events(), &[1200]);
//! assert_eq!(reporter.seeding_events()[0].kept, 12);
//! ```

use crate::track::TrackSnapshot;
use crate::tracker::{EventSummary, Pass, RejectReason};

// ============================================================================
// StepReporter Trait
// ============================================================================

/// Observability trait for reconstruction passes.
///
/// All methods have default empty implementations, so implementors only
/// override the events they care about. Callbacks take `&mut self`;
/// reporters need not be `Send + Sync`.
pub trait StepReporter {
    /// Called after an event's clusters are loaded into the store.
    fn on_clusters_loaded(&mut self, _n_clusters: usize) {}

    /// Called after one seeding row pair has been processed.
    ///
    /// `tried` counts triplets passing the geometric cuts, `kept` the seeds
    /// that survived the seeding prolongation.
    fn on_seeds(&mut self, _near: usize, _far: usize, _tried: usize, _kept: usize) {}

    /// Called when a track is accepted.
    fn on_track_accepted(&mut self, _pass: Pass, _track: &TrackSnapshot) {}

    /// Called when a candidate is dropped.
    fn on_track_rejected(&mut self, _pass: Pass, _reason: RejectReason) {}

    /// Called once a pass has finished.
    fn on_pass_complete(&mut self, _pass: Pass, _summary: &EventSummary) {}
}

// ============================================================================
// NoOpReporter
// ============================================================================

/// Reporter that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReporter;

impl NoOpReporter {
    /// Create a new no-op reporter.
    pub fn new() -> Self {
        Self
    }
}

impl StepReporter for NoOpReporter {}

// ============================================================================
// DebugReporter
// ============================================================================

/// One seeding row pair as seen by a [`DebugReporter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedingEvent {
    /// Near row
    pub near: usize,
    /// Far row
    pub far: usize,
    /// Triplets passing the geometric cuts
    pub tried: usize,
    /// Seeds kept after prolongation
    pub kept: usize,
}

/// Reporter that captures all events.
///
/// Accepted tracks are stored as [`TrackSnapshot`]s, so memory grows with
/// the number of tracks reported.
#[derive(Debug, Clone, Default)]
pub struct DebugReporter {
    loads: Vec<usize>,
    seedings: Vec<SeedingEvent>,
    accepted: Vec<(Pass, TrackSnapshot)>,
    rejected: Vec<(Pass, RejectReason)>,
    summaries: Vec<(Pass, EventSummary)>,
}

impl DebugReporter {
    /// Create a new debug reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all captured events.
    pub fn clear(&mut self) {
        self.loads.clear();
        self.seedings.clear();
        self.accepted.clear();
        self.rejected.clear();
        self.summaries.clear();
    }

    /// Cluster counts of each load.
    pub fn load_events(&self) -> &[usize] {
        &self.loads
    }

    /// Seeding row pairs.
    pub fn seeding_events(&self) -> &[SeedingEvent] {
        &self.seedings
    }

    /// Accepted tracks with their pass.
    pub fn accepted_events(&self) -> &[(Pass, TrackSnapshot)] {
        &self.accepted
    }

    /// Rejections with their pass.
    pub fn rejected_events(&self) -> &[(Pass, RejectReason)] {
        &self.rejected
    }

    /// Pass summaries.
    pub fn summary_events(&self) -> &[(Pass, EventSummary)] {
        &self.summaries
    }

    /// Total number of captured events across all types.
    pub fn total_events(&self) -> usize {
        self.loads.len() + self.seedings.len() + self.accepted.len() + self.rejected.len() + self.summaries.len()
    }
}

impl StepReporter for DebugReporter {
    fn on_clusters_loaded(&mut self, n_clusters: usize) {
        self.loads.push(n_clusters);
    }

    fn on_seeds(&mut self, near: usize, far: usize, tried: usize, kept: usize) {
        self.seedings.push(SeedingEvent { near, far, tried, kept });
    }

    fn on_track_accepted(&mut self, pass: Pass, track: &TrackSnapshot) {
        self.accepted.push((pass, track.clone()));
    }

    fn on_track_rejected(&mut self, pass: Pass, reason: RejectReason) {
        self.rejected.push((pass, reason));
    }

    fn on_pass_complete(&mut self, pass: Pass, summary: &EventSummary) {
        self.summaries.push((pass, *summary));
    }
}

// ============================================================================
// LoggingReporter
// ============================================================================

/// Reporter that emits events through the `log` crate.
///
/// Levels: pass summaries at INFO, loads and seeding at DEBUG, per-track
/// decisions at TRACE (DEBUG for accepted tracks when verbose).
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReporter {
    /// Whether to include track details in log messages
    verbose: bool,
}

impl LoggingReporter {
    /// Create a new logging reporter.
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Create a verbose logging reporter that includes track details.
    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl StepReporter for LoggingReporter {
    fn on_clusters_loaded(&mut self, n_clusters: usize) {
        log::debug!("Clusters loaded: {}", n_clusters);
    }

    fn on_seeds(&mut self, near: usize, far: usize, tried: usize, kept: usize) {
        log::debug!("Seeding {} -> {}: {} tried, {} kept", near, far, tried, kept);
    }

    fn on_track_accepted(&mut self, pass: Pass, track: &TrackSnapshot) {
        if self.verbose {
            log::debug!(
                "{}: accepted track label={} clusters={} 1/pt={:.4} dE/dx={:.1} mass={:?}",
                pass,
                track.label,
                track.clusters.len(),
                track.one_over_pt,
                track.dedx,
                track.mass
            );
        } else {
            log::trace!("{}: accepted track with {} clusters", pass, track.clusters.len());
        }
    }

    fn on_track_rejected(&mut self, pass: Pass, reason: RejectReason) {
        log::trace!("{}: rejected ({})", pass, reason);
    }

    fn on_pass_complete(&mut self, pass: Pass, summary: &EventSummary) {
        log::info!("{} complete: {}", pass, summary);
    }
}

// ============================================================================
// CompositeReporter
// ============================================================================

/// Reporter that forwards events to two child reporters.
#[derive(Debug, Clone)]
pub struct CompositeReporter<A: StepReporter, B: StepReporter> {
    first: A,
    second: B,
}

impl<A: StepReporter, B: StepReporter> CompositeReporter<A, B> {
    /// Create a new composite reporter.
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    /// Get a reference to the first reporter.
    pub fn first(&self) -> &A {
        &self.first
    }

    /// Get a reference to the second reporter.
    pub fn second(&self) -> &B {
        &self.second
    }

    /// Consume and return both reporters.
    pub fn into_parts(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A: StepReporter, B: StepReporter> StepReporter for CompositeReporter<A, B> {
    fn on_clusters_loaded(&mut self, n_clusters: usize) {
        self.first.on_clusters_loaded(n_clusters);
        self.second.on_clusters_loaded(n_clusters);
    }

    fn on_seeds(&mut self, near: usize, far: usize, tried: usize, kept: usize) {
        self.first.on_seeds(near, far, tried, kept);
        self.second.on_seeds(near, far, tried, kept);
    }

    fn on_track_accepted(&mut self, pass: Pass, track: &TrackSnapshot) {
        self.first.on_track_accepted(pass, track);
        self.second.on_track_accepted(pass, track);
    }

    fn on_track_rejected(&mut self, pass: Pass, reason: RejectReason) {
        self.first.on_track_rejected(pass, reason);
        self.second.on_track_rejected(pass, reason);
    }

    fn on_pass_complete(&mut self, pass: Pass, summary: &EventSummary) {
        self.first.on_pass_complete(pass, summary);
        self.second.on_pass_complete(pass, summary);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prolongation::AbortReason;
    use crate::qa::ParticleMass;

    fn snapshot(label: i32) -> TrackSnapshot {
        TrackSnapshot {
            label,
            clusters: vec![1, 2, 3],
            x: 85.0,
            alpha: 0.17,
            y: 0.0,
            z: 0.0,
            tgl: 0.1,
            one_over_pt: 0.5,
            chi2: 3.0,
            dedx: 50.0,
            mass: ParticleMass::Pion,
        }
    }

    #[test]
    fn test_noop_reporter() {
        let mut reporter = NoOpReporter::new();
        reporter.on_clusters_loaded(10);
        reporter.on_seeds(95, 76, 1, 1);
        reporter.on_track_accepted(Pass::FindTracks, &snapshot(1));
        reporter.on_track_rejected(Pass::FindTracks, RejectReason::Aborted(AbortReason::Rotation));
        reporter.on_pass_complete(Pass::FindTracks, &EventSummary::default());
    }

    #[test]
    fn test_debug_reporter_captures_events() {
        let mut reporter = DebugReporter::new();
        assert_eq!(reporter.total_events(), 0);

        reporter.on_clusters_loaded(10);
        reporter.on_seeds(95, 76, 4, 2);
        reporter.on_seeds(86, 67, 3, 0);
        reporter.on_track_accepted(Pass::PropagateBack, &snapshot(7));
        reporter.on_track_rejected(
            Pass::FindTracks,
            RejectReason::TooFewClusters { found: 20, required: 63 },
        );
        reporter.on_pass_complete(Pass::FindTracks, &EventSummary::default());

        assert_eq!(reporter.load_events(), &[10]);
        assert_eq!(reporter.seeding_events().len(), 2);
        assert_eq!(reporter.seeding_events()[1].near, 86);
        assert_eq!(reporter.accepted_events()[0].0, Pass::PropagateBack);
        assert_eq!(reporter.accepted_events()[0].1.label, 7);
        assert_eq!(
            reporter.rejected_events()[0].1,
            RejectReason::TooFewClusters { found: 20, required: 63 }
        );
        assert_eq!(reporter.total_events(), 6);

        reporter.clear();
        assert_eq!(reporter.total_events(), 0);
    }

    #[test]
    fn test_logging_reporter() {
        let mut reporter = LoggingReporter::new();
        reporter.on_track_accepted(Pass::FindTracks, &snapshot(1));
        reporter.on_pass_complete(Pass::RefitInward, &EventSummary::default());

        let mut verbose = LoggingReporter::verbose();
        verbose.on_track_accepted(Pass::FindTracks, &snapshot(-1));
    }

    #[test]
    fn test_composite_reporter() {
        let mut composite = CompositeReporter::new(DebugReporter::new(), LoggingReporter::new());
        composite.on_clusters_loaded(5);
        composite.on_pass_complete(Pass::FindTracks, &EventSummary::default());

        assert_eq!(composite.first().load_events(), &[5]);
        let (debug, _logging) = composite.into_parts();
        assert_eq!(debug.summary_events().len(), 1);
    }

    #[test]
    fn test_reporter_default_implementations() {
        struct MinimalReporter;
        impl StepReporter for MinimalReporter {}

        let mut reporter = MinimalReporter;
        reporter.on_clusters_loaded(0);
        reporter.on_seeds(0, 0, 0, 0);
        reporter.on_pass_complete(Pass::PropagateBack, &EventSummary::default());
    }
}
