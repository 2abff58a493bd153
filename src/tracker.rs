//! Per-event reconstruction passes
//!
//! A [`Tracker`] owns the cluster store and runs three passes, each on a
//! freshly loaded event:
//!
//! - [`Tracker::find_tracks`]: seeds in the outer sectors, prolongs inward
//!   through both sections and keeps long enough tracks
//! - [`Tracker::propagate_back`]: refits tracks outward, reusing their
//!   associations and filling gaps by search
//! - [`Tracker::refit_inward`]: refits back-propagated tracks through their
//!   associations only
//!
//! Accepted tracks claim their clusters, so a cluster is never shared by two
//! tracks of the same pass.

use std::fmt;

use serde::Serialize;

use crate::cluster::{Cluster, ClusterId, ClusterSegment};
use crate::config::{DetectorConfig, TrackerConfig};
use crate::error::TrackerError;
use crate::prolongation::{AbortReason, FollowOutcome, ProlongationEngine};
use crate::qa::cook_label;
use crate::refit::RefitEngine;
use crate::reporter::{NoOpReporter, StepReporter};
use crate::sector::ClusterStore;
use crate::seeding::SeedFinder;
use crate::state::{HelixModel, HelixState, TrackState};
use crate::track::{TrackCandidate, TrackSnapshot};

/// Reconstruction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Pass {
    /// Track finding from clusters
    FindTracks,
    /// Outward refit
    PropagateBack,
    /// Inward refit
    RefitInward,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::FindTracks => write!(f, "find-tracks"),
            Pass::PropagateBack => write!(f, "propagate-back"),
            Pass::RefitInward => write!(f, "refit-inward"),
        }
    }
}

/// Why a candidate was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Prolongation or refit stopped early
    Aborted(AbortReason),
    /// Fewer clusters than an accepted track needs
    TooFewClusters {
        /// Clusters collected
        found: usize,
        /// Minimum required
        required: usize,
    },
    /// A seeding cluster was claimed by an earlier track
    ClusterClaimed(ClusterId),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Aborted(reason) => write!(f, "{}", reason),
            RejectReason::TooFewClusters { found, required } => {
                write!(f, "{} clusters, {} required", found, required)
            }
            RejectReason::ClusterClaimed(id) => write!(f, "cluster {} already claimed", id),
        }
    }
}

/// `Err` with the abort reason unless the outcome is completed
fn completed(outcome: FollowOutcome) -> Result<(), RejectReason> {
    match outcome {
        FollowOutcome::Completed => Ok(()),
        FollowOutcome::Aborted(reason) => Err(RejectReason::Aborted(reason)),
    }
}

/// Counters of one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    /// Triplets passing the seeding cuts, or input tracks of a refit
    pub seeds_tried: usize,
    /// Seeds surviving seeding, or refit tracks surviving the inner section
    pub seeds_kept: usize,
    /// Accepted tracks
    pub tracks_found: usize,
    /// Accepted tracks with a positive truth label
    pub tracks_matched: usize,
}

impl fmt::Display for EventSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seeds tried {}, seeds kept {}, tracks found {}, tracks matched {}",
            self.seeds_tried, self.seeds_kept, self.tracks_found, self.tracks_matched
        )
    }
}

/// Tracks of one pass
#[derive(Debug, Clone)]
pub struct EventResult<S> {
    /// Accepted tracks in acceptance order
    pub tracks: Vec<TrackCandidate<S>>,
    /// Pass counters
    pub summary: EventSummary,
}

impl<S: TrackState> EventResult<S> {
    /// Serializable summaries of the tracks
    pub fn snapshots(&self) -> Vec<TrackSnapshot> {
        self.tracks.iter().map(TrackSnapshot::from).collect()
    }
}

/// Track finder and refitter for one detector layout
#[derive(Debug)]
pub struct Tracker<S: TrackState, R: StepReporter = NoOpReporter> {
    detector: DetectorConfig,
    config: TrackerConfig,
    model: S::Model,
    store: ClusterStore,
    reporter: R,
}

impl Tracker<HelixState> {
    /// Tracker using the helix state with the detector's field
    pub fn helix(detector: DetectorConfig, config: TrackerConfig) -> Result<Self, TrackerError> {
        let model = HelixModel::from(&detector);
        Self::new(detector, config, model)
    }
}

impl<S: TrackState> Tracker<S> {
    /// Create a tracker; the detector layout and cuts are validated
    pub fn new(detector: DetectorConfig, config: TrackerConfig, model: S::Model) -> Result<Self, TrackerError> {
        config.validate()?;
        let store = ClusterStore::new(&detector)?;
        Ok(Self {
            detector,
            config,
            model,
            store,
            reporter: NoOpReporter,
        })
    }
}

impl<S: TrackState, R: StepReporter> Tracker<S, R> {
    /// Replace the reporter
    pub fn with_reporter<R2: StepReporter>(self, reporter: R2) -> Tracker<S, R2> {
        Tracker {
            detector: self.detector,
            config: self.config,
            model: self.model,
            store: self.store,
            reporter,
        }
    }

    /// Reporter in use
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Mutable reporter
    pub fn reporter_mut(&mut self) -> &mut R {
        &mut self.reporter
    }

    /// Detector layout
    pub fn detector(&self) -> &DetectorConfig {
        &self.detector
    }

    /// Reconstruction cuts
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Cluster store; empty between passes
    pub fn store(&self) -> &ClusterStore {
        &self.store
    }

    /// Clusters an accepted track needs
    fn min_track_clusters(&self) -> usize {
        (self.config.min_track_fraction * self.store.total_rows() as f64) as usize
    }

    /// Load an event, run a pass over it and unload, also on error
    fn with_event<T>(
        &mut self,
        segments: &[ClusterSegment],
        pass: impl FnOnce(&mut Self) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let result = self.store.load(segments).and_then(|stored| {
            self.reporter.on_clusters_loaded(stored);
            pass(self)
        });
        self.store.unload();
        result
    }

    fn accept(&mut self, pass: Pass, track: TrackCandidate<S>, result: &mut EventResult<S>) {
        self.reporter.on_track_accepted(pass, &TrackSnapshot::from(&track));
        result.summary.tracks_found += 1;
        if track.label() > 0 {
            result.summary.tracks_matched += 1;
        }
        result.tracks.push(track);
    }

    fn finish(&mut self, pass: Pass, result: EventResult<S>) -> EventResult<S> {
        log::info!("{}: {}", pass, result.summary);
        self.reporter.on_pass_complete(pass, &result.summary);
        result
    }

    /// Find tracks in one event.
    ///
    /// Seeds are taken from the two outer row pairs of
    /// [`SeedFinder::schedule`] and processed by ascending `|1/pt|`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidSegment`] for a segment id outside the
    /// detector layout.
    pub fn find_tracks(&mut self, segments: &[ClusterSegment]) -> Result<EventResult<S>, TrackerError> {
        self.with_event(segments, Self::find_loaded)
    }

    fn find_loaded(&mut self) -> Result<EventResult<S>, TrackerError> {
        let config = self.config;
        let finder = SeedFinder::new(&config.seeding, &config.prolongation);
        let mut result = EventResult {
            tracks: Vec::new(),
            summary: EventSummary::default(),
        };

        let pairs = SeedFinder::schedule(
            self.store.outer().n_rows(),
            self.store.total_rows(),
            config.seeding.gap_fraction,
        );
        let mut seeds = Vec::new();
        for (near, far) in pairs {
            let (tried, mut found) = finder.make_seeds::<S>(self.store.outer(), near, far, &self.model);
            self.reporter.on_seeds(near, far, tried, found.len());
            result.summary.seeds_tried += tried;
            result.summary.seeds_kept += found.len();
            seeds.append(&mut found);
        }
        seeds.sort_by(|a, b| a.state.one_over_pt().abs().total_cmp(&b.state.one_over_pt().abs()));

        let engine = ProlongationEngine::new(&config.prolongation);
        let required = self.min_track_clusters();
        for mut seed in seeds {
            if let Some(id) = self.first_claimed(seed.clusters())? {
                self.reporter
                    .on_track_rejected(Pass::FindTracks, RejectReason::ClusterClaimed(id));
                continue;
            }
            match self.prolong_seed(&engine, &mut seed, required) {
                Ok(()) => {
                    seed.cook_dedx(&config.dedx);
                    let clusters = seed
                        .clusters()
                        .iter()
                        .map(|&id| self.store.cluster(id))
                        .collect::<Result<Vec<&Cluster>, _>>()?;
                    seed.set_label(cook_label(&clusters, config.label_wrong_fraction));
                    self.store.mark_all_used(seed.clusters())?;
                    self.accept(Pass::FindTracks, seed, &mut result);
                }
                Err(reason) => self.reporter.on_track_rejected(Pass::FindTracks, reason),
            }
        }
        Ok(self.finish(Pass::FindTracks, result))
    }

    /// First locator already claimed by an accepted track.
    ///
    /// Seeds hold their seeding rows from before any track was accepted.
    fn first_claimed(&self, clusters: &[ClusterId]) -> Result<Option<ClusterId>, TrackerError> {
        for &id in clusters {
            if self.store.cluster(id)?.used {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Continue a seed down to the first outer row, then through the inner rows
    fn prolong_seed(
        &self,
        engine: &ProlongationEngine<'_>,
        seed: &mut TrackCandidate<S>,
        required: usize,
    ) -> Result<(), RejectReason> {
        completed(engine.follow(seed, self.store.outer(), 0))?;
        if !ProlongationEngine::align_to_sector(seed, self.store.inner()) {
            return Err(RejectReason::Aborted(AbortReason::Rotation));
        }
        completed(engine.follow(seed, self.store.inner(), 0))?;
        if seed.n_clusters() < required {
            return Err(RejectReason::TooFewClusters {
                found: seed.n_clusters(),
                required,
            });
        }
        Ok(())
    }

    /// Back-propagate tracks outward through one event.
    ///
    /// Each track restarts from its own state with no clusters and walks its
    /// associations from the innermost one. Accepted tracks keep the input
    /// label and end at `outer_radius_up`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidSegment`] for a bad segment id and
    /// [`TrackerError::InvalidLocator`] for a track association outside the
    /// loaded event.
    pub fn propagate_back(
        &mut self,
        segments: &[ClusterSegment],
        tracks: &[TrackCandidate<S>],
    ) -> Result<EventResult<S>, TrackerError> {
        self.with_event(segments, |tracker| tracker.propagate_back_loaded(tracks))
    }

    fn propagate_back_loaded(&mut self, tracks: &[TrackCandidate<S>]) -> Result<EventResult<S>, TrackerError> {
        let config = self.config;
        let refit = RefitEngine::new(&config.prolongation);
        let required = self.min_track_clusters();
        let mut result = EventResult {
            tracks: Vec::new(),
            summary: EventSummary {
                seeds_tried: tracks.len(),
                ..EventSummary::default()
            },
        };

        for track in tracks {
            let reference = track.clusters();
            let mut candidate = TrackCandidate::restart_from(track);
            candidate.set_cursor(reference.len().checked_sub(1));

            if !ProlongationEngine::align_to_sector(&mut candidate, self.store.inner()) {
                self.reporter
                    .on_track_rejected(Pass::PropagateBack, RejectReason::Aborted(AbortReason::Rotation));
                continue;
            }
            let outcome = refit.follow_back(&mut candidate, reference, self.store.inner(), &self.store)?;
            if let Err(reason) = completed(outcome) {
                self.reporter.on_track_rejected(Pass::PropagateBack, reason);
                continue;
            }
            self.store.mark_all_used(candidate.clusters())?;
            result.summary.seeds_kept += 1;
            let n_inner = candidate.n_clusters();

            let outcome = if ProlongationEngine::align_to_sector(&mut candidate, self.store.outer()) {
                refit.follow_back(&mut candidate, reference, self.store.outer(), &self.store)?
            } else {
                FollowOutcome::Aborted(AbortReason::Rotation)
            };
            if let Err(reason) = completed(outcome) {
                self.reporter.on_track_rejected(Pass::PropagateBack, reason);
                continue;
            }
            if candidate.n_clusters() < required {
                self.reporter.on_track_rejected(
                    Pass::PropagateBack,
                    RejectReason::TooFewClusters {
                        found: candidate.n_clusters(),
                        required,
                    },
                );
                continue;
            }

            candidate.cook_dedx(&config.dedx);
            self.store.mark_all_used(&candidate.clusters()[n_inner..])?;
            if !candidate.state.propagate_to(self.detector.outer_radius_up) {
                log::debug!(
                    "Track with label {} not propagated to the outer reference radius",
                    candidate.label()
                );
            }
            self.accept(Pass::PropagateBack, candidate, &mut result);
        }
        Ok(self.finish(Pass::PropagateBack, result))
    }

    /// Refit back-propagated tracks inward through one event.
    ///
    /// The covariance is inflated and associations are reused in list order,
    /// so the input associations must run from the innermost row outward, as
    /// [`Tracker::propagate_back`] produces them. No rows are searched.
    /// Accepted tracks keep the input label and end at `inner_radius_low`.
    ///
    /// # Errors
    ///
    /// Same as [`Tracker::propagate_back`].
    pub fn refit_inward(
        &mut self,
        segments: &[ClusterSegment],
        tracks: &[TrackCandidate<S>],
    ) -> Result<EventResult<S>, TrackerError> {
        self.with_event(segments, |tracker| tracker.refit_inward_loaded(tracks))
    }

    fn refit_inward_loaded(&mut self, tracks: &[TrackCandidate<S>]) -> Result<EventResult<S>, TrackerError> {
        let config = self.config;
        let refit = RefitEngine::new(&config.prolongation);
        let mut result = EventResult {
            tracks: Vec::new(),
            summary: EventSummary {
                seeds_tried: tracks.len(),
                ..EventSummary::default()
            },
        };

        for track in tracks {
            let reference = track.clusters();
            let mut candidate = TrackCandidate::restart_from(track);
            candidate.state.reset_covariance();
            candidate.set_cursor((!reference.is_empty()).then_some(0));

            let mut outcome = FollowOutcome::Aborted(AbortReason::Rotation);
            if ProlongationEngine::align_to_sector(&mut candidate, self.store.inner()) {
                outcome = refit.follow_refit(&mut candidate, reference, self.store.inner(), &self.store)?;
            }
            if let Err(reason) = completed(outcome) {
                self.reporter.on_track_rejected(Pass::RefitInward, reason);
                continue;
            }
            self.store.mark_all_used(candidate.clusters())?;
            result.summary.seeds_kept += 1;
            let n_inner = candidate.n_clusters();

            let mut outcome = FollowOutcome::Aborted(AbortReason::Rotation);
            if ProlongationEngine::align_to_sector(&mut candidate, self.store.outer()) {
                outcome = refit.follow_refit(&mut candidate, reference, self.store.outer(), &self.store)?;
            }
            if let Err(reason) = completed(outcome) {
                self.reporter.on_track_rejected(Pass::RefitInward, reason);
                continue;
            }
            self.store.mark_all_used(&candidate.clusters()[n_inner..])?;

            candidate.cook_dedx(&config.dedx);
            if !candidate.state.propagate_to(self.detector.inner_radius_low) {
                log::debug!(
                    "Track with label {} not propagated to the inner reference radius",
                    candidate.label()
                );
            }
            self.accept(Pass::RefitInward, candidate, &mut result);
        }
        Ok(self.finish(Pass::RefitInward, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::DebugReporter;
    use crate::sector::{Section, Side};

    fn tracker() -> Tracker<HelixState, DebugReporter> {
        Tracker::helix(DetectorConfig::standard(), TrackerConfig::default())
            .unwrap()
            .with_reporter(DebugReporter::new())
    }

    #[test]
    fn test_summary_display() {
        let summary = EventSummary {
            seeds_tried: 10,
            seeds_kept: 4,
            tracks_found: 2,
            tracks_matched: 1,
        };
        assert_eq!(
            summary.to_string(),
            "seeds tried 10, seeds kept 4, tracks found 2, tracks matched 1"
        );
    }

    #[test]
    fn test_reject_reason_from_outcome() {
        assert_eq!(completed(FollowOutcome::Completed), Ok(()));
        assert_eq!(
            completed(FollowOutcome::Aborted(AbortReason::Propagation)),
            Err(RejectReason::Aborted(AbortReason::Propagation))
        );
    }

    #[test]
    fn test_empty_event() {
        let mut tracker = tracker();
        let result = tracker.find_tracks(&[]).unwrap();
        assert!(result.tracks.is_empty());
        assert_eq!(result.summary, EventSummary::default());
        assert_eq!(tracker.reporter().load_events(), &[0]);
        assert_eq!(tracker.reporter().seeding_events().len(), 2);
        assert_eq!(tracker.reporter().summary_events()[0].0, Pass::FindTracks);
    }

    #[test]
    fn test_claimed_seed_cluster_is_found() {
        let mut tracker = tracker();
        let segment = tracker.store.segment_id(Section::Outer, 0, 90, Side::A);
        let clusters = vec![
            Cluster::new(-1.0, 5.0, 1.0, 0.01, 0.01),
            Cluster::new(1.0, 5.0, 1.0, 0.01, 0.01),
        ];
        tracker.store.load(&[ClusterSegment::new(segment, clusters)]).unwrap();

        let sector = tracker.store.outer().global_sector(0);
        let ids = [ClusterId::new(sector, 90, 0).unwrap(), ClusterId::new(sector, 90, 1).unwrap()];
        assert_eq!(tracker.first_claimed(&ids).unwrap(), None);

        tracker.store.mark_used(ids[1]).unwrap();
        assert_eq!(tracker.first_claimed(&ids).unwrap(), Some(ids[1]));
        assert_eq!(
            RejectReason::ClusterClaimed(ids[1]).to_string(),
            format!("cluster {} already claimed", ids[1])
        );
        tracker.store.unload();
    }

    #[test]
    fn test_invalid_segment_is_fatal_and_store_is_unloaded() {
        let mut tracker = tracker();
        let limit = tracker.store().segment_limit();
        let good = ClusterSegment::new(0, vec![Cluster::new(0.0, 0.0, 1.0, 0.01, 0.01)]);
        let bad = ClusterSegment::new(limit, vec![]);
        let err = tracker.find_tracks(&[good, bad]).unwrap_err();
        assert_eq!(err, TrackerError::InvalidSegment { id: limit, limit });
        assert_eq!(tracker.store().n_clusters(), 0);
    }

    #[test]
    fn test_refit_with_foreign_locator_is_fatal() {
        let mut tracker = tracker();
        let model = HelixModel::default();
        let params = crate::state::SeedParameters {
            x: 84.0,
            alpha: tracker.store().inner().frame_angle(0),
            params: nalgebra::Vector5::new(0.0, 0.0, 0.0, 0.0, 1e-7),
            covariance: nalgebra::Matrix5::identity() * 0.01,
        };
        let state = HelixState::from_seed(&params, &model);
        let track = TrackCandidate::from_seed(state, ClusterId::new(0, 0, 3).unwrap(), 1.0);
        let segment = ClusterSegment::new(
            tracker.store().segment_id(Section::Inner, 0, 0, Side::A),
            vec![Cluster::new(0.0, 0.0, 1.0, 0.01, 0.01)],
        );
        let err = tracker.refit_inward(&[segment], &[track]).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidLocator { .. }));
    }
}
