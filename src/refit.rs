//! Refits that reuse the associations of a reference track
//!
//! Both variants walk one sector table from its first row outward. A
//! candidate's cursor points into the reference track's locator list at the
//! next association still to be revisited; it survives across sections so
//! an association in the other table is picked up by the next pass.
//!
//! - [`RefitEngine::follow_back`] walks the reference list from its last
//!   entry towards the first, applies a chi-square cut once the candidate is
//!   established and searches rows without an association.
//! - [`RefitEngine::follow_refit`] walks the reference list from the first
//!   entry forward and only ever reuses associations.

use crate::cluster::ClusterId;
use crate::config::ProlongationConfig;
use crate::error::TrackerError;
use crate::prolongation::{AbortReason, FollowOutcome, ProlongationEngine};
use crate::sector::{ClusterStore, SectorTable};
use crate::state::TrackState;
use crate::track::{TrackCandidate, TrackPhase};

/// Which way the cursor moves through the reference list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorStep {
    Backward,
    Forward,
}

/// Association-reusing refits with the cuts of a [`ProlongationConfig`]
#[derive(Debug, Clone, Copy)]
pub struct RefitEngine<'a> {
    engine: ProlongationEngine<'a>,
}

impl<'a> RefitEngine<'a> {
    /// Create a refit engine
    pub fn new(config: &'a ProlongationConfig) -> Self {
        Self {
            engine: ProlongationEngine::new(config),
        }
    }

    /// Pending association under the cursor, if it belongs to `table`
    fn pending<S: TrackState>(
        candidate: &TrackCandidate<S>,
        reference: &[ClusterId],
        table: &SectorTable,
        store: &ClusterStore,
    ) -> Result<Option<ClusterId>, TrackerError> {
        let Some(&id) = candidate.cursor().and_then(|k| reference.get(k)) else {
            return Ok(None);
        };
        if store.section_of(id)? != table.section() {
            return Ok(None);
        }
        Ok(Some(id))
    }

    fn advance<S: TrackState>(candidate: &mut TrackCandidate<S>, reference: &[ClusterId], step: CursorStep) {
        let next = candidate.cursor().and_then(|k| match step {
            CursorStep::Backward => k.checked_sub(1),
            CursorStep::Forward => Some(k + 1).filter(|&n| n < reference.len()),
        });
        candidate.set_cursor(next);
    }

    /// Rotate into the neighbouring sector when the state left the current one
    fn hand_over<S: TrackState>(
        candidate: &mut TrackCandidate<S>,
        table: &SectorTable,
        sector: &mut usize,
        row: usize,
    ) -> bool {
        let y = candidate.state.y();
        let y_max = table.max_y(row);
        let step = if y > y_max {
            1
        } else if y < -y_max {
            -1
        } else {
            return true;
        };
        if !candidate.state.rotate(step as f64 * table.alpha()) {
            return false;
        }
        *sector = table.neighbour(*sector, step);
        candidate.set_phase(TrackPhase::SectorCrossing);
        true
    }

    /// Filter a cluster in; a failed update leaves the candidate unchanged
    fn attach<S: TrackState>(
        candidate: &mut TrackCandidate<S>,
        table: &SectorTable,
        store: &ClusterStore,
        row: usize,
        id: ClusterId,
        chi2: f64,
    ) -> Result<(), TrackerError> {
        let cluster = store.cluster(id)?;
        let sample = ProlongationEngine::dedx_sample(table, row, cluster);
        if candidate.accept(cluster, chi2, id, sample) {
            candidate.set_phase(TrackPhase::Extending);
        } else {
            log::trace!("Update with {} failed at row {} of {}", id, row, table.section());
        }
        Ok(())
    }

    /// Back-propagate a candidate outward through one table.
    ///
    /// An association on the current row is taken if its chi-square is
    /// below `max_chi2` or the candidate has fewer than
    /// `gap_fill_min_clusters` clusters. Rows without an accepted
    /// association are searched once the candidate has more than
    /// `gap_fill_min_clusters` clusters.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidLocator`] if the reference list holds
    /// a locator outside the store.
    pub fn follow_back<S: TrackState>(
        &self,
        candidate: &mut TrackCandidate<S>,
        reference: &[ClusterId],
        table: &SectorTable,
        store: &ClusterStore,
    ) -> Result<FollowOutcome, TrackerError> {
        let cfg = self.engine.config();
        let mut sector = table.sector_of(candidate.state.alpha());
        let mut pending = Self::pending(candidate, reference, table, store)?;

        for nr in 0..table.n_rows() {
            if !candidate.state.propagate_to(table.x(nr)) {
                return Ok(FollowOutcome::Aborted(AbortReason::Propagation));
            }
            if !Self::hand_over(candidate, table, &mut sector, nr) {
                return Ok(FollowOutcome::Aborted(AbortReason::Rotation));
            }

            let window = self.engine.window(&candidate.state);
            if self.engine.road_too_broad(&window) {
                log::warn!(
                    "Back-propagation of track with {} clusters: road too broad ({:.2}) at row {} of {}",
                    candidate.n_clusters(),
                    window.road,
                    nr,
                    table.section()
                );
                return Ok(FollowOutcome::Aborted(AbortReason::RoadTooBroad));
            }

            let accepted = candidate.n_clusters();
            let mut found = None;
            if let Some(id) = pending.filter(|id| id.row() == nr) {
                let chi2 = candidate.state.predicted_chi2(store.cluster(id)?);
                if chi2 < cfg.max_chi2 || accepted < cfg.gap_fill_min_clusters {
                    found = Some((id, chi2));
                } else {
                    log::trace!("Outlier association {} (chi2 {:.2}) at row {}", id, chi2, nr);
                }
                Self::advance(candidate, reference, CursorStep::Backward);
                pending = Self::pending(candidate, reference, table, store)?;
            }

            if found.is_none() && accepted > cfg.gap_fill_min_clusters {
                found = self.engine.best_match(table.row(sector, nr), &window, &candidate.state);
            }

            if let Some((id, chi2)) = found {
                Self::attach(candidate, table, store, nr, id, chi2)?;
            }
        }
        Ok(FollowOutcome::Completed)
    }

    /// Refit a candidate through one table using only the reference
    /// associations, taken in list order.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidLocator`] if the reference list holds
    /// a locator outside the store.
    pub fn follow_refit<S: TrackState>(
        &self,
        candidate: &mut TrackCandidate<S>,
        reference: &[ClusterId],
        table: &SectorTable,
        store: &ClusterStore,
    ) -> Result<FollowOutcome, TrackerError> {
        let mut sector = table.sector_of(candidate.state.alpha());
        let mut pending = Self::pending(candidate, reference, table, store)?;

        for nr in 0..table.n_rows() {
            if !candidate.state.propagate_to(table.x(nr)) {
                return Ok(FollowOutcome::Aborted(AbortReason::Propagation));
            }
            if !Self::hand_over(candidate, table, &mut sector, nr) {
                return Ok(FollowOutcome::Aborted(AbortReason::Rotation));
            }

            if let Some(id) = pending.filter(|id| id.row() == nr) {
                let chi2 = candidate.state.predicted_chi2(store.cluster(id)?);
                Self::advance(candidate, reference, CursorStep::Forward);
                pending = Self::pending(candidate, reference, table, store)?;
                Self::attach(candidate, table, store, nr, id, chi2)?;
            }
        }
        Ok(FollowOutcome::Completed)
    }
}
