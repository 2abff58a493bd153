//! Row-by-row track prolongation
//!
//! [`ProlongationEngine::follow`] walks a candidate inward through one
//! sector table. At each row it propagates the state, opens a search window
//! sized by the track and cluster resolutions, attaches the best cluster and
//! hands the track over to a neighbouring sector when it leaves the current
//! one. A bounded run of rows without a match is tolerated.

use std::fmt;

use crate::cluster::{Cluster, ClusterId};
use crate::config::ProlongationConfig;
use crate::resolution;
use crate::row::Row;
use crate::sector::SectorTable;
use crate::state::TrackState;
use crate::track::{TrackCandidate, TrackPhase};

/// Why a prolongation stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    /// The state could not be propagated to the next row
    Propagation,
    /// The state could not be rotated into a neighbouring sector
    Rotation,
    /// The search road exceeded its limit
    RoadTooBroad,
    /// A state update failed with no miss budget left
    UpdateFailed,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Propagation => write!(f, "propagation failed"),
            AbortReason::Rotation => write!(f, "rotation failed"),
            AbortReason::RoadTooBroad => write!(f, "road too broad"),
            AbortReason::UpdateFailed => write!(f, "update failed"),
        }
    }
}

/// Result of following a candidate through one section
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    /// Reached the stop row or ran out of miss budget; clusters are kept
    Completed,
    /// Stopped early; the candidate should be discarded
    Aborted(AbortReason),
}

impl FollowOutcome {
    /// Whether the candidate survived
    #[inline]
    pub fn is_completed(self) -> bool {
        matches!(self, FollowOutcome::Completed)
    }
}

/// Search window around the predicted position at one row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchWindow {
    /// Predicted `y`
    pub y: f64,
    /// Predicted `z`
    pub z: f64,
    /// Half-width of the road in `y`
    pub road: f64,
    /// Max squared `z` residual
    pub z_gate2: f64,
}

impl SearchWindow {
    /// Whether a cluster passes the drift-direction gate
    #[inline]
    pub fn accepts_z(&self, z: f64) -> bool {
        (z - self.z) * (z - self.z) <= self.z_gate2
    }
}

/// Row-by-row prolongation with the cuts of a [`ProlongationConfig`]
#[derive(Debug, Clone, Copy)]
pub struct ProlongationEngine<'a> {
    config: &'a ProlongationConfig,
}

impl<'a> ProlongationEngine<'a> {
    /// Create an engine
    pub fn new(config: &'a ProlongationConfig) -> Self {
        Self { config }
    }

    /// Cuts in use
    #[inline]
    pub fn config(&self) -> &ProlongationConfig {
        self.config
    }

    /// Search window for the state at its current radius
    pub fn window<S: TrackState>(&self, state: &S) -> SearchWindow {
        let x = state.x();
        let tgl = state.tgl();
        let sy2 = resolution::sigma_y2(x, tgl, state.pt(), self.config);
        let sz2 = resolution::sigma_z2(x, tgl, self.config);
        SearchWindow {
            y: state.y(),
            z: state.z(),
            road: self.config.road_sigmas * (state.sigma_y2() + sy2).sqrt(),
            z_gate2: self.config.z_gate_sigmas2 * (state.sigma_z2() + sz2),
        }
    }

    /// Whether a road is too broad to search
    #[inline]
    pub fn road_too_broad(&self, window: &SearchWindow) -> bool {
        !(window.road <= self.config.max_road)
    }

    /// Best unused cluster of a row inside the window.
    ///
    /// Clusters are scanned in ascending `y` from `y - road` to `y + road`;
    /// the smallest chi-square not above `max_chi2` wins, a later cluster
    /// winning a tie.
    pub fn best_match<S: TrackState>(
        &self,
        row: &Row,
        window: &SearchWindow,
        state: &S,
    ) -> Option<(ClusterId, f64)> {
        let mut best = None;
        let mut max_chi2 = self.config.max_chi2;
        let start = row.find(window.y - window.road);
        for (id, c) in row.iter().skip(start) {
            if c.y > window.y + window.road {
                break;
            }
            if c.used || !window.accepts_z(c.z) {
                continue;
            }
            let chi2 = state.predicted_chi2(c);
            if chi2 > max_chi2 {
                continue;
            }
            max_chi2 = chi2;
            best = Some((id, chi2));
        }
        best
    }

    /// Charge sample of a cluster in a row: `q / pad_pitch_width * corr(row)`
    #[inline]
    pub fn dedx_sample(table: &SectorTable, row: usize, cluster: &Cluster) -> f64 {
        cluster.q / table.pad_pitch_width() * table.dedx_correction(row)
    }

    /// Miss budget of a candidate entering a section
    pub fn skip_limit<S: TrackState>(&self, candidate: &TrackCandidate<S>, table: &SectorTable) -> usize {
        if candidate.n_clusters() < self.config.established_min_clusters {
            self.config.rows_to_skip
        } else {
            (self.config.established_skip_fraction * table.n_rows() as f64) as usize
        }
    }

    /// Rotate a candidate into the frame of the sector containing its angle
    pub fn align_to_sector<S: TrackState>(candidate: &mut TrackCandidate<S>, table: &SectorTable) -> bool {
        let alpha = candidate.state.alpha();
        let sector = table.sector_of(alpha);
        let dalpha = table.frame_angle(sector) - alpha;
        candidate.state.rotate(dalpha)
    }

    /// Follow a candidate inward from its current radius down to `stop_row`.
    ///
    /// The start row is the one just inside the candidate's radius. Clusters
    /// attached so far are kept when the miss budget runs out.
    pub fn follow<S: TrackState>(
        &self,
        candidate: &mut TrackCandidate<S>,
        table: &SectorTable,
        stop_row: usize,
    ) -> FollowOutcome {
        let skip_limit = self.skip_limit(candidate, table);
        candidate.set_skip_budget(skip_limit);

        let Some(start) = table.row_number(candidate.state.x()) else {
            return FollowOutcome::Completed;
        };
        let mut sector = table.sector_of(candidate.state.alpha());

        for nr in (stop_row..start).rev() {
            let x = table.x(nr);
            let y_max = table.max_y(nr);
            if !candidate.state.propagate_to(x) {
                log::trace!("Propagation to row {} (x={:.2}) failed", nr, x);
                return FollowOutcome::Aborted(AbortReason::Propagation);
            }

            let window = self.window(&candidate.state);
            if self.road_too_broad(&window) {
                if candidate.n_clusters() > 4 {
                    log::warn!(
                        "Track with {} clusters: road too broad ({:.2}) at row {} of {} sector {}",
                        candidate.n_clusters(),
                        window.road,
                        nr,
                        table.section(),
                        sector
                    );
                }
                return FollowOutcome::Aborted(AbortReason::RoadTooBroad);
            }

            let row = table.row(sector, nr);
            match self.best_match(row, &window, &candidate.state) {
                Some((id, chi2)) => {
                    let Some(cluster) = row.get_by_slot(id.slot()) else {
                        continue;
                    };
                    let sample = Self::dedx_sample(table, nr, cluster);
                    if candidate.accept(cluster, chi2, id, sample) {
                        candidate.set_skip_budget(skip_limit);
                        candidate.set_phase(TrackPhase::Extending);
                    } else if !candidate.consume_budget() {
                        log::trace!("Update failed at row {} with no budget left", nr);
                        return FollowOutcome::Aborted(AbortReason::UpdateFailed);
                    }
                }
                None => {
                    if candidate.skip_budget() == 0 {
                        candidate.set_phase(TrackPhase::Exhausted);
                        break;
                    }
                    let step = if window.y > y_max {
                        1
                    } else if window.y < -y_max {
                        -1
                    } else {
                        0
                    };
                    if step != 0 {
                        if !candidate.state.rotate(step as f64 * table.alpha()) {
                            return FollowOutcome::Aborted(AbortReason::Rotation);
                        }
                        sector = table.neighbour(sector, step);
                        candidate.set_phase(TrackPhase::SectorCrossing);
                    }
                    candidate.consume_budget();
                    candidate.record_miss();
                }
            }
        }
        FollowOutcome::Completed
    }
}
