/*!
# tpc-tracker - track reconstruction for sector-segmented drift chambers

Finds, extends and refits charged-particle trajectories through a
cylindrical drift chamber whose pad rows are grouped into azimuthal sectors.

## Features

- Per-row sorted cluster store addressed by packed 32-bit locators
- Triplet seed finder over two widely separated rows and a reference point
- Row-by-row Kalman prolongation with sector hand-over and a miss budget
- Outward and inward refits reusing earlier cluster associations
- Truth-label cooking, truncated-mean dE/dx and mass hypothesis

## Modules

- [`tracker`] - Per-event passes: find, propagate back, refit inward
- [`seeding`], [`prolongation`], [`refit`] - The reconstruction engines
- [`sector`], [`row`] - Cluster storage
- [`state`] - Track state contract and the helix implementation
- [`qa`] - Label, dE/dx and mass annotations
- [`common`] - Constants, angle helpers, synthetic events

## Example

```rust,no_run
use tpc_tracker::common::simulation::{generate_event, random_particles, SimulationConfig};
use tpc_tracker::{DetectorConfig, Tracker, TrackerConfig};

let detector = DetectorConfig::standard();
let particles = random_particles(20, 0.5, 3.0, 0.8, 42);
let event = generate_event(&detector, &particles, &SimulationConfig::default(), 42).unwrap();

let mut tracker = Tracker::helix(detector, TrackerConfig::default()).unwrap();
let found = tracker.find_tracks(&event.segments).unwrap();
let back = tracker.propagate_back(&event.segments, &found.tracks).unwrap();
let refit = tracker.refit_inward(&event.segments, &back.tracks).unwrap();
println!("{}", refit.summary);
```
*/

// ============================================================================
// Core modules
// ============================================================================

/// Cluster records and packed locators
pub mod cluster;

/// Detector layout and reconstruction cuts
pub mod config;

/// Error types
pub mod error;

/// Pad-row cluster store
pub mod row;

/// Sector tables and the per-event cluster store
pub mod sector;

/// Track state contract and the helix state
pub mod state;

/// Cluster resolution model
pub mod resolution;

/// Seeds and tracks
pub mod track;

/// Triplet seed finder
pub mod seeding;

/// Row-by-row prolongation
pub mod prolongation;

/// Association-reusing refits
pub mod refit;

/// Label, dE/dx and mass annotations
pub mod qa;

/// Observability hooks
pub mod reporter;

/// Per-event reconstruction passes
pub mod tracker;

/// Constants, angle helpers and synthetic events
pub mod common;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use cluster::{Cluster, ClusterId, ClusterSegment, NO_LABEL};
pub use config::{DedxConfig, DetectorConfig, PadRegion, ProlongationConfig, SectionConfig, SeedingConfig, TrackerConfig};
pub use error::TrackerError;
pub use prolongation::{AbortReason, FollowOutcome, ProlongationEngine};
pub use qa::{cook_label, truncated_mean, ParticleMass};
pub use refit::RefitEngine;
pub use reporter::{CompositeReporter, DebugReporter, LoggingReporter, NoOpReporter, StepReporter};
pub use row::Row;
pub use sector::{ClusterStore, Section, SectorTable, Side};
pub use seeding::{SeedFinder, SeedTriplet};
pub use state::{HelixModel, HelixState, SeedParameters, TrackState};
pub use track::{TrackCandidate, TrackPhase, TrackSnapshot};
pub use tracker::{EventResult, EventSummary, Pass, RejectReason, Tracker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
