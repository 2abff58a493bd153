//! Shared setup for the integration tests

#![allow(dead_code)]

use tpc_tracker::common::simulation::{generate_event, ParticleSpec, SimulatedEvent, SimulationConfig};
use tpc_tracker::{ClusterSegment, DebugReporter, DetectorConfig, HelixState, Section, Side, Tracker, TrackerConfig};

/// Frame angle at the middle of a sector of the standard layout
pub fn sector_centre(sector: usize) -> f64 {
    (10.0 + 20.0 * sector as f64).to_radians()
}

/// Tracker over the standard layout recording every callback
pub fn debug_tracker() -> Tracker<HelixState, DebugReporter> {
    Tracker::helix(DetectorConfig::standard(), TrackerConfig::default())
        .unwrap()
        .with_reporter(DebugReporter::new())
}

/// Event of the standard layout with the default response
pub fn event(particles: &[ParticleSpec], seed: u64) -> SimulatedEvent {
    generate_event(&DetectorConfig::standard(), particles, &SimulationConfig::default(), seed).unwrap()
}

/// One stiff particle per listed sector, crossing it through the middle
pub fn particles_in_sectors(sectors: &[usize]) -> Vec<ParticleSpec> {
    sectors
        .iter()
        .enumerate()
        .map(|(k, &sector)| {
            let pt = 1.0 + 0.5 * k as f64;
            let charge = if k % 2 == 0 { 1.0 } else { -1.0 };
            let tgl = 0.1 + 0.1 * (k % 4) as f64;
            ParticleSpec::new(pt, sector_centre(sector), tgl, charge, k as i32 + 1)
        })
        .collect()
}

/// Segment of `(section, sector, row)` on side A, if the event has one
pub fn segment_mut<'a>(
    tracker: &Tracker<HelixState, DebugReporter>,
    segments: &'a mut [ClusterSegment],
    section: Section,
    sector: usize,
    row: usize,
) -> Option<&'a mut ClusterSegment> {
    let id = tracker.store().segment_id(section, sector, row, Side::A);
    segments.iter_mut().find(|s| s.id == id)
}
