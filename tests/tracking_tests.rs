//! End-to-end tests of the three reconstruction passes on synthetic events
//!
//! Every event is generated from a fixed seed, so the outcome of each test
//! is reproducible.

mod helpers;

use std::collections::HashSet;

use tpc_tracker::common::simulation::{generate_event, ParticleSpec, SimulationConfig};
use tpc_tracker::{
    ClusterId, ClusterSegment, DetectorConfig, HelixState, Pass, RejectReason, Section, TrackCandidate,
    TrackSnapshot, TrackState, TrackerError,
};

use helpers::{debug_tracker, event, particles_in_sectors, sector_centre, segment_mut};

#[test]
fn test_find_tracks_recovers_every_particle() {
    let particles = particles_in_sectors(&[0, 3, 6, 9, 12, 15]);
    let event = event(&particles, 42);
    let mut tracker = debug_tracker();

    let found = tracker.find_tracks(&event.segments).unwrap();

    assert_eq!(found.tracks.len(), particles.len());
    assert_eq!(found.summary.tracks_found, particles.len());
    assert_eq!(found.summary.tracks_matched, particles.len());

    let mut labels: Vec<i32> = found.tracks.iter().map(|t| t.label()).collect();
    labels.sort_unstable();
    assert_eq!(labels, (1..=particles.len() as i32).collect::<Vec<_>>());

    for track in &found.tracks {
        let p = &particles[(track.label() - 1) as usize];
        assert!(track.n_clusters() >= 63, "label {} has {} clusters", p.label, track.n_clusters());

        // Charge sign and transverse momentum from the fitted curvature
        let snapshot = TrackSnapshot::from(track);
        assert_eq!(snapshot.one_over_pt.signum(), p.charge);
        let pt = 1.0 / snapshot.one_over_pt.abs();
        assert!((pt - p.pt).abs() / p.pt < 0.15, "pt {} vs {}", pt, p.pt);
        assert!((snapshot.tgl - p.tgl).abs() < 0.02);
        assert!(snapshot.dedx > 0.0 && snapshot.dedx.is_finite());
    }

    let reporter = tracker.reporter();
    assert_eq!(reporter.load_events().len(), 1);
    assert_eq!(reporter.seeding_events().len(), 2);
    assert_eq!(reporter.accepted_events().len(), particles.len());
    assert!(reporter.accepted_events().iter().all(|(pass, _)| *pass == Pass::FindTracks));
    assert_eq!(reporter.summary_events().len(), 1);
}

fn assert_no_shared_clusters(found: &[TrackCandidate<HelixState>]) {
    let mut seen = HashSet::new();
    for track in found {
        for &id in track.clusters() {
            assert!(seen.insert(id), "{} assigned twice", id);
        }
    }
}

#[test]
fn test_accepted_tracks_never_share_clusters() {
    let particles = particles_in_sectors(&[1, 2, 4, 7, 11]);
    let event = event(&particles, 7);
    let found = debug_tracker().find_tracks(&event.segments).unwrap();
    assert_no_shared_clusters(&found.tracks);
}

#[test]
fn test_overlapping_particles_never_share_clusters() {
    // Both particles cross the seeding rows within one road
    let phi = sector_centre(0);
    let particles = vec![
        ParticleSpec::new(2.0, phi, 0.2, 1.0, 1),
        ParticleSpec::new(1.99, phi, 0.2, 1.0, 2),
    ];
    for seed in 0..10 {
        let event = event(&particles, seed);
        let mut tracker = debug_tracker();
        let found = tracker.find_tracks(&event.segments).unwrap();
        assert!(!found.tracks.is_empty(), "event {}", seed);
        assert_no_shared_clusters(&found.tracks);
        assert!(tracker
            .reporter()
            .rejected_events()
            .iter()
            .any(|(_, reason)| matches!(reason, RejectReason::ClusterClaimed(_))));
    }
}

#[test]
fn test_find_tracks_is_deterministic() {
    let particles = particles_in_sectors(&[0, 5, 10, 14]);
    let event = event(&particles, 3);

    let first = debug_tracker().find_tracks(&event.segments).unwrap();
    let second = debug_tracker().find_tracks(&event.segments).unwrap();

    let a = serde_json::to_string(&first.snapshots()).unwrap();
    let b = serde_json::to_string(&second.snapshots()).unwrap();
    assert_eq!(a, b);
    assert_eq!(first.summary, second.summary);
}

fn assert_first_claimant_keeps(row: usize) {
    let phi = sector_centre(0);
    let particles = vec![
        ParticleSpec::new(2.0, phi, 0.2, 1.0, 1),
        ParticleSpec::new(1.99, phi, 0.2, 1.0, 2),
    ];
    let mut event = event(&particles, 5);
    let mut tracker = debug_tracker();

    // Only the first particle leaves a cluster on this row
    let segment = segment_mut(&tracker, &mut event.segments, Section::Outer, 0, row).unwrap();
    segment.clusters.retain(|c| c.primary_label() == 1);
    assert_eq!(segment.clusters.len(), 1);

    let found = tracker.find_tracks(&event.segments).unwrap();
    assert!(!found.tracks.is_empty());

    let contested = ClusterId::new(tracker.store().outer().global_sector(0), row, 0).unwrap();
    assert!(found.tracks[0].clusters().contains(&contested));
    for track in &found.tracks[1..] {
        assert!(!track.clusters().contains(&contested));
    }
}

#[test]
fn test_first_claimant_keeps_contested_cluster() {
    assert_first_claimant_keeps(40);
}

#[test]
fn test_first_claimant_keeps_contested_seeding_cluster() {
    // Inside the span both seeding row pairs cover
    assert_first_claimant_keeps(80);
}

#[test]
fn test_empty_row_inside_road_is_skipped() {
    let particles = vec![ParticleSpec::new(2.0, sector_centre(0), 0.2, -1.0, 1)];
    let mut event = event(&particles, 9);
    let mut tracker = debug_tracker();

    let segment = segment_mut(&tracker, &mut event.segments, Section::Outer, 0, 50).unwrap();
    segment.clusters.clear();

    let found = tracker.find_tracks(&event.segments).unwrap();
    assert_eq!(found.tracks.len(), 1);
    let track = &found.tracks[0];
    assert_eq!(track.label(), 1);
    assert!(track.misses() >= 1);

    let outer = tracker.store().outer();
    let outer_rows: HashSet<usize> = track
        .clusters()
        .iter()
        .filter(|id| outer.owns_sector(id.sector()))
        .map(|id| id.row())
        .collect();
    assert!(!outer_rows.contains(&50));
    assert!(outer_rows.contains(&49));
    assert!(outer_rows.contains(&51));

    // Tracking went on through the inner section
    assert!(track.clusters().iter().any(|id| tracker.store().inner().owns_sector(id.sector())));
}

#[test]
fn test_noise_alone_yields_no_tracks() {
    let config = SimulationConfig {
        noise_clusters: 500,
        ..SimulationConfig::default()
    };
    let event = generate_event(&DetectorConfig::standard(), &[], &config, 13).unwrap();
    let mut tracker = debug_tracker();

    let found = tracker.find_tracks(&event.segments).unwrap();
    assert!(found.tracks.is_empty());
    assert_eq!(found.summary.tracks_found, 0);
    assert_eq!(tracker.reporter().load_events(), &[500]);
}

#[test]
fn test_back_propagation_and_refit_reuse_associations() {
    let particles = particles_in_sectors(&[2, 8, 13]);
    let event = event(&particles, 21);
    let mut tracker = debug_tracker();
    let detector = tracker.detector().clone();

    let found = tracker.find_tracks(&event.segments).unwrap();
    assert_eq!(found.tracks.len(), particles.len());

    let back = tracker.propagate_back(&event.segments, &found.tracks).unwrap();
    assert_eq!(back.tracks.len(), found.tracks.len());
    assert_eq!(back.summary.seeds_tried, found.tracks.len());
    for (f, b) in found.tracks.iter().zip(&back.tracks) {
        assert_eq!(b.label(), f.label());
        let reused = b.clusters().iter().filter(|id| f.clusters().contains(id)).count();
        assert!(reused * 10 >= f.n_clusters() * 9, "{} of {} reused", reused, f.n_clusters());
        assert!((b.state.x() - detector.outer_radius_up).abs() < 1e-6);

        // Innermost association first
        let first = b.clusters()[0];
        assert!(tracker.store().inner().owns_sector(first.sector()));
    }

    let refit = tracker.refit_inward(&event.segments, &back.tracks).unwrap();
    assert_eq!(refit.tracks.len(), back.tracks.len());
    for (b, r) in back.tracks.iter().zip(&refit.tracks) {
        assert_eq!(r.label(), b.label());
        assert_eq!(r.clusters(), b.clusters());
        assert!((r.state.x() - detector.inner_radius_low).abs() < 1e-6);
        assert!(r.dedx() > 0.0);
    }

    let passes: Vec<Pass> = tracker.reporter().summary_events().iter().map(|(p, _)| *p).collect();
    assert_eq!(passes, vec![Pass::FindTracks, Pass::PropagateBack, Pass::RefitInward]);
}

#[test]
fn test_back_propagation_with_foreign_locators_is_fatal() {
    let particles = particles_in_sectors(&[4]);
    let event = event(&particles, 1);
    let mut tracker = debug_tracker();
    let found = tracker.find_tracks(&event.segments).unwrap();
    assert_eq!(found.tracks.len(), 1);

    // The associations point at slots an empty event does not have
    let err = tracker.propagate_back(&[], &found.tracks).unwrap_err();
    assert!(matches!(err, TrackerError::InvalidLocator { .. }));
    assert_eq!(tracker.store().n_clusters(), 0);
}

#[test]
fn test_invalid_segment_aborts_the_event() {
    let mut tracker = debug_tracker();
    let limit = tracker.store().segment_limit();
    let segments = vec![ClusterSegment::new(limit, Vec::new())];

    let err = tracker.find_tracks(&segments).unwrap_err();
    assert!(matches!(err, TrackerError::InvalidSegment { .. }));
    assert!(tracker.reporter().summary_events().is_empty());
}
