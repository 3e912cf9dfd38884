use std::collections::HashSet;

use tagtrack_rs::barcode::{group_blobs_by_frame, Blob, Catalog, Color, FrameBlobs, IdentityIndex};
use tagtrack_rs::mot::{
    track_video, Anomaly, MatchingAlgorithm, PointStatus, TrackerConfig, VideoTracker,
};

const SPACING: f32 = 15.0;

fn barcode(frame: usize, code: &str, x: f32, y: f32) -> Vec<Blob> {
    code.chars()
        .enumerate()
        .map(|(i, c)| Blob::new(frame, Color(c), x + SPACING * i as f32, y, 4.0))
        .collect()
}

// Small deterministic generator so the noisy scenarios stay reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 40) as f32 / (1u64 << 24) as f32
    }
}

fn noisy_catalog() -> Catalog {
    Catalog::from_codes(&[
        ("rat_01", "RGB"),
        ("rat_02", "RBY"),
        ("rat_03", "GYB"),
        ("rat_04", "YRG"),
    ])
    .unwrap()
}

fn noisy_video(frames: usize, seed: u64) -> Vec<FrameBlobs> {
    let codes = ["RGB", "RBY", "GYB", "YRG"];
    let mut rng = Lcg(seed);
    let mut blobs = Vec::new();
    for frame in 0..frames {
        for (i, code) in codes.iter().enumerate() {
            let x = 50.0 + 3.0 * frame as f32;
            let y = 100.0 + 80.0 * i as f32 + 10.0 * (frame as f32 / 7.0).sin();
            for blob in barcode(frame, code, x, y) {
                // drop some blobs
                if rng.next() > 0.08 {
                    blobs.push(blob);
                }
            }
        }
        // spurious detections
        if rng.next() < 0.3 {
            let x = 600.0 * rng.next();
            let y = 500.0 * rng.next();
            blobs.push(Blob::new(frame, Color('G'), x, y, 3.0));
        }
    }
    group_blobs_by_frame(blobs)
}

#[test]
fn test_full_match_is_detected_at_cluster_centroid() {
    let catalog = Catalog::from_codes(&[("rat_02", "RBY"), ("rat_07", "RGB")]).unwrap();
    let rat_07 = catalog.index_of("rat_07").unwrap();
    let mut tracker = VideoTracker::new(catalog, TrackerConfig::default()).unwrap();
    for frame in 0..=5 {
        let x = 100.0 + 2.0 * frame as f32;
        tracker.process_frame(frame, &barcode(frame, "RGB", x, 100.0)).unwrap();
    }
    let output = tracker.finish().unwrap();
    let point = output.store.point(rat_07, 5).unwrap();
    assert_eq!(point.status, PointStatus::Detected);
    assert_eq!(point.confidence, 1.0);
    let position = point.position.unwrap();
    // centroid of the three chips
    assert!((position.x - (110.0 + SPACING)).abs() < 1e-3);
    assert!((position.y - 100.0).abs() < 1e-3);
}

#[test]
fn test_undecodable_neighbour_is_not_misassigned() {
    let catalog = Catalog::from_codes(&[("rat_01", "RGB"), ("rat_02", "YMC")]).unwrap();
    let rat_01 = IdentityIndex(0);
    let rat_02 = IdentityIndex(1);
    let mut tracker = VideoTracker::new(catalog, TrackerConfig::default()).unwrap();
    // rat_02 walks towards rat_01
    for (frame, y) in [(0, 200.0), (1, 180.0), (2, 160.0), (3, 140.0)] {
        let mut blobs = barcode(frame, "RGB", 100.0, 100.0);
        blobs.extend(barcode(frame, "YMC", 100.0, y));
        let resolution = tracker.process_frame(frame, &blobs).unwrap();
        assert_eq!(resolution.assignments.len(), 2);
    }
    // only one chip of rat_02 is visible, right next to rat_01
    let mut blobs = barcode(4, "RGB", 100.0, 100.0);
    blobs.push(Blob::new(4, Color('C'), 130.0, 122.0, 4.0));
    let resolution = tracker.process_frame(4, &blobs).unwrap();
    assert_eq!(resolution.missing, vec![rat_02]);
    let assignment = resolution.assignment_for(rat_01).unwrap();
    assert!((assignment.option.position.y - 100.0).abs() < 1e-3);

    let mut blobs = barcode(5, "RGB", 100.0, 100.0);
    blobs.extend(barcode(5, "YMC", 100.0, 130.0));
    tracker.process_frame(5, &blobs).unwrap();
    let output = tracker.finish().unwrap();
    let point = output.store.point(rat_02, 4).unwrap();
    assert_eq!(point.status, PointStatus::Interpolated);
    assert!((point.position.unwrap().y - 135.0).abs() < 1e-3);
    assert_eq!(output.store.point(rat_01, 4).unwrap().status, PointStatus::Detected);
}

#[test]
fn test_exactly_one_point_per_identity_and_frame() {
    let frames = noisy_video(80, 7);
    let output = track_video(noisy_catalog(), TrackerConfig::default(), &frames).unwrap();
    assert_eq!(output.store.frame_range(), Some(0..80));
    for trajectory in output.store.trajectories() {
        assert_eq!(trajectory.len(), 80);
        for (offset, point) in trajectory.points.iter().enumerate() {
            assert_eq!(point.frame, offset);
        }
    }
    for frame in 0..80 {
        assert_eq!(output.store.points_at(frame).len(), 4);
    }
    // the noise is mild, every identity is seen most of the time
    assert!(output.summary.detected > 4 * 80 / 2);
}

#[test]
fn test_candidates_are_used_once_and_cutoff_holds() {
    for algorithm in [MatchingAlgorithm::Hungarian, MatchingAlgorithm::Greedy] {
        let mut config = TrackerConfig::default();
        config.algorithm = algorithm;
        config.max_displacement = 25.0;
        let mut tracker = VideoTracker::new(noisy_catalog(), config.clone()).unwrap();
        for batch in noisy_video(60, 11) {
            let resolution = tracker.process_frame(batch.frame, &batch.blobs).unwrap();
            let used: HashSet<usize> = resolution.assignments.iter().map(|a| a.candidate).collect();
            assert_eq!(used.len(), resolution.assignments.len());
            for assignment in &resolution.assignments {
                if let Some(distance) = assignment.distance {
                    assert!(distance <= config.max_displacement);
                }
                assert!(assignment.option.confidence >= config.min_confidence);
            }
        }
    }
}

#[test]
fn test_far_jump_is_rejected() {
    let catalog = Catalog::from_codes(&[("rat_01", "RGB")]).unwrap();
    let rat_01 = IdentityIndex(0);
    let mut tracker = VideoTracker::new(catalog, TrackerConfig::default()).unwrap();
    for frame in 0..5 {
        tracker.process_frame(frame, &barcode(frame, "RGB", 100.0, 100.0)).unwrap();
    }
    let resolution = tracker.process_frame(5, &barcode(5, "RGB", 300.0, 100.0)).unwrap();
    assert!(resolution.assignments.is_empty());
    assert_eq!(resolution.missing, vec![rat_01]);
    assert_eq!(resolution.unmatched_candidates, vec![0]);
    let output = tracker.finish().unwrap();
    assert_ne!(output.store.point(rat_01, 5).unwrap().status, PointStatus::Detected);
    assert_eq!(output.summary.anomalies.beyond_cutoff, 1);
    assert_eq!(output.summary.anomalies.unmatched, 1);
}

#[test]
fn test_identical_input_gives_identical_store() {
    let frames = noisy_video(50, 3);
    let first = track_video(noisy_catalog(), TrackerConfig::default(), &frames).unwrap();
    let second = track_video(noisy_catalog(), TrackerConfig::default(), &frames).unwrap();
    assert_eq!(first.store.to_json().unwrap(), second.store.to_json().unwrap());
    assert_eq!(first.anomalies, second.anomalies);
}

#[test]
fn test_fifty_frame_absence() {
    let catalog = Catalog::from_codes(&[("rat_01", "RGB"), ("rat_02", "RBY")]).unwrap();
    let rat_02 = catalog.index_of("rat_02").unwrap();
    let mut config = TrackerConfig::default();
    config.max_gap_length = 10;
    let mut tracker = VideoTracker::new(catalog, config).unwrap();
    for frame in 0..70 {
        let mut blobs = barcode(frame, "RGB", 100.0, 100.0);
        if frame < 10 {
            blobs.extend(barcode(frame, "RBY", 300.0, 300.0));
        } else if frame >= 60 {
            // reappears somewhere else
            blobs.extend(barcode(frame, "RBY", 500.0, 200.0));
        }
        tracker.process_frame(frame, &blobs).unwrap();
        if (10..20).contains(&frame) {
            assert_eq!(tracker.anomalies().len(), 0);
        }
    }
    let output = tracker.finish().unwrap();
    let trajectory = output.store.trajectory(rat_02).unwrap();
    for frame in 10..60 {
        let point = trajectory.point(frame).unwrap();
        assert_eq!(point.status, PointStatus::Missing);
        assert!(point.position.is_none());
    }
    for frame in 60..70 {
        assert!(trajectory.point(frame).unwrap().is_detected());
    }
    assert_eq!(trajectory.detected_segments().len(), 2);
    let losses: Vec<&Anomaly> = output
        .anomalies
        .entries()
        .iter()
        .filter(|a| matches!(a, Anomaly::SustainedLoss { .. } | Anomaly::Reacquired { .. }))
        .collect();
    assert_eq!(
        losses,
        vec![
            &Anomaly::SustainedLoss {
                identity: rat_02,
                first_frame: 10,
                frames: 11
            },
            &Anomaly::Reacquired {
                identity: rat_02,
                frame: 60,
                missed_frames: 50
            },
        ]
    );
}

#[test]
fn test_lost_state_between_loss_and_reappearance() {
    let catalog = Catalog::from_codes(&[("rat_02", "RBY")]).unwrap();
    let rat_02 = IdentityIndex(0);
    let mut config = TrackerConfig::default();
    config.max_gap_length = 10;
    let mut tracker = VideoTracker::new(catalog, config).unwrap();
    tracker.process_frame(0, &barcode(0, "RBY", 300.0, 300.0)).unwrap();
    for frame in 1..=50 {
        tracker.process_frame(frame, &[]).unwrap();
    }
    let output = tracker.finish().unwrap();
    // nothing left to extrapolate, the gap became a loss
    assert_eq!(output.summary.extrapolated, 0);
    assert_eq!(output.summary.missing, 50);
    assert_eq!(output.store.point(rat_02, 0).unwrap().status, PointStatus::Detected);
}

#[test]
fn test_two_close_animals_are_both_detected() {
    let frames = 30;
    for algorithm in [MatchingAlgorithm::Hungarian, MatchingAlgorithm::Greedy] {
        let catalog = Catalog::from_codes(&[("rat_01", "RGB"), ("rat_02", "OPY")]).unwrap();
        let rat_01 = IdentityIndex(0);
        let rat_02 = IdentityIndex(1);
        let mut config = TrackerConfig::default();
        config.algorithm = algorithm;
        let mut tracker = VideoTracker::new(catalog, config).unwrap();
        // side by side, 20px apart, closer than the clustering distance
        for frame in 0..frames {
            let x = 100.0 + 2.0 * frame as f32;
            let mut blobs = barcode(frame, "RGB", x, 100.0);
            blobs.extend(barcode(frame, "OPY", x, 120.0));
            let resolution = tracker.process_frame(frame, &blobs).unwrap();
            assert_eq!(resolution.assignments.len(), 2);
            assert!(resolution.missing.is_empty());
            let used: HashSet<usize> = resolution.assignments.iter().map(|a| a.candidate).collect();
            assert_eq!(used.len(), 2);
            let first = resolution.assignment_for(rat_01).unwrap();
            let second = resolution.assignment_for(rat_02).unwrap();
            assert!((first.option.position.y - 100.0).abs() < 1e-3);
            assert!((second.option.position.y - 120.0).abs() < 1e-3);
        }
        let output = tracker.finish().unwrap();
        assert_eq!(output.summary.detected, 2 * frames);
        for identity in [rat_01, rat_02] {
            let trajectory = output.store.trajectory(identity).unwrap();
            assert!(trajectory.points.iter().all(|p| p.is_detected()));
        }
        assert_eq!(output.summary.anomalies.ambiguous, 0);
    }
}
