use tracing::info;

use crate::barcode::{Catalog, IdentityIndex};
use crate::errors::StoreError;
use crate::mot::{
    Anomaly, AnomalyLog, Detection, FrameResolution, IdentityPrediction, IdentityState,
    StateEvent, TrackState, TrackerConfig, TrajectoryStore,
};

/// Turns per-frame resolutions into dense trajectories.
///
/// Every identity gets exactly one point per processed frame. Undetected frames of a
/// tracked identity are held back (at most `max_gap_length + 1` of them) until the gap
/// either closes, which makes them interpolated, or grows too long, which makes them missing.
#[derive(Debug, Clone)]
pub struct TrajectoryBuilder {
    states: Vec<IdentityState>,
    store: TrajectoryStore,
    max_gap_length: usize,
    max_lost_before_reset: usize,
}

impl TrajectoryBuilder {
    pub fn new(catalog: &Catalog, config: &TrackerConfig, first_frame: usize) -> Self {
        let states = catalog
            .identities()
            .map(|identity| IdentityState::new(identity, config.velocity_depth))
            .collect();
        TrajectoryBuilder {
            states,
            store: TrajectoryStore::new(catalog, first_frame),
            max_gap_length: config.max_gap_length,
            max_lost_before_reset: config.max_lost_before_reset,
        }
    }
    pub fn state(&self, identity: IdentityIndex) -> Option<&IdentityState> {
        self.states.get(identity.0)
    }
    pub fn store(&self) -> &TrajectoryStore {
        &self.store
    }
    /// Expected position of every identity on `frame`
    pub fn predictions(&self, frame: usize) -> Vec<IdentityPrediction> {
        self.states
            .iter()
            .map(|state| IdentityPrediction {
                identity: state.identity(),
                position: state.predict(frame, self.max_lost_before_reset),
            })
            .collect()
    }
    /// Feeds one resolved frame to every identity
    pub fn apply(
        &mut self,
        resolution: &FrameResolution,
        anomalies: &mut AnomalyLog,
    ) -> Result<(), StoreError> {
        let frame = resolution.frame;
        for state in self.states.iter_mut() {
            let identity = state.identity();
            let detection = resolution.assignment_for(identity).map(|a| Detection {
                frame,
                position: a.option.position,
                orientation: a.option.orientation,
                confidence: a.option.confidence,
            });
            let outcome = state.observe(frame, detection, self.max_gap_length);
            for point in outcome.points {
                self.store.append(identity, point)?;
            }
            match outcome.event {
                Some(StateEvent::SustainedLoss {
                    first_frame,
                    frames,
                }) => {
                    info!(%identity, first_frame, frames, "identity lost");
                    anomalies.push(Anomaly::SustainedLoss {
                        identity,
                        first_frame,
                        frames,
                    });
                }
                Some(StateEvent::Reacquired { missed_frames }) => {
                    info!(%identity, frame, missed_frames, "identity reacquired");
                    anomalies.push(Anomaly::Reacquired {
                        identity,
                        frame,
                        missed_frames,
                    });
                }
                None => {}
            }
        }
        Ok(())
    }
    /// Writes out still open gaps as extrapolated points and hands over the store
    pub fn finish(mut self) -> Result<TrajectoryStore, StoreError> {
        for state in self.states.iter_mut() {
            if state.state() != TrackState::Gap {
                continue;
            }
            let identity = state.identity();
            for point in state.flush() {
                self.store.append(identity, point)?;
            }
        }
        Ok(self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::LabelOption;
    use crate::mot::{FrameAssignment, PointStatus};
    use crate::utils::Point;
    use approx::assert_relative_eq;

    fn catalog() -> Catalog {
        Catalog::from_codes(&[("rat_01", "RGB"), ("rat_02", "RBY")]).unwrap()
    }

    fn resolution(frame: usize, detected: &[(usize, f32, f32)]) -> FrameResolution {
        let assignments = detected
            .iter()
            .enumerate()
            .map(|(candidate, &(identity, x, y))| FrameAssignment {
                identity: IdentityIndex(identity),
                candidate,
                option: LabelOption {
                    identity: IdentityIndex(identity),
                    confidence: 0.9,
                    position: Point::new(x, y),
                    orientation: 0.0,
                    chips: vec![Some(0), Some(1), Some(2)],
                    missing: 0,
                    mismatched: 0,
                },
                distance: None,
                score: 0.9,
            })
            .collect();
        let missing = (0..2)
            .filter(|i| detected.iter().all(|d| d.0 != *i))
            .map(IdentityIndex)
            .collect();
        FrameResolution {
            frame,
            assignments,
            missing,
            ..Default::default()
        }
    }

    #[test]
    fn test_gap_between_detections_is_interpolated() {
        let config = TrackerConfig::default();
        let mut builder = TrajectoryBuilder::new(&catalog(), &config, 0);
        let mut log = AnomalyLog::new();
        builder.apply(&resolution(0, &[(0, 0.0, 0.0)]), &mut log).unwrap();
        builder.apply(&resolution(1, &[]), &mut log).unwrap();
        builder.apply(&resolution(2, &[(0, 10.0, 20.0)]), &mut log).unwrap();
        let store = builder.finish().unwrap();

        let point = store.point(IdentityIndex(0), 1).unwrap();
        assert_eq!(point.status, PointStatus::Interpolated);
        assert_eq!(point.confidence, 0.0);
        let position = point.position.unwrap();
        assert_relative_eq!(position.x, 5.0, epsilon = 1e-4);
        assert_relative_eq!(position.y, 10.0, epsilon = 1e-4);
        assert_eq!(store.point(IdentityIndex(0), 2).unwrap().confidence, 0.9);
        // never seen
        for frame in 0..3 {
            assert_eq!(
                store.point(IdentityIndex(1), frame).unwrap().status,
                PointStatus::Missing
            );
        }
        assert!(log.is_empty());
    }

    #[test]
    fn test_long_absence_is_missing_then_lost() {
        let mut config = TrackerConfig::default();
        config.max_gap_length = 10;
        let mut builder = TrajectoryBuilder::new(&catalog(), &config, 0);
        let mut log = AnomalyLog::new();
        let rat_02 = IdentityIndex(1);
        builder.apply(&resolution(0, &[(1, 50.0, 50.0)]), &mut log).unwrap();
        for frame in 1..=50 {
            builder.apply(&resolution(frame, &[]), &mut log).unwrap();
            if frame <= 10 {
                assert_eq!(builder.state(rat_02).unwrap().state(), TrackState::Gap);
            } else {
                assert_eq!(builder.state(rat_02).unwrap().state(), TrackState::Lost);
            }
        }
        builder.apply(&resolution(51, &[(1, 60.0, 50.0)]), &mut log).unwrap();
        let store = builder.finish().unwrap();

        for frame in 1..=50 {
            let point = store.point(rat_02, frame).unwrap();
            assert_eq!(point.status, PointStatus::Missing);
            assert!(point.position.is_none());
        }
        assert!(store.point(rat_02, 51).unwrap().is_detected());
        let summary = log.summary();
        assert_eq!(summary.sustained_losses, 1);
        assert_eq!(summary.reacquisitions, 1);
        assert_eq!(
            log.entries()[0],
            Anomaly::SustainedLoss {
                identity: rat_02,
                first_frame: 1,
                frames: 11
            }
        );
    }

    #[test]
    fn test_predictions_follow_state() {
        let config = TrackerConfig::default();
        let mut builder = TrajectoryBuilder::new(&catalog(), &config, 0);
        let mut log = AnomalyLog::new();
        builder.apply(&resolution(0, &[(0, 0.0, 0.0)]), &mut log).unwrap();
        builder.apply(&resolution(1, &[(0, 3.0, 0.0)]), &mut log).unwrap();
        let predictions = builder.predictions(2);
        assert_eq!(predictions.len(), 2);
        assert_relative_eq!(predictions[0].position.unwrap().x, 6.0, epsilon = 1e-4);
        assert!(predictions[1].position.is_none());
    }

    #[test]
    fn test_finish_extrapolates_open_gaps() {
        let config = TrackerConfig::default();
        let mut builder = TrajectoryBuilder::new(&catalog(), &config, 0);
        let mut log = AnomalyLog::new();
        builder.apply(&resolution(0, &[(0, 0.0, 0.0)]), &mut log).unwrap();
        builder.apply(&resolution(1, &[(0, 2.0, 0.0)]), &mut log).unwrap();
        builder.apply(&resolution(2, &[]), &mut log).unwrap();
        builder.apply(&resolution(3, &[]), &mut log).unwrap();
        let store = builder.finish().unwrap();
        let trajectory = store.trajectory(IdentityIndex(0)).unwrap();
        assert_eq!(trajectory.len(), 4);
        assert_eq!(trajectory.count(PointStatus::Extrapolated), 2);
        assert_relative_eq!(
            store.point(IdentityIndex(0), 3).unwrap().position.unwrap().x,
            6.0,
            epsilon = 1e-4
        );
        assert_eq!(store.frame_range(), Some(0..4));
    }
}
