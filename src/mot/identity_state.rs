use serde::Serialize;
use std::collections::VecDeque;

use crate::barcode::IdentityIndex;
use crate::mot::TrajectoryPoint;
use crate::utils::{lerp_angle, lerp_point, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackState {
    /// Never detected so far
    Untracked,
    Tracking,
    /// Undetected for a run no longer than the max gap length; frames are buffered
    Gap,
    /// Undetected for longer than the max gap length
    Lost,
}

/// What an assigned candidate tells about the identity on one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub frame: usize,
    pub position: Point,
    pub orientation: f32,
    pub confidence: f32,
}

/// Transition worth reporting as an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// Gap grew beyond the max gap length; `frames` undetected frames starting at `first_frame`
    SustainedLoss { first_frame: usize, frames: usize },
    /// Detected again after `missed_frames` undetected frames in total
    Reacquired { missed_frames: usize },
}

/// Result of feeding one frame to an identity
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepOutcome {
    /// Points that became final on this frame, in frame order
    pub points: Vec<TrajectoryPoint>,
    pub event: Option<StateEvent>,
}

/// Tracking state of a single identity, owned by the trajectory builder
#[derive(Debug, Clone)]
pub struct IdentityState {
    identity: IdentityIndex,
    state: TrackState,
    // Recent detections (frame, position) used for velocity estimation
    track: VecDeque<(usize, Point)>,
    max_track_len: usize,
    last_detection: Option<Detection>,
    // Undetected frames not yet written to the store
    pending: Vec<usize>,
    // Frame at which the identity became lost
    lost_since: Option<usize>,
}

impl IdentityState {
    pub fn new(identity: IdentityIndex, velocity_depth: usize) -> Self {
        let max_track_len = velocity_depth.max(1);
        IdentityState {
            identity,
            state: TrackState::Untracked,
            track: VecDeque::with_capacity(max_track_len),
            max_track_len,
            last_detection: None,
            pending: Vec::new(),
            lost_since: None,
        }
    }
    pub fn identity(&self) -> IdentityIndex {
        self.identity
    }
    pub fn state(&self) -> TrackState {
        self.state
    }
    pub fn last_detection(&self) -> Option<&Detection> {
        self.last_detection.as_ref()
    }
    /// Undetected frames waiting for the gap to be resolved
    pub fn pending_frames(&self) -> &[usize] {
        &self.pending
    }
    pub fn lost_since(&self) -> Option<usize> {
        self.lost_since
    }

    /// Per-frame velocity estimated from recent detections.
    /// Newer displacements weigh more: the i-th most recent one gets weight (depth - i).
    pub fn velocity(&self) -> Option<(f32, f32)> {
        let depth = self.track.len();
        if depth <= 1 {
            return None;
        }
        let mut delta_x = 0.0;
        let mut delta_y = 0.0;
        let mut sum = 0.0;
        for i in 1..depth {
            let (current_frame, current) = self.track[depth - i];
            let (prev_frame, prev) = self.track[depth - i - 1];
            let frames = current_frame.saturating_sub(prev_frame).max(1) as f32;
            let weight = (depth - i) as f32;
            delta_x += (current.x - prev.x) / frames * weight;
            delta_y += (current.y - prev.y) / frames * weight;
            sum += i as f32;
        }
        Some((delta_x / sum, delta_y / sum))
    }

    fn extrapolate(&self, last: &Detection, frame: usize) -> Point {
        let (vx, vy) = self.velocity().unwrap_or((0.0, 0.0));
        let steps = frame.saturating_sub(last.frame) as f32;
        Point::new(last.position.x + vx * steps, last.position.y + vy * steps)
    }

    /// Expected position on `frame`, `None` when the identity may be anywhere
    pub fn predict(&self, frame: usize, max_lost_before_reset: usize) -> Option<Point> {
        let last = self.last_detection.as_ref()?;
        match self.state {
            TrackState::Untracked => None,
            TrackState::Tracking | TrackState::Gap => Some(self.extrapolate(last, frame)),
            TrackState::Lost => {
                let lost_for = frame.saturating_sub(self.lost_since.unwrap_or(frame));
                if lost_for <= max_lost_before_reset {
                    Some(last.position)
                } else {
                    None
                }
            }
        }
    }

    /// Advances the state machine by one frame
    pub fn observe(
        &mut self,
        frame: usize,
        detection: Option<Detection>,
        max_gap_length: usize,
    ) -> StepOutcome {
        match detection {
            Some(detection) => self.on_detected(detection),
            None => self.on_missing(frame, max_gap_length),
        }
    }

    fn on_detected(&mut self, detection: Detection) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        match self.state {
            TrackState::Untracked | TrackState::Tracking => {}
            TrackState::Gap => {
                if let Some(last) = self.last_detection {
                    let span = detection.frame.saturating_sub(last.frame).max(1) as f32;
                    for &frame in &self.pending {
                        let t = (frame - last.frame) as f32 / span;
                        outcome.points.push(TrajectoryPoint::interpolated(
                            frame,
                            lerp_point(&last.position, &detection.position, t),
                            lerp_angle(last.orientation, detection.orientation, t),
                        ));
                    }
                }
                self.pending.clear();
            }
            TrackState::Lost => {
                let missed_frames = self
                    .last_detection
                    .map(|last| detection.frame.saturating_sub(last.frame + 1))
                    .unwrap_or(0);
                outcome.event = Some(StateEvent::Reacquired { missed_frames });
                self.track.clear();
                self.lost_since = None;
            }
        }
        outcome.points.push(TrajectoryPoint::detected(
            detection.frame,
            detection.position,
            detection.orientation,
            detection.confidence,
        ));
        self.track.push_back((detection.frame, detection.position));
        if self.track.len() > self.max_track_len {
            self.track.pop_front();
        }
        self.last_detection = Some(detection);
        self.state = TrackState::Tracking;
        outcome
    }

    fn on_missing(&mut self, frame: usize, max_gap_length: usize) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        match self.state {
            TrackState::Untracked | TrackState::Lost => {
                outcome.points.push(TrajectoryPoint::missing(frame));
            }
            TrackState::Tracking | TrackState::Gap => {
                self.pending.push(frame);
                self.state = TrackState::Gap;
                if self.pending.len() > max_gap_length {
                    outcome.event = Some(StateEvent::SustainedLoss {
                        first_frame: self.pending[0],
                        frames: self.pending.len(),
                    });
                    outcome
                        .points
                        .extend(self.pending.drain(..).map(TrajectoryPoint::missing));
                    self.state = TrackState::Lost;
                    self.lost_since = Some(frame);
                }
            }
        }
        outcome
    }

    /// Writes out a gap still open at the end of the video as extrapolated points
    pub fn flush(&mut self) -> Vec<TrajectoryPoint> {
        let last = match self.last_detection {
            Some(last) if !self.pending.is_empty() => last,
            _ => return Vec::new(),
        };
        let points = self
            .pending
            .iter()
            .map(|&frame| {
                TrajectoryPoint::extrapolated(frame, self.extrapolate(&last, frame), last.orientation)
            })
            .collect();
        self.pending.clear();
        points
    }
}
