use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::barcode::{Catalog, IdentityIndex};
use crate::errors::StoreError;
use crate::utils::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointStatus {
    Detected,
    Interpolated,
    Extrapolated,
    Missing,
}

/// State of one identity at one frame. Immutable once written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub frame: usize,
    /// `None` for missing points
    pub position: Option<Point>,
    pub orientation: Option<f32>,
    pub status: PointStatus,
    /// Decode confidence of the assigned candidate, 0 if not detected
    pub confidence: f32,
}

impl TrajectoryPoint {
    pub fn detected(frame: usize, position: Point, orientation: f32, confidence: f32) -> Self {
        TrajectoryPoint {
            frame,
            position: Some(position),
            orientation: Some(orientation),
            status: PointStatus::Detected,
            confidence,
        }
    }
    pub fn interpolated(frame: usize, position: Point, orientation: f32) -> Self {
        TrajectoryPoint {
            frame,
            position: Some(position),
            orientation: Some(orientation),
            status: PointStatus::Interpolated,
            confidence: 0.0,
        }
    }
    pub fn extrapolated(frame: usize, position: Point, orientation: f32) -> Self {
        TrajectoryPoint {
            frame,
            position: Some(position),
            orientation: Some(orientation),
            status: PointStatus::Extrapolated,
            confidence: 0.0,
        }
    }
    pub fn missing(frame: usize) -> Self {
        TrajectoryPoint {
            frame,
            position: None,
            orientation: None,
            status: PointStatus::Missing,
            confidence: 0.0,
        }
    }
    pub fn is_detected(&self) -> bool {
        self.status == PointStatus::Detected
    }
}

/// Inclusive run of consecutive detected frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedSegment {
    pub first_frame: usize,
    pub last_frame: usize,
}

impl DetectedSegment {
    pub fn len(&self) -> usize {
        self.last_frame - self.first_frame + 1
    }
}

/// Dense, frame ordered timeline of one identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub identity: IdentityIndex,
    pub name: String,
    pub first_frame: usize,
    pub points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn point(&self, frame: usize) -> Option<&TrajectoryPoint> {
        frame
            .checked_sub(self.first_frame)
            .and_then(|offset| self.points.get(offset))
    }
    /// Frame the next appended point must have
    pub fn next_frame(&self) -> usize {
        self.first_frame + self.points.len()
    }
    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
    pub fn count(&self, status: PointStatus) -> usize {
        self.points.iter().filter(|p| p.status == status).count()
    }
    pub fn detected_segments(&self) -> Vec<DetectedSegment> {
        let mut segments = vec![];
        for (detected, group) in &self.points.iter().group_by(|p| p.is_detected()) {
            if !detected {
                continue;
            }
            let frames: Vec<usize> = group.map(|p| p.frame).collect();
            if let (Some(first), Some(last)) = (frames.first(), frames.last()) {
                segments.push(DetectedSegment {
                    first_frame: *first,
                    last_frame: *last,
                });
            }
        }
        segments
    }
}

/// Append-only trajectories of every catalog identity.
///
/// Each trajectory holds exactly one point per frame starting at `first_frame`,
/// so a point is found by identity and frame without any search.
///
/// Basic usage:
///
/// ```
/// use tagtrack_rs::barcode::{Catalog, IdentityIndex};
/// use tagtrack_rs::mot::TrajectoryStore;
/// let catalog = Catalog::from_codes(&[("rat_01", "RGB"), ("rat_02", "RBY")]).unwrap();
/// let store = TrajectoryStore::new(&catalog, 0);
/// assert_eq!(store.trajectory(IdentityIndex(1)).unwrap().name, "rat_02");
/// assert!(store.frame_range().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStore {
    first_frame: usize,
    trajectories: Vec<Trajectory>,
}

impl TrajectoryStore {
    pub fn new(catalog: &Catalog, first_frame: usize) -> Self {
        let trajectories = catalog
            .iter()
            .map(|(identity, definition)| Trajectory {
                identity,
                name: definition.name.clone(),
                first_frame,
                points: Vec::new(),
            })
            .collect();
        TrajectoryStore {
            first_frame,
            trajectories,
        }
    }
    pub(crate) fn append(
        &mut self,
        identity: IdentityIndex,
        point: TrajectoryPoint,
    ) -> Result<(), StoreError> {
        let trajectory = self
            .trajectories
            .get_mut(identity.0)
            .ok_or(StoreError::UnknownIdentity(identity))?;
        let expected = trajectory.next_frame();
        if point.frame != expected {
            return Err(StoreError::OutOfOrder {
                identity,
                expected,
                found: point.frame,
            });
        }
        trajectory.points.push(point);
        Ok(())
    }
    pub fn first_frame(&self) -> usize {
        self.first_frame
    }
    pub fn trajectories(&self) -> &[Trajectory] {
        &self.trajectories
    }
    pub fn trajectory(&self, identity: IdentityIndex) -> Option<&Trajectory> {
        self.trajectories.get(identity.0)
    }
    pub fn point(&self, identity: IdentityIndex, frame: usize) -> Option<&TrajectoryPoint> {
        self.trajectory(identity).and_then(|t| t.point(frame))
    }
    /// Points of every identity at the given frame, in identity order
    pub fn points_at(&self, frame: usize) -> Vec<(IdentityIndex, &TrajectoryPoint)> {
        self.trajectories
            .iter()
            .filter_map(|t| t.point(frame).map(|p| (t.identity, p)))
            .collect()
    }
    /// Identities with a known (detected or estimated) position at the given frame
    pub fn identities_at(&self, frame: usize) -> Vec<IdentityIndex> {
        self.points_at(frame)
            .into_iter()
            .filter(|(_, p)| p.position.is_some())
            .map(|(identity, _)| identity)
            .collect()
    }
    /// Frames present for every identity. `None` before anything was written.
    pub fn frame_range(&self) -> Option<Range<usize>> {
        let end = self.trajectories.iter().map(|t| t.next_frame()).min()?;
        if end > self.first_frame {
            Some(self.first_frame..end)
        } else {
            None
        }
    }
    pub fn detected_segments(&self, identity: IdentityIndex) -> Vec<DetectedSegment> {
        self.trajectory(identity)
            .map(|t| t.detected_segments())
            .unwrap_or_default()
    }
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
