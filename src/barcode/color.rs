use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::{euclidean_distance, Point};

/// Color label of a blob, identified by the initial of the color name ('R' for red, etc.)
/// Deserialized symbols are uppercased like the ones given to [`Color::from_symbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "char")]
pub struct Color(pub char);

impl From<char> for Color {
    fn from(symbol: char) -> Self {
        Color::from_symbol(symbol)
    }
}

impl Color {
    pub fn from_symbol(symbol: char) -> Self {
        Color(symbol.to_ascii_uppercase())
    }
    pub fn symbol(&self) -> char {
        self.0
    }
    pub fn is_valid(&self) -> bool {
        self.0.is_ascii_alphabetic()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One detected colored region on one frame. Produced upstream and never mutated here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub frame: usize,
    pub color: Color,
    pub center: Point,
    pub radius: f32,
}

impl Blob {
    pub fn new(frame: usize, color: Color, x: f32, y: f32, radius: f32) -> Self {
        Blob {
            frame,
            color,
            center: Point::new(x, y),
            radius,
        }
    }
    pub fn distance_to(&self, other: &Blob) -> f32 {
        euclidean_distance(&self.center, &other.center)
    }
}

/// All blobs detected on one frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameBlobs {
    pub frame: usize,
    pub blobs: Vec<Blob>,
}

/// Groups a flat detector output into per-frame batches in increasing frame order.
/// Blob order inside a frame is preserved.
pub fn group_blobs_by_frame(mut blobs: Vec<Blob>) -> Vec<FrameBlobs> {
    // stable sort keeps detector order within a frame
    blobs.sort_by_key(|b| b.frame);
    let grouped = blobs.into_iter().group_by(|b| b.frame);
    let frames = grouped
        .into_iter()
        .map(|(frame, group)| FrameBlobs {
            frame,
            blobs: group.collect(),
        })
        .collect();
    frames
}
