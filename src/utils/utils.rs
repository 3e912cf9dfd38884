use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }
    /// Arithmetic mean of a set of points. Returns `None` for an empty set.
    pub fn centroid<'a, I>(points: I) -> Option<Point>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut n = 0usize;
        for p in points {
            sum_x += p.x;
            sum_y += p.y;
            n += 1;
        }
        if n == 0 {
            return None;
        }
        Some(Point::new(sum_x / n as f32, sum_y / n as f32))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

pub fn euclidean_distance(p1: &Point, p2: &Point) -> f32 {
    f32::hypot(p1.x - p2.x, p1.y - p2.y)
}

/// Wraps an angle in radians into (-PI, PI]
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = f32::atan2(angle.sin(), angle.cos());
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Point on the segment `from -> to` at parameter `t` (0 gives `from`, 1 gives `to`)
pub fn lerp_point(from: &Point, to: &Point, t: f32) -> Point {
    Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)
}

/// Interpolates between two orientations along the shorter arc
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    normalize_angle(from + normalize_angle(to - from) * t)
}
