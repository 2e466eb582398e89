//! Plain `f32` geometry used for node placement and packet interpolation.
//!
//! Positions feed a renderer directly, so single precision is enough. Helpers
//! here never allocate and never fail.

use serde::{Deserialize, Serialize};

/// A point in renderer space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Point3 {
    pub const ORIGIN: Point3 = Point3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// A point on the z = 0 plane.
    pub const fn planar(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Linear interpolation towards `to`.
    ///
    /// `t` is clamped to `[0, 1]`, and `t >= 1` returns `to` exactly so a
    /// packet that has arrived sits on its destination without rounding error.
    pub fn lerp(self, to: Point3, t: f32) -> Point3 {
        if t >= 1.0 {
            return to;
        }
        let t = t.max(0.0);
        Point3 {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
            z: self.z + (to.z - self.z) * t,
        }
    }

    /// Polar angle of the (x, y) projection, normalized to `[0, 2π)`.
    ///
    /// A `y` within rounding noise of zero counts as exactly on the x axis,
    /// so `sin(π)` landing a hair below zero still sorts at π, not 2π.
    pub fn planar_angle(self) -> f32 {
        let y = if self.y.abs() <= self.x.abs() * 1e-6 { 0.0 } else { self.y };
        let a = y.atan2(self.x);
        if a < 0.0 { a + std::f32::consts::TAU } else { a }
    }
}

/// Closest point to `p` on the segment `a`-`b`.
pub fn project_onto_segment(p: Point3, a: Point3, b: Point3) -> Point3 {
    let ab = (b.x - a.x, b.y - a.y, b.z - a.z);
    let len_sq = ab.0 * ab.0 + ab.1 * ab.1 + ab.2 * ab.2;
    if len_sq == 0.0 {
        return a;
    }
    let t = ((p.x - a.x) * ab.0 + (p.y - a.y) * ab.1 + (p.z - a.z) * ab.2) / len_sq;
    a.lerp(b, t.clamp(0.0, 1.0))
}
