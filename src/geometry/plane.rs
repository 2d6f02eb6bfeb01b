use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::utils::math::SMALL_NUMBER_SQUARED;

/// Plane `normal · p = w`. Normals point out of the volume a plane bounds, so
/// a point is inside when [`Plane::plane_dot`] is `<= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub w: f32,
}

impl Plane {
    pub fn new(normal: Vec3, w: f32) -> Self {
        Self { normal, w }
    }

    /// Plane through `point` with the given normal.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Self {
            normal,
            w: normal.dot(point),
        }
    }

    /// Builds the outward plane of a clip inequality `row · (p, 1) >= 0`.
    /// Returns `None` when the row has no usable normal (e.g. the far row of an
    /// infinite projection).
    pub fn from_clip_row(row: Vec4) -> Option<Self> {
        let normal = row.truncate();
        let length_squared = normal.length_squared();
        if length_squared <= SMALL_NUMBER_SQUARED {
            return None;
        }
        let inv_length = length_squared.sqrt().recip();
        Some(Self {
            normal: -normal * inv_length,
            w: row.w * inv_length,
        })
    }

    /// Signed distance of `point` for a unit normal.
    #[inline]
    pub fn plane_dot(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.w
    }

    pub fn flip(&self) -> Self {
        Self {
            normal: -self.normal,
            w: -self.w,
        }
    }

    /// `a * self + b * other` as plane equations.
    pub fn combine(&self, a: f32, other: &Plane, b: f32) -> Self {
        Self {
            normal: self.normal * a + other.normal * b,
            w: self.w * a + other.w * b,
        }
    }

    /// Rescales to a unit normal; `None` for a degenerate plane.
    pub fn normalized(&self) -> Option<Self> {
        let length_squared = self.normal.length_squared();
        if length_squared <= SMALL_NUMBER_SQUARED {
            return None;
        }
        let inv_length = length_squared.sqrt().recip();
        Some(Self {
            normal: self.normal * inv_length,
            w: self.w * inv_length,
        })
    }
}
