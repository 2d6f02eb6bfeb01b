use glam::{Vec3, Vec3A};
use serde::{Deserialize, Serialize};

/// Combined axis-aligned box and bounding sphere sharing one origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoxSphereBounds {
    pub origin: Vec3,
    pub box_extent: Vec3,
    pub sphere_radius: f32,
}

impl BoxSphereBounds {
    pub fn new(origin: Vec3, box_extent: Vec3, sphere_radius: f32) -> Self {
        Self {
            origin,
            box_extent,
            sphere_radius,
        }
    }

    /// Bounds of a sphere; the box is the sphere's enclosing cube.
    pub fn from_sphere(center: Vec3, radius: f32) -> Self {
        Self {
            origin: center,
            box_extent: Vec3::splat(radius),
            sphere_radius: radius,
        }
    }

    /// Bounds of a box; the sphere passes through the box corners.
    pub fn from_box(center: Vec3, extent: Vec3) -> Self {
        Self {
            origin: center,
            box_extent: extent,
            sphere_radius: extent.length(),
        }
    }

    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            origin: self.origin + offset,
            ..*self
        }
    }

    pub fn min(&self) -> Vec3 {
        self.origin - self.box_extent
    }

    pub fn max(&self) -> Vec3 {
        self.origin + self.box_extent
    }

    /// The eight box corners.
    pub fn corners(&self) -> [Vec3; 8] {
        let (min, max) = (self.min(), self.max());
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }
}

/// Whether two spheres overlap (touching counts).
#[inline]
pub fn sphere_intersects_sphere(
    center_a: Vec3,
    radius_a: f32,
    center_b: Vec3,
    radius_b: f32,
) -> bool {
    let delta = Vec3A::from(center_a) - Vec3A::from(center_b);
    let radius_sum = radius_a + radius_b;
    delta.length_squared() <= radius_sum * radius_sum
}
