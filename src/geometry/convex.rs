//! Convex volumes: view frustums, shadow caster frustums and light-view hulls.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::{bounds::BoxSphereBounds, plane::Plane};

/// Index of each frustum plane as produced by
/// [`ConvexVolume::from_view_projection`] for an infinite projection.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR_CAP: usize = 4;
const FAR_CAP: usize = 5;

/// The 12 frustum edges as pairs of adjacent plane indices. Edges that refer
/// to a plane the frustum does not have are skipped.
const FRUSTUM_EDGES: [(usize, usize); 12] = [
    (NEAR_CAP, LEFT),
    (NEAR_CAP, RIGHT),
    (NEAR_CAP, BOTTOM),
    (NEAR_CAP, TOP),
    (FAR_CAP, LEFT),
    (FAR_CAP, RIGHT),
    (FAR_CAP, BOTTOM),
    (FAR_CAP, TOP),
    (LEFT, BOTTOM),
    (LEFT, TOP),
    (RIGHT, BOTTOM),
    (RIGHT, TOP),
];

/// Intersection of half-spaces. An empty volume contains everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvexVolume {
    pub planes: Vec<Plane>,
}

impl ConvexVolume {
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Extracts the clip planes of `view_projection` (Gribb/Hartmann) for a
    /// `0 <= z <= w` clip depth. Planes come out as left, right, bottom, top,
    /// near (when requested) and far. Rows without a usable normal are
    /// dropped, so an infinite projection yields five planes.
    pub fn from_view_projection(view_projection: &Mat4, use_near_plane: bool) -> Self {
        let row0 = view_projection.row(0);
        let row1 = view_projection.row(1);
        let row2 = view_projection.row(2);
        let row3 = view_projection.row(3);

        let mut rows = vec![row3 + row0, row3 - row0, row3 + row1, row3 - row1];
        if use_near_plane {
            rows.push(row2);
        }
        rows.push(row3 - row2);

        Self {
            planes: rows.into_iter().filter_map(Plane::from_clip_row).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Whether `point` lies inside every plane.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.plane_dot(point) <= 0.0)
    }

    /// Conservative box test: the box is rejected only when a single plane
    /// separates it from the volume.
    pub fn intersects_box(&self, center: Vec3, extent: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let distance = plane.plane_dot(center);
            let push_out = plane.normal.abs().dot(extent);
            distance <= push_out
        })
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.plane_dot(center) <= radius)
    }

    pub fn intersects_bounds(&self, bounds: &BoxSphereBounds) -> bool {
        self.intersects_box(bounds.origin, bounds.box_extent)
    }
}

/// Extends a camera frustum into the volume of everything that can cast a
/// shadow from `light_origin` into it.
///
/// Planes the light lies behind are kept. Every frustum edge between a kept
/// plane and a dropped one becomes a silhouette plane through the edge and the
/// light. The frustum must have at least the four side planes and one cap.
pub fn build_light_view_frustum_convex_hull(
    light_origin: Vec3,
    frustum: &ConvexVolume,
) -> ConvexVolume {
    let num_planes = frustum.planes.len();
    debug_assert!(
        num_planes >= 5,
        "light view hull needs at least 5 frustum planes, got {num_planes}"
    );
    if num_planes < 5 {
        return ConvexVolume::default();
    }

    let distances: Vec<f32> = frustum
        .planes
        .iter()
        .map(|plane| plane.plane_dot(light_origin))
        .collect();
    let visible: Vec<bool> = distances.iter().map(|&distance| distance < 0.0).collect();

    let mut planes: Vec<Plane> = frustum
        .planes
        .iter()
        .zip(&visible)
        .filter(|(_, &is_visible)| is_visible)
        .map(|(plane, _)| *plane)
        .collect();

    for &(first, second) in &FRUSTUM_EDGES {
        if first >= num_planes || second >= num_planes {
            continue;
        }
        if visible[first] == visible[second] {
            continue;
        }

        let (d1, d2) = (distances[first], distances[second]);
        let mut silhouette = frustum.planes[first].combine(d2, &frustum.planes[second], -d1);
        if visible[second] {
            silhouette = silhouette.flip();
        }
        if let Some(silhouette) = silhouette.normalized() {
            planes.push(silhouette);
        }
    }

    ConvexVolume { planes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_frustum() -> ConvexVolume {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let projection =
            Mat4::perspective_infinite_reverse_rh(std::f32::consts::FRAC_PI_2, 1.0, 1.0);
        ConvexVolume::from_view_projection(&(projection * view), true)
    }

    #[test]
    fn infinite_projection_gives_five_planes() {
        assert_eq!(camera_frustum().planes.len(), 5);
    }

    #[test]
    fn finite_projection_gives_six_planes() {
        let projection = Mat4::perspective_rh(1.0, 1.0, 1.0, 100.0);
        let frustum = ConvexVolume::from_view_projection(&projection, true);
        assert_eq!(frustum.planes.len(), 6);
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -50.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -150.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -0.5)));
    }

    #[test]
    fn frustum_box_tests() {
        let frustum = camera_frustum();
        assert!(frustum.intersects_box(Vec3::new(0.0, 0.0, -10.0), Vec3::ONE));
        assert!(!frustum.intersects_box(Vec3::new(0.0, 0.0, 10.0), Vec3::ONE));
        assert!(!frustum.intersects_box(Vec3::new(100.0, 0.0, -10.0), Vec3::ONE));
        assert!(frustum.intersects_sphere(Vec3::new(12.0, 0.0, -10.0), 3.0));
    }

    #[test]
    fn light_inside_frustum_keeps_all_planes() {
        let frustum = camera_frustum();
        let hull = build_light_view_frustum_convex_hull(Vec3::new(0.0, 0.0, -50.0), &frustum);
        assert_eq!(hull.planes, frustum.planes);
    }

    #[test]
    fn side_light_adds_silhouette_planes() {
        let frustum = camera_frustum();
        let light = Vec3::new(200.0, 50.0, -100.0);
        let hull = build_light_view_frustum_convex_hull(light, &frustum);

        // Right plane dropped; near-right, right-bottom, right-top edges added.
        assert_eq!(hull.planes.len(), 4 + 3);
        for plane in &hull.planes {
            assert!(plane.plane_dot(light) <= 1e-3);
        }
        // A caster between the frustum and the light is kept.
        assert!(hull.intersects_box(Vec3::new(120.0, 20.0, -80.0), Vec3::ONE));
        assert!(!frustum.intersects_box(Vec3::new(120.0, 20.0, -80.0), Vec3::ONE));
        // Behind the camera nothing can shadow the view.
        assert!(!hull.intersects_box(Vec3::new(0.0, 0.0, 20.0), Vec3::ONE));
    }
}
