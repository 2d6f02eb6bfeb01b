use glam::{Mat4, UVec2, Vec3};

use crate::geometry::ConvexVolume;

/// Camera view that shadows are set up for.
///
/// Perspective views use an infinite reversed-Z projection, so their frustum
/// has five planes.
#[derive(Debug, Clone)]
pub struct ViewInfo {
    pub view_matrix: Mat4,
    pub projection_matrix: Mat4,
    pub view_projection: Mat4,
    pub view_origin: Vec3,
    pub viewport_size: UVec2,
    /// Scales distances used for LOD and screen-size decisions.
    pub lod_distance_factor: f32,
    /// Only primitives with static lighting are rendered (e.g. reflection
    /// captures).
    pub static_scene_only: bool,
    pub is_scene_capture: bool,
    /// World-space frustum.
    pub frustum: ConvexVolume,
}

impl ViewInfo {
    pub fn from_matrices(view_matrix: Mat4, projection_matrix: Mat4, viewport_size: UVec2) -> Self {
        let view_projection = projection_matrix * view_matrix;
        let view_origin = view_matrix.inverse().w_axis.truncate();
        Self {
            view_matrix,
            projection_matrix,
            view_projection,
            view_origin,
            viewport_size,
            lod_distance_factor: 1.0,
            static_scene_only: false,
            is_scene_capture: false,
            frustum: ConvexVolume::from_view_projection(&view_projection, true),
        }
    }

    /// Right-handed perspective camera at `eye` looking at `target`.
    pub fn perspective(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        viewport_size: UVec2,
        near: f32,
    ) -> Self {
        let aspect = viewport_size.x.max(1) as f32 / viewport_size.y.max(1) as f32;
        let view = Mat4::look_at_rh(eye, target, up);
        let projection = Mat4::perspective_infinite_reverse_rh(fov_y, aspect, near);
        Self::from_matrices(view, projection, viewport_size)
    }

    pub fn with_lod_distance_factor(mut self, factor: f32) -> Self {
        self.lod_distance_factor = factor;
        self
    }

    pub fn with_static_scene_only(mut self, static_scene_only: bool) -> Self {
        self.static_scene_only = static_scene_only;
        self
    }

    pub fn is_perspective(&self) -> bool {
        self.projection_matrix.w_axis.w == 0.0
    }

    /// Pixels covered by one world unit at distance 1.
    pub fn screen_scale(&self) -> f32 {
        let half_width = self.viewport_size.x as f32 * 0.5;
        let half_height = self.viewport_size.y as f32 * 0.5;
        (half_width * self.projection_matrix.x_axis.x)
            .max(half_height * self.projection_matrix.y_axis.y)
    }

    /// Distance of the near clip plane.
    pub fn near_clip(&self) -> f32 {
        if self.projection_matrix.z_axis.z == 0.0 {
            // Infinite reversed-Z stores the near distance directly.
            self.projection_matrix.w_axis.z
        } else {
            let p = &self.projection_matrix;
            (p.w_axis.z / p.z_axis.z).abs()
        }
    }

    /// World-space corners of the frustum slice between two view distances,
    /// near face first.
    pub fn frustum_slice_corners(&self, slice_near: f32, slice_far: f32) -> [Vec3; 8] {
        let projection = self.projection_matrix;
        let tan_half_fov = 1.0 / projection.y_axis.y;
        let aspect = projection.y_axis.y / projection.x_axis.x;

        let h_near = tan_half_fov * slice_near;
        let w_near = h_near * aspect;
        let h_far = tan_half_fov * slice_far;
        let w_far = h_far * aspect;

        let corners_view = [
            Vec3::new(-w_near, -h_near, -slice_near),
            Vec3::new(w_near, -h_near, -slice_near),
            Vec3::new(w_near, h_near, -slice_near),
            Vec3::new(-w_near, h_near, -slice_near),
            Vec3::new(-w_far, -h_far, -slice_far),
            Vec3::new(w_far, -h_far, -slice_far),
            Vec3::new(w_far, h_far, -slice_far),
            Vec3::new(-w_far, h_far, -slice_far),
        ];

        let inv_view = self.view_matrix.inverse();
        corners_view.map(|corner| inv_view.transform_point3(corner))
    }
}
