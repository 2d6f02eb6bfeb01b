//! Matrix builders for shadow depth projections.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::utils::math::{find_best_axis_vectors, safe_normal};

/// Number of faces rendered by a one-pass cube shadow.
pub const CUBE_FACE_COUNT: usize = 6;

/// Look direction of each cube face, in +X, -X, +Y, -Y, +Z, -Z order.
pub const CUBE_FACE_DIRECTIONS: [Vec3; CUBE_FACE_COUNT] = [
    Vec3::X,
    Vec3::NEG_X,
    Vec3::Y,
    Vec3::NEG_Y,
    Vec3::Z,
    Vec3::NEG_Z,
];

/// Up vector paired with each entry of [`CUBE_FACE_DIRECTIONS`].
pub const CUBE_FACE_UPS: [Vec3; CUBE_FACE_COUNT] = [
    Vec3::Y,
    Vec3::Y,
    Vec3::NEG_Z,
    Vec3::Z,
    Vec3::Y,
    Vec3::Y,
];

/// Depth projection mapping `z` in `[min_z, max_z]` to `[0, 1]`.
///
/// `w_axis` selects the clip `w`: `(0, 0, 1, 0)` gives a perspective divide by
/// `z`, `(0, 0, 0, 1)` an orthographic projection.
pub fn shadow_projection_matrix(min_z: f32, max_z: f32, w_axis: Vec4) -> Mat4 {
    let depth_scale = (w_axis.z * max_z + w_axis.w) / (max_z - min_z);
    Mat4::from_cols(
        Vec4::new(1.0, 0.0, 0.0, w_axis.x),
        Vec4::new(0.0, 1.0, 0.0, w_axis.y),
        Vec4::new(0.0, 0.0, depth_scale, w_axis.z),
        Vec4::new(0.0, 0.0, -min_z * depth_scale, w_axis.w),
    )
}

/// Change of basis into face space: x along `-axis1`, y along `axis2`, z along
/// the face direction, where the axes come from [`find_best_axis_vectors`].
pub fn face_basis_matrix(face_direction: Vec3) -> Mat4 {
    let (x_axis, y_axis) = find_best_axis_vectors(face_direction);
    let basis = Mat3::from_cols(-x_axis, y_axis, safe_normal(face_direction)).transpose();
    Mat4::from_mat3(basis)
}

/// View matrix of one cube face, looking out from the origin of translated
/// world space.
pub fn cube_face_view_matrix(face: usize) -> Mat4 {
    Mat4::look_to_rh(Vec3::ZERO, CUBE_FACE_DIRECTIONS[face], CUBE_FACE_UPS[face])
}

/// 90 degree projection shared by all cube faces of a light with the given
/// radius.
pub fn cube_face_projection(radius: f32) -> Mat4 {
    Mat4::perspective_rh(FRAC_PI_2, 1.0, 1.0, radius.max(2.0))
}
