//! Additional math helpers layered on top of `glam`.

use glam::{Quat, Vec3};

/// Squared length below which a vector is treated as zero.
pub const SMALL_NUMBER_SQUARED: f32 = 1e-16;

/// Normalizes `v`, returning zero for (near) zero-length input.
pub fn safe_normal(v: Vec3) -> Vec3 {
    let length_squared = v.length_squared();
    if length_squared <= SMALL_NUMBER_SQUARED {
        Vec3::ZERO
    } else {
        v * length_squared.sqrt().recip()
    }
}

/// Picks two axes orthogonal to `direction` (and to each other) in a
/// deterministic way, avoiding the axis most aligned with `direction`.
pub fn find_best_axis_vectors(direction: Vec3) -> (Vec3, Vec3) {
    let abs = direction.abs();
    let seed = if abs.z > abs.x && abs.z > abs.y {
        Vec3::X
    } else {
        Vec3::Z
    };

    let axis1 = safe_normal(seed - direction * seed.dot(direction));
    let axis2 = axis1.cross(direction);
    (axis1, axis2)
}

/// Rotation taking the local +X axis onto `direction`.
pub fn rotation_from_x_axis(direction: Vec3) -> Quat {
    let dir = safe_normal(direction);
    if dir == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(Vec3::X, dir)
}

/// Floor of the base-2 logarithm; `floor_log2(0) == 0`.
pub fn floor_log2(value: u32) -> u32 {
    if value == 0 {
        0
    } else {
        31 - value.leading_zeros()
    }
}
