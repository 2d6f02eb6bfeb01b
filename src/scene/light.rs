//! Light descriptions consumed by shadow setup.

use std::f32::consts::FRAC_PI_2;

use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::{
    config::HALF_WORLD_MAX,
    geometry::{sphere_intersects_sphere, BoxSphereBounds},
    scene::view::ViewInfo,
    utils::math::{rotation_from_x_axis, safe_normal},
};

const MIN_CONE_ANGLE: f32 = 1.0e-4;
const MAX_CONE_ANGLE: f32 = FRAC_PI_2 - 1.0e-3;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct LightFlags: u32 {
        const CASTS_DYNAMIC_SHADOW      = 1 << 0;
        const CASTS_STATIC_SHADOW       = 1 << 1;
        const HAS_STATIC_LIGHTING       = 1 << 2;
        const HAS_STATIC_SHADOWING      = 1 << 3;
        const ONE_PASS_CUBEMAP_ELIGIBLE = 1 << 4;
        const RAY_TRACED_DISTANCE_FIELD = 1 << 5;
    }
}

impl LightFlags {
    /// Static lighting implies static shadowing.
    pub fn normalized(self) -> Self {
        if self.contains(Self::HAS_STATIC_LIGHTING) {
            self | Self::HAS_STATIC_SHADOWING
        } else {
            self
        }
    }
}

/// Cascade layout of a directional light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalLightParams {
    /// View distance covered by dynamic cascades.
    pub dynamic_shadow_distance: f32,
    pub num_cascades: u32,
    /// Higher values concentrate cascades near the camera.
    pub cascade_distribution_exponent: f32,
    /// Fraction of each cascade used to fade into the next one.
    pub cascade_transition_fraction: f32,
    pub far_shadow_cascade_count: u32,
    pub far_shadow_distance: f32,
}

impl Default for DirectionalLightParams {
    fn default() -> Self {
        Self {
            dynamic_shadow_distance: 20_000.0,
            num_cascades: 3,
            cascade_distribution_exponent: 3.0,
            cascade_transition_fraction: 0.1,
            far_shadow_cascade_count: 0,
            far_shadow_distance: 300_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightKind {
    Directional(DirectionalLightParams),
    Point {
        radius: f32,
    },
    Spot {
        radius: f32,
        inner_cone_angle: f32,
        outer_cone_angle: f32,
    },
    Rect {
        radius: f32,
        source_width: f32,
        source_height: f32,
    },
}

/// Kind tag without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightType {
    Directional,
    Point,
    Spot,
    Rect,
}

impl LightKind {
    pub fn light_type(&self) -> LightType {
        match self {
            LightKind::Directional(_) => LightType::Directional,
            LightKind::Point { .. } => LightType::Point,
            LightKind::Spot { .. } => LightType::Spot,
            LightKind::Rect { .. } => LightType::Rect,
        }
    }
}

/// Per-frame immutable description of a light.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightProxy {
    kind: LightKind,
    light_to_world: Mat4,
    world_to_light: Mat4,
    flags: LightFlags,
    pub color: Vec3,
    pub shadow_resolution_scale: f32,
    /// Opacity of the shadow, multiplied into every fade alpha.
    pub shadow_amount: f32,
}

impl LightProxy {
    fn new(kind: LightKind, position: Vec3, direction: Vec3, flags: LightFlags) -> Self {
        let light_to_world =
            Mat4::from_rotation_translation(rotation_from_x_axis(direction), position);
        Self {
            kind,
            light_to_world,
            world_to_light: light_to_world.inverse(),
            flags: flags.normalized(),
            color: Vec3::ONE,
            shadow_resolution_scale: 1.0,
            shadow_amount: 1.0,
        }
    }

    fn default_flags() -> LightFlags {
        LightFlags::CASTS_DYNAMIC_SHADOW | LightFlags::CASTS_STATIC_SHADOW
    }

    pub fn directional(direction: Vec3, params: DirectionalLightParams) -> Self {
        Self::new(LightKind::Directional(params), Vec3::ZERO, direction, Self::default_flags())
    }

    pub fn point(position: Vec3, radius: f32) -> Self {
        Self::new(
            LightKind::Point { radius },
            position,
            Vec3::X,
            Self::default_flags() | LightFlags::ONE_PASS_CUBEMAP_ELIGIBLE,
        )
    }

    /// Cone angles are half angles in radians.
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        radius: f32,
        inner_cone_angle: f32,
        outer_cone_angle: f32,
    ) -> Self {
        let outer_cone_angle = outer_cone_angle.clamp(MIN_CONE_ANGLE, MAX_CONE_ANGLE);
        let inner_cone_angle = inner_cone_angle.clamp(0.0, outer_cone_angle);
        Self::new(
            LightKind::Spot {
                radius,
                inner_cone_angle,
                outer_cone_angle,
            },
            position,
            direction,
            Self::default_flags(),
        )
    }

    pub fn rect(
        position: Vec3,
        direction: Vec3,
        radius: f32,
        source_width: f32,
        source_height: f32,
    ) -> Self {
        Self::new(
            LightKind::Rect {
                radius,
                source_width,
                source_height,
            },
            position,
            direction,
            Self::default_flags() | LightFlags::ONE_PASS_CUBEMAP_ELIGIBLE,
        )
    }

    pub fn with_flags(mut self, flags: LightFlags) -> Self {
        self.set_flags(flags);
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    pub fn with_shadow_resolution_scale(mut self, scale: f32) -> Self {
        self.shadow_resolution_scale = scale;
        self
    }

    pub fn set_flags(&mut self, flags: LightFlags) {
        self.flags = flags.normalized();
    }

    pub fn set_transform(&mut self, position: Vec3, direction: Vec3) {
        self.light_to_world =
            Mat4::from_rotation_translation(rotation_from_x_axis(direction), position);
        self.world_to_light = self.light_to_world.inverse();
    }

    pub fn kind(&self) -> &LightKind {
        &self.kind
    }

    pub fn light_type(&self) -> LightType {
        self.kind.light_type()
    }

    pub fn flags(&self) -> LightFlags {
        self.flags
    }

    pub fn light_to_world(&self) -> Mat4 {
        self.light_to_world
    }

    pub fn world_to_light(&self) -> Mat4 {
        self.world_to_light
    }

    pub fn origin(&self) -> Vec3 {
        self.light_to_world.w_axis.truncate()
    }

    /// Direction the light travels in (local +X).
    pub fn direction(&self) -> Vec3 {
        safe_normal(self.light_to_world.x_axis.truncate())
    }

    /// `(origin, 1)` for local lights, `(-direction, 0)` for directional.
    pub fn position(&self) -> Vec4 {
        match self.kind {
            LightKind::Directional(_) => (-self.direction()).extend(0.0),
            _ => self.origin().extend(1.0),
        }
    }

    /// Attenuation radius; directional lights reach the whole world.
    pub fn radius(&self) -> f32 {
        match self.kind {
            LightKind::Directional(_) => HALF_WORLD_MAX,
            LightKind::Point { radius }
            | LightKind::Spot { radius, .. }
            | LightKind::Rect { radius, .. } => radius,
        }
    }

    pub fn outer_cone_angle(&self) -> Option<f32> {
        match self.kind {
            LightKind::Spot { outer_cone_angle, .. } => Some(outer_cone_angle),
            _ => None,
        }
    }

    pub fn directional_params(&self) -> Option<&DirectionalLightParams> {
        match &self.kind {
            LightKind::Directional(params) => Some(params),
            _ => None,
        }
    }

    pub fn is_directional(&self) -> bool {
        matches!(self.kind, LightKind::Directional(_))
    }

    pub fn casts_dynamic_shadow(&self) -> bool {
        self.flags.contains(LightFlags::CASTS_DYNAMIC_SHADOW)
    }

    pub fn casts_static_shadow(&self) -> bool {
        self.flags.contains(LightFlags::CASTS_STATIC_SHADOW)
    }

    pub fn has_static_lighting(&self) -> bool {
        self.flags.contains(LightFlags::HAS_STATIC_LIGHTING)
    }

    pub fn has_static_shadowing(&self) -> bool {
        self.flags.contains(LightFlags::HAS_STATIC_SHADOWING)
    }

    pub fn is_one_pass_cubemap_eligible(&self) -> bool {
        self.flags.contains(LightFlags::ONE_PASS_CUBEMAP_ELIGIBLE)
    }

    /// Sphere enclosing everything the light can reach. Spot lights use the
    /// tight sphere around their cone.
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        match self.kind {
            LightKind::Directional(_) => (Vec3::ZERO, f32::MAX),
            LightKind::Point { radius } | LightKind::Rect { radius, .. } => (self.origin(), radius),
            LightKind::Spot {
                radius,
                outer_cone_angle,
                ..
            } => cone_bounding_sphere(self.origin(), self.direction(), radius, outer_cone_angle),
        }
    }

    /// Whether the light can reach anything inside `bounds`.
    pub fn affects_bounds(&self, bounds: &BoxSphereBounds) -> bool {
        match self.kind {
            LightKind::Directional(_) => true,
            LightKind::Point { radius } | LightKind::Rect { radius, .. } => {
                sphere_intersects_sphere(self.origin(), radius, bounds.origin, bounds.sphere_radius)
            }
            LightKind::Spot { outer_cone_angle, .. } => {
                let (center, sphere_radius) = self.bounding_sphere();
                let (origin, bounds_radius) = (bounds.origin, bounds.sphere_radius);
                if !sphere_intersects_sphere(center, sphere_radius, origin, bounds_radius) {
                    return false;
                }
                cone_intersects_sphere(
                    self.origin(),
                    self.direction(),
                    outer_cone_angle,
                    bounds.origin,
                    bounds.sphere_radius,
                )
            }
        }
    }

    /// Approximate screen radius in pixels of the light's influence in `view`.
    pub fn effective_screen_radius(&self, view: &ViewInfo) -> f32 {
        let distance = self.origin().distance(view.view_origin).max(1.0);
        view.screen_scale() * self.radius() / distance
    }
}

/// Tight bounding sphere of a cone with the given half angle.
pub fn cone_bounding_sphere(
    origin: Vec3,
    direction: Vec3,
    radius: f32,
    half_angle: f32,
) -> (Vec3, f32) {
    let (sin_angle, cos_angle) = half_angle.sin_cos();
    if cos_angle < std::f32::consts::FRAC_1_SQRT_2 {
        (origin + direction * radius * cos_angle, radius * sin_angle)
    } else {
        let bounding_radius = radius / (2.0 * cos_angle);
        (origin + direction * bounding_radius, bounding_radius)
    }
}

fn cone_intersects_sphere(
    origin: Vec3,
    direction: Vec3,
    half_angle: f32,
    center: Vec3,
    sphere_radius: f32,
) -> bool {
    let (sin_angle, cos_angle) = half_angle.sin_cos();

    // Apex pulled back so the widened cone touches every overlapping sphere.
    let apex = origin - direction * (sphere_radius / sin_angle);
    let to_center = center - apex;
    let along = direction.dot(to_center);
    if along <= 0.0 || along * along < to_center.length_squared() * cos_angle * cos_angle {
        return false;
    }

    // Spheres behind the real apex only count when they contain it.
    let to_center = center - origin;
    let behind = -direction.dot(to_center);
    if behind > 0.0 && behind * behind >= to_center.length_squared() * sin_angle * sin_angle {
        to_center.length_squared() <= sphere_radius * sphere_radius
    } else {
        true
    }
}
