//! Initializers describe how the world is projected into a shadow's depth
//! space. They are plain values and compare by exact equality, which is what
//! decides whether a cached shadow map can be reused.

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::{
    config::HALF_WORLD_MAX,
    geometry::BoxSphereBounds,
    scene::{
        light::{cone_bounding_sphere, DirectionalLightParams, LightFlags, LightKind, LightProxy},
        view::ViewInfo,
    },
    utils::math::{rotation_from_x_axis, safe_normal},
};

/// Subjects closer to a local light than this multiple of their radius are
/// shadowed from a synthesized position further back.
const SHADOW_RADIUS_MULTIPLIER: f32 = 1.1;

/// Guard against zero-radius subjects.
const MIN_SUBJECT_RADIUS: f32 = 1.0e-3;

/// Closest light-space `w` a perspective shadow renders.
const PERSPECTIVE_MIN_LIGHT_W: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedShadowInitializer {
    /// Added to world positions before `world_to_light`.
    pub pre_shadow_translation: Vec3,
    pub world_to_light: Mat4,
    /// Non-uniform scale applied in light space.
    pub scales: Vec3,
    pub face_direction: Vec3,
    /// Subject bounds in translated world space.
    pub subject_bounds: BoxSphereBounds,
    /// `(0, 0, 1, 0)` for perspective shadows, `(0, 0, 0, 1)` for orthographic.
    pub w_axis: Vec4,
    pub min_light_w: f32,
    pub max_distance_to_cast_in_light_w: f32,
}

impl Default for ProjectedShadowInitializer {
    fn default() -> Self {
        Self {
            pre_shadow_translation: Vec3::ZERO,
            world_to_light: Mat4::IDENTITY,
            scales: Vec3::ONE,
            face_direction: Vec3::X,
            subject_bounds: BoxSphereBounds::default(),
            w_axis: Vec4::new(0.0, 0.0, 1.0, 0.0),
            min_light_w: PERSPECTIVE_MIN_LIGHT_W,
            max_distance_to_cast_in_light_w: 0.0,
        }
    }
}

impl ProjectedShadowInitializer {
    /// Whether a shadow rendered with `cached` can stand in for one rendered
    /// with `self`. Every field must match exactly.
    pub fn is_cached_shadow_valid(&self, cached: &ProjectedShadowInitializer) -> bool {
        self.pre_shadow_translation == cached.pre_shadow_translation
            && self.world_to_light == cached.world_to_light
            && self.scales == cached.scales
            && self.face_direction == cached.face_direction
            && self.subject_bounds.origin == cached.subject_bounds.origin
            && self.subject_bounds.box_extent == cached.subject_bounds.box_extent
            && self.subject_bounds.sphere_radius == cached.subject_bounds.sphere_radius
            && self.w_axis == cached.w_axis
            && self.min_light_w == cached.min_light_w
            && self.max_distance_to_cast_in_light_w == cached.max_distance_to_cast_in_light_w
    }

    pub fn is_orthographic(&self) -> bool {
        self.w_axis.z == 0.0
    }
}

/// Placement of one directional cascade within the view.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CascadeSettings {
    pub split_near: f32,
    pub split_far: f32,
    pub split_near_fade_region: f32,
    pub split_far_fade_region: f32,
    /// View distance where fading into the next cascade starts.
    pub fade_plane_offset: f32,
    pub fade_plane_length: f32,
    /// `None` for shadows that are not cascades.
    pub shadow_split_index: Option<u32>,
    pub is_far_shadow_cascade: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WholeSceneProjectedShadowInitializer {
    pub projection: ProjectedShadowInitializer,
    pub cascade_settings: CascadeSettings,
    pub one_pass_point_light_shadow: bool,
    pub ray_traced_distance_field: bool,
}

impl WholeSceneProjectedShadowInitializer {
    pub fn is_cached_shadow_valid(&self, cached: &WholeSceneProjectedShadowInitializer) -> bool {
        self.projection.is_cached_shadow_valid(&cached.projection)
            && self.one_pass_point_light_shadow == cached.one_pass_point_light_shadow
            && self.ray_traced_distance_field == cached.ray_traced_distance_field
    }
}

fn inverse_rotation_toward(direction: Vec3) -> Mat4 {
    Mat4::from_quat(rotation_from_x_axis(direction).inverse())
}

fn light_rotation_only(light: &LightProxy) -> Mat4 {
    let mut world_to_light = light.world_to_light();
    world_to_light.w_axis = Vec4::W;
    world_to_light
}

/// Initializer for a shadow cast by a single subject.
pub fn per_object_initializer(
    light: &LightProxy,
    subject_bounds: &BoxSphereBounds,
) -> ProjectedShadowInitializer {
    match light.kind() {
        LightKind::Directional(_) => {
            let radius = subject_bounds.sphere_radius.max(MIN_SUBJECT_RADIUS);
            ProjectedShadowInitializer {
                pre_shadow_translation: -subject_bounds.origin,
                world_to_light: inverse_rotation_toward(light.direction()),
                scales: Vec3::new(1.0, 1.0 / radius, 1.0 / radius),
                face_direction: Vec3::X,
                subject_bounds: BoxSphereBounds::new(
                    Vec3::ZERO,
                    subject_bounds.box_extent,
                    subject_bounds.sphere_radius,
                ),
                w_axis: Vec4::W,
                min_light_w: -HALF_WORLD_MAX,
                max_distance_to_cast_in_light_w: HALF_WORLD_MAX / 32.0,
            }
        }
        _ => local_light_per_object_initializer(light, subject_bounds),
    }
}

fn local_light_per_object_initializer(
    light: &LightProxy,
    subject_bounds: &BoxSphereBounds,
) -> ProjectedShadowInitializer {
    let mut light_position = light.origin();
    let mut light_vector = subject_bounds.origin - light_position;
    let mut light_distance = light_vector.length();
    let subject_radius = subject_bounds.box_extent.length().max(MIN_SUBJECT_RADIUS);

    let mut silhouette_radius = 1.0_f32;
    if light_distance > subject_radius {
        let denominator =
            ((light_distance - subject_radius) * (light_distance + subject_radius)).sqrt();
        silhouette_radius = (subject_radius / denominator).min(1.0);
    }

    if light_distance <= subject_radius * SHADOW_RADIUS_MULTIPLIER {
        // Pull the light back so the subject fits a < 90 degree cone.
        light_vector = safe_normal(light_vector) * subject_radius * SHADOW_RADIUS_MULTIPLIER;
        light_position = subject_bounds.origin - light_vector;
        light_distance = subject_radius * SHADOW_RADIUS_MULTIPLIER;
        silhouette_radius = 1.0;
    }

    ProjectedShadowInitializer {
        pre_shadow_translation: -light_position,
        world_to_light: inverse_rotation_toward(light_vector / light_distance),
        scales: Vec3::new(1.0, 1.0 / silhouette_radius, 1.0 / silhouette_radius),
        face_direction: Vec3::X,
        subject_bounds: BoxSphereBounds::new(
            subject_bounds.origin - light_position,
            subject_bounds.box_extent,
            subject_bounds.sphere_radius,
        ),
        w_axis: Vec4::new(0.0, 0.0, 1.0, 0.0),
        min_light_w: PERSPECTIVE_MIN_LIGHT_W,
        max_distance_to_cast_in_light_w: light.radius(),
    }
}

/// View-independent whole-scene initializer of a local light. Point and rect
/// lights get a one-pass cube shadow when eligible; directional lights use
/// [`directional_cascade_initializers`] instead.
pub fn whole_scene_initializer(light: &LightProxy) -> Option<WholeSceneProjectedShadowInitializer> {
    let ray_traced_distance_field = light.flags().contains(LightFlags::RAY_TRACED_DISTANCE_FIELD);

    match *light.kind() {
        LightKind::Directional(_) => None,
        LightKind::Point { radius } | LightKind::Rect { radius, .. } => {
            if !light.is_one_pass_cubemap_eligible() {
                return None;
            }
            Some(WholeSceneProjectedShadowInitializer {
                projection: ProjectedShadowInitializer {
                    pre_shadow_translation: -light.origin(),
                    world_to_light: light_rotation_only(light),
                    scales: Vec3::ONE,
                    face_direction: Vec3::Z,
                    subject_bounds: BoxSphereBounds::from_sphere(Vec3::ZERO, radius),
                    w_axis: Vec4::new(0.0, 0.0, 1.0, 0.0),
                    min_light_w: PERSPECTIVE_MIN_LIGHT_W,
                    max_distance_to_cast_in_light_w: radius,
                },
                cascade_settings: CascadeSettings::default(),
                one_pass_point_light_shadow: true,
                ray_traced_distance_field,
            })
        }
        LightKind::Spot {
            radius,
            outer_cone_angle,
            ..
        } => {
            let inv_tan_outer_cone = 1.0 / outer_cone_angle.tan();
            let (center, bounds_radius) =
                cone_bounding_sphere(light.origin(), light.direction(), radius, outer_cone_angle);
            Some(WholeSceneProjectedShadowInitializer {
                projection: ProjectedShadowInitializer {
                    pre_shadow_translation: -light.origin(),
                    world_to_light: light_rotation_only(light),
                    scales: Vec3::new(1.0, inv_tan_outer_cone, inv_tan_outer_cone),
                    face_direction: Vec3::X,
                    subject_bounds: BoxSphereBounds::from_sphere(
                        center - light.origin(),
                        bounds_radius,
                    ),
                    w_axis: Vec4::new(0.0, 0.0, 1.0, 0.0),
                    min_light_w: PERSPECTIVE_MIN_LIGHT_W,
                    max_distance_to_cast_in_light_w: radius,
                },
                cascade_settings: CascadeSettings::default(),
                one_pass_point_light_shadow: false,
                ray_traced_distance_field,
            })
        }
    }
}

/// Share of the distance range covered by the first `cascade_index`
/// cascades when each cascade is `exponent` times longer than the previous.
pub fn accumulated_cascade_scale(exponent: f32, cascade_index: u32, cascade_count: u32) -> f32 {
    if cascade_index == 0 {
        return 0.0;
    }

    let mut current_scale = 1.0;
    let mut total_scale = 0.0;
    let mut accumulated = 0.0;
    for i in 0..cascade_count {
        if i < cascade_index {
            accumulated += current_scale;
        }
        total_scale += current_scale;
        current_scale *= exponent;
    }
    accumulated / total_scale
}

/// View distance where cascade `split_index` starts. Index `num_cascades`
/// is the end of the dynamic range; higher indices reach into far cascades.
pub fn cascade_split_distance(
    params: &DirectionalLightParams,
    shadow_near: f32,
    split_index: u32,
) -> f32 {
    let near_count = params.num_cascades;
    let dynamic_distance = params.dynamic_shadow_distance.max(shadow_near);

    if split_index > near_count {
        let far_index = split_index - near_count;
        let far_scale = accumulated_cascade_scale(
            params.cascade_distribution_exponent,
            far_index,
            params.far_shadow_cascade_count,
        );
        dynamic_distance + far_scale * (params.far_shadow_distance - dynamic_distance)
    } else {
        let exponent = params.cascade_distribution_exponent;
        let near_scale = accumulated_cascade_scale(exponent, split_index, near_count);
        shadow_near + near_scale * (dynamic_distance - shadow_near)
    }
}

fn bounding_sphere_of(points: &[Vec3]) -> (Vec3, f32) {
    let center = points.iter().copied().sum::<Vec3>() / points.len().max(1) as f32;
    let radius = points
        .iter()
        .map(|point| point.distance(center))
        .fold(0.0_f32, f32::max);
    (center, radius)
}

/// Cascade placement and the sphere bounding its slice of the view frustum.
pub fn cascade_split_bounds(
    params: &DirectionalLightParams,
    view: &ViewInfo,
    split_index: u32,
) -> (CascadeSettings, Vec3, f32) {
    let shadow_near = view.near_clip();
    let total_cascades = params.num_cascades + params.far_shadow_cascade_count;

    let split_near = cascade_split_distance(params, shadow_near, split_index);
    let mut split_far = cascade_split_distance(params, shadow_near, split_index + 1);
    let fade_plane = split_far;
    let fade_extension = (split_far - split_near) * params.cascade_transition_fraction;
    if split_index + 1 < total_cascades {
        split_far += fade_extension;
    }

    let split_near_fade_region = if split_index >= 1 {
        let before_near = cascade_split_distance(params, shadow_near, split_index - 1);
        (split_near - before_near) * params.cascade_transition_fraction
    } else {
        0.0
    };

    let settings = CascadeSettings {
        split_near,
        split_far,
        split_near_fade_region,
        split_far_fade_region: fade_extension,
        fade_plane_offset: fade_plane,
        fade_plane_length: split_far - fade_plane,
        shadow_split_index: Some(split_index),
        is_far_shadow_cascade: split_index >= params.num_cascades,
    };

    let corners = view.frustum_slice_corners(split_near, split_far);
    let (center, radius) = bounding_sphere_of(&corners);
    (settings, center, radius)
}

/// One orthographic initializer per cascade of a directional light, nearest
/// cascade first.
pub fn directional_cascade_initializers(
    light: &LightProxy,
    view: &ViewInfo,
) -> Vec<WholeSceneProjectedShadowInitializer> {
    let Some(params) = light.directional_params() else {
        return Vec::new();
    };
    if params.dynamic_shadow_distance <= 0.0 {
        return Vec::new();
    }

    let ray_traced_distance_field = light.flags().contains(LightFlags::RAY_TRACED_DISTANCE_FIELD);
    let world_to_light = inverse_rotation_toward(light.direction());
    let total_cascades = params.num_cascades + params.far_shadow_cascade_count;

    (0..total_cascades)
        .map(|split_index| {
            let (cascade_settings, center, radius) =
                cascade_split_bounds(params, view, split_index);
            let radius = radius.max(MIN_SUBJECT_RADIUS);
            let extent = radius / 3.0_f32.sqrt();
            let min_light_w = (-HALF_WORLD_MAX).min(-radius);

            WholeSceneProjectedShadowInitializer {
                projection: ProjectedShadowInitializer {
                    pre_shadow_translation: -center,
                    world_to_light,
                    scales: Vec3::new(1.0, 1.0 / radius, 1.0 / radius),
                    face_direction: Vec3::X,
                    subject_bounds: BoxSphereBounds::new(Vec3::ZERO, Vec3::splat(extent), radius),
                    w_axis: Vec4::W,
                    min_light_w,
                    max_distance_to_cast_in_light_w: radius - min_light_w,
                },
                cascade_settings,
                one_pass_point_light_shadow: false,
                ray_traced_distance_field,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::UVec2;

    fn wide_camera() -> ViewInfo {
        ViewInfo::perspective(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, 1.2, UVec2::new(800, 600), 1.0)
    }

    #[test]
    fn accumulated_scale_spans_unit_range() {
        assert_eq!(accumulated_cascade_scale(3.0, 0, 3), 0.0);
        assert!((accumulated_cascade_scale(3.0, 3, 3) - 1.0).abs() < 1e-6);
        // 1 / (1 + 3 + 9)
        assert!((accumulated_cascade_scale(3.0, 1, 3) - 1.0 / 13.0).abs() < 1e-6);
        // Exponent 1 is a uniform split.
        assert!((accumulated_cascade_scale(1.0, 2, 4) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn subject_close_to_light_is_pulled_back() {
        let light = LightProxy::point(Vec3::ZERO, 1000.0);
        let bounds = BoxSphereBounds::from_box(Vec3::new(1.0, 0.0, 0.0), Vec3::splat(2.0));
        let init = per_object_initializer(&light, &bounds);

        let radius = bounds.box_extent.length();
        assert_eq!(init.scales, Vec3::ONE);
        let pulled_back = radius * SHADOW_RADIUS_MULTIPLIER;
        assert!((init.subject_bounds.origin.length() - pulled_back).abs() < 1e-4);
        assert_eq!(init.max_distance_to_cast_in_light_w, 1000.0);
    }

    #[test]
    fn distant_subject_uses_silhouette_radius() {
        let light = LightProxy::point(Vec3::ZERO, 1000.0);
        let bounds =
            BoxSphereBounds::from_box(Vec3::new(0.0, 100.0, 0.0), Vec3::new(3.0, 0.0, 4.0));
        let init = per_object_initializer(&light, &bounds);

        let expected = 5.0 / ((95.0_f32) * 105.0).sqrt();
        assert!((init.scales.y - 1.0 / expected).abs() < 1e-3);
        assert_eq!(init.pre_shadow_translation, Vec3::ZERO);
        // Light space +X points at the subject.
        let local = init.world_to_light.transform_point3(init.subject_bounds.origin);
        assert!((local - Vec3::new(100.0, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn identical_inputs_give_valid_cache() {
        let light = LightProxy::spot(Vec3::new(5.0, 2.0, 1.0), Vec3::NEG_Y, 300.0, 0.3, 0.6);
        let a = whole_scene_initializer(&light).unwrap();
        let b = whole_scene_initializer(&light).unwrap();
        assert!(a.is_cached_shadow_valid(&b));

        let mut c = b;
        c.projection.min_light_w += 1.0e-3;
        assert!(!a.is_cached_shadow_valid(&c));
    }

    #[test]
    fn point_light_needs_cube_eligibility() {
        let light = LightProxy::point(Vec3::ZERO, 100.0);
        let init = whole_scene_initializer(&light).unwrap();
        assert!(init.one_pass_point_light_shadow);
        assert_eq!(init.projection.subject_bounds.sphere_radius, 100.0);

        let flags = light.flags() - LightFlags::ONE_PASS_CUBEMAP_ELIGIBLE;
        assert!(whole_scene_initializer(&light.clone().with_flags(flags)).is_none());
    }

    #[test]
    fn cascades_cover_dynamic_distance() {
        let params = DirectionalLightParams {
            dynamic_shadow_distance: 1000.0,
            num_cascades: 3,
            ..Default::default()
        };
        let light = LightProxy::directional(Vec3::new(0.3, -1.0, 0.2), params);
        let view = wide_camera();

        let cascades = directional_cascade_initializers(&light, &view);
        assert_eq!(cascades.len(), 3);
        assert_eq!(cascades[0].cascade_settings.split_near, 1.0);
        assert!((cascades[2].cascade_settings.split_far - 1000.0).abs() < 1e-2);
        for pair in cascades.windows(2) {
            assert!(pair[0].cascade_settings.split_far > pair[1].cascade_settings.split_near);
            let radii = (
                pair[0].projection.subject_bounds.sphere_radius,
                pair[1].projection.subject_bounds.sphere_radius,
            );
            assert!(radii.0 < radii.1);
        }
        assert!(cascades.iter().all(|cascade| cascade.projection.is_orthographic()));
    }

    #[test]
    fn far_cascades_continue_past_the_dynamic_distance() {
        let params = DirectionalLightParams {
            dynamic_shadow_distance: 1000.0,
            num_cascades: 2,
            far_shadow_cascade_count: 2,
            far_shadow_distance: 10_000.0,
            ..Default::default()
        };

        assert_eq!(cascade_split_distance(&params, 1.0, 2), 1000.0);
        // First far split: 1 / (1 + 3) of the far range.
        assert!((cascade_split_distance(&params, 1.0, 3) - 3250.0).abs() < 1e-2);
        assert!((cascade_split_distance(&params, 1.0, 4) - 10_000.0).abs() < 1e-2);

        let light = LightProxy::directional(Vec3::new(0.3, -1.0, 0.2), params);
        let view = wide_camera();
        let cascades = directional_cascade_initializers(&light, &view);
        assert_eq!(cascades.len(), 4);

        let far: Vec<bool> = cascades
            .iter()
            .map(|cascade| cascade.cascade_settings.is_far_shadow_cascade)
            .collect();
        assert_eq!(far, vec![false, false, true, true]);

        // Each cascade starts where the previous one's fade plane sits.
        for pair in cascades.windows(2) {
            assert_eq!(
                pair[0].cascade_settings.fade_plane_offset,
                pair[1].cascade_settings.split_near
            );
        }
        assert_eq!(cascades[2].cascade_settings.split_near, 1000.0);
        assert!((cascades[3].cascade_settings.split_far - 10_000.0).abs() < 1e-2);
        assert_eq!(cascades[3].cascade_settings.shadow_split_index, Some(3));
    }
}
