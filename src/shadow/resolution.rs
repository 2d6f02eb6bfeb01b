//! Shadow map resolution selection and fade-out near the minimum resolution.

use crate::{
    config::{ShadowConfig, MIN_VISIBLE_FADE_ALPHA},
    geometry::BoxSphereBounds,
    scene::{light::LightProxy, light::LightType, view::ViewInfo},
    utils::math::floor_log2,
};

/// Fade-in alpha for a shadow whose unclamped resolution is
/// `max_unclamped_resolution`.
///
/// 1 above `shadow_fade_resolution`, 0 at or below `min_shadow_resolution`,
/// and a `pow(ratio, exponent)` ramp between them that starts at exactly 0.
pub fn calculate_shadow_fade_alpha(
    max_unclamped_resolution: f32,
    shadow_fade_resolution: u32,
    min_shadow_resolution: u32,
    exponent: f32,
) -> f32 {
    let fade_resolution = shadow_fade_resolution as f32;
    let min_resolution = min_shadow_resolution as f32;

    if max_unclamped_resolution > fade_resolution {
        return 1.0;
    }
    if max_unclamped_resolution <= min_resolution {
        return 0.0;
    }

    // Only reachable when fade_resolution > min_resolution.
    let inverse_range = 1.0 / (fade_resolution - min_resolution);
    let first_fade_value = inverse_range.powf(exponent);
    if first_fade_value >= 1.0 {
        // Ramp narrower than one texel.
        return 1.0;
    }
    let size_ratio = (max_unclamped_resolution - min_resolution) * inverse_range;
    // Rescaled so the first step above the minimum does not pop.
    let alpha = (size_ratio.powf(exponent) - first_fade_value) / (1.0 - first_fade_value);
    alpha.clamp(0.0, 1.0)
}

/// Largest `2^k - 2 * border` not above `resolution`, at least 1.
pub fn round_down_to_shadow_resolution(resolution: u32, border: u32) -> u32 {
    let padded = resolution.saturating_add(2 * border).max(1);
    (1u32 << floor_log2(padded)).saturating_sub(2 * border).max(1)
}

/// Cube face sizes available to one-pass point light shadows, largest first.
pub fn cube_shadow_resolutions(config: &ShadowConfig) -> [u32; 5] {
    let half = config.shadow_buffer_resolution / 2;
    [half, half / 2, half / 4, half / 8, config.min_shadow_resolution]
}

/// Largest cube size not above `desired_resolution`, falling back to the
/// smallest available size.
pub fn one_pass_cube_resolution(desired_resolution: u32, config: &ShadowConfig) -> u32 {
    let sizes = cube_shadow_resolutions(config);
    sizes
        .iter()
        .copied()
        .find(|&size| desired_resolution >= size)
        .unwrap_or(sizes[sizes.len() - 1])
        .max(1)
}

pub fn texels_per_pixel(light_type: LightType, config: &ShadowConfig) -> f32 {
    match light_type {
        LightType::Point => config.texels_per_pixel_point,
        LightType::Spot => config.texels_per_pixel_spot,
        LightType::Rect => config.texels_per_pixel_rect,
        LightType::Directional => config.texels_per_pixel,
    }
}

/// Resolution picked for a shadow and how visible it is in each view.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowResolution {
    /// Size of the rendered area, border excluded.
    pub resolution: u32,
    pub border: u32,
    /// One entry per view.
    pub fade_alphas: Vec<f32>,
    pub max_fade_alpha: f32,
}

/// Shared resolution policy: fade each view, clamp, take the largest and
/// optionally snap to a power of two. `None` when the shadow has faded out
/// in every view.
fn resolve_resolution(
    unclamped_per_view: impl Iterator<Item = f32>,
    light: &LightProxy,
    border: u32,
    snap_to_power_of_two: bool,
    config: &ShadowConfig,
) -> Option<ShadowResolution> {
    let max_resolution = config.max_resolution_without_border(border) as f32;
    let min_floor = (config.min_shadow_resolution as f32)
        .min(config.shadow_buffer_resolution.saturating_sub(2 * border) as f32);
    let scale = light.shadow_resolution_scale;

    let mut fade_alphas = Vec::new();
    let mut max_fade_alpha = 0.0_f32;
    let mut max_desired = 0.0_f32;

    for unclamped in unclamped_per_view {
        let fade_alpha = calculate_shadow_fade_alpha(
            unclamped,
            config.shadow_fade_resolution,
            config.min_shadow_resolution,
            config.shadow_fade_exponent,
        ) * light.shadow_amount;
        max_fade_alpha = max_fade_alpha.max(fade_alpha);
        fade_alphas.push(fade_alpha);

        let mut clamped = unclamped;
        if scale > 1.0 {
            clamped *= scale;
        }
        clamped = clamped.min(max_resolution);
        if scale <= 1.0 {
            clamped *= scale;
        }
        max_desired = max_desired.max(clamped.max(min_floor));
    }

    if max_fade_alpha <= MIN_VISIBLE_FADE_ALPHA {
        return None;
    }

    let resolution = if max_desired >= max_resolution {
        max_resolution as u32
    } else if snap_to_power_of_two {
        round_down_to_shadow_resolution(max_desired as u32, border)
    } else {
        (max_desired as u32).max(1)
    };

    Some(ShadowResolution {
        resolution,
        border,
        fade_alphas,
        max_fade_alpha,
    })
}

/// Resolution of a local light's whole-scene shadow. One-pass cube shadows
/// have no border and snap to the cube size table.
pub fn whole_scene_shadow_resolution(
    light: &LightProxy,
    views: &[ViewInfo],
    one_pass_cube: bool,
    config: &ShadowConfig,
) -> Option<ShadowResolution> {
    let texels = texels_per_pixel(light.light_type(), config);
    let border = if one_pass_cube { 0 } else { config.shadow_border };
    let unclamped = views
        .iter()
        .map(|view| light.effective_screen_radius(view) * texels);

    let mut resolution = resolve_resolution(unclamped, light, border, true, config)?;
    if one_pass_cube {
        resolution.resolution = one_pass_cube_resolution(resolution.resolution, config);
    }
    Some(resolution)
}

/// Screen radius in pixels of `bounds` seen from `view`.
pub fn subject_screen_radius(bounds: &BoxSphereBounds, view: &ViewInfo) -> f32 {
    let distance = bounds.origin.distance(view.view_origin).max(1.0);
    view.screen_scale() * bounds.sphere_radius / distance
}

/// Resolution of a per-object shadow, driven by the subject's own size on
/// screen.
pub fn per_object_shadow_resolution(
    light: &LightProxy,
    subject_bounds: &BoxSphereBounds,
    views: &[ViewInfo],
    config: &ShadowConfig,
) -> Option<ShadowResolution> {
    let unclamped = views
        .iter()
        .map(|view| subject_screen_radius(subject_bounds, view) * config.texels_per_pixel);
    resolve_resolution(unclamped, light, config.shadow_border, false, config)
}

/// Cascades always render at the configured cascade resolution.
pub fn cascade_shadow_resolution(config: &ShadowConfig, view_count: usize) -> ShadowResolution {
    let border = config.shadow_border;
    ShadowResolution {
        resolution: config
            .max_csm_resolution
            .min(config.shadow_buffer_resolution)
            .saturating_sub(2 * border)
            .max(1),
        border,
        fade_alphas: vec![1.0; view_count],
        max_fade_alpha: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{UVec2, Vec3};

    #[test]
    fn fade_alpha_endpoints() {
        assert_eq!(calculate_shadow_fade_alpha(32.0, 64, 32, 0.25), 0.0);
        assert_eq!(calculate_shadow_fade_alpha(10.0, 64, 32, 0.25), 0.0);
        assert_eq!(calculate_shadow_fade_alpha(64.0, 64, 32, 0.25), 1.0);
        assert_eq!(calculate_shadow_fade_alpha(1000.0, 64, 32, 0.25), 1.0);
        let mid = calculate_shadow_fade_alpha(48.0, 64, 32, 0.25);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn rounding_examples() {
        assert_eq!(round_down_to_shadow_resolution(1000, 4), 504);
        assert_eq!(round_down_to_shadow_resolution(120, 4), 120);
        assert_eq!(round_down_to_shadow_resolution(119, 4), 56);
        assert_eq!(round_down_to_shadow_resolution(0, 0), 1);
    }

    #[test]
    fn cube_sizes_snap_down() {
        let config = ShadowConfig::default();
        assert_eq!(cube_shadow_resolutions(&config), [1024, 512, 256, 128, 32]);
        assert_eq!(one_pass_cube_resolution(2000, &config), 1024);
        assert_eq!(one_pass_cube_resolution(300, &config), 256);
        assert_eq!(one_pass_cube_resolution(40, &config), 32);
        assert_eq!(one_pass_cube_resolution(1, &config), 32);
    }

    fn camera() -> ViewInfo {
        ViewInfo::perspective(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, 1.0, UVec2::new(1280, 720), 0.1)
    }

    #[test]
    fn distant_light_is_culled() {
        let config = ShadowConfig::default();
        let light = LightProxy::point(Vec3::new(0.0, 0.0, -100_000.0), 10.0);
        let view = camera();
        assert!(whole_scene_shadow_resolution(&light, &[view], true, &config).is_none());
    }

    #[test]
    fn close_light_gets_largest_cube() {
        let config = ShadowConfig::default();
        let light = LightProxy::point(Vec3::new(0.0, 0.0, -10.0), 500.0);
        let view = camera();
        let resolution = whole_scene_shadow_resolution(&light, &[view], true, &config).unwrap();
        assert_eq!(resolution.border, 0);
        assert_eq!(resolution.resolution, 1024);
        assert_eq!(resolution.fade_alphas, vec![1.0]);
    }
}
