//! Configuration constants and tunables for shadow setup.

use serde::{Deserialize, Serialize};

/// Pixel border kept around every shadow packed into an atlas.
pub const SHADOW_BORDER: u32 = 4;

/// Smallest resolution a shadow map is rendered at.
pub const DEFAULT_MIN_SHADOW_RESOLUTION: u32 = 32;

/// Largest resolution a single shadow map may use.
pub const DEFAULT_MAX_SHADOW_RESOLUTION: u32 = 2048;

/// Side length of the shadow depth buffer (atlas page size).
pub const DEFAULT_SHADOW_BUFFER_RESOLUTION: u32 = 2048;

/// Resolution below which shadows start fading out.
pub const DEFAULT_SHADOW_FADE_RESOLUTION: u32 = 64;

/// Exponent of the fade-out curve.
pub const DEFAULT_SHADOW_FADE_EXPONENT: f32 = 0.25;

/// Screen radius below which a primitive stops casting whole-scene shadows.
pub const DEFAULT_MIN_SCREEN_RADIUS_FOR_SHADOW_CASTER: f32 = 0.01;

/// Shadow texels per screen pixel (4 / π).
pub const DEFAULT_TEXELS_PER_PIXEL: f32 = 1.27324;
pub const DEFAULT_TEXELS_PER_PIXEL_POINT: f32 = 1.27324;
pub const DEFAULT_TEXELS_PER_PIXEL_SPOT: f32 = 2.0 * 1.27324;
pub const DEFAULT_TEXELS_PER_PIXEL_RECT: f32 = 1.27324;

/// Shadows whose fade alpha does not exceed this are not rendered.
pub const MIN_VISIBLE_FADE_ALPHA: f32 = 1.0 / 256.0;

/// Half the extent of the representable world.
pub const HALF_WORLD_MAX: f32 = 1_048_576.0;

/// Minimum depth range (each side) of a directional shadow.
pub const DIRECTIONAL_DEPTH_RANGE_CLAMP: f32 = 5000.0;

/// Largest factor the shadow map is downsampled by during filtering. The
/// directional texel snap uses it so snapping stays stable at that scale.
pub const MAX_DOWNSAMPLE_FACTOR: f32 = 4.0;

/// Default budget for memory held by cached whole-scene shadow maps.
pub const DEFAULT_WHOLE_SCENE_SHADOW_CACHE_MB: u32 = 150;

/// Seconds after which an unused cached shadow map is released.
pub const DEFAULT_CACHED_SHADOW_RELEASE_SECONDS: f64 = 2.0;

/// Tunables read by every stage of shadow setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub shadow_border: u32,
    pub min_shadow_resolution: u32,
    pub max_shadow_resolution: u32,
    pub shadow_buffer_resolution: u32,
    /// Resolution used for each directional cascade.
    pub max_csm_resolution: u32,
    pub shadow_fade_resolution: u32,
    pub shadow_fade_exponent: f32,
    pub min_screen_radius_for_shadow_caster: f32,
    pub texels_per_pixel: f32,
    pub texels_per_pixel_point: f32,
    pub texels_per_pixel_spot: f32,
    pub texels_per_pixel_rect: f32,
    pub cache_whole_scene_shadows: bool,
    pub whole_scene_shadow_cache_mb: u32,
    /// `None` means unlimited.
    pub max_point_cache_updates_per_frame: Option<u32>,
    /// `None` means unlimited.
    pub max_spot_cache_updates_per_frame: Option<u32>,
    pub cached_shadow_release_seconds: f64,
    pub use_light_view_convex_hull_culling: bool,
    pub max_shadow_atlas_pages: u32,
    pub setup_budget_ms: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            shadow_border: SHADOW_BORDER,
            min_shadow_resolution: DEFAULT_MIN_SHADOW_RESOLUTION,
            max_shadow_resolution: DEFAULT_MAX_SHADOW_RESOLUTION,
            shadow_buffer_resolution: DEFAULT_SHADOW_BUFFER_RESOLUTION,
            max_csm_resolution: DEFAULT_MAX_SHADOW_RESOLUTION,
            shadow_fade_resolution: DEFAULT_SHADOW_FADE_RESOLUTION,
            shadow_fade_exponent: DEFAULT_SHADOW_FADE_EXPONENT,
            min_screen_radius_for_shadow_caster: DEFAULT_MIN_SCREEN_RADIUS_FOR_SHADOW_CASTER,
            texels_per_pixel: DEFAULT_TEXELS_PER_PIXEL,
            texels_per_pixel_point: DEFAULT_TEXELS_PER_PIXEL_POINT,
            texels_per_pixel_spot: DEFAULT_TEXELS_PER_PIXEL_SPOT,
            texels_per_pixel_rect: DEFAULT_TEXELS_PER_PIXEL_RECT,
            cache_whole_scene_shadows: true,
            whole_scene_shadow_cache_mb: DEFAULT_WHOLE_SCENE_SHADOW_CACHE_MB,
            max_point_cache_updates_per_frame: None,
            max_spot_cache_updates_per_frame: None,
            cached_shadow_release_seconds: DEFAULT_CACHED_SHADOW_RELEASE_SECONDS,
            use_light_view_convex_hull_culling: true,
            max_shadow_atlas_pages: 4,
            setup_budget_ms: 2.0,
        }
    }
}

impl ShadowConfig {
    /// Largest usable shadow resolution once the border is reserved.
    pub fn max_resolution_without_border(&self, border: u32) -> u32 {
        self.max_shadow_resolution
            .min(self.shadow_buffer_resolution)
            .saturating_sub(2 * border)
            .max(1)
    }

    pub fn whole_scene_shadow_cache_bytes(&self) -> u64 {
        u64::from(self.whole_scene_shadow_cache_mb) * 1024 * 1024
    }
}
