//! Per-frame shadow setup: decides the shadows of every light, fills them
//! with casters and assigns depth targets.

use std::time::Instant;

use glam::UVec2;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    config::ShadowConfig,
    scene::{
        scene::{LightSceneInfo, Scene},
        view::ViewInfo,
    },
    shadow::{
        allocator::ShadowTargetAllocator,
        cache::ShadowCacheMode,
        collector::build_caster_culling_hulls,
        info::{ProjectedShadowInfo, VisibleLightShadows},
        initializer::{
            directional_cascade_initializers, per_object_initializer, whole_scene_initializer,
        },
        resolution::{
            cascade_shadow_resolution, per_object_shadow_resolution, whole_scene_shadow_resolution,
        },
        targets::DepthTarget,
    },
    utils::{
        allocator::LightId,
        logging::{warn_if_setup_budget_exceeded, ScopedTimer, SetupPhase},
        profiling::{ShadowSetupStats, StageTimer},
    },
};

/// Everything the render pass needs to draw this frame's shadows.
#[derive(Debug, Clone, Default)]
pub struct FrameShadows {
    /// Lights with at least one shadow, in registration order.
    pub lights: Vec<VisibleLightShadows>,
    pub point_cache_updates: u32,
    pub spot_cache_updates: u32,
    /// Shadows removed because no depth target could be found.
    pub dropped: usize,
}

impl FrameShadows {
    pub fn shadows_for(&self, light_id: LightId) -> &[ProjectedShadowInfo] {
        self.lights
            .iter()
            .find(|light| light.light_id == light_id)
            .map(|light| light.shadows.as_slice())
            .unwrap_or(&[])
    }

    pub fn shadow_count(&self) -> usize {
        self.lights.iter().map(|light| light.shadows.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectedShadowInfo> + '_ {
        self.lights.iter().flat_map(|light| light.shadows.iter())
    }
}

/// Result of setting up one light.
#[derive(Default)]
struct LightSetup {
    shadows: Vec<ProjectedShadowInfo>,
    released: Vec<DepthTarget>,
}

/// Drives shadow setup frame after frame. Owns the depth-target allocator;
/// the shadow cache lives in the [`Scene`].
#[derive(Debug)]
pub struct ShadowSetup {
    config: ShadowConfig,
    allocator: ShadowTargetAllocator,
    stats: ShadowSetupStats,
    parallel_enabled: bool,
}

impl ShadowSetup {
    pub fn new(config: ShadowConfig) -> Self {
        let allocator = ShadowTargetAllocator::from_config(&config);
        Self {
            config,
            allocator,
            stats: ShadowSetupStats::default(),
            parallel_enabled: cfg!(feature = "parallel"),
        }
    }

    pub fn with_allocator(mut self, allocator: ShadowTargetAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Runs per-light setup on the rayon pool. Ignored without the
    /// `parallel` feature.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.parallel_enabled = enabled && cfg!(feature = "parallel");
    }

    pub fn parallel_enabled(&self) -> bool {
        self.parallel_enabled
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    pub fn stats(&self) -> &ShadowSetupStats {
        &self.stats
    }

    pub fn allocator(&self) -> &ShadowTargetAllocator {
        &self.allocator
    }

    /// Sets up the shadows of every light in `scene` for `views`.
    /// `real_time` is in seconds and drives cache aging.
    pub fn run(&mut self, scene: &Scene, views: &[ViewInfo], real_time: f64) -> FrameShadows {
        let frame_start = Instant::now();
        let _timer = ScopedTimer::new(SetupPhase::Frame);
        self.stats.reset();

        let cache = scene.cached_shadow_maps();
        self.allocator.begin_frame();
        self.allocator.release_all(cache.take_orphaned_targets());
        cache.reset_frame_counters();

        let results = {
            let _stage = StageTimer::new(&mut self.stats.light_setup_time);
            let _timer = ScopedTimer::new(SetupPhase::Lights);
            setup_lights(scene, views, real_time, &self.config, self.parallel_enabled)
        };

        let mut lights = Vec::with_capacity(results.len());
        for (light, result) in scene.lights().zip(results) {
            self.allocator.release_all(result.released);
            if !result.shadows.is_empty() {
                lights.push(VisibleLightShadows {
                    light_id: light.id,
                    shadows: result.shadows,
                });
            }
        }
        self.stats.lights_processed = scene.light_count();

        let allocation = {
            let _stage = StageTimer::new(&mut self.stats.allocation_time);
            let _timer = ScopedTimer::new(SetupPhase::Allocation);
            self.allocator.allocate(&mut lights, cache)
        };

        let stale = cache.release_stale(real_time, self.config.cached_shadow_release_seconds);
        self.allocator.release_all(stale);

        let frame = FrameShadows {
            lights,
            point_cache_updates: cache.point_updates_this_frame(),
            spot_cache_updates: cache.spot_updates_this_frame(),
            dropped: allocation.dropped,
        };

        self.record_stats(&frame, allocation.targets_allocated);
        self.stats.total_frame_time = frame_start.elapsed();
        self.stats.report();
        warn_if_setup_budget_exceeded(&self.stats, self.config.setup_budget_ms);
        frame
    }

    fn record_stats(&mut self, frame: &FrameShadows, targets_allocated: usize) {
        for shadow in frame.iter() {
            if shadow.is_cascade() {
                self.stats.cascade_shadows += 1;
            } else if shadow.is_whole_scene() {
                self.stats.whole_scene_shadows += 1;
            } else {
                self.stats.per_object_shadows += 1;
            }
            self.stats.subject_primitives += shadow.dynamic_subject_primitives().len();
            self.stats.static_mesh_elements += shadow.static_mesh_elements().len();
        }
        self.stats.shadows_dropped = frame.dropped;
        self.stats.point_cache_updates = frame.point_cache_updates;
        self.stats.spot_cache_updates = frame.spot_cache_updates;
        self.stats.targets_allocated = targets_allocated;
    }
}

impl Default for ShadowSetup {
    fn default() -> Self {
        Self::new(ShadowConfig::default())
    }
}

/// Per-light results in registration order.
fn setup_lights(
    scene: &Scene,
    views: &[ViewInfo],
    real_time: f64,
    config: &ShadowConfig,
    parallel: bool,
) -> Vec<LightSetup> {
    let lights: Vec<&LightSceneInfo> = scene.lights().collect();

    #[cfg(feature = "parallel")]
    if parallel {
        return lights
            .par_iter()
            .map(|light| setup_light(scene, light, views, real_time, config))
            .collect();
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    lights
        .iter()
        .map(|light| setup_light(scene, light, views, real_time, config))
        .collect()
}

fn setup_light(
    scene: &Scene,
    light: &LightSceneInfo,
    views: &[ViewInfo],
    real_time: f64,
    config: &ShadowConfig,
) -> LightSetup {
    let proxy = &light.proxy;
    if !proxy.casts_dynamic_shadow() || views.is_empty() {
        return LightSetup::default();
    }

    if let Some(params) = proxy.directional_params() {
        if params.dynamic_shadow_distance > 0.0 {
            return setup_cascades(scene, light, views, config);
        }
        if proxy.has_static_shadowing() {
            return setup_per_object_shadows(scene, light, views, config, false);
        }
        return LightSetup::default();
    }

    if proxy.has_static_lighting() {
        // Fully baked.
        return LightSetup::default();
    }
    if proxy.has_static_shadowing() {
        // Static casters are in the shadow map baked for the light.
        return setup_per_object_shadows(scene, light, views, config, false);
    }

    match whole_scene_initializer(proxy) {
        Some(_) => setup_whole_scene_shadow(scene, light, views, real_time, config),
        None => setup_per_object_shadows(scene, light, views, config, true),
    }
}

fn setup_cascades(
    scene: &Scene,
    light: &LightSceneInfo,
    views: &[ViewInfo],
    config: &ShadowConfig,
) -> LightSetup {
    let mut setup = LightSetup::default();
    let resolution = cascade_shadow_resolution(config, views.len());

    for (view_index, view) in views.iter().enumerate() {
        let mut fade_alphas = vec![0.0; views.len()];
        fade_alphas[view_index] = 1.0;

        for cascade in directional_cascade_initializers(&light.proxy, view) {
            let mut shadow = ProjectedShadowInfo::whole_scene(
                light.id,
                true,
                Some(view_index),
                &cascade,
                resolution.resolution,
                resolution.border,
                ShadowCacheMode::Uncached,
                fade_alphas.clone(),
            );
            shadow.gather_directional_casters(scene, light, views, config);
            setup.shadows.push(shadow);
        }
    }
    setup
}

fn setup_whole_scene_shadow(
    scene: &Scene,
    light: &LightSceneInfo,
    views: &[ViewInfo],
    real_time: f64,
    config: &ShadowConfig,
) -> LightSetup {
    let mut setup = LightSetup::default();
    let proxy = &light.proxy;
    let Some(initializer) = whole_scene_initializer(proxy) else {
        return setup;
    };
    let Some(resolution) =
        whole_scene_shadow_resolution(proxy, views, initializer.one_pass_point_light_shadow, config)
    else {
        log::trace!("light {:?}: whole-scene shadow faded out", light.id);
        return setup;
    };

    let cache_modes = scene.cached_shadow_maps().compute_whole_scene_shadow_cache_modes(
        light.id,
        proxy.light_type(),
        real_time,
        &initializer,
        UVec2::splat(resolution.resolution),
        config,
    );
    setup.released.extend(cache_modes.released_target);
    log::debug!(
        "light {:?}: {} shadow pass(es) {:?} at {}",
        light.id,
        cache_modes.num_shadow_maps(),
        cache_modes.cache_modes(),
        cache_modes.updated_shadow_map_size.x
    );

    for &mode in cache_modes.cache_modes() {
        let mut shadow = ProjectedShadowInfo::whole_scene(
            light.id,
            false,
            None,
            &cache_modes.updated_initializer,
            cache_modes.updated_shadow_map_size.x,
            resolution.border,
            mode,
            resolution.fade_alphas.clone(),
        );
        let hulls = build_caster_culling_hulls(proxy, views, mode, config);
        shadow.add_all_casters(scene, light, views, &hulls, config);
        setup.shadows.push(shadow);
    }
    setup
}

/// One shadow per visible caster. Lights with static shadowing only need
/// them for often-moving casters.
fn setup_per_object_shadows(
    scene: &Scene,
    light: &LightSceneInfo,
    views: &[ViewInfo],
    config: &ShadowConfig,
    include_static_casters: bool,
) -> LightSetup {
    let mut setup = LightSetup::default();
    let proxy = &light.proxy;

    let mut lists = vec![light.often_moving_interactions()];
    if include_static_casters {
        lists.push(light.static_interactions());
    }

    for interaction_id in lists.into_iter().flat_map(|list| list.iter()) {
        let Some(interaction) = scene.interaction(interaction_id) else {
            continue;
        };
        if !interaction.has_shadow() || interaction.casts_self_shadow_only() {
            continue;
        }
        let Some(primitive) = scene.primitive(interaction.primitive) else {
            continue;
        };
        if !views.iter().any(|view| view.frustum.intersects_bounds(&primitive.bounds)) {
            continue;
        }

        let Some(resolution) =
            per_object_shadow_resolution(proxy, &primitive.bounds, views, config)
        else {
            continue;
        };
        let initializer = per_object_initializer(proxy, &primitive.bounds);
        let Some(mut shadow) = ProjectedShadowInfo::per_object(
            light.id,
            primitive.id,
            &initializer,
            resolution.resolution,
            resolution.border,
            resolution.fade_alphas,
        ) else {
            log::debug!(
                "light {:?}: degenerate per-object shadow for {:?}",
                light.id,
                primitive.id
            );
            continue;
        };
        shadow.add_subject_primitive(primitive, views, scene.materials(), config);
        setup.shadows.push(shadow);
    }
    setup
}
