use penumbra::{
    shadow::{
        initializer::{
            whole_scene_initializer, ProjectedShadowInitializer,
            WholeSceneProjectedShadowInitializer,
        },
        targets::{DepthTarget, DepthTargetDesc, DepthTargetHandle},
        CacheModeResolution, ShadowCacheMode, ShadowCacheTable,
    },
    LightId, LightProxy, LightType, ShadowConfig, UVec2, Vec3,
};

fn point_initializer(position: Vec3) -> WholeSceneProjectedShadowInitializer {
    whole_scene_initializer(&LightProxy::point(position, 800.0)).unwrap()
}

fn resolve_point(
    cache: &ShadowCacheTable,
    light: LightId,
    time: f64,
    init: &WholeSceneProjectedShadowInitializer,
    size: u32,
    config: &ShadowConfig,
) -> CacheModeResolution {
    let size = UVec2::splat(size);
    cache.compute_whole_scene_shadow_cache_modes(light, LightType::Point, time, init, size, config)
}

fn cube_target(handle: u64, size: u32) -> DepthTarget {
    DepthTarget {
        handle: DepthTargetHandle(handle),
        desc: DepthTargetDesc::cube(size),
    }
}

#[test]
fn initializer_equality_is_exact_and_field_order_independent() {
    let a = point_initializer(Vec3::new(10.0, 2.0, -3.0)).projection;
    let b = ProjectedShadowInitializer {
        max_distance_to_cast_in_light_w: a.max_distance_to_cast_in_light_w,
        min_light_w: a.min_light_w,
        w_axis: a.w_axis,
        subject_bounds: a.subject_bounds,
        face_direction: a.face_direction,
        scales: a.scales,
        world_to_light: a.world_to_light,
        pre_shadow_translation: a.pre_shadow_translation,
    };
    assert!(a.is_cached_shadow_valid(&b));
    assert!(b.is_cached_shadow_valid(&a));

    let mut moved = b;
    moved.pre_shadow_translation.x += 1.0e-3;
    assert!(!a.is_cached_shadow_valid(&moved));

    let mut rescaled = b;
    rescaled.scales.y = f32::from_bits(rescaled.scales.y.to_bits() + 1);
    assert!(!a.is_cached_shadow_valid(&rescaled));

    let mut wider = b;
    wider.subject_bounds.sphere_radius += 0.5;
    assert!(!a.is_cached_shadow_valid(&wider));

    let same_light_again = point_initializer(Vec3::new(10.0, 2.0, -3.0));
    let mut flagged = same_light_again;
    flagged.ray_traced_distance_field = true;
    assert!(!same_light_again.is_cached_shadow_valid(&flagged));
}

#[test]
fn first_frame_renders_static_then_movable() {
    let cache = ShadowCacheTable::new();
    let config = ShadowConfig::default();
    let light = LightId::new(0, 0);
    let init = point_initializer(Vec3::ZERO);

    let resolution = resolve_point(&cache, light, 1.0, &init, 512, &config);
    assert_eq!(
        resolution.cache_modes(),
        &[ShadowCacheMode::StaticPrimitivesOnly, ShadowCacheMode::MovablePrimitivesOnly]
    );
    assert_eq!(cache.point_updates_this_frame(), 1);
    assert_eq!(cache.spot_updates_this_frame(), 0);

    let entry = cache.entry(light).unwrap();
    assert_eq!(entry.initializer, init);
    assert_eq!(entry.last_used_time, 1.0);
    assert!(entry.shadow_map.is_none());
}

#[test]
fn unchanged_light_reuses_the_cached_static_depth() {
    let cache = ShadowCacheTable::new();
    let config = ShadowConfig::default();
    let light = LightId::new(3, 1);
    let init = point_initializer(Vec3::new(0.0, 100.0, 0.0));
    let size = UVec2::splat(512);

    resolve_point(&cache, light, 0.0, &init, 512, &config);
    assert_eq!(cache.set_static_result(light, size, Some(cube_target(1, 512)), true), None);

    cache.reset_frame_counters();
    let resolution = resolve_point(&cache, light, 0.5, &init, 512, &config);
    assert_eq!(resolution.cache_modes(), &[ShadowCacheMode::MovablePrimitivesOnly]);
    assert_eq!(resolution.released_target, None);
    assert_eq!(cache.point_updates_this_frame(), 0);
    assert_eq!(cache.entry(light).unwrap().last_used_time, 0.5);
    assert_eq!(cache.cached_target(light), Some(cube_target(1, 512)));
}

#[test]
fn resolution_change_rerenders_both_passes() {
    let cache = ShadowCacheTable::new();
    let config = ShadowConfig::default();
    let light = LightId::new(0, 0);
    let init = point_initializer(Vec3::ZERO);

    resolve_point(&cache, light, 0.0, &init, 512, &config);
    cache.set_static_result(light, UVec2::splat(512), Some(cube_target(7, 512)), true);
    cache.reset_frame_counters();

    let resolution = resolve_point(&cache, light, 0.1, &init, 256, &config);
    assert_eq!(resolution.num_shadow_maps(), 2);
    assert_eq!(
        resolution.cache_modes(),
        &[ShadowCacheMode::StaticPrimitivesOnly, ShadowCacheMode::MovablePrimitivesOnly]
    );
    assert_eq!(resolution.released_target, Some(cube_target(7, 512)));
    assert_eq!(cache.point_updates_this_frame(), 1);
}

#[test]
fn moved_light_invalidates_without_counting_an_update() {
    let cache = ShadowCacheTable::new();
    let config = ShadowConfig::default();
    let light = LightId::new(0, 0);
    let size = UVec2::splat(512);
    let resolve_spot = |time, init: &WholeSceneProjectedShadowInitializer| {
        let spot = LightType::Spot;
        cache.compute_whole_scene_shadow_cache_modes(light, spot, time, init, size, &config)
    };

    resolve_spot(0.0, &point_initializer(Vec3::ZERO));
    cache.set_static_result(light, size, Some(cube_target(2, 512)), true);
    cache.reset_frame_counters();

    let moved = point_initializer(Vec3::new(0.0, 0.0, 1.0));
    let resolution = resolve_spot(0.1, &moved);
    assert_eq!(resolution.cache_modes(), &[ShadowCacheMode::Uncached]);
    assert_eq!(resolution.released_target, Some(cube_target(2, 512)));
    assert_eq!(cache.spot_updates_this_frame(), 0);
    assert_eq!(cache.entry(light).unwrap().initializer, moved);

    // Holding still again re-renders the static depth.
    let resolution = resolve_spot(0.2, &moved);
    assert_eq!(resolution.num_shadow_maps(), 2);
    assert_eq!(cache.spot_updates_this_frame(), 1);
}

#[test]
fn update_cap_defers_new_entries() {
    let cache = ShadowCacheTable::new();
    let config = ShadowConfig {
        max_point_cache_updates_per_frame: Some(1),
        ..ShadowConfig::default()
    };
    let size = UVec2::splat(256);

    let first = cache.compute_whole_scene_shadow_cache_modes(
        LightId::new(0, 0),
        LightType::Point,
        0.0,
        &point_initializer(Vec3::ZERO),
        size,
        &config,
    );
    let second = cache.compute_whole_scene_shadow_cache_modes(
        LightId::new(1, 0),
        LightType::Rect,
        0.0,
        &point_initializer(Vec3::X),
        size,
        &config,
    );
    assert_eq!(first.num_shadow_maps(), 2);
    assert_eq!(second.cache_modes(), &[ShadowCacheMode::Uncached]);
    assert!(!cache.contains(LightId::new(1, 0)));
    assert_eq!(cache.point_updates_this_frame(), 1);
}

#[test]
fn disabled_caching_drops_the_entry() {
    let cache = ShadowCacheTable::new();
    let light = LightId::new(0, 0);
    let size = UVec2::splat(256);
    let init = point_initializer(Vec3::ZERO);

    resolve_point(&cache, light, 0.0, &init, 256, &ShadowConfig::default());
    cache.set_static_result(light, size, Some(cube_target(4, 256)), true);

    let disabled = ShadowConfig {
        cache_whole_scene_shadows: false,
        ..ShadowConfig::default()
    };
    let resolution = resolve_point(&cache, light, 0.1, &init, 256, &disabled);
    assert_eq!(resolution.cache_modes(), &[ShadowCacheMode::Uncached]);
    assert_eq!(resolution.released_target, Some(cube_target(4, 256)));
    assert!(cache.is_empty());
}

#[test]
fn stale_and_removed_entries_hand_back_their_targets() {
    let cache = ShadowCacheTable::new();
    let config = ShadowConfig::default();
    let size = UVec2::splat(256);
    let (old, fresh, removed) = (LightId::new(0, 0), LightId::new(1, 0), LightId::new(2, 0));

    for (light, time) in [(old, 0.0), (fresh, 9.0), (removed, 9.0)] {
        resolve_point(&cache, light, time, &point_initializer(Vec3::ZERO), 256, &config);
    }
    cache.set_static_result(old, size, Some(cube_target(10, 256)), true);
    cache.set_static_result(removed, size, Some(cube_target(12, 256)), true);
    assert_eq!(cache.cached_memory_bytes(), 2 * DepthTargetDesc::cube(256).memory_bytes());

    cache.remove_light(removed);
    assert_eq!(cache.take_orphaned_targets(), vec![cube_target(12, 256)]);
    assert!(cache.take_orphaned_targets().is_empty());

    let released = cache.release_stale(10.0, config.cached_shadow_release_seconds);
    assert_eq!(released, vec![cube_target(10, 256)]);
    assert!(!cache.contains(old));
    assert!(cache.contains(fresh));
    assert_eq!(cache.len(), 1);
}
