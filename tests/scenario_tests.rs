use penumbra::{
    shadow::{ShadowKind, ShelfAtlasPacker, TransientDepthTargetPool},
    BoxSphereBounds, DirectionalLightParams, FrameShadows, LightFlags, LightId, LightProxy,
    Mobility, PrimitiveFlags, PrimitiveSceneInfo, Scene, ShadowCacheMode, ShadowConfig,
    ShadowSetup, ShadowTarget, ShadowTargetAllocator, UVec2, Vec3, ViewInfo,
};

const FRAME: f64 = 1.0 / 60.0;

fn camera(eye: Vec3) -> ViewInfo {
    ViewInfo::perspective(eye, Vec3::ZERO, Vec3::Y, 1.0, UVec2::new(1280, 720), 0.1)
}

fn static_sphere(center: Vec3, radius: f32) -> PrimitiveSceneInfo {
    PrimitiveSceneInfo::new(
        BoxSphereBounds::from_sphere(center, radius),
        Mobility::Static,
        PrimitiveFlags::CASTS_DYNAMIC_SHADOW | PrimitiveFlags::HAS_STATIC_LIGHTING,
    )
}

fn movable_sphere(center: Vec3, radius: f32) -> PrimitiveSceneInfo {
    PrimitiveSceneInfo::new(
        BoxSphereBounds::from_sphere(center, radius),
        Mobility::Movable,
        PrimitiveFlags::CASTS_DYNAMIC_SHADOW,
    )
}

#[test]
fn point_light_first_frame_with_static_caster() {
    let mut scene = Scene::new();
    let light = scene.add_light(LightProxy::point(Vec3::ZERO, 500.0));
    let sphere = scene.add_primitive(static_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
    let mut setup = ShadowSetup::new(ShadowConfig::default());

    let frame = setup.run(&scene, &[camera(Vec3::new(0.0, 0.0, 10.0))], 0.0);
    let shadows = frame.shadows_for(light);
    assert_eq!(shadows.len(), 2);

    let static_pass = &shadows[0];
    assert_eq!(static_pass.cache_mode, ShadowCacheMode::StaticPrimitivesOnly);
    assert_eq!(static_pass.dynamic_subject_primitives(), &[sphere]);
    let Some(ShadowTarget::Dedicated { target, composite_from: None }) = static_pass.target else {
        panic!("static pass should own a dedicated target: {:?}", static_pass.target);
    };

    let movable_pass = &shadows[1];
    assert_eq!(movable_pass.cache_mode, ShadowCacheMode::MovablePrimitivesOnly);
    assert!(!movable_pass.has_subject_prims());
    assert_eq!(movable_pass.target, Some(ShadowTarget::CachedReuse { target }));

    let entry = scene.cached_shadow_maps().entry(light).unwrap();
    assert!(entry.has_primitives);
    assert_eq!(entry.shadow_map.unwrap().target, Some(target));
    let proxy = &scene.light(light).unwrap().proxy;
    assert_eq!(entry.initializer, penumbra::shadow::whole_scene_initializer(proxy).unwrap());
    assert_eq!(frame.point_cache_updates, 1);
    assert_eq!(setup.stats().point_cache_updates, 1);
    assert_eq!(setup.stats().whole_scene_shadows, 2);
}

#[test]
fn point_light_first_frame_without_casters() {
    let mut scene = Scene::new();
    let light = scene.add_light(LightProxy::point(Vec3::ZERO, 500.0));
    let mut setup = ShadowSetup::new(ShadowConfig::default());

    let frame = setup.run(&scene, &[camera(Vec3::new(0.0, 0.0, 10.0))], 0.0);
    let shadows = frame.shadows_for(light);
    assert_eq!(shadows.len(), 1);
    assert_eq!(shadows[0].cache_mode, ShadowCacheMode::MovablePrimitivesOnly);
    assert!(matches!(
        shadows[0].target,
        Some(ShadowTarget::Dedicated { composite_from: None, .. })
    ));

    let entry = scene.cached_shadow_maps().entry(light).unwrap();
    assert!(!entry.has_primitives);
    assert!(entry.shadow_map.unwrap().target.is_none());
    assert_eq!(frame.point_cache_updates, 1);
    assert_eq!(setup.stats().targets_allocated, 1);
}

#[test]
fn second_frame_with_moved_camera_renders_only_movable_casters() {
    let mut scene = Scene::new();
    let light = scene.add_light(LightProxy::point(Vec3::ZERO, 500.0));
    scene.add_primitive(static_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
    let mover = scene.add_primitive(movable_sphere(Vec3::new(3.0, 0.0, -5.0), 1.0));
    let mut setup = ShadowSetup::new(ShadowConfig::default());

    let first = setup.run(&scene, &[camera(Vec3::new(0.0, 0.0, 10.0))], 0.0);
    assert_eq!(first.shadows_for(light).len(), 2);
    let cached = scene.cached_shadow_maps().cached_target(light).unwrap();

    let second = setup.run(&scene, &[camera(Vec3::new(4.0, 1.0, 12.0))], FRAME);
    let shadows = second.shadows_for(light);
    assert_eq!(shadows.len(), 1);
    assert_eq!(shadows[0].cache_mode, ShadowCacheMode::MovablePrimitivesOnly);
    assert_eq!(shadows[0].dynamic_subject_primitives(), &[mover]);
    assert!(matches!(
        shadows[0].target,
        Some(ShadowTarget::Dedicated { composite_from: Some(from), .. }) if from == cached
    ));
    assert_eq!(second.point_cache_updates, 0);
    assert_eq!(scene.cached_shadow_maps().cached_target(light), Some(cached));
}

fn cache_modes(frame: &FrameShadows, light: LightId) -> Vec<ShadowCacheMode> {
    frame.shadows_for(light).iter().map(|shadow| shadow.cache_mode).collect()
}

#[test]
fn changing_static_casters_rerenders_the_cached_depth() {
    let mut scene = Scene::new();
    let light = scene.add_light(LightProxy::point(Vec3::ZERO, 500.0));
    let mut setup = ShadowSetup::new(ShadowConfig::default());
    let views = [camera(Vec3::new(0.0, 0.0, 10.0))];
    let both = vec![ShadowCacheMode::StaticPrimitivesOnly, ShadowCacheMode::MovablePrimitivesOnly];

    // The empty static pass is cached without a target.
    let frame = setup.run(&scene, &views, 0.0);
    assert_eq!(cache_modes(&frame, light), vec![ShadowCacheMode::MovablePrimitivesOnly]);

    let sphere = scene.add_primitive(static_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
    let frame = setup.run(&scene, &views, FRAME);
    assert_eq!(cache_modes(&frame, light), both);
    assert_eq!(frame.shadows_for(light)[0].dynamic_subject_primitives(), &[sphere]);
    assert_eq!(frame.point_cache_updates, 1);
    let first_target = scene.cached_shadow_maps().cached_target(light).unwrap();

    let frame = setup.run(&scene, &views, 2.0 * FRAME);
    assert_eq!(cache_modes(&frame, light), vec![ShadowCacheMode::MovablePrimitivesOnly]);

    scene.update_primitive(
        sphere,
        BoxSphereBounds::from_sphere(Vec3::new(2.0, 0.0, -5.0), 1.0),
        PrimitiveFlags::CASTS_DYNAMIC_SHADOW | PrimitiveFlags::HAS_STATIC_LIGHTING,
    );
    assert!(scene.cached_shadow_maps().cached_target(light).is_none());
    let frame = setup.run(&scene, &views, 3.0 * FRAME);
    assert_eq!(cache_modes(&frame, light), both);
    assert_eq!(frame.shadows_for(light)[0].dynamic_subject_primitives(), &[sphere]);
    assert_ne!(scene.cached_shadow_maps().cached_target(light), Some(first_target));

    scene.remove_primitive(sphere);
    let frame = setup.run(&scene, &views, 4.0 * FRAME);
    assert_eq!(cache_modes(&frame, light), vec![ShadowCacheMode::MovablePrimitivesOnly]);
    assert!(scene.cached_shadow_maps().cached_target(light).is_none());
    assert!(!scene.cached_shadow_maps().entry(light).unwrap().has_primitives);
}

#[test]
fn moving_the_light_falls_back_to_an_uncached_pass() {
    let mut scene = Scene::new();
    let light = scene.add_light(LightProxy::point(Vec3::ZERO, 500.0));
    scene.add_primitive(static_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
    let mut setup = ShadowSetup::new(ShadowConfig::default());
    let views = [camera(Vec3::new(0.0, 0.0, 10.0))];

    setup.run(&scene, &views, 0.0);
    let live_after_first = setup.allocator().device().allocated_bytes();
    assert!(live_after_first > 0);

    scene.set_light_transform(light, Vec3::new(1.0, 0.0, 0.0), Vec3::X);
    let frame = setup.run(&scene, &views, FRAME);
    let shadows = frame.shadows_for(light);
    assert_eq!(shadows.len(), 1);
    assert_eq!(shadows[0].cache_mode, ShadowCacheMode::Uncached);
    assert_eq!(scene.cached_shadow_maps().cached_target(light), None);
    assert_eq!(frame.point_cache_updates, 0);
}

#[test]
fn stale_cache_entries_are_released() {
    let mut scene = Scene::new();
    let light = scene.add_light(LightProxy::point(Vec3::ZERO, 500.0));
    scene.add_primitive(static_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
    let mut setup = ShadowSetup::new(ShadowConfig::default());

    setup.run(&scene, &[camera(Vec3::new(0.0, 0.0, 10.0))], 0.0);
    assert!(scene.cached_shadow_maps().contains(light));

    // Far enough that the light fades out and stops refreshing its entry.
    setup.run(&scene, &[camera(Vec3::new(0.0, 0.0, 1.0e6))], 10.0);
    assert!(!scene.cached_shadow_maps().contains(light));
    assert_eq!(setup.allocator().device().allocated_bytes(), 0);
}

#[test]
fn directional_light_renders_one_shadow_per_cascade() {
    let mut scene = Scene::new();
    let params = DirectionalLightParams::default();
    let light = scene.add_light(LightProxy::directional(Vec3::new(0.3, -1.0, 0.2), params));
    let caster = scene.add_primitive(movable_sphere(Vec3::ZERO, 1.0));
    let mut setup = ShadowSetup::new(ShadowConfig::default());

    let frame = setup.run(&scene, &[camera(Vec3::new(0.0, 0.0, 10.0))], 0.0);
    let shadows = frame.shadows_for(light);
    assert_eq!(shadows.len(), params.num_cascades as usize);
    assert!(shadows.iter().all(|shadow| shadow.is_cascade() && shadow.directional_light));
    assert!(shadows.iter().all(|shadow| shadow.cache_mode == ShadowCacheMode::Uncached));
    assert!(shadows.iter().all(|shadow| matches!(shadow.target, Some(ShadowTarget::Atlas { .. }))));
    assert!(shadows
        .iter()
        .any(|shadow| shadow.dynamic_subject_primitives().contains(&caster)));
    assert_eq!(setup.stats().cascade_shadows, shadows.len());
    assert!(scene.cached_shadow_maps().is_empty());
}

#[test]
fn far_cascades_only_admit_far_shadow_casters() {
    let mut scene = Scene::new();
    let params = DirectionalLightParams {
        dynamic_shadow_distance: 50.0,
        num_cascades: 1,
        far_shadow_cascade_count: 1,
        far_shadow_distance: 2000.0,
        ..DirectionalLightParams::default()
    };
    let light = scene.add_light(LightProxy::directional(Vec3::new(0.3, -1.0, 0.2), params));
    let regular = scene.add_primitive(movable_sphere(Vec3::new(-30.0, 0.0, -500.0), 20.0));
    let far_caster = scene.add_primitive(PrimitiveSceneInfo::new(
        BoxSphereBounds::from_sphere(Vec3::new(30.0, 0.0, -500.0), 20.0),
        Mobility::Movable,
        PrimitiveFlags::CASTS_DYNAMIC_SHADOW | PrimitiveFlags::CASTS_FAR_SHADOW,
    ));
    let mut setup = ShadowSetup::new(ShadowConfig::default());

    let frame = setup.run(&scene, &[camera(Vec3::new(0.0, 0.0, 10.0))], 0.0);
    let shadows = frame.shadows_for(light);
    assert_eq!(shadows.len(), 2);

    let far_cascades: Vec<_> = shadows
        .iter()
        .filter(|shadow| shadow.cascade_settings.is_far_shadow_cascade)
        .collect();
    assert_eq!(far_cascades.len(), 1);
    assert_eq!(far_cascades[0].dynamic_subject_primitives(), &[far_caster]);
    assert!(!far_cascades[0].dynamic_subject_primitives().contains(&regular));
}

#[test]
fn stationary_light_gets_per_object_shadows_for_movable_casters() {
    let mut scene = Scene::new();
    let stationary = LightProxy::point(Vec3::new(0.0, 50.0, 0.0), 500.0)
        .with_flags(LightFlags::CASTS_DYNAMIC_SHADOW | LightFlags::HAS_STATIC_SHADOWING);
    let light = scene.add_light(stationary);
    scene.add_primitive(static_sphere(Vec3::new(5.0, 0.0, 0.0), 2.0));
    let mover = scene.add_primitive(movable_sphere(Vec3::ZERO, 2.0));
    let mut setup = ShadowSetup::new(ShadowConfig::default());

    let frame = setup.run(&scene, &[camera(Vec3::new(0.0, 0.0, 10.0))], 0.0);
    let shadows = frame.shadows_for(light);
    assert_eq!(shadows.len(), 1);
    assert_eq!(shadows[0].kind, ShadowKind::PerObject { subject: mover });
    assert_eq!(shadows[0].dynamic_subject_primitives(), &[mover]);
    assert!(matches!(shadows[0].target, Some(ShadowTarget::Atlas { .. })));
    assert_eq!(setup.stats().per_object_shadows, 1);
    assert!(scene.cached_shadow_maps().is_empty());
}

#[test]
fn fully_baked_lights_render_nothing() {
    let mut scene = Scene::new();
    let baked = LightProxy::point(Vec3::ZERO, 500.0)
        .with_flags(LightFlags::CASTS_DYNAMIC_SHADOW | LightFlags::HAS_STATIC_LIGHTING);
    scene.add_light(baked);
    scene.add_light(LightProxy::point(Vec3::X, 500.0).with_flags(LightFlags::empty()));
    scene.add_primitive(movable_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
    let mut setup = ShadowSetup::default();

    let frame = setup.run(&scene, &[camera(Vec3::new(0.0, 0.0, 10.0))], 0.0);
    assert_eq!(frame.shadow_count(), 0);
    assert!(frame.lights.is_empty());
    assert_eq!(setup.stats().lights_processed, 2);
}

#[test]
fn atlas_failure_drops_only_that_shadow() {
    let mut scene = Scene::new();
    let spot_proxy = LightProxy::spot(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z, 400.0, 0.3, 0.5);
    let spot = scene.add_light(spot_proxy);
    let point = scene.add_light(LightProxy::point(Vec3::ZERO, 500.0));
    scene.add_primitive(movable_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));

    let config = ShadowConfig {
        cache_whole_scene_shadows: false,
        max_shadow_atlas_pages: 0,
        ..ShadowConfig::default()
    };
    let allocator = ShadowTargetAllocator::new(
        TransientDepthTargetPool::new(),
        ShelfAtlasPacker::new(config.shadow_buffer_resolution, 0),
    );
    let mut setup = ShadowSetup::new(config).with_allocator(allocator);

    let frame = setup.run(&scene, &[camera(Vec3::new(0.0, 0.0, 10.0))], 0.0);
    assert_eq!(frame.dropped, 1);
    assert!(frame.shadows_for(spot).is_empty());
    let cube = frame.shadows_for(point);
    assert_eq!(cube.len(), 1);
    assert!(cube[0].one_pass_point_light_shadow);
    assert!(matches!(cube[0].target, Some(ShadowTarget::Dedicated { .. })));
    assert_eq!(setup.stats().shadows_dropped, 1);
}

#[test]
fn removed_light_releases_its_cached_target_next_frame() {
    let mut scene = Scene::new();
    let light = scene.add_light(LightProxy::point(Vec3::ZERO, 500.0));
    scene.add_primitive(static_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
    let mut setup = ShadowSetup::new(ShadowConfig::default());
    let views = [camera(Vec3::new(0.0, 0.0, 10.0))];

    setup.run(&scene, &views, 0.0);
    assert!(setup.allocator().device().allocated_bytes() > 0);

    scene.remove_light(light);
    let frame = setup.run(&scene, &views, FRAME);
    assert_eq!(frame.shadow_count(), 0);
    assert_eq!(setup.allocator().device().allocated_bytes(), 0);
}
