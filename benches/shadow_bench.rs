use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use penumbra::{
    geometry::build_light_view_frustum_convex_hull, BoxSphereBounds, LightProxy, Mobility,
    PrimitiveFlags, PrimitiveSceneInfo, Scene, ShadowConfig, ShadowSetup, UVec2, Vec3, ViewInfo,
};
use std::hint::black_box;

const FRAME: f64 = 1.0 / 60.0;

fn camera() -> ViewInfo {
    ViewInfo::perspective(
        Vec3::new(0.0, 30.0, 60.0),
        Vec3::new(0.0, 0.0, -40.0),
        Vec3::Y,
        1.2,
        UVec2::new(1920, 1080),
        0.1,
    )
}

fn prepare_scene(light_count: usize, primitive_count: usize) -> Scene {
    let mut scene = Scene::new();
    let side = (primitive_count as f32).sqrt().ceil() as usize;
    for i in 0..primitive_count {
        let x = (i % side) as f32 * 6.0 - side as f32 * 3.0;
        let z = -((i / side) as f32 * 6.0);
        let (mobility, flags) = if i % 4 == 0 {
            (Mobility::Movable, PrimitiveFlags::CASTS_DYNAMIC_SHADOW)
        } else {
            (
                Mobility::Static,
                PrimitiveFlags::CASTS_DYNAMIC_SHADOW | PrimitiveFlags::HAS_STATIC_LIGHTING,
            )
        };
        scene.add_primitive(PrimitiveSceneInfo::new(
            BoxSphereBounds::from_sphere(Vec3::new(x, 1.0, z), 1.5),
            mobility,
            flags,
        ));
    }
    for i in 0..light_count {
        let x = (i % 8) as f32 * 20.0 - 80.0;
        let z = -((i / 8) as f32 * 20.0);
        if i % 2 == 0 {
            scene.add_light(LightProxy::point(Vec3::new(x, 8.0, z), 60.0));
        } else {
            scene.add_light(LightProxy::spot(Vec3::new(x, 25.0, z), Vec3::NEG_Y, 80.0, 0.4, 0.7));
        }
    }
    scene
}

fn bench_hull_culling(c: &mut Criterion) {
    let view = camera();
    let light = Vec3::new(150.0, 40.0, -30.0);
    let hull = build_light_view_frustum_convex_hull(light, &view.frustum);
    let boxes: Vec<BoxSphereBounds> = (0..4096)
        .map(|i| {
            let x = (i % 64) as f32 * 5.0 - 160.0;
            let z = -((i / 64) as f32 * 5.0);
            BoxSphereBounds::from_box(Vec3::new(x, 0.0, z), Vec3::splat(1.0))
        })
        .collect();

    let mut group = c.benchmark_group("light_view_hull");
    group.bench_function("build", |b| {
        b.iter(|| build_light_view_frustum_convex_hull(black_box(light), black_box(&view.frustum)))
    });
    group.bench_function("cull_4096_boxes", |b| {
        b.iter(|| {
            boxes
                .iter()
                .filter(|bounds| hull.intersects_bounds(black_box(bounds)))
                .count()
        })
    });
    group.finish();
}

fn bench_frame_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("shadow_setup");
    for &(lights, primitives) in &[(8usize, 256usize), (32, 1024), (64, 4096)] {
        let scene = prepare_scene(lights, primitives);
        let views = [camera()];
        let label = format!("{lights}x{primitives}");

        group.bench_with_input(BenchmarkId::new("sequential", &label), &scene, |b, scene| {
            let mut setup = ShadowSetup::new(ShadowConfig::default());
            setup.set_parallel_enabled(false);
            let mut time = 0.0;
            b.iter(|| {
                time += FRAME;
                black_box(setup.run(scene, &views, time))
            })
        });
        group.bench_with_input(BenchmarkId::new("parallel", &label), &scene, |b, scene| {
            let mut setup = ShadowSetup::new(ShadowConfig::default());
            setup.set_parallel_enabled(true);
            let mut time = 0.0;
            b.iter(|| {
                time += FRAME;
                black_box(setup.run(scene, &views, time))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_hull_culling, bench_frame_setup);
criterion_main!(benches);
