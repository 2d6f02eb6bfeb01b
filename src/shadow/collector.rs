//! Fills shadows with the primitives rendered into them.

use crate::{
    config::ShadowConfig,
    geometry::{build_light_view_frustum_convex_hull, ConvexVolume},
    scene::{
        light::LightProxy,
        primitive::{PrimitiveSceneInfo, ShadowMaterialQuery},
        scene::{LightSceneInfo, Scene},
        view::ViewInfo,
    },
    shadow::{cache::ShadowCacheMode, info::ProjectedShadowInfo, info::ShadowMeshElement},
};

/// Hulls of everything that can cast a shadow into each view. An empty list
/// means casters are not culled against views.
///
/// Cached static passes outlive the current camera, so they never get hulls.
pub fn build_caster_culling_hulls(
    light: &LightProxy,
    views: &[ViewInfo],
    cache_mode: ShadowCacheMode,
    config: &ShadowConfig,
) -> Vec<ConvexVolume> {
    if !config.use_light_view_convex_hull_culling
        || light.is_directional()
        || cache_mode == ShadowCacheMode::StaticPrimitivesOnly
    {
        return Vec::new();
    }

    let mut hulls = Vec::with_capacity(views.len());
    for view in views {
        if !view.is_perspective() || view.frustum.planes.len() < 5 {
            return Vec::new();
        }
        let hull = build_light_view_frustum_convex_hull(light.origin(), &view.frustum);
        if hull.is_empty() {
            return Vec::new();
        }
        hulls.push(hull);
    }
    hulls
}

impl ProjectedShadowInfo {
    /// Views whose screen size decides whether a caster is worth rendering.
    fn relevant_views<'v>(&self, views: &'v [ViewInfo]) -> &'v [ViewInfo] {
        match self.dependent_view {
            Some(index) if index < views.len() => &views[index..=index],
            _ => views,
        }
    }

    /// Adds `primitive` as a caster. Returns `false` when it was already
    /// present or got culled.
    pub fn add_subject_primitive(
        &mut self,
        primitive: &PrimitiveSceneInfo,
        views: &[ViewInfo],
        materials: &dyn ShadowMaterialQuery,
        config: &ShadowConfig,
    ) -> bool {
        if self.subjects.contains(&primitive.id) {
            return false;
        }
        if self.cascade_settings.is_far_shadow_cascade && !primitive.casts_far_shadow() {
            return false;
        }

        if self.is_whole_scene() {
            let radius_squared = primitive.bounds.sphere_radius * primitive.bounds.sphere_radius;
            let min_radius = config.min_screen_radius_for_shadow_caster;
            let min_radius_squared = min_radius * min_radius;
            let visible = self.relevant_views(views).iter().any(|view| {
                let distance_squared = primitive.bounds.origin.distance_squared(view.view_origin);
                let lod_squared = view.lod_distance_factor * view.lod_distance_factor;
                radius_squared >= min_radius_squared * distance_squared * lod_squared
            });
            if !visible {
                return false;
            }
        }

        self.subjects.insert(primitive.id);

        if primitive.has_static_relevance() {
            for batch in &primitive.static_meshes {
                if !batch.casts_shadow || !materials.should_cast_dynamic_shadows(batch.material) {
                    continue;
                }
                self.static_mesh_elements.push(ShadowMeshElement {
                    primitive: primitive.id,
                    section_index: batch.section_index,
                    material: batch.material,
                    depth_material: materials.shadow_depth_material(batch.material),
                });
            }
        } else {
            self.dynamic_subject_primitives.push(primitive.id);
        }
        true
    }

    /// Walks the light's interaction lists and adds every caster this shadow
    /// should render. Static passes only see the static list and movable
    /// passes only the often-moving list, so the two composite without
    /// overlap.
    pub fn add_all_casters(
        &mut self,
        scene: &Scene,
        light: &LightSceneInfo,
        views: &[ViewInfo],
        hulls: &[ConvexVolume],
        config: &ShadowConfig,
    ) {
        let static_scene_only = views.iter().any(|view| view.static_scene_only);
        let materials = scene.materials();

        let mut lists = Vec::with_capacity(2);
        if self.cache_mode != ShadowCacheMode::StaticPrimitivesOnly {
            lists.push(light.often_moving_interactions());
        }
        if self.cache_mode != ShadowCacheMode::MovablePrimitivesOnly {
            lists.push(light.static_interactions());
        }

        for list in lists {
            for interaction_id in list.iter() {
                let Some(interaction) = scene.interaction(interaction_id) else {
                    continue;
                };
                let Some(primitive) = scene.primitive(interaction.primitive) else {
                    continue;
                };

                if !interaction.has_shadow()
                    || interaction.casts_self_shadow_only()
                    || (static_scene_only && !primitive.has_static_lighting())
                {
                    continue;
                }
                if !self.caster_frustum.intersects_bounds(&primitive.bounds) {
                    continue;
                }
                let in_hull = |hull: &ConvexVolume| hull.intersects_bounds(&primitive.bounds);
                if !hulls.is_empty() && !hulls.iter().any(in_hull) {
                    continue;
                }

                self.add_subject_primitive(primitive, views, materials, config);
            }
        }
    }

    /// Caster gathering for a directional cascade: every shadow-casting
    /// primitive inside the cascade's caster frustum.
    pub fn gather_directional_casters(
        &mut self,
        scene: &Scene,
        light: &LightSceneInfo,
        views: &[ViewInfo],
        config: &ShadowConfig,
    ) {
        debug_assert!(self.directional_light, "cascade casters requested for a local light");
        self.add_all_casters(scene, light, views, &[], config);
    }
}
