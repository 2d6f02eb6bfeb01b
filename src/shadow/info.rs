//! Per-frame shadow descriptors and the projection math that fills them.

use std::collections::HashSet;

use glam::{Mat4, UVec2, Vec3, Vec4};

use crate::{
    config::{DIRECTIONAL_DEPTH_RANGE_CLAMP, HALF_WORLD_MAX, MAX_DOWNSAMPLE_FACTOR},
    geometry::{
        projection::{
            cube_face_projection, cube_face_view_matrix, face_basis_matrix,
            shadow_projection_matrix, CUBE_FACE_COUNT,
        },
        BoxSphereBounds, ConvexVolume,
    },
    scene::primitive::MaterialId,
    shadow::{
        cache::ShadowCacheMode,
        initializer::{
            CascadeSettings, ProjectedShadowInitializer, WholeSceneProjectedShadowInitializer,
        },
        targets::{DepthTargetDesc, ShadowTarget},
    },
    utils::allocator::{LightId, PrimitiveId},
};

/// Minimum depth range of a per-object shadow.
const PER_OBJECT_DEPTH_GUARD: f32 = 1.0;

/// Reorders light space (x = light direction) into the view convention used
/// while rendering depth (z forward).
const LIGHT_TO_SHADOW_VIEW: Mat4 = Mat4::from_cols(Vec4::Z, Vec4::X, Vec4::Y, Vec4::W);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowKind {
    /// Covers every caster of the light (cube, spot or cascade).
    WholeScene,
    /// Covers a single subject primitive.
    PerObject { subject: PrimitiveId },
}

/// Mesh section rendered into a shadow with its depth material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowMeshElement {
    pub primitive: PrimitiveId,
    pub section_index: u32,
    pub material: MaterialId,
    pub depth_material: MaterialId,
}

/// One shadow depth map requested this frame.
#[derive(Debug, Clone)]
pub struct ProjectedShadowInfo {
    pub light_id: LightId,
    pub kind: ShadowKind,
    pub cache_mode: ShadowCacheMode,
    /// Rendered area, border excluded.
    pub resolution: UVec2,
    pub border: u32,
    /// View a cascade belongs to. `None` for view-independent shadows.
    pub dependent_view: Option<usize>,

    pub directional_light: bool,
    pub one_pass_point_light_shadow: bool,
    pub ray_traced_distance_field: bool,
    pub cascade_settings: CascadeSettings,
    /// Projection this shadow was built from, before texel snapping.
    pub initializer: ProjectedShadowInitializer,
    /// Translation applied to world positions before the shadow matrices.
    pub pre_shadow_translation: Vec3,

    /// World-space volume casters must intersect.
    pub caster_frustum: ConvexVolume,
    /// World-space volume receivers must intersect.
    pub receiver_frustum: ConvexVolume,
    pub subject_and_receiver_matrix: Mat4,
    pub receiver_matrix: Mat4,
    pub inv_receiver_matrix: Mat4,
    pub shadow_view_matrix: Mat4,

    pub one_pass_shadow_view_matrices: Vec<Mat4>,
    pub one_pass_shadow_view_projection_matrices: Vec<Mat4>,
    pub one_pass_shadow_frustums: Vec<ConvexVolume>,

    /// World-space sphere around everything the shadow covers.
    pub shadow_bounds: BoxSphereBounds,
    pub min_subject_z: f32,
    pub max_subject_z: f32,
    pub max_receiver_z: f32,
    pub inv_max_subject_depth: f32,

    /// Fade alpha for each view.
    pub fade_alphas: Vec<f32>,

    pub(crate) dynamic_subject_primitives: Vec<PrimitiveId>,
    pub(crate) static_mesh_elements: Vec<ShadowMeshElement>,
    pub(crate) subjects: HashSet<PrimitiveId>,

    pub target: Option<ShadowTarget>,
}

impl ProjectedShadowInfo {
    fn empty(light_id: LightId, kind: ShadowKind, cache_mode: ShadowCacheMode) -> Self {
        Self {
            light_id,
            kind,
            cache_mode,
            resolution: UVec2::ONE,
            border: 0,
            dependent_view: None,
            directional_light: false,
            one_pass_point_light_shadow: false,
            ray_traced_distance_field: false,
            cascade_settings: CascadeSettings::default(),
            initializer: ProjectedShadowInitializer::default(),
            pre_shadow_translation: Vec3::ZERO,
            caster_frustum: ConvexVolume::default(),
            receiver_frustum: ConvexVolume::default(),
            subject_and_receiver_matrix: Mat4::IDENTITY,
            receiver_matrix: Mat4::IDENTITY,
            inv_receiver_matrix: Mat4::IDENTITY,
            shadow_view_matrix: Mat4::IDENTITY,
            one_pass_shadow_view_matrices: Vec::new(),
            one_pass_shadow_view_projection_matrices: Vec::new(),
            one_pass_shadow_frustums: Vec::new(),
            shadow_bounds: BoxSphereBounds::default(),
            min_subject_z: 0.0,
            max_subject_z: 0.0,
            max_receiver_z: 0.0,
            inv_max_subject_depth: 1.0,
            fade_alphas: Vec::new(),
            dynamic_subject_primitives: Vec::new(),
            static_mesh_elements: Vec::new(),
            subjects: HashSet::new(),
            target: None,
        }
    }

    /// Whole-scene shadow with its projection already set up.
    #[allow(clippy::too_many_arguments)]
    pub fn whole_scene(
        light_id: LightId,
        directional_light: bool,
        dependent_view: Option<usize>,
        initializer: &WholeSceneProjectedShadowInitializer,
        resolution: u32,
        border: u32,
        cache_mode: ShadowCacheMode,
        fade_alphas: Vec<f32>,
    ) -> Self {
        let mut info = Self::empty(light_id, ShadowKind::WholeScene, cache_mode);
        info.fade_alphas = fade_alphas;
        info.setup_whole_scene_projection(
            directional_light,
            dependent_view,
            initializer,
            resolution,
            resolution,
            border,
        );
        info
    }

    /// Per-object shadow, or `None` when the projection is degenerate.
    pub fn per_object(
        light_id: LightId,
        subject: PrimitiveId,
        initializer: &ProjectedShadowInitializer,
        resolution: u32,
        border: u32,
        fade_alphas: Vec<f32>,
    ) -> Option<Self> {
        let kind = ShadowKind::PerObject { subject };
        let mut info = Self::empty(light_id, kind, ShadowCacheMode::Uncached);
        info.fade_alphas = fade_alphas;
        if info.setup_per_object_projection(initializer, resolution, resolution, border) {
            Some(info)
        } else {
            None
        }
    }

    /// Builds the matrices and frustums of a whole-scene shadow.
    pub fn setup_whole_scene_projection(
        &mut self,
        directional_light: bool,
        dependent_view: Option<usize>,
        whole_scene: &WholeSceneProjectedShadowInitializer,
        resolution_x: u32,
        resolution_y: u32,
        border: u32,
    ) {
        let initializer = &whole_scene.projection;
        self.directional_light = directional_light;
        self.dependent_view = dependent_view;
        self.resolution = UVec2::new(resolution_x.max(1), resolution_y.max(1));
        self.border = border;
        self.one_pass_point_light_shadow = whole_scene.one_pass_point_light_shadow;
        self.ray_traced_distance_field = whole_scene.ray_traced_distance_field;
        self.cascade_settings = whole_scene.cascade_settings;
        self.initializer = *initializer;
        self.pre_shadow_translation = initializer.pre_shadow_translation;

        let world_to_face = world_to_face_matrix(initializer);
        let subject = &initializer.subject_bounds;

        (self.min_subject_z, self.max_subject_z) =
            subject_depth_range(&world_to_face, subject, initializer.min_light_w);

        if directional_light {
            // Narrow cascades still need depth outside their own bounds.
            self.max_subject_z = self.max_subject_z.max(DIRECTIONAL_DEPTH_RANGE_CLAMP);
            self.min_subject_z = self.min_subject_z.min(-DIRECTIONAL_DEPTH_RANGE_CLAMP);
            self.pre_shadow_translation =
                snap_to_texel(&world_to_face, self.pre_shadow_translation, self.resolution);
        }

        self.shadow_bounds = BoxSphereBounds::from_sphere(
            subject.origin - initializer.pre_shadow_translation,
            subject.sphere_radius,
        );

        self.max_receiver_z = (self.min_subject_z + initializer.max_distance_to_cast_in_light_w)
            .min(HALF_WORLD_MAX)
            .max(self.max_subject_z);

        let w_axis = initializer.w_axis;
        let subject_projection =
            shadow_projection_matrix(self.min_subject_z, self.max_subject_z, w_axis);
        let receiver_projection =
            shadow_projection_matrix(self.min_subject_z, self.max_receiver_z, w_axis);
        self.subject_and_receiver_matrix = subject_projection * world_to_face;
        self.receiver_matrix = receiver_projection * world_to_face;
        self.inv_receiver_matrix = self.receiver_matrix.inverse();

        let max_subject_depth = if self.one_pass_point_light_shadow {
            subject.sphere_radius
        } else {
            // Depth of the subject's far side along the face direction, before
            // the perspective divide.
            let face_direction = initializer
                .world_to_light
                .inverse()
                .transform_vector3(initializer.face_direction);
            let far_point = subject.origin + face_direction * subject.sphere_radius;
            (self.subject_and_receiver_matrix * far_point.extend(1.0)).z
        };
        self.inv_max_subject_depth = inverse_or_one(max_subject_depth);

        self.shadow_view_matrix = LIGHT_TO_SHADOW_VIEW * initializer.world_to_light;

        let to_translated = Mat4::from_translation(self.pre_shadow_translation);
        // Directional casters may sit anywhere between the light and the
        // cascade, so the plane facing the light is left out.
        self.caster_frustum = ConvexVolume::from_view_projection(
            &(self.subject_and_receiver_matrix * to_translated),
            !directional_light,
        );
        self.receiver_frustum =
            ConvexVolume::from_view_projection(&(self.receiver_matrix * to_translated), true);

        self.one_pass_shadow_view_matrices.clear();
        self.one_pass_shadow_view_projection_matrices.clear();
        self.one_pass_shadow_frustums.clear();
        if self.one_pass_point_light_shadow {
            self.setup_cube_faces(initializer, to_translated);
        }

        debug_assert!(
            self.max_subject_z > self.min_subject_z,
            "shadow depth range collapsed: {} <= {}",
            self.max_subject_z,
            self.min_subject_z
        );
    }

    fn setup_cube_faces(&mut self, initializer: &ProjectedShadowInitializer, to_translated: Mat4) {
        let face_projection = cube_face_projection(initializer.max_distance_to_cast_in_light_w);
        let scale = Mat4::from_scale(initializer.scales);
        let mut far_planes = Vec::with_capacity(CUBE_FACE_COUNT);

        for face in 0..CUBE_FACE_COUNT {
            let view = cube_face_view_matrix(face);
            let view_projection = face_projection * view * scale;
            let frustum =
                ConvexVolume::from_view_projection(&(view_projection * to_translated), false);
            // The side planes are covered by the light radius test.
            if let Some(far) = frustum.planes.last() {
                far_planes.push(*far);
            }
            self.one_pass_shadow_view_matrices.push(view);
            self.one_pass_shadow_view_projection_matrices.push(view_projection);
            self.one_pass_shadow_frustums.push(frustum);
        }

        self.caster_frustum = ConvexVolume::new(far_planes);
    }

    /// Fits the projection around a single subject. Returns `false` when the
    /// light transform cannot be inverted and the shadow must be skipped.
    pub fn setup_per_object_projection(
        &mut self,
        initializer: &ProjectedShadowInitializer,
        resolution_x: u32,
        resolution_y: u32,
        border: u32,
    ) -> bool {
        self.resolution = UVec2::new(resolution_x.max(1), resolution_y.max(1));
        self.border = border;
        self.initializer = *initializer;
        self.pre_shadow_translation = initializer.pre_shadow_translation;

        let world_to_face = world_to_face_matrix(initializer);
        let determinant = world_to_face.determinant();
        if !determinant.is_finite() || determinant.abs() <= f32::EPSILON {
            return false;
        }

        let subject = &initializer.subject_bounds;
        (self.min_subject_z, self.max_subject_z) =
            subject_depth_range(&world_to_face, subject, initializer.min_light_w);
        self.max_subject_z = self.max_subject_z.max(self.min_subject_z + PER_OBJECT_DEPTH_GUARD);

        // Projected footprint of the subject box in face space.
        let w_axis = initializer.w_axis;
        let projection = shadow_projection_matrix(self.min_subject_z, self.max_subject_z, w_axis);
        let mut extent = 0.0_f32;
        for corner in subject.corners() {
            let clip = projection * world_to_face * corner.extend(1.0);
            if clip.w <= 0.0 {
                continue;
            }
            extent = extent.max((clip.x / clip.w).abs()).max((clip.y / clip.w).abs());
        }
        if !extent.is_finite() || extent <= 0.0 {
            return false;
        }
        let fit = Mat4::from_scale(Vec3::new(1.0 / extent, 1.0 / extent, 1.0));

        self.max_receiver_z = (self.min_subject_z + initializer.max_distance_to_cast_in_light_w)
            .min(HALF_WORLD_MAX)
            .max(self.max_subject_z);

        self.subject_and_receiver_matrix = fit * projection * world_to_face;
        let receiver_projection =
            shadow_projection_matrix(self.min_subject_z, self.max_receiver_z, w_axis);
        self.receiver_matrix = fit * receiver_projection * world_to_face;
        self.inv_receiver_matrix = self.receiver_matrix.inverse();
        self.inv_max_subject_depth = inverse_or_one(self.max_subject_z - self.min_subject_z);
        self.shadow_view_matrix = LIGHT_TO_SHADOW_VIEW * initializer.world_to_light;
        self.shadow_bounds = subject.translated(-initializer.pre_shadow_translation);

        let to_translated = Mat4::from_translation(self.pre_shadow_translation);
        let caster_view_projection = self.subject_and_receiver_matrix * to_translated;
        self.caster_frustum = ConvexVolume::from_view_projection(&caster_view_projection, true);
        self.receiver_frustum =
            ConvexVolume::from_view_projection(&(self.receiver_matrix * to_translated), true);
        true
    }

    pub fn is_whole_scene(&self) -> bool {
        self.kind == ShadowKind::WholeScene
    }

    pub fn is_per_object(&self) -> bool {
        matches!(self.kind, ShadowKind::PerObject { .. })
    }

    pub fn is_cascade(&self) -> bool {
        self.directional_light && self.cascade_settings.shadow_split_index.is_some()
    }

    pub fn has_subject_prims(&self) -> bool {
        !self.dynamic_subject_primitives.is_empty() || !self.static_mesh_elements.is_empty()
    }

    pub fn dynamic_subject_primitives(&self) -> &[PrimitiveId] {
        &self.dynamic_subject_primitives
    }

    pub fn static_mesh_elements(&self) -> &[ShadowMeshElement] {
        &self.static_mesh_elements
    }

    pub fn max_fade_alpha(&self) -> f32 {
        self.fade_alphas.iter().copied().fold(0.0, f32::max)
    }

    /// Size of the area reserved in a depth target, border included.
    pub fn allocation_size(&self) -> UVec2 {
        self.resolution + UVec2::splat(2 * self.border)
    }

    /// Depth target this shadow needs when it is not packed into an atlas.
    pub fn target_desc(&self) -> DepthTargetDesc {
        if self.one_pass_point_light_shadow {
            DepthTargetDesc::cube(self.resolution.x)
        } else {
            DepthTargetDesc::texture_2d(self.allocation_size())
        }
    }
}

/// Shadows of one light, in the order they were set up.
#[derive(Debug, Clone)]
pub struct VisibleLightShadows {
    pub light_id: LightId,
    pub shadows: Vec<ProjectedShadowInfo>,
}

/// World (translated) to face space: light rotation, then scales, then the
/// face basis.
pub fn world_to_face_matrix(initializer: &ProjectedShadowInitializer) -> Mat4 {
    face_basis_matrix(initializer.face_direction)
        * Mat4::from_scale(initializer.scales)
        * initializer.world_to_light
}

/// `(min_z, max_z)` of the subject sphere in face space, with the near side
/// clamped to `min_light_w`.
fn subject_depth_range(
    world_to_face: &Mat4,
    subject: &BoxSphereBounds,
    min_light_w: f32,
) -> (f32, f32) {
    let max_z = world_to_face.transform_point3(subject.origin).z + subject.sphere_radius;
    let min_z = (max_z - subject.sphere_radius * 2.0).max(min_light_w);
    (min_z, max_z)
}

/// Moves the shadow origin onto the shadow texel grid so camera motion does
/// not make the shadow shimmer. Snapping happens in normalized face space, in
/// units of `MAX_DOWNSAMPLE_FACTOR` texels.
fn snap_to_texel(world_to_face: &Mat4, pre_shadow_translation: Vec3, resolution: UVec2) -> Vec3 {
    let face_position = world_to_face.transform_point3(-pre_shadow_translation);
    let snap_x = face_position.x % (2.0 * MAX_DOWNSAMPLE_FACTOR / resolution.x as f32);
    let snap_y = face_position.y % (2.0 * MAX_DOWNSAMPLE_FACTOR / resolution.y as f32);
    let snapped_face = face_position - Vec3::new(snap_x, snap_y, 0.0);
    let snapped_world = world_to_face.inverse().transform_point3(snapped_face);
    -snapped_world
}

fn inverse_or_one(depth: f32) -> f32 {
    if depth.is_finite() && depth.abs() > f32::EPSILON {
        1.0 / depth
    } else {
        1.0
    }
}
