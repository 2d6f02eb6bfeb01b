//! Primitives that can cast or receive shadows, and the material query the
//! caster collector uses for their mesh sections.

use std::collections::HashMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    geometry::BoxSphereBounds, scene::interaction::InteractionList, utils::allocator::PrimitiveId,
};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PrimitiveFlags: u32 {
        const CASTS_DYNAMIC_SHADOW                 = 1 << 0;
        const CASTS_STATIC_SHADOW                  = 1 << 1;
        const HAS_STATIC_LIGHTING                  = 1 << 2;
        const CASTS_SELF_SHADOW_ONLY               = 1 << 3;
        const CASTS_FAR_SHADOW                     = 1 << 4;
        const CASTS_VOLUMETRIC_TRANSLUCENT_SHADOW  = 1 << 5;
        const CASTS_INSET_SHADOW                   = 1 << 6;
        /// Mesh sections can be drawn from cached per-material draw lists.
        const STATIC_RELEVANCE                     = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mobility {
    #[default]
    Static,
    Stationary,
    Movable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct MaterialId(pub u32);

/// One drawable section of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticMeshBatch {
    pub material: MaterialId,
    pub section_index: u32,
    pub casts_shadow: bool,
}

/// Answers shadow related questions about materials without mutating them.
pub trait ShadowMaterialQuery: Send + Sync {
    fn should_cast_dynamic_shadows(&self, material: MaterialId) -> bool;

    /// Material used to render the section into a shadow depth map.
    fn shadow_depth_material(&self, material: MaterialId) -> MaterialId {
        material
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct MaterialShadowSettings {
    casts_dynamic_shadows: bool,
    depth_override: Option<MaterialId>,
}

/// In-memory material registry; unknown materials cast shadows with their own
/// depth material.
#[derive(Debug, Clone, Default)]
pub struct MaterialTable {
    materials: HashMap<MaterialId, MaterialShadowSettings>,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_casts_dynamic_shadows(&mut self, material: MaterialId, casts: bool) {
        self.materials.entry(material).or_default().casts_dynamic_shadows = casts;
    }

    /// Renders `material` with `depth_material` in shadow passes, e.g. an
    /// opaque default for materials without alpha masking.
    pub fn set_shadow_depth_material(&mut self, material: MaterialId, depth_material: MaterialId) {
        let settings = self.materials.entry(material).or_insert(MaterialShadowSettings {
            casts_dynamic_shadows: true,
            depth_override: None,
        });
        settings.depth_override = Some(depth_material);
    }
}

impl ShadowMaterialQuery for MaterialTable {
    fn should_cast_dynamic_shadows(&self, material: MaterialId) -> bool {
        self.materials
            .get(&material)
            .map(|settings| settings.casts_dynamic_shadows)
            .unwrap_or(true)
    }

    fn shadow_depth_material(&self, material: MaterialId) -> MaterialId {
        self.materials
            .get(&material)
            .and_then(|settings| settings.depth_override)
            .unwrap_or(material)
    }
}

/// Scene-side record of a primitive.
#[derive(Debug, Clone)]
pub struct PrimitiveSceneInfo {
    pub id: PrimitiveId,
    pub bounds: BoxSphereBounds,
    pub mobility: Mobility,
    pub flags: PrimitiveFlags,
    pub static_meshes: Vec<StaticMeshBatch>,
    pub(crate) interactions: InteractionList,
}

impl PrimitiveSceneInfo {
    pub fn new(bounds: BoxSphereBounds, mobility: Mobility, flags: PrimitiveFlags) -> Self {
        Self {
            id: PrimitiveId::default(),
            bounds,
            mobility,
            flags,
            static_meshes: Vec::new(),
            interactions: InteractionList::default(),
        }
    }

    pub fn with_static_mesh(mut self, batch: StaticMeshBatch) -> Self {
        self.static_meshes.push(batch);
        self
    }

    pub fn casts_dynamic_shadow(&self) -> bool {
        self.flags.contains(PrimitiveFlags::CASTS_DYNAMIC_SHADOW)
    }

    pub fn has_static_lighting(&self) -> bool {
        self.flags.contains(PrimitiveFlags::HAS_STATIC_LIGHTING)
    }

    pub fn casts_far_shadow(&self) -> bool {
        self.flags.contains(PrimitiveFlags::CASTS_FAR_SHADOW)
    }

    pub fn has_static_relevance(&self) -> bool {
        self.flags.contains(PrimitiveFlags::STATIC_RELEVANCE) && !self.static_meshes.is_empty()
    }

    /// Moving primitives without baked lighting live in the light's
    /// often-moving interaction list.
    pub fn is_often_moving(&self) -> bool {
        self.mobility == Mobility::Movable && !self.has_static_lighting()
    }

    pub fn interactions(&self) -> &InteractionList {
        &self.interactions
    }
}
