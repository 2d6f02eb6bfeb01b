//! Shadow setup: per-light shadow decisions, caster gathering, the static
//! shadow cache and depth target assignment.

pub mod allocator;
pub mod cache;
pub mod collector;
pub mod info;
pub mod initializer;
pub mod resolution;
pub mod setup;
pub mod targets;

pub use allocator::{AllocationStats, ShadowTargetAllocator};
pub use cache::{
    CacheModeResolution, CachedShadowMap, CachedShadowMapData, ShadowCacheMode, ShadowCacheTable,
};
pub use collector::build_caster_culling_hulls;
pub use info::{ProjectedShadowInfo, ShadowKind, ShadowMeshElement, VisibleLightShadows};
pub use initializer::{
    directional_cascade_initializers, per_object_initializer, whole_scene_initializer,
    CascadeSettings, ProjectedShadowInitializer, WholeSceneProjectedShadowInitializer,
};
pub use resolution::{
    calculate_shadow_fade_alpha, round_down_to_shadow_resolution, ShadowResolution,
};
pub use setup::{FrameShadows, ShadowSetup};
pub use targets::{
    AtlasAllocation, AtlasPacker, DepthTarget, DepthTargetAllocator, DepthTargetDesc,
    DepthTargetHandle, DepthTargetKind, ShadowTarget, ShelfAtlasPacker, TransientDepthTargetPool,
};
