//! Penumbra – shadow map setup for real-time renderers.
//!
//! Each frame [`ShadowSetup::run`] decides which shadow depth maps the lights
//! of a [`Scene`] need, picks their resolution, gathers the primitives cast
//! into them and assigns depth targets. Whole-scene shadows of point and spot
//! lights are cached across frames so only movable casters are re-rendered
//! while the light and its static casters hold still.

pub mod config;
pub mod error;
pub mod geometry;
pub mod scene;
pub mod shadow;
pub mod utils;

pub use glam::{Mat4, UVec2, Vec3, Vec4};

pub use config::ShadowConfig;
pub use error::{Result, ShadowError};
pub use geometry::{BoxSphereBounds, ConvexVolume, Plane};
pub use scene::{
    DirectionalLightParams, LightFlags, LightProxy, LightType, MaterialId, MaterialTable, Mobility,
    PrimitiveFlags, PrimitiveSceneInfo, Scene, ShadowMaterialQuery, StaticMeshBatch, ViewInfo,
};
pub use shadow::{
    FrameShadows, ProjectedShadowInfo, ShadowCacheMode, ShadowSetup, ShadowTarget,
    ShadowTargetAllocator, VisibleLightShadows,
};
pub use utils::allocator::{InteractionId, LightId, PrimitiveId};
pub use utils::profiling::ShadowSetupStats;
