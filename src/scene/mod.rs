//! Scene-side inputs of shadow setup: lights, primitives, their interactions
//! and the camera views a frame is rendered from.

pub mod interaction;
pub mod light;
pub mod primitive;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod view;

pub use interaction::{
    InteractionFlags, InteractionList, LightInteractionList, LightPrimitiveInteraction,
};
pub use light::{DirectionalLightParams, LightFlags, LightKind, LightProxy, LightType};
pub use primitive::{
    MaterialId, MaterialTable, Mobility, PrimitiveFlags, PrimitiveSceneInfo, ShadowMaterialQuery,
    StaticMeshBatch,
};
pub use scene::{LightSceneInfo, Scene};
pub use view::ViewInfo;
