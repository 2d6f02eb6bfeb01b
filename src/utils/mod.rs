//! Utility helpers including math extensions, id allocators, logging, and profiling.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;

pub use allocator::{Arena, GenerationalId, InteractionId, LightId, PrimitiveId};
pub use math::*;
pub use profiling::ShadowSetupStats;
