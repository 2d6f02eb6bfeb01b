//! Planes, bounds and convex volumes used for shadow caster culling.

pub mod bounds;
pub mod convex;
pub mod plane;
pub mod projection;

pub use bounds::{sphere_intersects_sphere, BoxSphereBounds};
pub use convex::{build_light_view_frustum_convex_hull, ConvexVolume};
pub use plane::Plane;
