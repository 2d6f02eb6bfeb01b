//! Error types for shadow setup.
//!
//! Only resource exhaustion is reported through [`ShadowError`]; precondition
//! violations are debug assertions and degenerate geometry is clamped.

use glam::UVec2;
use thiserror::Error;

use crate::shadow::targets::DepthTargetKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShadowError {
    /// The allocator could not provide a depth target.
    #[error("failed to allocate {kind:?} depth target of {}x{}: {reason}", size.x, size.y)]
    TargetAllocationFailed {
        kind: DepthTargetKind,
        size: UVec2,
        reason: String,
    },
    /// No atlas page had room for the requested rectangle.
    #[error("shadow atlas has no room for a {}x{} region", size.x, size.y)]
    AtlasFull { size: UVec2 },
}

/// Convenient Result type alias for shadow setup operations.
pub type Result<T> = std::result::Result<T, ShadowError>;
