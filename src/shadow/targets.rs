//! Depth targets, the allocator and atlas interfaces they come from, and the
//! default in-memory implementations.

use std::collections::HashMap;

use glam::UVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShadowError};

/// Bytes per depth texel (32-bit float depth).
const DEPTH_TEXEL_BYTES: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthTargetKind {
    Texture2D,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthTargetDesc {
    pub kind: DepthTargetKind,
    /// Per-face size for cube targets.
    pub size: UVec2,
}

impl DepthTargetDesc {
    pub fn texture_2d(size: UVec2) -> Self {
        Self {
            kind: DepthTargetKind::Texture2D,
            size,
        }
    }

    pub fn cube(size: u32) -> Self {
        Self {
            kind: DepthTargetKind::Cube,
            size: UVec2::splat(size),
        }
    }

    pub fn memory_bytes(&self) -> u64 {
        let faces = match self.kind {
            DepthTargetKind::Texture2D => 1,
            DepthTargetKind::Cube => 6,
        };
        u64::from(self.size.x) * u64::from(self.size.y) * DEPTH_TEXEL_BYTES * faces
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepthTargetHandle(pub u64);

/// Opaque depth texture handed out by a [`DepthTargetAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthTarget {
    pub handle: DepthTargetHandle,
    pub desc: DepthTargetDesc,
}

impl DepthTarget {
    pub fn size(&self) -> UVec2 {
        self.desc.size
    }

    pub fn memory_bytes(&self) -> u64 {
        self.desc.memory_bytes()
    }
}

/// Graphics-device side of shadow setup: creates and destroys depth textures.
pub trait DepthTargetAllocator: Send {
    fn allocate(&mut self, desc: DepthTargetDesc) -> Result<DepthTarget>;
    fn release(&mut self, target: DepthTarget);

    /// Bytes currently held by live targets.
    fn allocated_bytes(&self) -> u64;

    fn name(&self) -> &str {
        "depth-target-allocator"
    }
}

/// Hands out handles and tracks memory without touching a device. An
/// optional byte budget makes allocations fail once exceeded.
#[derive(Debug, Default)]
pub struct TransientDepthTargetPool {
    next_handle: u64,
    live: HashMap<DepthTargetHandle, DepthTargetDesc>,
    allocated_bytes: u64,
    budget_bytes: Option<u64>,
}

impl TransientDepthTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(budget_bytes: u64) -> Self {
        Self {
            budget_bytes: Some(budget_bytes),
            ..Self::default()
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: DepthTargetHandle) -> bool {
        self.live.contains_key(&handle)
    }
}

impl DepthTargetAllocator for TransientDepthTargetPool {
    fn allocate(&mut self, desc: DepthTargetDesc) -> Result<DepthTarget> {
        if desc.size.x == 0 || desc.size.y == 0 {
            return Err(ShadowError::TargetAllocationFailed {
                kind: desc.kind,
                size: desc.size,
                reason: "zero-sized target".to_string(),
            });
        }

        let bytes = desc.memory_bytes();
        if let Some(budget) = self.budget_bytes {
            if self.allocated_bytes + bytes > budget {
                return Err(ShadowError::TargetAllocationFailed {
                    kind: desc.kind,
                    size: desc.size,
                    reason: format!(
                        "budget of {budget} bytes exceeded ({} in use, {bytes} requested)",
                        self.allocated_bytes
                    ),
                });
            }
        }

        let handle = DepthTargetHandle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(handle, desc);
        self.allocated_bytes += bytes;
        Ok(DepthTarget { handle, desc })
    }

    fn release(&mut self, target: DepthTarget) {
        if let Some(desc) = self.live.remove(&target.handle) {
            self.allocated_bytes -= desc.memory_bytes();
        } else {
            log::warn!("released unknown depth target {:?}", target.handle);
        }
    }

    fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    fn name(&self) -> &str {
        "transient-pool"
    }
}

/// Placement of a rectangle inside an atlas page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasAllocation {
    pub page: usize,
    pub origin: UVec2,
}

/// 2D bin packer for shadows sharing atlas pages.
pub trait AtlasPacker: Send {
    /// Forgets all placements of the previous frame.
    fn reset(&mut self);
    fn pack(&mut self, size: UVec2) -> Result<AtlasAllocation>;
    fn page_size(&self) -> UVec2;
    /// Pages used since the last reset.
    fn page_count(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct Shelf {
    y: u32,
    height: u32,
    cursor_x: u32,
}

#[derive(Debug, Clone, Default)]
struct ShelfPage {
    shelves: Vec<Shelf>,
    next_shelf_y: u32,
}

/// Shelf packer: rectangles are placed left to right on horizontal shelves,
/// opening a new shelf or page when nothing fits. Works best with input
/// sorted by decreasing height.
#[derive(Debug, Clone)]
pub struct ShelfAtlasPacker {
    page_size: u32,
    max_pages: usize,
    pages: Vec<ShelfPage>,
}

impl ShelfAtlasPacker {
    pub fn new(page_size: u32, max_pages: usize) -> Self {
        Self {
            page_size,
            max_pages,
            pages: Vec::new(),
        }
    }

    fn try_page(page: &mut ShelfPage, size: UVec2, page_size: u32) -> Option<UVec2> {
        for shelf in &mut page.shelves {
            if size.y <= shelf.height && shelf.cursor_x + size.x <= page_size {
                let origin = UVec2::new(shelf.cursor_x, shelf.y);
                shelf.cursor_x += size.x;
                return Some(origin);
            }
        }

        if page.next_shelf_y + size.y <= page_size {
            let origin = UVec2::new(0, page.next_shelf_y);
            page.shelves.push(Shelf {
                y: page.next_shelf_y,
                height: size.y,
                cursor_x: size.x,
            });
            page.next_shelf_y += size.y;
            return Some(origin);
        }
        None
    }
}

impl AtlasPacker for ShelfAtlasPacker {
    fn reset(&mut self) {
        self.pages.clear();
    }

    fn pack(&mut self, size: UVec2) -> Result<AtlasAllocation> {
        if size.x > self.page_size || size.y > self.page_size || size.x == 0 || size.y == 0 {
            return Err(ShadowError::AtlasFull { size });
        }

        for (index, page) in self.pages.iter_mut().enumerate() {
            if let Some(origin) = Self::try_page(page, size, self.page_size) {
                return Ok(AtlasAllocation { page: index, origin });
            }
        }

        if self.pages.len() >= self.max_pages {
            return Err(ShadowError::AtlasFull { size });
        }
        let mut page = ShelfPage::default();
        let origin = Self::try_page(&mut page, size, self.page_size)
            .ok_or(ShadowError::AtlasFull { size })?;
        self.pages.push(page);
        Ok(AtlasAllocation {
            page: self.pages.len() - 1,
            origin,
        })
    }

    fn page_size(&self) -> UVec2 {
        UVec2::splat(self.page_size)
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Where a shadow renders to, or reads from, this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowTarget {
    /// Region of a shared atlas page.
    Atlas {
        page: usize,
        target: DepthTarget,
        origin: UVec2,
    },
    /// A target of its own. Movable passes composite over `composite_from`,
    /// the cached static depth.
    Dedicated {
        target: DepthTarget,
        composite_from: Option<DepthTarget>,
    },
    /// The cached static depth is read as-is; nothing is rendered.
    CachedReuse { target: DepthTarget },
}

impl ShadowTarget {
    pub fn depth_target(&self) -> DepthTarget {
        match *self {
            ShadowTarget::Atlas { target, .. }
            | ShadowTarget::Dedicated { target, .. }
            | ShadowTarget::CachedReuse { target } => target,
        }
    }

    /// Whether this frame allocated fresh render space for the shadow.
    pub fn is_fresh(&self) -> bool {
        !matches!(self, ShadowTarget::CachedReuse { .. })
    }
}
