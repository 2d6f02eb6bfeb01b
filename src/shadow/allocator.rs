//! Assigns depth targets to the shadows of a frame.

use glam::UVec2;

use crate::{
    config::ShadowConfig,
    shadow::{
        cache::{ShadowCacheMode, ShadowCacheTable},
        info::{ProjectedShadowInfo, VisibleLightShadows},
        targets::{
            AtlasPacker, DepthTarget, DepthTargetAllocator, DepthTargetDesc, ShadowTarget,
            ShelfAtlasPacker, TransientDepthTargetPool,
        },
    },
};

/// Counters of one allocation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocationStats {
    pub targets_allocated: usize,
    pub atlas_pages: usize,
    /// Shadows removed because no space could be found.
    pub dropped: usize,
    /// Empty static passes that were recorded in the cache but not rendered.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Keep,
    Skip,
    Drop,
}

struct AtlasRequest {
    light: usize,
    shadow: usize,
    size: UVec2,
}

/// Owns the device allocator and atlas packer used for shadow depth.
///
/// Atlas pages and every target not held by the shadow cache are transient:
/// they live until the start of the next frame.
pub struct ShadowTargetAllocator {
    device: Box<dyn DepthTargetAllocator>,
    packer: Box<dyn AtlasPacker>,
    transient: Vec<DepthTarget>,
}

impl ShadowTargetAllocator {
    pub fn new<D, P>(device: D, packer: P) -> Self
    where
        D: DepthTargetAllocator + 'static,
        P: AtlasPacker + 'static,
    {
        Self {
            device: Box::new(device),
            packer: Box::new(packer),
            transient: Vec::new(),
        }
    }

    /// In-memory pool with atlas pages of `shadow_buffer_resolution`.
    pub fn from_config(config: &ShadowConfig) -> Self {
        Self::new(
            TransientDepthTargetPool::new(),
            ShelfAtlasPacker::new(
                config.shadow_buffer_resolution,
                config.max_shadow_atlas_pages as usize,
            ),
        )
    }

    pub fn device(&self) -> &dyn DepthTargetAllocator {
        self.device.as_ref()
    }

    pub fn transient_count(&self) -> usize {
        self.transient.len()
    }

    /// Releases last frame's transient targets.
    pub fn begin_frame(&mut self) {
        for target in std::mem::take(&mut self.transient) {
            self.device.release(target);
        }
        self.packer.reset();
    }

    pub fn release(&mut self, target: DepthTarget) {
        self.device.release(target);
    }

    pub fn release_all(&mut self, targets: impl IntoIterator<Item = DepthTarget>) {
        for target in targets {
            self.device.release(target);
        }
    }

    fn allocate_transient(&mut self, desc: DepthTargetDesc) -> crate::error::Result<DepthTarget> {
        let target = self.device.allocate(desc)?;
        self.transient.push(target);
        Ok(target)
    }

    /// Gives every shadow a target. Shadows that cannot be placed are
    /// removed from `lights`, as are empty static passes.
    pub fn allocate(
        &mut self,
        lights: &mut [VisibleLightShadows],
        cache: &ShadowCacheTable,
    ) -> AllocationStats {
        let mut stats = AllocationStats::default();
        let mut placements: Vec<Vec<Placement>> = lights
            .iter()
            .map(|light| vec![Placement::Keep; light.shadows.len()])
            .collect();
        let mut atlas_requests = Vec::new();

        for (light_index, light) in lights.iter_mut().enumerate() {
            for (shadow_index, shadow) in light.shadows.iter_mut().enumerate() {
                let placement = match shadow.cache_mode {
                    ShadowCacheMode::StaticPrimitivesOnly => {
                        self.place_static(shadow, cache, &mut stats)
                    }
                    ShadowCacheMode::MovablePrimitivesOnly => {
                        self.place_movable(shadow, cache, &mut stats)
                    }
                    ShadowCacheMode::Uncached if shadow.one_pass_point_light_shadow => {
                        self.place_dedicated(shadow, None, &mut stats)
                    }
                    ShadowCacheMode::Uncached => {
                        atlas_requests.push(AtlasRequest {
                            light: light_index,
                            shadow: shadow_index,
                            size: shadow.allocation_size(),
                        });
                        Placement::Keep
                    }
                };
                placements[light_index][shadow_index] = placement;
            }
        }

        // Tallest first packs best on shelves; the sort is stable so equal
        // sizes keep registration order.
        atlas_requests.sort_by(|a, b| b.size.y.cmp(&a.size.y).then(b.size.x.cmp(&a.size.x)));
        let mut pages: Vec<Option<DepthTarget>> = Vec::new();

        for request in atlas_requests {
            let shadow = &mut lights[request.light].shadows[request.shadow];
            let placement = match self.packer.pack(request.size) {
                Ok(allocation) => {
                    if pages.len() <= allocation.page {
                        pages.resize(allocation.page + 1, None);
                    }
                    let existing = pages[allocation.page];
                    let page_target = match existing {
                        Some(target) => Ok(target),
                        None => {
                            let desc = DepthTargetDesc::texture_2d(self.packer.page_size());
                            self.allocate_transient(desc).inspect(|target| {
                                pages[allocation.page] = Some(*target);
                                stats.targets_allocated += 1;
                                stats.atlas_pages += 1;
                            })
                        }
                    };
                    match page_target {
                        Ok(target) => {
                            shadow.target = Some(ShadowTarget::Atlas {
                                page: allocation.page,
                                target,
                                origin: allocation.origin,
                            });
                            Placement::Keep
                        }
                        Err(err) => {
                            log::warn!(
                                "light {:?}: atlas page allocation failed: {err}",
                                shadow.light_id
                            );
                            Placement::Drop
                        }
                    }
                }
                Err(err) => {
                    log::warn!("light {:?}: dropping shadow: {err}", shadow.light_id);
                    Placement::Drop
                }
            };
            placements[request.light][request.shadow] = placement;
        }

        for (light, light_placements) in lights.iter_mut().zip(placements) {
            let mut placements = light_placements.into_iter();
            light.shadows.retain(|_| match placements.next() {
                Some(Placement::Drop) => {
                    stats.dropped += 1;
                    false
                }
                Some(Placement::Skip) => {
                    stats.skipped += 1;
                    false
                }
                _ => true,
            });
        }

        stats
    }

    /// Static pass: renders into a target owned by the cache entry, unless it
    /// has no casters, in which case only that fact is recorded.
    fn place_static(
        &mut self,
        shadow: &mut ProjectedShadowInfo,
        cache: &ShadowCacheTable,
        stats: &mut AllocationStats,
    ) -> Placement {
        if !shadow.has_subject_prims() {
            let replaced = cache.set_static_result(shadow.light_id, shadow.resolution, None, false);
            if let Some(replaced) = replaced {
                self.device.release(replaced);
            }
            return Placement::Skip;
        }

        match self.device.allocate(shadow.target_desc()) {
            Ok(target) => {
                stats.targets_allocated += 1;
                shadow.target = Some(ShadowTarget::Dedicated {
                    target,
                    composite_from: None,
                });
                let light_id = shadow.light_id;
                match cache.set_static_result(light_id, shadow.resolution, Some(target), true) {
                    // No cache entry to hold it; dies with the frame.
                    Some(replaced) if replaced == target => self.transient.push(target),
                    Some(replaced) => self.device.release(replaced),
                    None => {}
                }
                Placement::Keep
            }
            Err(err) => {
                log::warn!("light {:?}: static shadow allocation failed: {err}", shadow.light_id);
                Placement::Drop
            }
        }
    }

    /// Movable pass: with no casters the cached static depth is read as-is,
    /// otherwise a fresh target composites over it.
    fn place_movable(
        &mut self,
        shadow: &mut ProjectedShadowInfo,
        cache: &ShadowCacheTable,
        stats: &mut AllocationStats,
    ) -> Placement {
        let cached = cache.cached_target(shadow.light_id);
        match cached {
            Some(target) if !shadow.has_subject_prims() => {
                shadow.target = Some(ShadowTarget::CachedReuse { target });
                Placement::Keep
            }
            _ => self.place_dedicated(shadow, cached, stats),
        }
    }

    fn place_dedicated(
        &mut self,
        shadow: &mut ProjectedShadowInfo,
        composite_from: Option<DepthTarget>,
        stats: &mut AllocationStats,
    ) -> Placement {
        match self.allocate_transient(shadow.target_desc()) {
            Ok(target) => {
                stats.targets_allocated += 1;
                shadow.target = Some(ShadowTarget::Dedicated { target, composite_from });
                Placement::Keep
            }
            Err(err) => {
                log::warn!("light {:?}: dropping shadow: {err}", shadow.light_id);
                Placement::Drop
            }
        }
    }
}

impl std::fmt::Debug for ShadowTargetAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowTargetAllocator")
            .field("device", &self.device.name())
            .field("allocated_bytes", &self.device.allocated_bytes())
            .field("transient", &self.transient.len())
            .finish()
    }
}
