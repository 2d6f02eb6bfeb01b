//! Persistent per-light cache of whole-scene shadow maps and the resolver
//! deciding how many depth passes a cached light renders each frame.

use std::collections::HashMap;

use glam::UVec2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    config::ShadowConfig,
    scene::light::LightType,
    shadow::{initializer::WholeSceneProjectedShadowInitializer, targets::DepthTarget},
    utils::allocator::LightId,
};

/// Which primitives a depth pass renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadowCacheMode {
    /// Everything, no caching.
    Uncached,
    /// Static primitives only; the result is kept across frames.
    StaticPrimitivesOnly,
    /// Movable primitives composited over the cached static depth.
    MovablePrimitivesOnly,
}

/// The cached static depth of a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedShadowMap {
    pub size: UVec2,
    /// `None` when the static pass had no casters and was never rendered.
    pub target: Option<DepthTarget>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedShadowMapData {
    pub initializer: WholeSceneProjectedShadowInitializer,
    /// Real time in seconds of the last frame that requested this shadow.
    pub last_used_time: f64,
    pub shadow_map: Option<CachedShadowMap>,
    pub has_primitives: bool,
}

impl CachedShadowMapData {
    pub fn new(initializer: WholeSceneProjectedShadowInitializer, real_time: f64) -> Self {
        Self {
            initializer,
            last_used_time: real_time,
            shadow_map: None,
            has_primitives: true,
        }
    }

    fn memory_bytes(&self) -> u64 {
        self.shadow_map
            .and_then(|map| map.target)
            .map(|target| target.memory_bytes())
            .unwrap_or(0)
    }

    fn take_target(&mut self) -> Option<DepthTarget> {
        self.shadow_map.take().and_then(|map| map.target)
    }
}

/// Outcome of [`ShadowCacheTable::compute_whole_scene_shadow_cache_modes`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheModeResolution {
    num_shadow_maps: usize,
    cache_modes: [ShadowCacheMode; 2],
    pub updated_initializer: WholeSceneProjectedShadowInitializer,
    pub updated_shadow_map_size: UVec2,
    /// Cached depth that no longer applies; the caller releases it.
    pub released_target: Option<DepthTarget>,
}

impl CacheModeResolution {
    fn single(
        mode: ShadowCacheMode,
        initializer: &WholeSceneProjectedShadowInitializer,
        size: UVec2,
        released_target: Option<DepthTarget>,
    ) -> Self {
        Self {
            num_shadow_maps: 1,
            cache_modes: [mode, ShadowCacheMode::Uncached],
            updated_initializer: *initializer,
            updated_shadow_map_size: size,
            released_target,
        }
    }

    fn static_then_movable(
        initializer: &WholeSceneProjectedShadowInitializer,
        size: UVec2,
        released_target: Option<DepthTarget>,
    ) -> Self {
        Self {
            num_shadow_maps: 2,
            cache_modes: [
                ShadowCacheMode::StaticPrimitivesOnly,
                ShadowCacheMode::MovablePrimitivesOnly,
            ],
            updated_initializer: *initializer,
            updated_shadow_map_size: size,
            released_target,
        }
    }

    /// Passes to render, static before movable.
    pub fn cache_modes(&self) -> &[ShadowCacheMode] {
        &self.cache_modes[..self.num_shadow_maps]
    }

    pub fn num_shadow_maps(&self) -> usize {
        self.num_shadow_maps
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<LightId, CachedShadowMapData>,
    point_updates_this_frame: u32,
    spot_updates_this_frame: u32,
    orphaned: Vec<DepthTarget>,
}

impl CacheState {
    fn cached_memory_bytes(&self) -> u64 {
        self.entries.values().map(CachedShadowMapData::memory_bytes).sum()
    }

    fn updates(&self, light_type: LightType) -> u32 {
        match light_type {
            LightType::Spot => self.spot_updates_this_frame,
            _ => self.point_updates_this_frame,
        }
    }

    fn count_update(&mut self, light_type: LightType) {
        match light_type {
            LightType::Spot => self.spot_updates_this_frame += 1,
            _ => self.point_updates_this_frame += 1,
        }
    }
}

fn update_cap(config: &ShadowConfig, light_type: LightType) -> Option<u32> {
    match light_type {
        LightType::Spot => config.max_spot_cache_updates_per_frame,
        _ => config.max_point_cache_updates_per_frame,
    }
}

/// Scene-wide table of cached shadow maps, keyed by light. Safe to use from
/// parallel per-light setup.
#[derive(Debug, Default)]
pub struct ShadowCacheTable {
    state: Mutex<CacheState>,
}

impl ShadowCacheTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides the depth passes of a point, rect or spot light's whole-scene
    /// shadow for this frame and updates the light's cache entry.
    pub fn compute_whole_scene_shadow_cache_modes(
        &self,
        light_id: LightId,
        light_type: LightType,
        real_time: f64,
        initializer: &WholeSceneProjectedShadowInitializer,
        shadow_map_size: UVec2,
        config: &ShadowConfig,
    ) -> CacheModeResolution {
        debug_assert!(
            light_type != LightType::Directional,
            "directional lights never use cached whole-scene shadows"
        );
        let single = |mode, size, released| {
            CacheModeResolution::single(mode, initializer, size, released)
        };
        if light_type == LightType::Directional {
            return single(ShadowCacheMode::Uncached, shadow_map_size, None);
        }

        let mut state = self.state.lock();

        if !config.cache_whole_scene_shadows {
            let released = state
                .entries
                .remove(&light_id)
                .and_then(|mut entry| entry.take_target());
            return single(ShadowCacheMode::Uncached, shadow_map_size, released);
        }

        let within_budget = state.cached_memory_bytes() < config.whole_scene_shadow_cache_bytes();
        let cap_reached =
            update_cap(config, light_type).is_some_and(|cap| state.updates(light_type) >= cap);

        let Some(entry) = state.entries.get_mut(&light_id) else {
            if !within_budget || cap_reached {
                log::debug!("light {light_id:?}: cache budget reached, rendering uncached");
                return single(ShadowCacheMode::Uncached, shadow_map_size, None);
            }
            state
                .entries
                .insert(light_id, CachedShadowMapData::new(*initializer, real_time));
            state.count_update(light_type);
            return CacheModeResolution::static_then_movable(initializer, shadow_map_size, None);
        };

        entry.last_used_time = real_time;

        if !initializer.is_cached_shadow_valid(&entry.initializer) {
            let released = entry.take_target();
            entry.initializer = *initializer;
            log::debug!("light {light_id:?}: cached shadow invalidated");
            return single(ShadowCacheMode::Uncached, shadow_map_size, released);
        }
        entry.initializer = *initializer;

        let cached_map = entry.shadow_map;
        match cached_map {
            Some(map) if map.size == shadow_map_size => {
                single(ShadowCacheMode::MovablePrimitivesOnly, shadow_map_size, None)
            }
            Some(map) if cap_reached => {
                // Keep showing the old resolution until a later frame has room.
                single(ShadowCacheMode::MovablePrimitivesOnly, map.size, None)
            }
            _ if !within_budget => {
                let released = entry.take_target();
                single(ShadowCacheMode::Uncached, shadow_map_size, released)
            }
            _ => {
                let released = entry.take_target();
                state.count_update(light_type);
                CacheModeResolution::static_then_movable(initializer, shadow_map_size, released)
            }
        }
    }

    /// Records the outcome of a static pass. Returns the target it replaces.
    pub fn set_static_result(
        &self,
        light_id: LightId,
        size: UVec2,
        target: Option<DepthTarget>,
        has_primitives: bool,
    ) -> Option<DepthTarget> {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(&light_id) else {
            return target;
        };
        let replaced = entry.take_target();
        entry.shadow_map = Some(CachedShadowMap { size, target });
        entry.has_primitives = has_primitives;
        replaced
    }

    pub fn cached_target(&self, light_id: LightId) -> Option<DepthTarget> {
        self.state
            .lock()
            .entries
            .get(&light_id)
            .and_then(|entry| entry.shadow_map)
            .and_then(|map| map.target)
    }

    pub fn entry(&self, light_id: LightId) -> Option<CachedShadowMapData> {
        self.state.lock().entries.get(&light_id).cloned()
    }

    pub fn contains(&self, light_id: LightId) -> bool {
        self.state.lock().entries.contains_key(&light_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Drops a light's entry; its target is released on the next frame.
    pub fn remove_light(&self, light_id: LightId) {
        let mut state = self.state.lock();
        if let Some(target) = state
            .entries
            .remove(&light_id)
            .and_then(|mut entry| entry.take_target())
        {
            state.orphaned.push(target);
        }
    }

    /// Forgets a light's cached static depth after its static casters
    /// changed. The entry stays, so the next frame renders both passes again.
    /// Returns `false` when there was nothing cached.
    pub fn invalidate_static(&self, light_id: LightId) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(&light_id) else {
            return false;
        };
        if entry.shadow_map.is_none() {
            return false;
        }
        let target = entry.take_target();
        entry.has_primitives = true;
        state.orphaned.extend(target);
        log::debug!("light {light_id:?}: static casters changed, dropping cached depth");
        true
    }

    pub fn take_orphaned_targets(&self) -> Vec<DepthTarget> {
        std::mem::take(&mut self.state.lock().orphaned)
    }

    /// Removes entries unused for longer than `max_age` seconds and returns
    /// their targets.
    pub fn release_stale(&self, real_time: f64, max_age: f64) -> Vec<DepthTarget> {
        let mut state = self.state.lock();
        let mut released = Vec::new();
        state.entries.retain(|light_id, entry| {
            if real_time - entry.last_used_time > max_age {
                log::debug!("light {light_id:?}: releasing stale cached shadow");
                released.extend(entry.take_target());
                false
            } else {
                true
            }
        });
        released
    }

    pub fn cached_memory_bytes(&self) -> u64 {
        self.state.lock().cached_memory_bytes()
    }

    pub fn reset_frame_counters(&self) {
        let mut state = self.state.lock();
        state.point_updates_this_frame = 0;
        state.spot_updates_this_frame = 0;
    }

    /// Point and rect light caches updated this frame.
    pub fn point_updates_this_frame(&self) -> u32 {
        self.state.lock().point_updates_this_frame
    }

    pub fn spot_updates_this_frame(&self) -> u32 {
        self.state.lock().spot_updates_this_frame
    }
}
