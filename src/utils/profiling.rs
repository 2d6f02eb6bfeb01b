use std::time::{Duration, Instant};

/// Per-frame counters and timings gathered by [`crate::ShadowSetup`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ShadowSetupStats {
    pub light_setup_time: Duration,
    pub allocation_time: Duration,
    pub total_frame_time: Duration,

    pub lights_processed: usize,
    pub whole_scene_shadows: usize,
    pub cascade_shadows: usize,
    pub per_object_shadows: usize,
    pub subject_primitives: usize,
    pub static_mesh_elements: usize,
    pub shadows_dropped: usize,
    pub point_cache_updates: u32,
    pub spot_cache_updates: u32,
    pub targets_allocated: usize,
}

impl ShadowSetupStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn total_shadows(&self) -> usize {
        self.whole_scene_shadows + self.cascade_shadows + self.per_object_shadows
    }

    pub fn report(&self) {
        let total_us = self.total_frame_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        log::debug!(
            "shadow setup: {} lights, {} shadows ({} whole, {} cascade, {} per-object), {} dropped",
            self.lights_processed,
            self.total_shadows(),
            self.whole_scene_shadows,
            self.cascade_shadows,
            self.per_object_shadows,
            self.shadows_dropped
        );
        log::debug!(
            "  casters: {} dynamic, {} static; cache updates: {} point, {} spot; {} targets",
            self.subject_primitives,
            self.static_mesh_elements,
            self.point_cache_updates,
            self.spot_cache_updates,
            self.targets_allocated
        );
        log::debug!(
            "  light setup: {:.2} ms ({:.1}%), allocation: {:.2} ms ({:.1}%), total: {:.2} ms",
            self.light_setup_time.as_secs_f32() * 1000.0,
            (self.light_setup_time.as_micros() as f32 / total_us) * 100.0,
            self.allocation_time.as_secs_f32() * 1000.0,
            (self.allocation_time.as_micros() as f32 / total_us) * 100.0,
            self.total_frame_time.as_secs_f32() * 1000.0
        );
    }
}

/// Accumulates the elapsed time of a scope into a stats field.
pub struct StageTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> StageTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for StageTimer<'a> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
