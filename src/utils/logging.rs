use log::{log_enabled, warn, Level};
use std::time::Instant;

use super::profiling::ShadowSetupStats;

/// Stages of a shadow setup frame that get their own trace span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPhase {
    Frame,
    Lights,
    Allocation,
}

impl SetupPhase {
    pub fn label(self) -> &'static str {
        match self {
            SetupPhase::Frame => "shadows::setup",
            SetupPhase::Lights => "shadows::lights",
            SetupPhase::Allocation => "shadows::allocate",
        }
    }
}

/// Traces entry and exit of one setup phase.
pub struct ScopedTimer {
    phase: SetupPhase,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(phase: SetupPhase) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {}", phase.label());
        }
        Self {
            phase,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            let elapsed = self.start.elapsed();
            log::trace!("end {} ({} µs)", self.phase.label(), elapsed.as_micros());
        }
    }
}

/// Milliseconds by which the frame overran `budget_ms`, if it did.
/// A non-positive budget disables the check.
pub fn setup_budget_overrun(stats: &ShadowSetupStats, budget_ms: f32) -> Option<f32> {
    let frame_ms = stats.total_frame_time.as_secs_f32() * 1000.0;
    (budget_ms > 0.0 && frame_ms > budget_ms).then_some(frame_ms - budget_ms)
}

/// Warns when a frame's shadow setup ran over budget, naming the light and
/// shadow counts and the slower of the two stages.
pub fn warn_if_setup_budget_exceeded(stats: &ShadowSetupStats, budget_ms: f32) {
    let Some(overrun_ms) = setup_budget_overrun(stats, budget_ms) else {
        return;
    };
    let (stage, stage_time) = if stats.allocation_time > stats.light_setup_time {
        (SetupPhase::Allocation, stats.allocation_time)
    } else {
        (SetupPhase::Lights, stats.light_setup_time)
    };
    warn!(
        "shadow setup over budget by {overrun_ms:.2} ms ({} lights, {} shadows, {} dropped); \
         slowest stage {} at {:.2} ms",
        stats.lights_processed,
        stats.total_shadows(),
        stats.shadows_dropped,
        stage.label(),
        stage_time.as_secs_f32() * 1000.0
    );
}
