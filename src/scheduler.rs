// ==============================================================================
// scheduler.rs — FIXED-TIMESTEP ACCUMULATOR
// ------------------------------------------------------------------------------
//   acc += clamp(frame_delta, MIN_DELTA, MAX_DELTA)
//   while acc >= FIXED { tick(FIXED); acc -= FIXED }
//
// The clamp is what bounds catch-up work after a stall. The leftover fraction
// is readable through `alpha()` for render interpolation and never consumed.
// ==============================================================================

use crate::config::SchedulerConfig;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PhysicsScheduler {
    config: SchedulerConfig,
    accumulator: f32,      // s, always in [0, fixed_timestep)
    initialized: bool,     // false once disposed
    total_steps: u64,
}

impl PhysicsScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config, accumulator: 0.0, initialized: true, total_steps: 0 }
    }

    pub fn fixed_timestep(&self) -> f32 {
        self.config.fixed_timestep
    }

    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Leftover fraction of a step, in [0, 1).
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.config.fixed_timestep
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Every later `advance` is a no-op.
    pub fn dispose(&mut self) {
        self.initialized = false;
        self.accumulator = 0.0;
    }

    /// Clamped frame delta; non-finite deltas count as zero.
    pub fn clamp_delta(&self, frame_delta: f32) -> f32 {
        if !frame_delta.is_finite() {
            return 0.0;
        }
        frame_delta.max(self.config.min_delta).min(self.config.max_delta)
    }

    /// Runs `tick(fixed_dt)` as many times as the accumulated time allows and
    /// returns how many steps ran.
    pub fn advance<F>(&mut self, frame_delta: f32, mut tick: F) -> usize
    where
        F: FnMut(f32),
    {
        if !self.initialized {
            return 0;
        }

        let fixed = self.config.fixed_timestep;
        self.accumulator += self.clamp_delta(frame_delta);

        let mut steps = 0;
        while self.accumulator >= fixed {
            tick(fixed);
            self.accumulator -= fixed;
            steps += 1;
        }
        self.accumulator = self.accumulator.max(0.0);
        self.total_steps += steps as u64;

        if frame_delta > self.config.max_delta {
            debug!(frame_delta, steps, "frame delta clamped");
        }
        steps
    }
}
