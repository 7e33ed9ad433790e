//! Gain (volume) stage
//!
//! The control side stores the target gain as `f32` bits in an atomic. The
//! render side ramps linearly towards a new target over a fixed number of
//! frames and lands exactly on it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Control-side handle to the gain target
#[derive(Debug, Clone)]
pub struct GainControl {
    target: Arc<AtomicU32>,
}

impl GainControl {
    pub fn new(initial: f32) -> Self {
        Self {
            target: Arc::new(AtomicU32::new(initial.clamp(0.0, 1.0).to_bits())),
        }
    }

    /// Set the target gain (clamped to 0.0 - 1.0, NaN reads as 0.0)
    pub fn set(&self, value: f32) {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.target.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.target.load(Ordering::Relaxed))
    }

    /// Render-side stage following this control
    pub fn stage(&self, ramp_frames: usize) -> GainStage {
        let initial = self.get();
        GainStage {
            target: self.target.clone(),
            current: initial,
            ramp_target: initial,
            step: 0.0,
            ramp_frames,
        }
    }
}

/// Render-side gain applied after the analysis tap
#[derive(Debug)]
pub struct GainStage {
    target: Arc<AtomicU32>,
    current: f32,
    /// Target the current ramp is heading to
    ramp_target: f32,
    /// Per-frame increment of the current ramp
    step: f32,
    ramp_frames: usize,
}

impl GainStage {
    /// Gain applied to the most recent frame
    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn apply(&mut self, left: &mut [f32], right: &mut [f32]) {
        let target = f32::from_bits(self.target.load(Ordering::Relaxed));
        if target != self.ramp_target {
            self.ramp_target = target;
            if self.ramp_frames == 0 {
                self.current = target;
            } else {
                self.step = (target - self.current) / self.ramp_frames as f32;
            }
        }

        if self.current == target {
            if target != 1.0 {
                for s in left.iter_mut().chain(right.iter_mut()) {
                    *s *= target;
                }
            }
            return;
        }

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            if self.current != target {
                self.current += self.step;
                let overshoot = (self.step > 0.0 && self.current >= target)
                    || (self.step < 0.0 && self.current <= target);
                if overshoot || self.step == 0.0 {
                    self.current = target;
                }
            }
            *l *= self.current;
            *r *= self.current;
        }
    }
}
