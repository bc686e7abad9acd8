//! Per-frame bookkeeping: the clamped clock, the pointer sample that drives the
//! predator, and the parameter set the compute passes read.

use crate::{FrameUniforms, PositionUniforms, SimParams, VelocityUniforms, MAX_DELTA};
use std::time::{Duration, Instant};

/// Pointer offset (in pixels from the window center) that parks the predator
/// far outside the flock.
pub const POINTER_SENTINEL: f32 = 10_000.0;

/// Tracks when the previous frame ran.
#[derive(Debug)]
pub struct FrameClock {
  start: Instant,
  /// `None` until the first tick, so the first frame has a zero step.
  last: Option<Instant>,
}

impl FrameClock {
  pub fn new(start: Instant) -> Self {
    Self { start, last: None }
  }

  /// Returns `(time, delta)` in seconds, with `delta` clamped to `MAX_DELTA`.
  pub fn tick(&mut self, now: Instant) -> (f32, f32) {
    let elapsed = self
      .last
      .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
    self.last = Some(now);
    let delta = elapsed.as_secs_f32().min(MAX_DELTA);
    let time = now.saturating_duration_since(self.start).as_secs_f32();
    (time, delta)
  }
}

/// Latest pointer position relative to the window center.
///
/// Each frame consumes the sample and resets it to `POINTER_SENTINEL`, so a
/// pointer that stops moving only influences the frame it was sampled in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
  x: f32,
  y: f32,
}

impl Default for PointerSample {
  fn default() -> Self {
    Self {
      x: POINTER_SENTINEL,
      y: POINTER_SENTINEL,
    }
  }
}

impl PointerSample {
  /// Records a cursor position given in window pixels.
  pub fn set(&mut self, cursor: (f32, f32), half_extent: (f32, f32)) {
    self.x = cursor.0 - half_extent.0;
    self.y = cursor.1 - half_extent.1;
  }

  /// Maps the sample to a normalized predator position and resets it.
  pub fn take_predator(&mut self, half_extent: (f32, f32)) -> [f32; 3] {
    let half_w = half_extent.0.max(1.0);
    let half_h = half_extent.1.max(1.0);
    let predator = [0.5 * self.x / half_w, -0.5 * self.y / half_h, 0.0];
    *self = Self::default();
    predator
  }

  pub fn is_sentinel(&self) -> bool {
    *self == Self::default()
  }
}

/// Owns every piece of mutable per-frame state and turns it into uniforms.
#[derive(Debug)]
pub struct FrameDriver {
  pub clock: FrameClock,
  pub pointer: PointerSample,
  pub params: SimParams,
  /// Half of the window size in pixels.
  half_extent: (f32, f32),
}

impl FrameDriver {
  pub fn new(params: SimParams, window_size: (u32, u32), start: Instant) -> Self {
    let mut driver = Self {
      clock: FrameClock::new(start),
      pointer: PointerSample::default(),
      params: params.clamped(),
      half_extent: (1.0, 1.0),
    };
    driver.resize(window_size);
    driver
  }

  pub fn resize(&mut self, window_size: (u32, u32)) {
    self.half_extent = (
      window_size.0.max(1) as f32 / 2.0,
      window_size.1.max(1) as f32 / 2.0,
    );
  }

  pub fn pointer_moved(&mut self, x: f32, y: f32) {
    self.pointer.set((x, y), self.half_extent);
  }

  /// Advances one frame: ticks the clock and consumes the pointer sample.
  pub fn advance(&mut self, now: Instant) -> FrameUniforms {
    let (time, delta) = self.clock.tick(now);
    let predator = self.pointer.take_predator(self.half_extent);
    FrameUniforms {
      time,
      delta,
      predator,
    }
  }

  /// Advances only once a render target is in hand. Without one the clock
  /// and pointer sample are left for the next attempt.
  pub fn advance_for<T>(&mut self, target: Option<T>, now: Instant) -> Option<(T, FrameUniforms)> {
    let target = target?;
    Some((target, self.advance(now)))
  }

  pub fn uniforms(&self, frame: &FrameUniforms) -> (VelocityUniforms, PositionUniforms) {
    (
      VelocityUniforms::new(&self.params, frame),
      PositionUniforms::new(frame),
    )
  }
}
