pub mod camera;
pub mod compute;
pub mod context;
pub mod controls;
pub mod frame;
pub mod headless;
pub mod initialize;
pub mod kernels;
pub mod pingpong;
pub mod render;
pub mod simulation;
pub mod state;

/// Edge length of the bounding cube the flock lives in.
pub const BOUNDS: f32 = 800.0;
pub const BOUNDS_HALF: f32 = BOUNDS / 2.0;

/// Upper bound on the per-frame time step, in seconds.
pub const MAX_DELTA: f32 = 1.0;

pub const SPEED_LIMIT: f32 = 9.0;
pub const SPEED_SCALE: f32 = 15.0;

/// Largest value any of the three flocking distances may take.
pub const MAX_DISTANCE: f32 = 100.0;
pub const MAX_FREEDOM: f32 = 1.0;

/// Tunable flocking parameters, the values behind the live controls.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SimParams {
  pub separation: f32,
  pub alignment: f32,
  pub cohesion: f32,
  pub freedom: f32,
}

impl Default for SimParams {
  fn default() -> Self {
    Self {
      separation: 20.0,
      alignment: 20.0,
      cohesion: 20.0,
      freedom: 0.75,
    }
  }
}

impl SimParams {
  /// Clamps the three distances into `[0, MAX_DISTANCE]` and the freedom
  /// factor into `[0, MAX_FREEDOM]`. Non-finite values fall back to the
  /// defaults.
  #[must_use]
  pub fn clamped(self) -> Self {
    let defaults = Self::default();
    Self {
      separation: clamp_finite(self.separation, MAX_DISTANCE, defaults.separation),
      alignment: clamp_finite(self.alignment, MAX_DISTANCE, defaults.alignment),
      cohesion: clamp_finite(self.cohesion, MAX_DISTANCE, defaults.cohesion),
      freedom: clamp_finite(self.freedom, MAX_FREEDOM, defaults.freedom),
    }
  }
}

fn clamp_finite(value: f32, max: f32, fallback: f32) -> f32 {
  if value.is_finite() {
    value.clamp(0.0, max)
  } else {
    fallback
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Appearance {
  /// Three-triangle bird meshes oriented along their velocity
  Birds,
  /// Camera-facing quads textured from the appearance atlas
  Sprites,
}

/// Startup configuration, filled from the command line.
#[derive(Clone, Debug)]
pub struct SimConfig {
  /// Side of the square simulation texture; the flock has `width * width` members.
  pub width: u32,
  pub seed: u64,
  pub params: SimParams,
  pub appearance: Appearance,
}

impl Default for SimConfig {
  fn default() -> Self {
    Self {
      width: 128,
      seed: 42,
      params: SimParams::default(),
      appearance: Appearance::Sprites,
    }
  }
}

impl SimConfig {
  pub fn particle_count(&self) -> u32 {
    self.width * self.width
  }
}

/// Uniform block of the velocity kernel. Layout mirrors `VelocityParams` in
/// `shaders/velocity.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VelocityUniforms {
  pub predator: [f32; 3],
  pub time: f32,
  pub delta: f32,
  pub separation_distance: f32,
  pub alignment_distance: f32,
  pub cohesion_distance: f32,
  pub freedom_factor: f32,
  pub bounds: f32,
  pub speed_limit: f32,
  pub _padding: f32,
}

const _: () = assert!(std::mem::size_of::<VelocityUniforms>() == 48);
const _: () = assert!(std::mem::offset_of!(VelocityUniforms, time) == 12);
const _: () = assert!(std::mem::offset_of!(VelocityUniforms, bounds) == 36);

impl VelocityUniforms {
  pub fn new(params: &SimParams, frame: &FrameUniforms) -> Self {
    Self {
      predator: frame.predator,
      time: frame.time,
      delta: frame.delta,
      separation_distance: params.separation,
      alignment_distance: params.alignment,
      cohesion_distance: params.cohesion,
      freedom_factor: params.freedom,
      bounds: BOUNDS,
      speed_limit: SPEED_LIMIT,
      _padding: 0.0,
    }
  }
}

/// Uniform block of the position kernel, mirrors `PositionParams` in
/// `shaders/position.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PositionUniforms {
  pub time: f32,
  pub delta: f32,
  pub speed_scale: f32,
  pub _padding: f32,
}

const _: () = assert!(std::mem::size_of::<PositionUniforms>() == 16);

impl PositionUniforms {
  pub fn new(frame: &FrameUniforms) -> Self {
    Self {
      time: frame.time,
      delta: frame.delta,
      speed_scale: SPEED_SCALE,
      _padding: 0.0,
    }
  }
}

/// Per-frame values produced by the frame driver.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameUniforms {
  /// Seconds since the driver started.
  pub time: f32,
  /// Clamped step, never above `MAX_DELTA`.
  pub delta: f32,
  /// Normalized predator position, scaled by `BOUNDS` inside the kernel.
  pub predator: [f32; 3],
}

/// Host copy of both simulation textures, row-major, one `[f32; 4]` per texel.
#[derive(Clone, Debug, PartialEq)]
pub struct FlockState {
  pub width: u32,
  pub height: u32,
  pub positions: Vec<[f32; 4]>,
  pub velocities: Vec<[f32; 4]>,
}

impl FlockState {
  pub fn all_finite(&self) -> bool {
    self
      .positions
      .iter()
      .chain(&self.velocities)
      .all(|texel| texel.iter().all(|c| c.is_finite()))
  }

  pub fn mean_speed(&self) -> f32 {
    if self.velocities.is_empty() {
      return 0.0;
    }
    let total: f32 = self
      .velocities
      .iter()
      .map(|v| (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt())
      .sum();
    total / self.velocities.len() as f32
  }

  /// Largest absolute coordinate of any member.
  pub fn max_extent(&self) -> f32 {
    self
      .positions
      .iter()
      .flat_map(|p| p[..3].iter())
      .fold(0.0f32, |acc, c| acc.max(c.abs()))
  }
}

/// A flock that can be stepped and read back, on the GPU or on the host.
pub trait Flock {
  fn step(&mut self, velocity: &VelocityUniforms, position: &PositionUniforms);
  fn read_state(&mut self) -> anyhow::Result<FlockState>;
}
