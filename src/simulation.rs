use crate::compute::{GpuComputation, VariableId};
use crate::initialize::InitialState;
use crate::{Flock, FlockState, PositionUniforms, VelocityUniforms};
use std::sync::Arc;

/// The flock's position and velocity textures on the GPU, stepped by the
/// velocity and position kernels.
pub struct GpuFlock {
  computation: GpuComputation,
  position: VariableId,
  velocity: VariableId,
  device: Arc<wgpu::Device>,
  queue: Arc<wgpu::Queue>,
}

impl GpuFlock {
  /// Uploads the initial state and builds both kernels. A failed `init` is
  /// reported through the returned error; the flock is still usable but
  /// stepping it does nothing.
  pub fn new(
    device: &Arc<wgpu::Device>,
    queue: &Arc<wgpu::Queue>,
    width: u32,
    initial: &InitialState,
  ) -> (Self, anyhow::Result<()>) {
    let mut computation = GpuComputation::new(width, width);
    let velocity = computation.add_variable(
      device,
      queue,
      "velocity",
      include_str!("shaders/velocity.wgsl"),
      &initial.velocities,
      std::mem::size_of::<VelocityUniforms>() as u64,
    );
    let position = computation.add_variable(
      device,
      queue,
      "position",
      include_str!("shaders/position.wgsl"),
      &initial.positions,
      std::mem::size_of::<PositionUniforms>() as u64,
    );
    computation.set_dependencies(velocity, &[position, velocity]);
    computation.set_dependencies(position, &[position, velocity]);
    let status = computation.init(device);

    let flock = Self {
      computation,
      position,
      velocity,
      device: Arc::clone(device),
      queue: Arc::clone(queue),
    };
    (flock, status)
  }

  pub fn is_ready(&self) -> bool {
    self.computation.is_ready()
  }

  pub fn write_uniforms(&self, velocity: &VelocityUniforms, position: &PositionUniforms) {
    self
      .computation
      .write_uniforms(&self.queue, self.velocity, velocity);
    self
      .computation
      .write_uniforms(&self.queue, self.position, position);
  }

  /// Records both passes into an encoder shared with the render pass.
  pub fn encode(&mut self, encoder: &mut wgpu::CommandEncoder) {
    self.computation.encode(encoder);
  }

  pub fn current_index(&self) -> usize {
    self.computation.current_index()
  }

  pub fn position_view(&self, generation: usize) -> &wgpu::TextureView {
    self.computation.view(self.position, generation)
  }

  pub fn velocity_view(&self, generation: usize) -> &wgpu::TextureView {
    self.computation.view(self.velocity, generation)
  }
}

impl Flock for GpuFlock {
  fn step(&mut self, velocity: &VelocityUniforms, position: &PositionUniforms) {
    self.write_uniforms(velocity, position);
    self.computation.compute(&self.device, &self.queue);
  }

  fn read_state(&mut self) -> anyhow::Result<FlockState> {
    let (width, height) = self.computation.size();
    Ok(FlockState {
      width,
      height,
      positions: self
        .computation
        .read_texels(&self.device, &self.queue, self.position)?,
      velocities: self
        .computation
        .read_texels(&self.device, &self.queue, self.velocity)?,
    })
  }
}
