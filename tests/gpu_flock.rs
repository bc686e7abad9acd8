//! Headless GPU runs checked against the host reference flock.
//!
//! Each test skips when no adapter is available.

use boids_gpgpu::compute::GpuComputation;
use boids_gpgpu::context::GpuContext;
use boids_gpgpu::initialize::create_flock;
use boids_gpgpu::kernels::{ReferenceFlock, Texture};
use boids_gpgpu::simulation::GpuFlock;
use boids_gpgpu::{Flock, FlockState, FrameUniforms, PositionUniforms, SimParams, VelocityUniforms};

const DT: f32 = 0.016;
const TOLERANCE: f32 = 1e-3;

fn create_test_gpu() -> Option<GpuContext> {
  match pollster::block_on(GpuContext::headless()) {
    Ok(context) => Some(context),
    Err(err) => {
      eprintln!("skipping GPU test: {err:#}");
      None
    }
  }
}

fn uniforms() -> (VelocityUniforms, PositionUniforms) {
  let frame = FrameUniforms {
    time: 0.0,
    delta: DT,
    predator: [0.0, 0.0, 0.0],
  };
  (
    VelocityUniforms::new(&SimParams::default(), &frame),
    PositionUniforms::new(&frame),
  )
}

fn assert_close(gpu: &FlockState, cpu: &FlockState) {
  assert_eq!((gpu.width, gpu.height), (cpu.width, cpu.height));
  let pairs = gpu
    .positions
    .iter()
    .zip(&cpu.positions)
    .chain(gpu.velocities.iter().zip(&cpu.velocities));
  for (i, (g, c)) in pairs.enumerate() {
    for axis in 0..4 {
      let scale = c[axis].abs().max(1.0);
      assert!(
        (g[axis] - c[axis]).abs() <= TOLERANCE * scale,
        "texel {i} axis {axis}: gpu {} cpu {}",
        g[axis],
        c[axis]
      );
    }
  }
}

#[test]
fn upload_reads_back_unchanged() {
  let Some(context) = create_test_gpu() else {
    return;
  };
  let initial = create_flock(4, 99);
  let (mut flock, status) = GpuFlock::new(&context.device, &context.queue, 4, &initial);
  status.unwrap();
  assert!(flock.is_ready());

  let state = flock.read_state().unwrap();
  assert_eq!(state.positions, initial.positions);
  assert_eq!(state.velocities, initial.velocities);
}

#[test]
fn one_step_matches_reference() {
  let Some(context) = create_test_gpu() else {
    return;
  };
  let width = 4;
  let initial = create_flock(width, 1234);
  let (mut gpu, status) = GpuFlock::new(&context.device, &context.queue, width, &initial);
  status.unwrap();
  let mut cpu = ReferenceFlock::new(
    Texture::from_texels(width, width, initial.positions.clone()).unwrap(),
    Texture::from_texels(width, width, initial.velocities.clone()).unwrap(),
  )
  .unwrap();

  let (velocity, position) = uniforms();
  gpu.step(&velocity, &position);
  cpu.step(&velocity, &position);
  assert_eq!(gpu.current_index(), 1);

  assert_close(&gpu.read_state().unwrap(), &cpu.read_state().unwrap());
}

#[test]
fn many_steps_stay_close_to_reference() {
  let Some(context) = create_test_gpu() else {
    return;
  };
  let width = 8;
  let initial = create_flock(width, 5);
  let (mut gpu, status) = GpuFlock::new(&context.device, &context.queue, width, &initial);
  status.unwrap();
  let mut cpu = ReferenceFlock::new(
    Texture::from_texels(width, width, initial.positions.clone()).unwrap(),
    Texture::from_texels(width, width, initial.velocities.clone()).unwrap(),
  )
  .unwrap();

  let (velocity, position) = uniforms();
  for _ in 0..10 {
    gpu.step(&velocity, &position);
    cpu.step(&velocity, &position);
  }
  assert_eq!(gpu.current_index(), 0);

  let gpu_state = gpu.read_state().unwrap();
  assert!(gpu_state.all_finite());
  assert_close(&gpu_state, &cpu.read_state().unwrap());
}

const COPY_SHADER: &str = r#"
@group(0) @binding(0) var<uniform> params: vec4<f32>;
@group(0) @binding(1) var source: texture_2d<f32>;
@group(0) @binding(2) var output: texture_storage_2d<rgba32float, write>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
  let size = textureDimensions(source);
  if id.x >= size.x || id.y >= size.y {
    return;
  }
  let coord = vec2<i32>(id.xy);
  textureStore(output, coord, textureLoad(source, coord, 0) + params);
}
"#;

fn single_variable(context: &GpuContext, source: &str) -> (GpuComputation, boids_gpgpu::compute::VariableId) {
  let mut computation = GpuComputation::new(2, 2);
  let variable = computation.add_variable(
    &context.device,
    &context.queue,
    "copy",
    source,
    &[[1.0, 2.0, 3.0, 4.0]; 4],
    16,
  );
  (computation, variable)
}

fn assert_compute_is_inert(context: &GpuContext, computation: &mut GpuComputation) {
  assert!(!computation.is_ready());
  let before = computation.current_index();
  computation.compute(&context.device, &context.queue);
  computation.compute(&context.device, &context.queue);
  assert_eq!(computation.current_index(), before);
}

#[test]
fn missing_dependencies_fail_init() {
  let Some(context) = create_test_gpu() else {
    return;
  };
  let (mut computation, _) = single_variable(&context, COPY_SHADER);

  let err = computation.init(&context.device).unwrap_err();
  assert!(err.to_string().contains("no dependencies"), "{err:#}");
  assert_compute_is_inert(&context, &mut computation);
}

#[test]
fn broken_shader_fails_init() {
  let Some(context) = create_test_gpu() else {
    return;
  };
  let (mut computation, variable) = single_variable(&context, "fn main( {");
  computation.set_dependencies(variable, &[variable]);

  assert!(computation.init(&context.device).is_err());
  assert_compute_is_inert(&context, &mut computation);
  // textures keep their uploaded contents
  let texels = computation
    .read_texels(&context.device, &context.queue, variable)
    .unwrap();
  assert_eq!(texels, vec![[1.0, 2.0, 3.0, 4.0]; 4]);
}

#[test]
fn valid_variable_steps_and_swaps() {
  let Some(context) = create_test_gpu() else {
    return;
  };
  let (mut computation, variable) = single_variable(&context, COPY_SHADER);
  computation.set_dependencies(variable, &[variable]);
  computation.init(&context.device).unwrap();
  assert!(computation.is_ready());

  computation.write_uniforms(&context.queue, variable, &[1.0f32, 0.0, 0.0, 0.0]);
  computation.compute(&context.device, &context.queue);
  assert_eq!(computation.current_index(), 1);
  let texels = computation
    .read_texels(&context.device, &context.queue, variable)
    .unwrap();
  assert_eq!(texels, vec![[2.0, 2.0, 3.0, 4.0]; 4]);
}
