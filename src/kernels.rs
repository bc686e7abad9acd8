//! Host implementation of the two simulation kernels.
//!
//! Every function here mirrors its WGSL counterpart in `shaders/velocity.wgsl`
//! and `shaders/position.wgsl` operation for operation, so the GPU output can
//! be checked against it and headless runs can go without a GPU.

use crate::pingpong::PingPong;
use crate::{Flock, FlockState, PositionUniforms, VelocityUniforms};
use anyhow::ensure;
use cgmath::{InnerSpace, Vector3};
use std::f32::consts::TAU;

pub const PREY_RADIUS: f32 = 150.0;
pub const CENTER_PULL: f32 = 5.0;
pub const BOUNDARY_PUSH: f32 = 100.0;
/// Neighbors closer than this are treated as the boid itself.
pub const MIN_DISTANCE: f32 = 0.0001;

/// A `width * height` grid of RGBA float texels with repeat addressing.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
  width: u32,
  height: u32,
  texels: Vec<[f32; 4]>,
}

impl Texture {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      texels: vec![[0.0; 4]; (width * height) as usize],
    }
  }

  pub fn from_texels(width: u32, height: u32, texels: Vec<[f32; 4]>) -> anyhow::Result<Self> {
    let expected = width as usize * height as usize;
    ensure!(
      texels.len() == expected,
      "{} texels do not fill a {width}x{height} texture",
      texels.len()
    );
    Ok(Self {
      width,
      height,
      texels,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn texels(&self) -> &[[f32; 4]] {
    &self.texels
  }

  /// Reads a texel; out-of-range coordinates wrap around.
  pub fn load(&self, x: i32, y: i32) -> [f32; 4] {
    let x = x.rem_euclid(self.width as i32) as u32;
    let y = y.rem_euclid(self.height as i32) as u32;
    self.texels[(y * self.width + x) as usize]
  }

  pub fn store(&mut self, x: u32, y: u32, texel: [f32; 4]) {
    self.texels[(y * self.width + x) as usize] = texel;
  }
}

fn xyz(texel: [f32; 4]) -> Vector3<f32> {
  Vector3::new(texel[0], texel[1], texel[2])
}

/// Unit vector along `v`, or zero when `v` has no length.
pub fn safe_normalize(v: Vector3<f32>) -> Vector3<f32> {
  let len = v.magnitude();
  if len > 0.0 {
    v / len
  } else {
    Vector3::new(0.0, 0.0, 0.0)
  }
}

/// Steering that does not depend on neighbors: predator avoidance, the pull
/// toward the center and the push back from the walls of the bounding cube.
/// Returns the new velocity and the speed limit for this boid.
pub fn global_steering(
  position: Vector3<f32>,
  velocity: Vector3<f32>,
  params: &VelocityUniforms,
) -> (Vector3<f32>, f32) {
  let mut velocity = velocity;
  let mut limit = params.speed_limit;
  let delta = params.delta;

  let predator = Vector3::from(params.predator) * params.bounds;
  let mut dir = predator - position;
  dir.z = 0.0;
  let dist = dir.magnitude();
  if dist < PREY_RADIUS {
    let f = (dist * dist / (PREY_RADIUS * PREY_RADIUS) - 1.0) * delta * 100.0;
    velocity += safe_normalize(dir) * f;
    limit += 5.0;
  }

  let mut dir = position;
  dir.y *= 2.5;
  velocity -= safe_normalize(dir) * delta * CENTER_PULL;

  let half = params.bounds * 0.5;
  for axis in 0..3 {
    if position[axis].abs() > half {
      velocity[axis] -= position[axis].signum() * delta * BOUNDARY_PUSH;
    }
  }

  (velocity, limit)
}

/// Separation, alignment and cohesion accumulated over the whole grid.
pub fn neighbor_steering(
  x: u32,
  y: u32,
  position: &Texture,
  velocity: &Texture,
  params: &VelocityUniforms,
) -> Vector3<f32> {
  let mut steer = Vector3::new(0.0, 0.0, 0.0);
  let zone_radius = params.separation_distance + params.alignment_distance + params.cohesion_distance;
  if zone_radius <= 0.0 {
    return steer;
  }
  let separation_thresh = params.separation_distance / zone_radius;
  let alignment_thresh = (params.separation_distance + params.alignment_distance) / zone_radius;
  let zone_radius_sq = zone_radius * zone_radius;
  let delta = params.delta;
  let self_position = xyz(position.load(x as i32, y as i32));

  for ny in 0..position.height() as i32 {
    for nx in 0..position.width() as i32 {
      let dir = xyz(position.load(nx, ny)) - self_position;
      let dist = dir.magnitude();
      if dist < MIN_DISTANCE {
        continue;
      }
      let dist_sq = dist * dist;
      if dist_sq > zone_radius_sq {
        continue;
      }
      let percent = dist_sq / zone_radius_sq;

      if percent < separation_thresh {
        let f = (separation_thresh / percent - 1.0) * delta;
        steer -= safe_normalize(dir) * f;
      } else if percent < alignment_thresh {
        let thresh_delta = alignment_thresh - separation_thresh;
        let adjusted = (percent - separation_thresh) / thresh_delta;
        let other_velocity = xyz(velocity.load(nx, ny));
        let f = (0.5 - (adjusted * TAU).cos() * 0.5 + 0.5) * delta;
        steer += safe_normalize(other_velocity) * f;
      } else {
        let thresh_delta = 1.0 - alignment_thresh;
        let adjusted = if thresh_delta == 0.0 {
          1.0
        } else {
          (percent - alignment_thresh) / thresh_delta
        };
        let f = (0.5 - ((adjusted * TAU).cos() * -0.5 + 0.5)) * delta;
        steer += safe_normalize(dir) * f;
      }
    }
  }
  steer
}

/// New velocity of the boid stored at texel `(x, y)`.
pub fn velocity_kernel(
  x: u32,
  y: u32,
  position: &Texture,
  velocity: &Texture,
  params: &VelocityUniforms,
) -> [f32; 4] {
  let self_position = xyz(position.load(x as i32, y as i32));
  let self_velocity = velocity.load(x as i32, y as i32);

  let (mut new_velocity, limit) = global_steering(self_position, xyz(self_velocity), params);
  new_velocity += neighbor_steering(x, y, position, velocity, params) * params.freedom_factor;

  let speed = new_velocity.magnitude();
  if speed > limit {
    new_velocity = new_velocity / speed * limit;
  }
  [new_velocity.x, new_velocity.y, new_velocity.z, self_velocity[3]]
}

/// New position of the boid stored at texel `(x, y)`.
pub fn position_kernel(
  x: u32,
  y: u32,
  position: &Texture,
  velocity: &Texture,
  params: &PositionUniforms,
) -> [f32; 4] {
  let p = position.load(x as i32, y as i32);
  let v = xyz(velocity.load(x as i32, y as i32));
  let moved = xyz(p) + v * (params.delta * params.speed_scale);
  [moved.x, moved.y, moved.z, p[3]]
}

/// Host-side flock stepping both kernels over ping-ponged textures.
#[derive(Debug)]
pub struct ReferenceFlock {
  position: PingPong<Texture>,
  velocity: PingPong<Texture>,
}

impl ReferenceFlock {
  pub fn new(position: Texture, velocity: Texture) -> anyhow::Result<Self> {
    ensure!(
      (position.width(), position.height()) == (velocity.width(), velocity.height()),
      "position texture is {}x{} but velocity texture is {}x{}",
      position.width(),
      position.height(),
      velocity.width(),
      velocity.height()
    );
    Ok(Self {
      position: PingPong::filled(position),
      velocity: PingPong::filled(velocity),
    })
  }

  pub fn position(&self) -> &Texture {
    self.position.current()
  }

  pub fn velocity(&self) -> &Texture {
    self.velocity.current()
  }

  fn run_velocity_pass(&mut self, params: &VelocityUniforms) {
    let position = self.position.current();
    let (velocity, out) = self.velocity.split();
    for y in 0..position.height() {
      for x in 0..position.width() {
        out.store(x, y, velocity_kernel(x, y, position, velocity, params));
      }
    }
  }

  fn run_position_pass(&mut self, params: &PositionUniforms) {
    let velocity = self.velocity.current();
    let (position, out) = self.position.split();
    for y in 0..position.height() {
      for x in 0..position.width() {
        out.store(x, y, position_kernel(x, y, position, velocity, params));
      }
    }
  }
}

impl Flock for ReferenceFlock {
  /// Both passes read the snapshot left by the previous step; the buffers
  /// are swapped only once both are written.
  fn step(&mut self, velocity: &VelocityUniforms, position: &PositionUniforms) {
    self.run_velocity_pass(velocity);
    self.run_position_pass(position);
    self.velocity.swap();
    self.position.swap();
  }

  fn read_state(&mut self) -> anyhow::Result<FlockState> {
    let position = self.position.current();
    Ok(FlockState {
      width: position.width(),
      height: position.height(),
      positions: position.texels().to_vec(),
      velocities: self.velocity.current().texels().to_vec(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{BOUNDS, SPEED_LIMIT};

  fn params(delta: f32) -> VelocityUniforms {
    VelocityUniforms {
      predator: [100.0, 100.0, 0.0],
      delta,
      separation_distance: 20.0,
      alignment_distance: 20.0,
      cohesion_distance: 20.0,
      freedom_factor: 0.75,
      bounds: BOUNDS,
      speed_limit: SPEED_LIMIT,
      ..Default::default()
    }
  }

  #[test]
  fn load_wraps_around_edges() {
    let mut tex = Texture::new(2, 2);
    tex.store(1, 1, [1.0, 2.0, 3.0, 4.0]);
    assert_eq!(tex.load(-1, -1), [1.0, 2.0, 3.0, 4.0]);
    assert_eq!(tex.load(3, 3), [1.0, 2.0, 3.0, 4.0]);
  }

  #[test]
  fn zero_vector_normalizes_to_zero() {
    assert_eq!(safe_normalize(Vector3::new(0.0, 0.0, 0.0)), Vector3::new(0.0, 0.0, 0.0));
  }

  #[test]
  fn predator_pushes_boid_away() {
    let mut p = params(0.016);
    p.predator = [0.0, 0.0, 0.0];
    // pull toward center is along -x, predator push is along +x and stronger
    let (v, limit) = global_steering(Vector3::new(50.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0), &p);
    assert!(v.x > 0.0);
    assert_eq!(limit, SPEED_LIMIT + 5.0);
  }

  #[test]
  fn distant_predator_has_no_effect() {
    let p = params(0.016);
    let (_, limit) = global_steering(Vector3::new(50.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0), &p);
    assert_eq!(limit, SPEED_LIMIT);
  }

  #[test]
  fn close_neighbors_repel() {
    let position = Texture::from_texels(2, 1, vec![[0.0, 0.0, 0.0, 1.0], [2.0, 0.0, 0.0, 1.0]]).unwrap();
    let velocity = Texture::new(2, 1);
    let steer = neighbor_steering(0, 0, &position, &velocity, &params(0.016));
    assert!(steer.x < 0.0);
  }

  #[test]
  fn far_cohesion_zone_attracts() {
    // 59 units is inside the 60 unit zone, near the outer edge of the cohesion shell
    let position = Texture::from_texels(2, 1, vec![[0.0, 0.0, 0.0, 1.0], [59.0, 0.0, 0.0, 1.0]]).unwrap();
    let velocity = Texture::new(2, 1);
    let steer = neighbor_steering(0, 0, &position, &velocity, &params(0.016));
    assert!(steer.x > 0.0);
  }

  #[test]
  fn speed_is_limited() {
    let position = Texture::from_texels(1, 1, vec![[0.0, 10.0, 0.0, 1.0]]).unwrap();
    let velocity = Texture::from_texels(1, 1, vec![[100.0, 0.0, 0.0, 1.0]]).unwrap();
    let v = velocity_kernel(0, 0, &position, &velocity, &params(0.016));
    let speed = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    assert!(speed <= SPEED_LIMIT + 1e-4);
  }

  #[test]
  fn position_integrates_scaled_velocity() {
    let position = Texture::from_texels(1, 1, vec![[1.0, 2.0, 3.0, 1.0]]).unwrap();
    let velocity = Texture::from_texels(1, 1, vec![[1.0, -1.0, 0.5, 1.0]]).unwrap();
    let params = PositionUniforms {
      delta: 0.5,
      speed_scale: 2.0,
      ..Default::default()
    };
    assert_eq!(position_kernel(0, 0, &position, &velocity, &params), [2.0, 1.0, 3.5, 1.0]);
  }

  #[test]
  fn step_reads_a_single_snapshot() {
    let position = Texture::from_texels(1, 1, vec![[0.0, 10.0, 0.0, 1.0]]).unwrap();
    let velocity = Texture::from_texels(1, 1, vec![[2.0, 0.0, 0.0, 1.0]]).unwrap();
    let mut flock = ReferenceFlock::new(position, velocity).unwrap();
    let vp = params(0.1);
    let pp = PositionUniforms {
      delta: 0.1,
      speed_scale: 1.0,
      ..Default::default()
    };
    flock.step(&vp, &pp);
    // the position pass used the velocity from before the step
    assert_eq!(flock.position().load(0, 0)[0], 0.2);
    assert_eq!(flock.position().load(0, 0)[1], 10.0);
    assert!((flock.velocity().load(0, 0)[1] + 0.5).abs() < 1e-6);
  }

  #[test]
  fn mismatched_texel_count_is_rejected() {
    assert!(Texture::from_texels(2, 2, vec![[0.0; 4]; 3]).is_err());
  }

  #[test]
  fn mismatched_flock_textures_are_rejected() {
    let err = ReferenceFlock::new(Texture::new(2, 2), Texture::new(4, 1)).unwrap_err();
    assert!(err.to_string().contains("2x2"));
  }
}
