use crate::BOUNDS;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::f32::consts::PI;

/// Number of distinct cells in the appearance atlas.
pub const ATLAS_CELLS: u32 = 150;
pub const ATLAS_CELL_SIZE: u32 = 64;

/// Initial contents of both simulation textures.
pub struct InitialState {
  pub positions: Vec<[f32; 4]>,
  pub velocities: Vec<[f32; 4]>,
}

/// Scatters `width * width` boids through the bounding cube with small random
/// velocities. The same seed always yields the same flock.
#[must_use]
pub fn create_flock(width: u32, seed: u64) -> InitialState {
  let count = (width * width) as usize;
  let mut rng = SmallRng::seed_from_u64(seed);

  let positions = (0..count)
    .map(|_| {
      [
        rng.gen::<f32>() * BOUNDS - BOUNDS / 2.0,
        rng.gen::<f32>() * BOUNDS - BOUNDS / 2.0,
        rng.gen::<f32>() * BOUNDS - BOUNDS / 2.0,
        1.0,
      ]
    })
    .collect();
  let velocities = (0..count)
    .map(|_| {
      [
        (rng.gen::<f32>() - 0.5) * 10.0,
        (rng.gen::<f32>() - 0.5) * 10.0,
        (rng.gen::<f32>() - 0.5) * 10.0,
        1.0,
      ]
    })
    .collect();

  InitialState {
    positions,
    velocities,
  }
}

/// Atlas cell of every instance, fixed for the lifetime of the flock.
#[must_use]
pub fn atlas_indices(count: u32) -> Vec<u32> {
  (0..count).map(|i| i % ATLAS_CELLS).collect()
}

pub fn atlas_grid_width() -> u32 {
  (ATLAS_CELLS as f32).sqrt().ceil() as u32
}

/// RGBA8 atlas image, `grid * cell_size` pixels square.
pub struct AtlasImage {
  pub grid: u32,
  pub size: u32,
  pub pixels: Vec<u8>,
}

/// Paints one round "face" per cell, each with its own hue, so neighbouring
/// sprites are easy to tell apart.
#[must_use]
pub fn create_atlas() -> AtlasImage {
  let grid = atlas_grid_width();
  let size = grid * ATLAS_CELL_SIZE;
  let mut pixels = vec![0u8; (size * size * 4) as usize];
  let radius = ATLAS_CELL_SIZE as f32 * 0.45;

  for cell in 0..ATLAS_CELLS {
    let origin_x = (cell % grid) * ATLAS_CELL_SIZE;
    let origin_y = (cell / grid) * ATLAS_CELL_SIZE;
    let hue = cell as f32 / ATLAS_CELLS as f32;
    let face = hsv_to_rgb(hue, 0.65, 1.0);
    let rim = hsv_to_rgb(hue, 0.8, 0.6);

    for py in 0..ATLAS_CELL_SIZE {
      for px in 0..ATLAS_CELL_SIZE {
        let dx = px as f32 + 0.5 - ATLAS_CELL_SIZE as f32 / 2.0;
        let dy = py as f32 + 0.5 - ATLAS_CELL_SIZE as f32 / 2.0;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist > radius {
          continue;
        }

        let eye = [-0.35, 0.35]
          .iter()
          .any(|side| ((dx - side * radius).powi(2) + (dy + 0.25 * radius).powi(2)).sqrt() < radius * 0.12);
        let mouth_angle = dy.atan2(dx);
        let mouth = (dist - radius * 0.55).abs() < radius * 0.06
          && mouth_angle > PI * 0.2
          && mouth_angle < PI * 0.8;

        let rgb = if eye || mouth || dist > radius * 0.9 {
          rim
        } else {
          face
        };
        let offset = (((origin_y + py) * size + origin_x + px) * 4) as usize;
        pixels[offset..offset + 3].copy_from_slice(&rgb);
        pixels[offset + 3] = 255;
      }
    }
  }

  AtlasImage { grid, size, pixels }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
  let sector = (h * 6.0).rem_euclid(6.0);
  let c = v * s;
  let x = c * (1.0 - ((sector % 2.0) - 1.0).abs());
  let (r, g, b) = match sector as u32 {
    0 => (c, x, 0.0),
    1 => (x, c, 0.0),
    2 => (0.0, c, x),
    3 => (0.0, x, c),
    4 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };
  let m = v - c;
  [
    ((r + m) * 255.0).round() as u8,
    ((g + m) * 255.0).round() as u8,
    ((b + m) * 255.0).round() as u8,
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::BOUNDS_HALF;

  #[test]
  fn flock_starts_inside_bounds() {
    let state = create_flock(16, 7);
    assert_eq!(state.positions.len(), 256);
    assert_eq!(state.velocities.len(), 256);
    for p in &state.positions {
      assert!(p[..3].iter().all(|c| c.abs() <= BOUNDS_HALF));
      assert_eq!(p[3], 1.0);
    }
    for v in &state.velocities {
      assert!(v[..3].iter().all(|c| c.abs() <= 5.0));
    }
  }

  #[test]
  fn seed_reproduces_flock() {
    let a = create_flock(8, 42);
    let b = create_flock(8, 42);
    let c = create_flock(8, 43);
    assert_eq!(a.positions, b.positions);
    assert_eq!(a.velocities, b.velocities);
    assert_ne!(a.positions, c.positions);
  }

  #[test]
  fn atlas_indices_cycle_through_cells() {
    let indices = atlas_indices(ATLAS_CELLS + 3);
    assert_eq!(indices[0], 0);
    assert_eq!(indices[ATLAS_CELLS as usize - 1], ATLAS_CELLS - 1);
    assert_eq!(indices[ATLAS_CELLS as usize], 0);
  }

  #[test]
  fn atlas_covers_every_cell() {
    let atlas = create_atlas();
    assert_eq!(atlas.grid, 13);
    assert_eq!(atlas.pixels.len(), (atlas.size * atlas.size * 4) as usize);
    // center pixel of the last cell is opaque
    let last = ATLAS_CELLS - 1;
    let cx = (last % atlas.grid) * ATLAS_CELL_SIZE + ATLAS_CELL_SIZE / 2;
    let cy = (last / atlas.grid) * ATLAS_CELL_SIZE + ATLAS_CELL_SIZE / 2;
    assert_eq!(atlas.pixels[((cy * atlas.size + cx) * 4 + 3) as usize], 255);
  }
}
