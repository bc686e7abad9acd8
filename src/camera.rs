use cgmath::{InnerSpace, Rad, Rotation, Rotation3, SquareMatrix};
use winit::{
  event::{ElementState, KeyEvent, WindowEvent},
  keyboard::{KeyCode, PhysicalKey},
};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

pub struct Camera {
  pub eye: cgmath::Point3<f32>,
  pub target: cgmath::Point3<f32>,
  pub up: cgmath::Vector3<f32>,
  pub aspect: f32,
  pub fovy: f32,
  pub znear: f32,
  pub zfar: f32,
}

impl Camera {
  /// Looks at the flock from 350 units down the z axis.
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      eye: (0.0, 0.0, 350.0).into(),
      target: (0.0, 0.0, 0.0).into(),
      up: cgmath::Vector3::unit_y(),
      aspect: aspect_ratio(width, height),
      fovy: 75.0,
      znear: 1.0,
      zfar: 3000.0,
    }
  }

  pub fn resize(&mut self, width: u32, height: u32) {
    self.aspect = aspect_ratio(width, height);
  }

  fn build_view_projection_matrix(&self) -> cgmath::Matrix4<f32> {
    let view = cgmath::Matrix4::look_at_rh(self.eye, self.target, self.up);
    let proj = cgmath::perspective(cgmath::Deg(self.fovy), self.aspect, self.znear, self.zfar);
    OPENGL_TO_WGPU_MATRIX * proj * view
  }
}

fn aspect_ratio(width: u32, height: u32) -> f32 {
  width.max(1) as f32 / height.max(1) as f32
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
  view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
  pub fn new() -> Self {
    Self {
      view_proj: cgmath::Matrix4::identity().into(),
    }
  }

  pub fn update_view_proj(&mut self, camera: &Camera) {
    self.view_proj = camera.build_view_projection_matrix().into();
  }
}

impl Default for CameraUniform {
  fn default() -> Self {
    Self::new()
  }
}

pub struct CameraController {
  speed: f32,
  rotation_speed: f32,
  is_forward_pressed: bool,
  is_backward_pressed: bool,
  is_left_pressed: bool,
  is_right_pressed: bool,
  is_rotate_up_pressed: bool,
  is_rotate_down_pressed: bool,
}

impl CameraController {
  pub fn init(speed: f32, rotation_speed: f32) -> Self {
    Self {
      speed,
      rotation_speed,
      is_forward_pressed: false,
      is_backward_pressed: false,
      is_left_pressed: false,
      is_right_pressed: false,
      is_rotate_up_pressed: false,
      is_rotate_down_pressed: false,
    }
  }

  pub fn process_events(&mut self, event: &WindowEvent) -> bool {
    match event {
      WindowEvent::KeyboardInput {
        event:
          KeyEvent {
            state,
            physical_key: PhysicalKey::Code(keycode),
            ..
          },
        ..
      } => {
        let is_pressed = *state == ElementState::Pressed;
        match keycode {
          KeyCode::KeyW | KeyCode::ArrowUp => {
            self.is_forward_pressed = is_pressed;
            true
          }
          KeyCode::KeyA | KeyCode::ArrowLeft => {
            self.is_left_pressed = is_pressed;
            true
          }
          KeyCode::KeyS | KeyCode::ArrowDown => {
            self.is_backward_pressed = is_pressed;
            true
          }
          KeyCode::KeyD | KeyCode::ArrowRight => {
            self.is_right_pressed = is_pressed;
            true
          }
          KeyCode::KeyQ => {
            self.is_rotate_up_pressed = is_pressed;
            true
          }
          KeyCode::KeyE => {
            self.is_rotate_down_pressed = is_pressed;
            true
          }
          _ => false,
        }
      }
      _ => false,
    }
  }

  pub fn update_camera(&self, camera: &mut Camera) {
    let forward = camera.target - camera.eye;
    let forward_norm = forward.normalize();
    let forward_mag = forward.magnitude();

    // stay outside the near plane
    if self.is_forward_pressed && forward_mag > self.speed + camera.znear {
      camera.eye += forward_norm * self.speed;
    }
    if self.is_backward_pressed && forward_mag + self.speed < camera.zfar {
      camera.eye -= forward_norm * self.speed;
    }

    let right = forward_norm.cross(camera.up);
    let forward = camera.target - camera.eye;
    let forward_mag = forward.magnitude();

    if self.is_right_pressed {
      camera.eye = camera.target - (forward + right * self.speed).normalize() * forward_mag;
    }
    if self.is_left_pressed {
      camera.eye = camera.target - (forward - right * self.speed).normalize() * forward_mag;
    }

    let pitch = match (self.is_rotate_up_pressed, self.is_rotate_down_pressed) {
      (true, false) => self.rotation_speed,
      (false, true) => -self.rotation_speed,
      _ => 0.0,
    };
    if pitch != 0.0 {
      let rotation = cgmath::Quaternion::from_axis_angle(right.normalize(), Rad(pitch));
      camera.eye = camera.target - rotation.rotate_vector(forward);
      camera.up = rotation.rotate_vector(camera.up);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resize_updates_aspect_only() {
    let mut camera = Camera::new(800, 600);
    let eye = camera.eye;
    camera.resize(1000, 500);
    assert_eq!(camera.aspect, 2.0);
    assert_eq!(camera.eye, eye);
  }

  #[test]
  fn zero_sized_window_keeps_finite_aspect() {
    let camera = Camera::new(0, 0);
    assert_eq!(camera.aspect, 1.0);
  }

  #[test]
  fn flock_center_projects_to_screen_center() {
    let camera = Camera::new(800, 600);
    let clip = camera.build_view_projection_matrix() * cgmath::Vector4::new(0.0, 0.0, 0.0, 1.0);
    assert!((clip.x / clip.w).abs() < 1e-5);
    assert!((clip.y / clip.w).abs() < 1e-5);
    assert!((clip.w - 350.0).abs() < 1e-3);
  }

  #[test]
  fn frustum_edge_matches_field_of_view() {
    let camera = Camera::new(800, 800);
    let half_height = 350.0 * (37.5f32).to_radians().tan();
    let clip = camera.build_view_projection_matrix() * cgmath::Vector4::new(0.0, half_height, 0.0, 1.0);
    assert!((clip.y / clip.w - 1.0).abs() < 1e-4);
    assert!((clip.w - 350.0).abs() < 1e-3);
  }

  #[test]
  fn depth_spans_zero_to_one() {
    let camera = Camera::new(800, 600);
    let matrix = camera.build_view_projection_matrix();
    let near = matrix * cgmath::Vector4::new(0.0, 0.0, 350.0 - camera.znear, 1.0);
    let far = matrix * cgmath::Vector4::new(0.0, 0.0, 350.0 - camera.zfar, 1.0);
    assert!((near.z / near.w).abs() < 1e-4);
    assert!((far.z / far.w - 1.0).abs() < 1e-4);
  }
}
