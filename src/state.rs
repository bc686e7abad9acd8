use crate::camera::{Camera, CameraController, CameraUniform};
use crate::context::GpuContext;
use crate::controls::EffectController;
use crate::frame::FrameDriver;
use crate::initialize::create_flock;
use crate::render::Render;
use crate::simulation::GpuFlock;
use crate::SimConfig;
use anyhow::{anyhow, Context};
use std::sync::Arc;
use std::time::Instant;
use wgpu::util::DeviceExt;
use winit::event::ElementState;
use winit::keyboard::*;
use winit::{
  dpi::PhysicalSize,
  event::{Event, KeyEvent, StartCause, WindowEvent},
  event_loop::{EventLoop, EventLoopWindowTarget},
  window::Window,
};

struct EventLoopWrapper {
  event_loop: EventLoop<()>,
  window: Arc<Window>,
}

impl EventLoopWrapper {
  pub fn new(title: &str) -> anyhow::Result<Self> {
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    let builder = winit::window::WindowBuilder::new()
      .with_title(title)
      .with_inner_size(PhysicalSize::new(1280, 800));
    let window = Arc::new(builder.build(&event_loop).context("failed to create window")?);

    Ok(Self { event_loop, window })
  }
}

struct SurfaceWrapper {
  surface: wgpu::Surface<'static>,
  config: wgpu::SurfaceConfiguration,
}

impl SurfaceWrapper {
  fn new(
    context: &GpuContext,
    surface: wgpu::Surface<'static>,
    size: PhysicalSize<u32>,
  ) -> anyhow::Result<Self> {
    let width = size.width.max(1);
    let height = size.height.max(1);
    let mut config = surface
      .get_default_config(&context.adapter, width, height)
      .ok_or_else(|| anyhow!("surface is not supported by the adapter"))?;
    let view_format = config.format.add_srgb_suffix();
    config.view_formats.push(view_format);
    surface.configure(&context.device, &config);
    Ok(Self { surface, config })
  }

  fn resize(&mut self, context: &GpuContext, size: PhysicalSize<u32>) {
    self.config.width = size.width.max(1);
    self.config.height = size.height.max(1);
    self.surface.configure(&context.device, &self.config);
  }

  fn acquire(&mut self, context: &GpuContext) -> Option<wgpu::SurfaceTexture> {
    match self.surface.get_current_texture() {
      Ok(frame) => Some(frame),
      Err(wgpu::SurfaceError::Timeout) => {
        log::warn!("surface timed out, skipping frame");
        None
      }
      Err(
        wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost | wgpu::SurfaceError::OutOfMemory,
      ) => {
        self.surface.configure(&context.device, &self.config);
        self.surface.get_current_texture().ok()
      }
    }
  }
}

/// Everything the windowed viewer owns: GPU handles, camera, controls, the
/// flock and its renderer.
struct State {
  context: GpuContext,
  surface: SurfaceWrapper,
  camera: Camera,
  camera_uniform: CameraUniform,
  camera_buffer: wgpu::Buffer,
  camera_bind_group: wgpu::BindGroup,
  camera_controller: CameraController,
  effect_controller: EffectController,
  driver: FrameDriver,
  flock: GpuFlock,
  render: Render,
}

impl State {
  fn input(&mut self, event: &WindowEvent) -> bool {
    if self.camera_controller.process_events(event) {
      return true;
    }
    if self
      .effect_controller
      .process_events(event, &mut self.driver.params)
    {
      return true;
    }
    if let WindowEvent::CursorMoved { position, .. } = event {
      self.driver.pointer_moved(position.x as f32, position.y as f32);
      return true;
    }
    false
  }

  fn resize(&mut self, size: PhysicalSize<u32>) {
    self.surface.resize(&self.context, size);
    self.camera.resize(size.width, size.height);
    self.render
      .resize(&self.context.device, size.width, size.height);
    self.driver.resize((size.width, size.height));
  }

  fn update(&mut self) {
    self.camera_controller.update_camera(&mut self.camera);
    self.camera_uniform.update_view_proj(&self.camera);
    self.context.queue.write_buffer(
      &self.camera_buffer,
      0,
      bytemuck::cast_slice(&[self.camera_uniform]),
    );
  }

  /// One display refresh: acquire the surface, advance the clock, feed
  /// uniforms, then compute and draw in one submission.
  fn frame(&mut self) {
    let acquired = self.surface.acquire(&self.context);
    let Some((frame, frame_uniforms)) = self.driver.advance_for(acquired, Instant::now()) else {
      return;
    };
    let (velocity, position) = self.driver.uniforms(&frame_uniforms);
    self.flock.write_uniforms(&velocity, &position);

    let view = frame.texture.create_view(&wgpu::TextureViewDescriptor {
      format: Some(self.surface.config.view_formats[0]),
      ..wgpu::TextureViewDescriptor::default()
    });
    self.render.render(
      &view,
      &self.context.device,
      &self.context.queue,
      &self.camera_bind_group,
      &mut self.flock,
      frame_uniforms.time,
    );
    frame.present();
  }

  async fn init(config: &SimConfig, window: Arc<Window>) -> anyhow::Result<Self> {
    let size = window.inner_size();
    let instance = GpuContext::create_instance();
    let surface = instance
      .create_surface(window)
      .context("failed to create surface")?;
    let context = GpuContext::new(instance, Some(&surface)).await?;
    let surface = SurfaceWrapper::new(&context, surface, size)?;

    let camera = Camera::new(size.width, size.height);
    let mut camera_uniform = CameraUniform::new();
    camera_uniform.update_view_proj(&camera);

    let camera_buffer = context
      .device
      .create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Camera Buffer"),
        contents: bytemuck::cast_slice(&[camera_uniform]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
      });
    let camera_bind_group_layout =
      context
        .device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
          entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
              ty: wgpu::BufferBindingType::Uniform,
              has_dynamic_offset: false,
              min_binding_size: None,
            },
            count: None,
          }],
          label: Some("camera_bind_group_layout"),
        });
    let camera_bind_group = context
      .device
      .create_bind_group(&wgpu::BindGroupDescriptor {
        layout: &camera_bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
          binding: 0,
          resource: camera_buffer.as_entire_binding(),
        }],
        label: Some("camera_bind_group"),
      });
    let camera_controller = CameraController::init(4.0, 0.02);

    let initial = create_flock(config.width, config.seed);
    let (flock, status) = GpuFlock::new(&context.device, &context.queue, config.width, &initial);
    if let Err(err) = status {
      log::error!("{err:#}");
    }

    let render = Render::init(
      &surface.config,
      &context.device,
      &context.queue,
      &camera_bind_group_layout,
      &flock,
      config.width,
      config.appearance,
    );
    let driver = FrameDriver::new(config.params, (size.width, size.height), Instant::now());

    Ok(Self {
      context,
      surface,
      camera,
      camera_uniform,
      camera_buffer,
      camera_bind_group,
      camera_controller,
      effect_controller: EffectController,
      driver,
      flock,
      render,
    })
  }
}

/// Opens the window and runs the frame loop until it is closed.
pub fn run(config: SimConfig) -> anyhow::Result<()> {
  let EventLoopWrapper { event_loop, window } = EventLoopWrapper::new("Boids")?;
  let mut state: Option<State> = None;
  let mut init_error = None;

  event_loop
    .run(|event, target: &EventLoopWindowTarget<()>| match event {
      Event::NewEvents(StartCause::Init) => {
        if state.is_none() && init_error.is_none() {
          match pollster::block_on(State::init(&config, window.clone())) {
            Ok(new_state) => {
              state = Some(new_state);
              window.request_redraw();
            }
            Err(err) => {
              init_error = Some(err);
              target.exit();
            }
          }
        }
      }
      Event::WindowEvent { event, window_id } if window_id == window.id() => {
        let Some(state) = state.as_mut() else {
          return;
        };
        if state.input(&event) {
          return;
        }
        match event {
          WindowEvent::CloseRequested
          | WindowEvent::KeyboardInput {
            event:
              KeyEvent {
                state: ElementState::Pressed,
                physical_key: PhysicalKey::Code(KeyCode::Escape),
                ..
              },
            ..
          } => target.exit(),
          WindowEvent::Resized(size) => state.resize(size),
          WindowEvent::RedrawRequested => {
            window.request_redraw();
            state.update();
            state.frame();
          }
          _ => {}
        }
      }
      _ => {}
    })
    .context("event loop failed")?;

  match init_error {
    Some(err) => Err(err.context("failed to start the viewer")),
    None => Ok(()),
  }
}
