use crate::initialize::{atlas_indices, create_atlas};
use crate::simulation::GpuFlock;
use crate::Appearance;
use std::borrow::Cow;
use wgpu::{util::DeviceExt, PipelineCompilationOptions};

const BIRD_VERTICES: u32 = 9;
const QUAD_VERTICES: u32 = 6;
/// Half size of a sprite quad in clip units before the perspective divide.
const SPRITE_SIZE: f32 = 12.0;
const FOG_NEAR: f32 = 100.0;
const FOG_FAR: f32 = 1000.0;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Mirrors `RenderParams` in `shaders/render.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct RenderParams {
  texture_width: u32,
  atlas_grid: u32,
  sprite_size: f32,
  aspect: f32,
  fog_near: f32,
  fog_far: f32,
  time: f32,
  particle_count: u32,
}

const _: () = assert!(std::mem::size_of::<RenderParams>() == 32);

/// Bird meshes are depth tested; sprites are blended in draw order.
pub fn depth_stencil_state(appearance: Appearance) -> Option<wgpu::DepthStencilState> {
  match appearance {
    Appearance::Birds => Some(wgpu::DepthStencilState {
      format: DEPTH_FORMAT,
      depth_write_enabled: true,
      depth_compare: wgpu::CompareFunction::Less,
      stencil: wgpu::StencilState::default(),
      bias: wgpu::DepthBiasState::default(),
    }),
    Appearance::Sprites => None,
  }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
  let texture = device.create_texture(&wgpu::TextureDescriptor {
    label: Some("Depth Texture"),
    size: wgpu::Extent3d {
      width: width.max(1),
      height: height.max(1),
      depth_or_array_layers: 1,
    },
    mip_level_count: 1,
    sample_count: 1,
    dimension: wgpu::TextureDimension::D2,
    format: DEPTH_FORMAT,
    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
    view_formats: &[],
  });
  texture.create_view(&wgpu::TextureViewDescriptor::default())
}

pub struct Render {
  appearance: Appearance,
  /// Present only when the pipeline depth tests.
  depth_view: Option<wgpu::TextureView>,
  params: RenderParams,
  params_buffer: wgpu::Buffer,
  atlas_index_buffer: wgpu::Buffer,
  /// One per simulation generation.
  flock_bind_groups: Vec<wgpu::BindGroup>,
  render_pipeline: wgpu::RenderPipeline,
  particle_count: u32,
}

impl Render {
  #[must_use]
  pub fn init(
    config: &wgpu::SurfaceConfiguration,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
    flock: &GpuFlock,
    width: u32,
    appearance: Appearance,
  ) -> Self {
    let particle_count = width * width;
    let draw_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
      label: Some("render.wgsl"),
      source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/render.wgsl"))),
    });

    let atlas = create_atlas();
    let params = RenderParams {
      texture_width: width,
      atlas_grid: atlas.grid,
      sprite_size: SPRITE_SIZE,
      aspect: config.width.max(1) as f32 / config.height.max(1) as f32,
      fog_near: FOG_NEAR,
      fog_far: FOG_FAR,
      time: 0.0,
      particle_count,
    };
    let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
      label: Some("Render Parameter Buffer"),
      contents: bytemuck::bytes_of(&params),
      usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });

    let atlas_texture = device.create_texture_with_data(
      queue,
      &wgpu::TextureDescriptor {
        label: Some("Appearance Atlas"),
        size: wgpu::Extent3d {
          width: atlas.size,
          height: atlas.size,
          depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
      },
      wgpu::util::TextureDataOrder::LayerMajor,
      &atlas.pixels,
    );
    let atlas_view = atlas_texture.create_view(&wgpu::TextureViewDescriptor::default());
    let atlas_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
      label: Some("Atlas Sampler"),
      mag_filter: wgpu::FilterMode::Linear,
      min_filter: wgpu::FilterMode::Linear,
      ..Default::default()
    });

    let atlas_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
      label: Some("Atlas Index Buffer"),
      contents: bytemuck::cast_slice(&atlas_indices(particle_count)),
      usage: wgpu::BufferUsages::VERTEX,
    });

    // ========================================================================
    // flock bind groups
    // ========================================================================

    let simulation_texture = |binding| wgpu::BindGroupLayoutEntry {
      binding,
      visibility: wgpu::ShaderStages::VERTEX,
      ty: wgpu::BindingType::Texture {
        sample_type: wgpu::TextureSampleType::Float { filterable: false },
        view_dimension: wgpu::TextureViewDimension::D2,
        multisampled: false,
      },
      count: None,
    };
    let flock_bind_group_layout =
      device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
          wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
              ty: wgpu::BufferBindingType::Uniform,
              has_dynamic_offset: false,
              min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<RenderParams>() as _),
            },
            count: None,
          },
          simulation_texture(1),
          simulation_texture(2),
          wgpu::BindGroupLayoutEntry {
            binding: 3,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
              sample_type: wgpu::TextureSampleType::Float { filterable: true },
              view_dimension: wgpu::TextureViewDimension::D2,
              multisampled: false,
            },
            count: None,
          },
          wgpu::BindGroupLayoutEntry {
            binding: 4,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
          },
        ],
        label: Some("flock_bind_group_layout"),
      });
    let flock_bind_groups = (0..2)
      .map(|generation| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
          layout: &flock_bind_group_layout,
          entries: &[
            wgpu::BindGroupEntry {
              binding: 0,
              resource: params_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
              binding: 1,
              resource: wgpu::BindingResource::TextureView(flock.position_view(generation)),
            },
            wgpu::BindGroupEntry {
              binding: 2,
              resource: wgpu::BindingResource::TextureView(flock.velocity_view(generation)),
            },
            wgpu::BindGroupEntry {
              binding: 3,
              resource: wgpu::BindingResource::TextureView(&atlas_view),
            },
            wgpu::BindGroupEntry {
              binding: 4,
              resource: wgpu::BindingResource::Sampler(&atlas_sampler),
            },
          ],
          label: Some(&format!("flock_bind_group_{generation}")),
        })
      })
      .collect();

    // ========================================================================
    // render pipeline stuff
    // ========================================================================

    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
      label: Some("render"),
      bind_group_layouts: &[camera_bind_group_layout, &flock_bind_group_layout],
      push_constant_ranges: &[],
    });
    let atlas_index_layout = wgpu::VertexBufferLayout {
      array_stride: std::mem::size_of::<u32>() as u64,
      step_mode: wgpu::VertexStepMode::Instance,
      attributes: &wgpu::vertex_attr_array![0 => Uint32],
    };
    let (vs_entry, fs_entry, buffers) = match appearance {
      Appearance::Birds => ("vs_birds", "fs_birds", vec![]),
      Appearance::Sprites => ("vs_sprites", "fs_sprites", vec![atlas_index_layout]),
    };
    let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
      label: Some("Render Pipeline"),
      layout: Some(&render_pipeline_layout),
      vertex: wgpu::VertexState {
        module: &draw_shader,
        entry_point: vs_entry,
        compilation_options: PipelineCompilationOptions::default(),
        buffers: &buffers,
      },
      fragment: Some(wgpu::FragmentState {
        module: &draw_shader,
        entry_point: fs_entry,
        compilation_options: PipelineCompilationOptions::default(),
        targets: &[Some(wgpu::ColorTargetState {
          format: config.view_formats[0],
          blend: Some(wgpu::BlendState::ALPHA_BLENDING),
          write_mask: wgpu::ColorWrites::ALL,
        })],
      }),
      primitive: wgpu::PrimitiveState::default(),
      depth_stencil: depth_stencil_state(appearance),
      multisample: wgpu::MultisampleState::default(),
      multiview: None,
      cache: None,
    });

    let depth_view = depth_stencil_state(appearance)
      .map(|_| create_depth_view(device, config.width, config.height));

    log::info!("renderer ready: {particle_count} {appearance:?}");
    Render {
      appearance,
      depth_view,
      params,
      params_buffer,
      atlas_index_buffer,
      flock_bind_groups,
      render_pipeline,
      particle_count,
    }
  }

  pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
    self.params.aspect = width.max(1) as f32 / height.max(1) as f32;
    if self.depth_view.is_some() {
      self.depth_view = Some(create_depth_view(device, width, height));
    }
  }

  /// Steps the flock and draws it in a single submission: the compute passes
  /// are encoded first, then one instanced draw reads the generation they
  /// just wrote.
  pub fn render(
    &mut self,
    view: &wgpu::TextureView,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    camera_bind_group: &wgpu::BindGroup,
    flock: &mut GpuFlock,
    time: f32,
  ) {
    self.params.time = time;
    queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&self.params));

    let color_attachments = [Some(wgpu::RenderPassColorAttachment {
      view,
      resolve_target: None,
      ops: wgpu::Operations {
        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
        store: wgpu::StoreOp::Store,
      },
    })];
    let depth_stencil_attachment =
      self
        .depth_view
        .as_ref()
        .map(|view| wgpu::RenderPassDepthStencilAttachment {
          view,
          depth_ops: Some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(1.0),
            store: wgpu::StoreOp::Store,
          }),
          stencil_ops: None,
        });
    let render_pass_descriptor = wgpu::RenderPassDescriptor {
      label: None,
      color_attachments: &color_attachments,
      depth_stencil_attachment,
      timestamp_writes: None,
      occlusion_query_set: None,
    };
    let mut command_encoder =
      device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    flock.encode(&mut command_encoder);
    {
      let mut rpass = command_encoder.begin_render_pass(&render_pass_descriptor);
      rpass.set_pipeline(&self.render_pipeline);
      rpass.set_bind_group(0, camera_bind_group, &[]);
      rpass.set_bind_group(1, &self.flock_bind_groups[flock.current_index()], &[]);
      match self.appearance {
        Appearance::Birds => rpass.draw(0..BIRD_VERTICES, 0..self.particle_count),
        Appearance::Sprites => {
          rpass.set_vertex_buffer(0, self.atlas_index_buffer.slice(..));
          rpass.draw(0..QUAD_VERTICES, 0..self.particle_count);
        }
      }
    }
    queue.submit(Some(command_encoder.finish()));
  }
}
