//! Ping-pong GPU computation over 2D float textures.
//!
//! Each variable owns two `Rgba32Float` textures. Every `compute` call runs
//! one compute pass per variable; all passes read the textures of the current
//! generation and write the other one, and the generations are swapped once at
//! the end. A variable's shader sees its uniform block at binding 0, its
//! dependencies at bindings `1..=n` in declaration order and its output storage
//! texture at binding `n + 1`.

use crate::pingpong::PingPong;
use anyhow::{anyhow, bail, Context};
use std::borrow::Cow;
use wgpu::{util::DeviceExt, PipelineCompilationOptions};

pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
const TEXEL_SIZE: u32 = 16;
const WORKGROUP_SIZE: u32 = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VariableId(usize);

struct Variable {
  name: String,
  shader_source: String,
  textures: PingPong<wgpu::Texture>,
  views: PingPong<wgpu::TextureView>,
  uniform_buffer: wgpu::Buffer,
  dependencies: Vec<VariableId>,
  pipeline: Option<wgpu::ComputePipeline>,
  /// Indexed by the generation being read.
  bind_groups: Vec<wgpu::BindGroup>,
}

pub struct GpuComputation {
  width: u32,
  height: u32,
  variables: Vec<Variable>,
  /// Generation holding the latest results. Shared by every variable so all
  /// of them swap together.
  current: usize,
  ready: bool,
  warned_not_ready: bool,
}

impl GpuComputation {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      variables: Vec::new(),
      current: 0,
      ready: false,
      warned_not_ready: false,
    }
  }

  pub fn size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  /// Registers a variable whose both generations start from `initial`.
  /// `uniform_size` is the byte size of the block at binding 0.
  pub fn add_variable(
    &mut self,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    name: &str,
    shader_source: &str,
    initial: &[[f32; 4]],
    uniform_size: u64,
  ) -> VariableId {
    let size = self.extent();
    let create = |generation: usize| {
      device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
          label: Some(&format!("{name} texture {generation}")),
          size,
          mip_level_count: 1,
          sample_count: 1,
          dimension: wgpu::TextureDimension::D2,
          format: TEXTURE_FORMAT,
          usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
          view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        bytemuck::cast_slice(initial),
      )
    };
    let textures = PingPong::new(create(0), create(1));
    let views = PingPong::new(
      textures.get(0).create_view(&wgpu::TextureViewDescriptor::default()),
      textures.get(1).create_view(&wgpu::TextureViewDescriptor::default()),
    );
    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
      label: Some(&format!("{name} uniforms")),
      size: uniform_size,
      usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
      mapped_at_creation: false,
    });

    self.variables.push(Variable {
      name: name.to_owned(),
      shader_source: shader_source.to_owned(),
      textures,
      views,
      uniform_buffer,
      dependencies: Vec::new(),
      pipeline: None,
      bind_groups: Vec::new(),
    });
    self.ready = false;
    VariableId(self.variables.len() - 1)
  }

  pub fn set_dependencies(&mut self, variable: VariableId, dependencies: &[VariableId]) {
    self.variables[variable.0].dependencies = dependencies.to_vec();
    self.ready = false;
  }

  /// Builds pipelines and bind groups. Shader and pipeline validation errors
  /// raised by the backend are returned instead of being left to the device's
  /// uncaptured error handler.
  pub fn init(&mut self, device: &wgpu::Device) -> anyhow::Result<()> {
    self.ready = false;
    self.check(device)?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    for index in 0..self.variables.len() {
      self.build_variable(device, index);
    }
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
      for variable in &mut self.variables {
        variable.pipeline = None;
        variable.bind_groups.clear();
      }
      bail!("compute pipeline setup failed: {error}");
    }

    self.ready = true;
    log::info!(
      "compute ready: {} variables on a {}x{} grid",
      self.variables.len(),
      self.width,
      self.height
    );
    Ok(())
  }

  fn check(&self, device: &wgpu::Device) -> anyhow::Result<()> {
    let max = device.limits().max_texture_dimension_2d;
    if self.width == 0 || self.height == 0 {
      bail!("simulation texture must not be empty");
    }
    if self.width > max || self.height > max {
      bail!(
        "simulation texture {}x{} exceeds the device limit of {max}",
        self.width,
        self.height
      );
    }
    for variable in &self.variables {
      if variable.dependencies.is_empty() {
        bail!("variable '{}' has no dependencies", variable.name);
      }
      if let Some(missing) = variable
        .dependencies
        .iter()
        .find(|dep| dep.0 >= self.variables.len())
      {
        bail!("variable '{}' depends on unknown variable {:?}", variable.name, missing);
      }
    }
    Ok(())
  }

  fn build_variable(&mut self, device: &wgpu::Device, index: usize) {
    let variable = &self.variables[index];
    let output_binding = variable.dependencies.len() as u32 + 1;

    let mut entries = vec![wgpu::BindGroupLayoutEntry {
      binding: 0,
      visibility: wgpu::ShaderStages::COMPUTE,
      ty: wgpu::BindingType::Buffer {
        ty: wgpu::BufferBindingType::Uniform,
        has_dynamic_offset: false,
        min_binding_size: wgpu::BufferSize::new(variable.uniform_buffer.size()),
      },
      count: None,
    }];
    entries.extend((1..output_binding).map(|binding| wgpu::BindGroupLayoutEntry {
      binding,
      visibility: wgpu::ShaderStages::COMPUTE,
      ty: wgpu::BindingType::Texture {
        sample_type: wgpu::TextureSampleType::Float { filterable: false },
        view_dimension: wgpu::TextureViewDimension::D2,
        multisampled: false,
      },
      count: None,
    }));
    entries.push(wgpu::BindGroupLayoutEntry {
      binding: output_binding,
      visibility: wgpu::ShaderStages::COMPUTE,
      ty: wgpu::BindingType::StorageTexture {
        access: wgpu::StorageTextureAccess::WriteOnly,
        format: TEXTURE_FORMAT,
        view_dimension: wgpu::TextureViewDimension::D2,
      },
      count: None,
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
      label: Some(&format!("{} layout", variable.name)),
      entries: &entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
      label: Some(&format!("{} pipeline layout", variable.name)),
      bind_group_layouts: &[&bind_group_layout],
      push_constant_ranges: &[],
    });
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
      label: Some(&variable.name),
      source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(variable.shader_source.as_str())),
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
      label: Some(&format!("{} pipeline", variable.name)),
      layout: Some(&pipeline_layout),
      module: &shader,
      entry_point: "main",
      compilation_options: PipelineCompilationOptions::default(),
      cache: None,
    });

    let bind_groups = (0..2)
      .map(|read| {
        let mut entries = vec![wgpu::BindGroupEntry {
          binding: 0,
          resource: variable.uniform_buffer.as_entire_binding(),
        }];
        for (slot, dependency) in variable.dependencies.iter().enumerate() {
          entries.push(wgpu::BindGroupEntry {
            binding: slot as u32 + 1,
            resource: wgpu::BindingResource::TextureView(self.variables[dependency.0].views.get(read)),
          });
        }
        entries.push(wgpu::BindGroupEntry {
          binding: output_binding,
          resource: wgpu::BindingResource::TextureView(variable.views.get(1 - read)),
        });
        device.create_bind_group(&wgpu::BindGroupDescriptor {
          label: Some(&format!("{} bind group {read}", variable.name)),
          layout: &bind_group_layout,
          entries: &entries,
        })
      })
      .collect();

    let variable = &mut self.variables[index];
    variable.pipeline = Some(pipeline);
    variable.bind_groups = bind_groups;
  }

  pub fn is_ready(&self) -> bool {
    self.ready
  }

  /// Uploads the uniform block of `variable`; visible to the next `compute`.
  pub fn write_uniforms<T: bytemuck::Pod>(&self, queue: &wgpu::Queue, variable: VariableId, value: &T) {
    queue.write_buffer(
      &self.variables[variable.0].uniform_buffer,
      0,
      bytemuck::bytes_of(value),
    );
  }

  /// Encodes one pass per variable into `encoder` and flips the generation.
  /// Does nothing until `init` has succeeded.
  pub fn encode(&mut self, encoder: &mut wgpu::CommandEncoder) {
    if !self.ready {
      if !self.warned_not_ready {
        log::warn!("compute skipped: pipelines are not initialized");
        self.warned_not_ready = true;
      }
      return;
    }
    let groups_x = self.width.div_ceil(WORKGROUP_SIZE);
    let groups_y = self.height.div_ceil(WORKGROUP_SIZE);

    for variable in &self.variables {
      let Some(pipeline) = &variable.pipeline else {
        continue;
      };
      let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(&variable.name),
        timestamp_writes: None,
      });
      cpass.set_pipeline(pipeline);
      cpass.set_bind_group(0, &variable.bind_groups[self.current], &[]);
      cpass.dispatch_workgroups(groups_x, groups_y, 1);
    }
    self.current = 1 - self.current;
  }

  /// Runs one step on its own submission.
  pub fn compute(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
      label: Some("compute"),
    });
    self.encode(&mut encoder);
    queue.submit(Some(encoder.finish()));
  }

  pub fn current_index(&self) -> usize {
    self.current
  }

  pub fn texture(&self, variable: VariableId, generation: usize) -> &wgpu::Texture {
    self.variables[variable.0].textures.get(generation)
  }

  pub fn view(&self, variable: VariableId, generation: usize) -> &wgpu::TextureView {
    self.variables[variable.0].views.get(generation)
  }

  pub fn current_texture(&self, variable: VariableId) -> &wgpu::Texture {
    self.texture(variable, self.current)
  }

  pub fn current_view(&self, variable: VariableId) -> &wgpu::TextureView {
    self.view(variable, self.current)
  }

  /// Copies the current generation of `variable` back to the host, one
  /// `[f32; 4]` per texel in row-major order.
  pub fn read_texels(
    &self,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    variable: VariableId,
  ) -> anyhow::Result<Vec<[f32; 4]>> {
    let unpadded_row = self.width * TEXEL_SIZE;
    let padded_row = unpadded_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
      * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
      label: Some("texel readback"),
      size: u64::from(padded_row) * u64::from(self.height),
      usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
      mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
      label: Some("texel readback"),
    });
    encoder.copy_texture_to_buffer(
      wgpu::ImageCopyTexture {
        texture: self.current_texture(variable),
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
      },
      wgpu::ImageCopyBuffer {
        buffer: &staging,
        layout: wgpu::ImageDataLayout {
          offset: 0,
          bytes_per_row: Some(padded_row),
          rows_per_image: Some(self.height),
        },
      },
      self.extent(),
    );
    queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
      let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::Maintain::Wait);
    rx.recv()
      .context("readback callback was dropped")?
      .map_err(|e| anyhow!("failed to map readback buffer: {e}"))?;

    let texels = {
      let data = slice.get_mapped_range();
      data
        .chunks_exact(padded_row as usize)
        .flat_map(|row| {
          bytemuck::cast_slice::<u8, [f32; 4]>(&row[..unpadded_row as usize]).iter().copied()
        })
        .collect()
    };
    staging.unmap();
    Ok(texels)
  }

  fn extent(&self) -> wgpu::Extent3d {
    wgpu::Extent3d {
      width: self.width,
      height: self.height,
      depth_or_array_layers: 1,
    }
  }
}
