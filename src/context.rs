use anyhow::{anyhow, Context};
use std::sync::Arc;

/// Device and queue shared by the compute scheduler and the renderer.
pub struct GpuContext {
  pub instance: wgpu::Instance,
  pub adapter: wgpu::Adapter,
  pub device: Arc<wgpu::Device>,
  pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
  pub fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
      #[cfg(not(target_arch = "wasm32"))]
      backends: wgpu::Backends::PRIMARY,
      ..Default::default()
    })
  }

  /// Requests an adapter able to present to `surface`, or any adapter when
  /// running headless.
  pub async fn new(
    instance: wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
  ) -> anyhow::Result<Self> {
    let adapter = instance
      .request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: surface,
        force_fallback_adapter: false,
      })
      .await
      .ok_or_else(|| anyhow!("no adapter available"))?;

    log::info!("adapter selected: {:?}", adapter.get_info());

    let (device, queue) = adapter
      .request_device(
        &wgpu::DeviceDescriptor {
          label: Some("boids device"),
          required_features: wgpu::Features::empty(),
          required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
          memory_hints: Default::default(),
        },
        None,
      )
      .await
      .context("failed to request device")?;

    Ok(Self {
      instance,
      adapter,
      device: Arc::new(device),
      queue: Arc::new(queue),
    })
  }

  pub async fn headless() -> anyhow::Result<Self> {
    Self::new(Self::create_instance(), None).await
  }
}
