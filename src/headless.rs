//! Runs the flock without a window for a fixed number of frames, logging
//! statistics along the way.

use crate::context::GpuContext;
use crate::frame::FrameDriver;
use crate::initialize::{create_flock, InitialState};
use crate::kernels::{ReferenceFlock, Texture};
use crate::simulation::GpuFlock;
use crate::{Flock, SimConfig, MAX_DELTA};
use anyhow::Context;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
  /// Compute passes on the GPU
  Gpu,
  /// Host reference kernels
  Cpu,
}

#[derive(Clone, Debug)]
pub struct HeadlessOptions {
  pub frames: u32,
  /// Simulated seconds per frame, clamped to `[0, MAX_DELTA]`.
  pub delta: f32,
  pub backend: Backend,
  /// Log statistics every this many frames, 0 for only the final report.
  pub report_every: u32,
}

impl Default for HeadlessOptions {
  fn default() -> Self {
    Self {
      frames: 600,
      delta: 1.0 / 60.0,
      backend: Backend::Gpu,
      report_every: 60,
    }
  }
}

fn reference_flock(width: u32, initial: InitialState) -> anyhow::Result<ReferenceFlock> {
  ReferenceFlock::new(
    Texture::from_texels(width, width, initial.positions)?,
    Texture::from_texels(width, width, initial.velocities)?,
  )
}

fn create_backend(config: &SimConfig, backend: Backend) -> anyhow::Result<Box<dyn Flock>> {
  let initial = create_flock(config.width, config.seed);
  match backend {
    Backend::Cpu => Ok(Box::new(reference_flock(config.width, initial)?)),
    Backend::Gpu => {
      let context = pollster::block_on(GpuContext::headless())?;
      let (flock, status) = GpuFlock::new(&context.device, &context.queue, config.width, &initial);
      if let Err(err) = status {
        log::error!("{err:#}");
      }
      Ok(Box::new(flock))
    }
  }
}

fn report(flock: &mut dyn Flock, frame: u32) -> anyhow::Result<()> {
  let state = flock
    .read_state()
    .with_context(|| format!("failed to read flock state at frame {frame}"))?;
  if !state.all_finite() {
    log::warn!("frame {frame}: non-finite texels in flock state");
  }
  log::info!(
    "frame {frame}: mean speed {:.3}, max extent {:.1}",
    state.mean_speed(),
    state.max_extent()
  );
  Ok(())
}

/// Steps the flock `options.frames` times, or until Ctrl-C.
pub fn run(config: SimConfig, options: HeadlessOptions) -> anyhow::Result<()> {
  let stop = Arc::new(AtomicBool::new(false));
  {
    let stop = Arc::clone(&stop);
    ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
      .context("failed to install Ctrl-C handler")?;
  }

  log::info!(
    "running {} boids headless on {:?} for {} frames",
    config.particle_count(),
    options.backend,
    options.frames
  );
  let mut flock = create_backend(&config, options.backend)?;

  let start = Instant::now();
  let step = Duration::from_secs_f32(options.delta.max(0.0).min(MAX_DELTA));
  let mut driver = FrameDriver::new(config.params, (1, 1), start);
  let mut now = start;
  let mut completed = 0;

  for frame in 1..=options.frames {
    if stop.load(Ordering::SeqCst) {
      log::info!("interrupted after {completed} frames");
      break;
    }
    let frame_uniforms = driver.advance(now);
    let (velocity, position) = driver.uniforms(&frame_uniforms);
    flock.step(&velocity, &position);
    completed = frame;
    now += step;

    if options.report_every > 0 && frame % options.report_every == 0 {
      report(flock.as_mut(), frame)?;
    }
  }

  report(flock.as_mut(), completed)?;
  log::info!("finished in {:.2?}", start.elapsed());
  Ok(())
}
