use boids_gpgpu::headless::{Backend, HeadlessOptions};
use boids_gpgpu::{Appearance, SimConfig, SimParams, MAX_DISTANCE, MAX_FREEDOM};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::process::ExitCode;

/// GPU flocking simulation with ping-ponged position and velocity textures
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
  /// Side of the simulation texture; the flock has width * width boids
  #[arg(short, long, default_value_t = 128, value_parser = clap::value_parser!(u32).range(1..=2048))]
  width: u32,
  /// Distance under which boids steer apart
  #[arg(long, default_value_t = 20.0, value_parser = distance)]
  separation: f32,
  /// Width of the shell in which boids match velocities
  #[arg(long, default_value_t = 20.0, value_parser = distance)]
  alignment: f32,
  /// Width of the shell in which boids steer together
  #[arg(long, default_value_t = 20.0, value_parser = distance)]
  cohesion: f32,
  /// Scale applied to neighbor steering
  #[arg(long, default_value_t = 0.75, value_parser = freedom)]
  freedom: f32,
  /// Seed for the initial flock
  #[arg(long, default_value_t = 42)]
  seed: u64,
  #[arg(long, value_enum, default_value_t = Appearance::Sprites)]
  appearance: Appearance,
  /// Run in headless mode (no window)
  #[arg(long, default_value_t = false)]
  headless: bool,
  /// Frames to simulate in headless mode
  #[arg(long, default_value_t = 600)]
  frames: u32,
  /// Seconds per headless frame
  #[arg(long, default_value_t = 1.0 / 60.0, value_parser = finite)]
  delta: f32,
  /// Where headless frames are computed
  #[arg(long, value_enum, default_value_t = Backend::Gpu)]
  backend: Backend,
  /// Frames between headless statistics reports (0 for only the last)
  #[arg(long, default_value_t = 60)]
  report_every: u32,
  #[command(subcommand)]
  command: Option<Commands>,
}

fn finite(arg: &str) -> Result<f32, String> {
  let value: f32 = arg.parse().map_err(|e| format!("{e}"))?;
  if value.is_finite() {
    Ok(value)
  } else {
    Err(format!("{arg} is not a finite number"))
  }
}

fn in_range(arg: &str, max: f32) -> Result<f32, String> {
  let value = finite(arg)?;
  if (0.0..=max).contains(&value) {
    Ok(value)
  } else {
    Err(format!("{value} is not in 0..={max}"))
  }
}

fn distance(arg: &str) -> Result<f32, String> {
  in_range(arg, MAX_DISTANCE)
}

fn freedom(arg: &str) -> Result<f32, String> {
  in_range(arg, MAX_FREEDOM)
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Generate shell completion scripts
  Completions {
    /// The shell to generate the script for
    #[arg(value_enum)]
    shell: Shell,
  },
}

impl Args {
  fn config(&self) -> SimConfig {
    SimConfig {
      width: self.width,
      seed: self.seed,
      params: SimParams {
        separation: self.separation,
        alignment: self.alignment,
        cohesion: self.cohesion,
        freedom: self.freedom,
      }
      .clamped(),
      appearance: self.appearance,
    }
  }

  fn headless_options(&self) -> HeadlessOptions {
    HeadlessOptions {
      frames: self.frames,
      delta: self.delta,
      backend: self.backend,
      report_every: self.report_every,
    }
  }
}

fn main() -> ExitCode {
  let args = Args::parse();

  if let Some(Commands::Completions { shell }) = args.command {
    let mut cmd = Args::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    return ExitCode::SUCCESS;
  }

  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let config = args.config();
  let result = if args.headless {
    boids_gpgpu::headless::run(config, args.headless_options())
  } else {
    boids_gpgpu::state::run(config)
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      log::error!("{err:#}");
      ExitCode::FAILURE
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cli_is_well_formed() {
    Args::command().debug_assert();
  }

  #[test]
  fn out_of_range_distances_are_rejected() {
    assert!(Args::try_parse_from(["boids-gpgpu", "--separation", "400"]).is_err());
    assert!(Args::try_parse_from(["boids-gpgpu", "--cohesion=-2"]).is_err());
    let args = Args::parse_from(["boids-gpgpu", "--separation", "100", "--cohesion", "0"]);
    let config = args.config();
    assert_eq!(config.params.separation, 100.0);
    assert_eq!(config.params.cohesion, 0.0);
    assert_eq!(config.params.alignment, 20.0);
  }

  #[test]
  fn non_finite_parameters_are_rejected() {
    for flag in ["--separation", "--alignment", "--cohesion", "--freedom", "--delta"] {
      for value in ["NaN", "inf", "-inf"] {
        let arg = format!("{flag}={value}");
        assert!(
          Args::try_parse_from(["boids-gpgpu", arg.as_str()]).is_err(),
          "{arg} was accepted"
        );
      }
    }
    assert!(Args::try_parse_from(["boids-gpgpu", "--freedom", "3"]).is_err());
  }

  #[test]
  fn accepted_parameters_keep_the_flock_finite() {
    use boids_gpgpu::kernels::{ReferenceFlock, Texture};
    use boids_gpgpu::{Flock, FrameUniforms, PositionUniforms, VelocityUniforms};

    let args = Args::parse_from(["boids-gpgpu", "--separation", "0", "--freedom", "1", "--width", "2"]);
    let config = args.config();
    let initial = boids_gpgpu::initialize::create_flock(config.width, config.seed);
    let mut flock = ReferenceFlock::new(
      Texture::from_texels(2, 2, initial.positions).unwrap(),
      Texture::from_texels(2, 2, initial.velocities).unwrap(),
    )
    .unwrap();
    let frame = FrameUniforms {
      time: 0.0,
      delta: args.delta,
      predator: [0.0, 0.0, 0.0],
    };
    let velocity = VelocityUniforms::new(&config.params, &frame);
    let position = PositionUniforms::new(&frame);
    for _ in 0..3 {
      flock.step(&velocity, &position);
    }
    assert!(flock.read_state().unwrap().all_finite());
  }

  #[test]
  fn headless_flags_parse() {
    let args = Args::parse_from([
      "boids-gpgpu",
      "--headless",
      "--backend",
      "cpu",
      "--frames",
      "10",
      "--appearance",
      "birds",
    ]);
    assert!(args.headless);
    assert_eq!(args.backend, Backend::Cpu);
    assert_eq!(args.frames, 10);
    assert_eq!(args.config().appearance, Appearance::Birds);
  }
}
