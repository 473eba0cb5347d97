#![warn(missing_docs)]
//! loopbench CLI Library
//!
//! Command-line front end of the capture benchmark: provisions (or adopts)
//! a capture device, then runs either one ad-hoc configuration or the
//! scenario table against it.
//!
//! # Example
//!
//! ```ignore
//! use loopbench::TrackingAllocator;
//!
//! #[global_allocator]
//! static GLOBAL: TrackingAllocator = TrackingAllocator;
//!
//! fn main() -> anyhow::Result<()> {
//!     loopbench_cli::run()
//! }
//! ```

mod capture;
mod config;
mod executor;
mod orchestrator;
mod scenarios;

pub use capture::{CaptureWriter, OutputCapture, ScenarioOutput};
pub use config::*;
pub use executor::{
    BenchmarkConfig, BenchmarkExecutor, ExecutorError, MemoryProfile, ProfilingError,
    ProfilingSession, TraceSink, build_run_meta, format_results, write_memory_profile,
};
pub use orchestrator::{
    ArtifactPaths, RunError, RunReport, RunSettings, ScenarioOrchestrator,
};
pub use scenarios::{BenchmarkScenario, SCENARIOS, format_scenario_list, select_scenarios};

use anyhow::Context;
use clap::Parser;
use loopbench_core::{CaptureBackend, PixelFormat};
use loopbench_loopback::{VirtualDevice, VirtualDeviceProvisioner, device_path};
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// loopbench CLI arguments
///
/// Long options are also accepted with a single dash (`-device`, `-list`).
#[derive(Parser, Debug)]
#[command(name = "loopbench")]
#[command(author, version, about = "loopbench - V4L2 frame capture benchmark")]
pub struct Cli {
    /// Use an existing capture device (e.g., /dev/video0) instead of a loopback device
    #[arg(long)]
    pub device: Option<PathBuf>,

    /// Loopback device number (/dev/videoN)
    #[arg(long, default_value_t = 50)]
    pub loopback_num: u32,

    /// Generator test pattern: testsrc, smptebars, color=<color>
    #[arg(long, default_value = "testsrc")]
    pub test_pattern: String,

    /// Capture duration per benchmark (e.g., 10s, 500ms)
    #[arg(long)]
    pub duration: Option<String>,

    /// Output directory (default: <prefix>_<timestamp>)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Run a specific scenario by name (all when omitted)
    #[arg(long)]
    pub scenario: Option<String>,

    /// List available scenarios and exit
    #[arg(long)]
    pub list: bool,

    /// Run a single benchmark with custom parameters
    #[arg(long)]
    pub single: bool,

    /// Frame width
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// Frame height
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Pixel format: MJPEG, YUYV, H264
    #[arg(long, default_value = "MJPEG")]
    pub format: String,

    /// Number of driver buffers
    #[arg(long)]
    pub buffers: Option<u32>,

    /// Write CPU profile to file (single mode)
    #[arg(long)]
    pub cpuprofile: Option<PathBuf>,

    /// Write memory profile to file (single mode)
    #[arg(long)]
    pub memprofile: Option<PathBuf>,

    /// Write execution trace to file (single mode)
    #[arg(long)]
    pub trace: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Rewrite single-dash long options (`-device`) to the `--device` form
///
/// Short flags (`-v`), values that look like numbers and everything after
/// `--` are left alone.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut passthrough = false;
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if i == 0 || passthrough {
                return arg;
            }
            let Some(s) = arg.to_str().map(str::to_owned) else {
                return arg;
            };
            if s == "--" {
                passthrough = true;
                return arg;
            }
            let mut chars = s.chars();
            let is_single_dash_long = chars.next() == Some('-')
                && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.next().is_some();
            if is_single_dash_long {
                OsString::from(format!("-{s}"))
            } else {
                arg
            }
        })
        .collect()
}

/// Run the loopbench CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if something goes wrong.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    run_with_cli(cli)
}

enum Plan {
    Single(PixelFormat),
    Multi(Vec<BenchmarkScenario>),
}

/// Run the loopbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    if cli.list {
        print!("{}", format_scenario_list(SCENARIOS));
        return Ok(());
    }

    // Discover loopbench.toml configuration (CLI flags override)
    let config = LoopbenchConfig::discover().unwrap_or_default();
    let duration_text = cli.duration.as_deref().unwrap_or(&config.run.duration);
    let duration = LoopbenchConfig::parse_duration(duration_text)
        .with_context(|| format!("Invalid duration: {}", duration_text))?;
    if duration.is_zero() {
        anyhow::bail!("Duration must be positive: {}", duration_text);
    }
    let buffers = cli.buffers.unwrap_or(config.run.buffers);

    // Configuration errors surface before any device interaction
    let plan = if cli.single {
        let format = cli
            .format
            .parse::<PixelFormat>()
            .map_err(|_| RunError::UnknownFormat(cli.format.clone()))?;
        Plan::Single(format)
    } else {
        Plan::Multi(select_scenarios(SCENARIOS, cli.scenario.as_deref())?)
    };
    let backend = capture_backend()?;

    let mut loopback: Option<VirtualDevice> = None;
    let device = match &cli.device {
        Some(path) => {
            tracing::info!("Using real device: {}", path.display());
            path.clone()
        }
        None => {
            let provisioner = VirtualDeviceProvisioner::new(config.provision_config()?);
            provisioner.check_prerequisites().context(
                "Loopback mode requires ffmpeg and v4l2loopback-dkms to be installed.\n\
                 Install with: sudo apt install ffmpeg v4l2loopback-dkms",
            )?;

            tracing::info!(
                "Setting up loopback device {}...",
                device_path(cli.loopback_num).display()
            );
            let device = provisioner
                .provision(
                    cli.loopback_num,
                    cli.width,
                    cli.height,
                    cli.fps,
                    &cli.test_pattern,
                )
                .context("Failed to setup loopback device")?;
            tracing::info!("Loopback device ready at {}", device.path().display());
            let path = device.path().to_path_buf();
            loopback = Some(device);
            path
        }
    };

    let executor = BenchmarkExecutor::new(backend);
    let outcome = match plan {
        Plan::Single(format) => {
            let config = BenchmarkConfig {
                device_path: device,
                width: cli.width,
                height: cli.height,
                pixel_format: format,
                fps: cli.fps,
                duration,
                buffer_count: buffers,
                cpu_profile: cli.cpuprofile.clone(),
                mem_profile: cli.memprofile.clone(),
                trace_file: cli.trace.clone(),
                verbose: cli.verbose,
            };
            run_single(&executor, &config)
        }
        Plan::Multi(scenarios) => {
            let output_dir = cli.output.clone().unwrap_or_else(|| {
                PathBuf::from(format!(
                    "{}_{}",
                    config.run.output_prefix,
                    chrono::Local::now().format("%Y%m%d_%H%M%S")
                ))
            });
            let settings = RunSettings {
                device_path: device,
                duration,
                buffer_count: buffers,
                output_dir,
                verbose: cli.verbose,
            };
            run_multi(executor, settings, &scenarios)
        }
    };

    // Teardown problems are reported but never replace the run's outcome
    if let Some(mut device) = loopback {
        if let Err(e) = device.release() {
            tracing::warn!("Failed to release loopback device: {}", e);
        }
    }

    outcome
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "loopbench=debug"
    } else {
        "loopbench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded or under test
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(all(feature = "v4l2", target_os = "linux"))]
fn capture_backend() -> anyhow::Result<Arc<dyn CaptureBackend>> {
    Ok(Arc::new(loopbench_core::V4lBackend))
}

#[cfg(not(all(feature = "v4l2", target_os = "linux")))]
fn capture_backend() -> anyhow::Result<Arc<dyn CaptureBackend>> {
    anyhow::bail!("This build has no V4L2 capture support (enable the `v4l2` feature on Linux)")
}

fn run_single(executor: &BenchmarkExecutor, config: &BenchmarkConfig) -> anyhow::Result<()> {
    let results = executor
        .run(config, &ScenarioOutput::Stderr)
        .with_context(|| format!("Benchmark on {} failed", config.device_path.display()))?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(format_results(config, &results).as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn run_multi(
    executor: BenchmarkExecutor,
    settings: RunSettings,
    scenarios: &[BenchmarkScenario],
) -> anyhow::Result<()> {
    let orchestrator = ScenarioOrchestrator::new(executor, settings);
    let mut stdout = std::io::stdout().lock();
    let report = orchestrator.run(scenarios, &mut stdout)?;
    stdout.flush()?;

    tracing::debug!(
        "Run finished: {} scenarios, {} succeeded",
        report.summary.scenarios.len(),
        report.summary.count(loopbench_report::ScenarioStatus::Success)
    );
    Ok(())
}
