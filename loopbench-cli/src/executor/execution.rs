//! Benchmark Execution
//!
//! Runs one capture scenario end to end against a `CaptureBackend`.
//!
//! ## Data Flow
//!
//! ```text
//!   BenchmarkConfig
//!        │
//!        ▼
//! ┌──────────────────┐   open ─> format ─> mem before ─> profiling on
//! │ BenchmarkExecutor│   start ─> collect until deadline ─> stop
//! └────────┬─────────┘   mem after ─> profiling off ─> close ─> mem profile
//!          │
//!          ▼
//!   BenchmarkResults
//! ```
//!
//! Everything the run logs goes to the `ScenarioOutput` it was handed, via a
//! subscriber scoped to the calling thread. Capture producer threads inherit
//! it through `spawn_producer`.

use crate::capture::ScenarioOutput;
use crate::executor::profiling::{
    MemoryProfile, ProfilingSession, TraceSink, write_memory_profile,
};
use loopbench_core::{
    CaptureBackend, CaptureConfig, CaptureError, PixelFormat, is_tracking, memory_snapshot,
};
use loopbench_report::{BenchmarkResults, format_duration};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

/// Scenario-fatal executor failures
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Open, format query or session start failed
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Configuration cannot produce a meaningful run
    #[error("Invalid benchmark configuration: {0}")]
    InvalidConfig(String),
}

/// Fully resolved parameters of one run
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkConfig {
    /// Capture device node
    pub device_path: PathBuf,
    /// Requested frame width
    pub width: u32,
    /// Requested frame height
    pub height: u32,
    /// Requested pixel format
    pub pixel_format: PixelFormat,
    /// Requested frame rate
    pub fps: u32,
    /// Capture window
    pub duration: Duration,
    /// Driver buffer count
    pub buffer_count: u32,
    /// CPU profile destination
    pub cpu_profile: Option<PathBuf>,
    /// Memory profile destination
    pub mem_profile: Option<PathBuf>,
    /// Execution trace destination
    pub trace_file: Option<PathBuf>,
    /// Log every dropped frame and periodic progress
    pub verbose: bool,
}

impl BenchmarkConfig {
    /// Parameters handed to the capture backend
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            pixel_format: self.pixel_format,
            width: self.width,
            height: self.height,
            fps: self.fps,
            buffer_count: self.buffer_count,
        }
    }

    fn validate(&self) -> Result<(), ExecutorError> {
        if self.width == 0 || self.height == 0 {
            return Err(ExecutorError::InvalidConfig(format!(
                "resolution {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(ExecutorError::InvalidConfig("fps must be positive".to_string()));
        }
        if self.buffer_count == 0 {
            return Err(ExecutorError::InvalidConfig(
                "at least one buffer is required".to_string(),
            ));
        }
        if self.duration.is_zero() {
            return Err(ExecutorError::InvalidConfig(
                "duration must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runs scenarios against devices opened through a capture backend
#[derive(Clone)]
pub struct BenchmarkExecutor {
    backend: Arc<dyn CaptureBackend>,
}

impl BenchmarkExecutor {
    /// Executor opening devices through `backend`
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self { backend }
    }

    /// Run one scenario, logging into `output`.
    ///
    /// Open, format and start failures end the run after the profiling
    /// session and device acquired so far have been released.
    pub fn run(
        &self,
        config: &BenchmarkConfig,
        output: &ScenarioOutput,
    ) -> Result<BenchmarkResults, ExecutorError> {
        config.validate()?;

        let trace = config.trace_file.as_deref().and_then(|path| {
            TraceSink::create(path)
                .map_err(|e| tracing::warn!("Could not create trace file: {}", e))
                .ok()
        });

        let level = if config.verbose { Level::DEBUG } else { Level::INFO };
        let subscriber = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(output.clone())
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(Targets::new().with_target("loopbench", level)),
            )
            .with(trace.as_ref().map(|sink| sink.layer()));

        tracing::subscriber::with_default(subscriber, || self.run_scoped(config, trace.as_ref()))
    }

    fn run_scoped(
        &self,
        config: &BenchmarkConfig,
        trace: Option<&TraceSink>,
    ) -> Result<BenchmarkResults, ExecutorError> {
        tracing::info!("Opening device: {}", config.device_path.display());
        tracing::info!(
            "Format: {}x{} @ {} fps ({})",
            config.width,
            config.height,
            config.fps,
            config.pixel_format
        );
        tracing::info!(
            "Duration: {}, Buffers: {}",
            format_duration(config.duration),
            config.buffer_count
        );

        let mut device = self
            .backend
            .open(&config.device_path, &config.capture_config())?;
        let actual = device.format()?;
        tracing::info!("Actual format: {}", actual);

        let session = if config.cpu_profile.is_some() || trace.is_some() {
            ProfilingSession::start(config.cpu_profile.as_deref(), trace)
                .map_err(|e| tracing::warn!("Profiling disabled for this run: {}", e))
                .ok()
        } else {
            None
        };

        let mem_before = memory_snapshot();
        let mut stream = match device.start() {
            Ok(stream) => stream,
            Err(e) => {
                drop(session);
                drop(device);
                return Err(e.into());
            }
        };

        tracing::info!("Capturing frames...");
        let stats = loopbench_stats::collect(&mut stream, config.duration);

        // Release the consumer first so a producer blocked on a full channel can exit
        drop(stream);
        device.stop();
        let mem_after = memory_snapshot();

        if let Some(session) = session {
            session.finish();
        }
        drop(device);

        if let Some(path) = &config.mem_profile {
            let profile = MemoryProfile {
                tracking: is_tracking(),
                before_capture: mem_before,
                after_capture: mem_after,
                after_release: memory_snapshot(),
            };
            match write_memory_profile(path, &profile) {
                Ok(()) => tracing::info!("Memory profile written: {}", path.display()),
                Err(e) => tracing::warn!("{}", e),
            }
        }

        let results =
            BenchmarkResults::from_parts(&stats, &mem_after.delta_since(&mem_before));
        if results.is_frameless() {
            tracing::warn!(
                "No frames captured in {} on {}",
                format_duration(results.wall_duration),
                config.device_path.display()
            );
        }
        Ok(results)
    }
}
