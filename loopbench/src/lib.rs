#![warn(missing_docs)]
//! # loopbench
//!
//! Frame capture benchmark for V4L2 devices.
//!
//! loopbench measures how a capture pipeline keeps up with a device:
//! - **Loopback provisioning**: a `v4l2loopback` device fed by an `ffmpeg` test pattern,
//!   torn down on every exit path
//! - **Capture statistics**: captured/dropped frames, FPS, throughput, frame-time
//!   min/avg/max, percentiles and jitter
//! - **Scoped profiling**: CPU profile, execution trace and heap counters bracketing
//!   exactly one capture window
//! - **Scenario suites**: fixed resolution/rate/format table with per-scenario artifacts
//!   and a combined summary
//!
//! ## Quick Start
//!
//! ```text
//! loopbench -list
//! loopbench -duration 5s                       # all scenarios on /dev/video50
//! loopbench -single -format YUYV -fps 60       # one ad-hoc run
//! loopbench -device /dev/video0 -scenario baseline_720p_mjpeg
//! ```
//!
//! ## Embedding
//!
//! ```ignore
//! use loopbench::prelude::*;
//! use std::sync::Arc;
//!
//! let executor = BenchmarkExecutor::new(Arc::new(SyntheticBackend::new()));
//! ```

// Re-export core types
pub use loopbench_core::{
    CaptureBackend, CaptureConfig, CaptureDevice, CaptureError, Delivery, FormatInfo,
    FrameSource, FrameStream, MemoryDelta, MemorySnapshot, PixelFormat, SyntheticBackend,
    TrackingAllocator, is_tracking, memory_snapshot,
};
#[cfg(all(feature = "v4l2", target_os = "linux"))]
pub use loopbench_core::V4lBackend;

// Re-export statistics
pub use loopbench_stats::{CaptureStatistics, FrameTimeSummary, StatisticsCollector, collect};

// Re-export provisioning
pub use loopbench_loopback::{
    HostTools, Lifecycle, ProvisionConfig, ProvisionError, SystemTools, VirtualDevice,
    VirtualDeviceProvisioner,
};

// Re-export report types
pub use loopbench_report::{
    BenchmarkResults, RunMeta, RunSummary, ScenarioRecord, ScenarioStatus, SystemInfo,
    format_duration, generate_json_summary, generate_text_summary,
};

// Re-export CLI
pub use loopbench_cli::{
    ArtifactPaths, BenchmarkConfig, BenchmarkExecutor, BenchmarkScenario, Cli, ExecutorError,
    LoopbenchConfig, OutputCapture, RunError, RunReport, RunSettings, SCENARIOS,
    ScenarioOrchestrator, ScenarioOutput, run, run_with_cli,
};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        BenchmarkConfig, BenchmarkExecutor, BenchmarkResults, PixelFormat, RunSettings,
        ScenarioOrchestrator, ScenarioOutput, ScenarioStatus, SyntheticBackend,
    };
}
