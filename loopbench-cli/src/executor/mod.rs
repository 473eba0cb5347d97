//! Benchmark Executor
//!
//! Runs one capture scenario and turns it into results text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! BenchmarkConfig (resolved from CLI flags or a scenario)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  execution  │  Open device, capture for the duration, sample memory
//! └──────┬──────┘
//!        │  ┌─────────────┐
//!        ├──│  profiling  │  CPU profile + trace around the capture window
//!        │  └─────────────┘
//!        ▼
//! ┌─────────────┐
//! │ formatting  │  Human-readable results text
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - Device lifecycle and statistics collection
//! - [`profiling`] - Scoped CPU/trace sessions and memory profiles
//! - [`formatting`] - Results text
//! - [`metadata`] - System metadata collection

mod execution;
mod formatting;
mod metadata;
mod profiling;

// Re-export public API
pub use execution::{BenchmarkConfig, BenchmarkExecutor, ExecutorError};
pub use formatting::format_results;
pub use metadata::build_run_meta;
pub use profiling::{
    MemoryProfile, ProfilingError, ProfilingSession, TraceSink, write_memory_profile,
};

#[cfg(test)]
pub(crate) use profiling::PROFILER_LOCK;
