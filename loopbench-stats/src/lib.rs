#![warn(missing_docs)]
//! loopbench Statistical Engine
//!
//! Reduces a live frame stream to capture statistics:
//! - Captured / dropped frame counters and byte totals
//! - Frame-time min / max / mean over steady-state samples (first interval excluded)
//! - Percentiles and standard deviation over the same samples
//!
//! ```text
//! FrameSource ──> StatisticsCollector::record ──> finish ──> CaptureStatistics
//!      │                    ^
//!      └── deadline ────────┘
//! ```

mod collector;
mod percentiles;

pub use collector::{CaptureStatistics, FrameTimeSummary, StatisticsCollector, collect};
pub use percentiles::{Percentiles, compute_percentile, compute_percentiles};

/// Longest single wait on the frame source before the deadline is rechecked
pub const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);
