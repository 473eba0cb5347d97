//! Report Data Structures

use chrono::{DateTime, Utc};
use loopbench_core::MemoryDelta;
use loopbench_stats::CaptureStatistics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Results of one scenario run
///
/// Built from a single capture session and never merged across scenarios.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResults {
    /// Frames delivered with data
    pub frames_captured: u64,
    /// Empty or errored deliveries
    pub frames_dropped: u64,
    /// Wall-clock length of the capture window
    #[serde(with = "duration_ns", rename = "wall_duration_ns")]
    pub wall_duration: Duration,
    /// Captured frames per wall-clock second
    pub avg_fps: f64,
    /// Shortest interval between captured frames
    #[serde(with = "duration_ns", rename = "min_frame_time_ns")]
    pub min_frame_time: Duration,
    /// Longest interval between captured frames
    #[serde(with = "duration_ns", rename = "max_frame_time_ns")]
    pub max_frame_time: Duration,
    /// Mean frame interval
    #[serde(with = "duration_ns", rename = "avg_frame_time_ns")]
    pub avg_frame_time: Duration,
    /// Population standard deviation of frame intervals
    #[serde(with = "duration_ns", rename = "frame_time_std_dev_ns")]
    pub frame_time_std_dev: Duration,
    /// Median frame interval in nanoseconds
    pub frame_time_p50_ns: f64,
    /// 95th percentile frame interval in nanoseconds
    pub frame_time_p95_ns: f64,
    /// 99th percentile frame interval in nanoseconds
    pub frame_time_p99_ns: f64,
    /// Payload bytes over all captured frames
    pub total_bytes: u64,
    /// `total_bytes / frames_captured`, 0 without frames
    pub avg_bytes_per_frame: u64,
    /// Bytes allocated during the capture window
    pub mem_alloc_bytes: u64,
    /// Allocations made during the capture window
    pub mem_alloc_objects: u64,
    /// Collector cycles; always 0 without a garbage collector
    pub gc_count: u64,
    /// Total collector pause time; always zero
    #[serde(with = "duration_ns", rename = "gc_pause_total_ns")]
    pub gc_pause_total: Duration,
    /// Frame stream closed before the configured duration
    pub ended_early: bool,
}

impl BenchmarkResults {
    /// Combine capture statistics with the heap activity of the same run
    pub fn from_parts(stats: &CaptureStatistics, memory: &MemoryDelta) -> Self {
        let ft = &stats.frame_times;
        Self {
            frames_captured: stats.frames_captured,
            frames_dropped: stats.frames_dropped,
            wall_duration: stats.duration,
            avg_fps: stats.avg_fps,
            min_frame_time: ft.min,
            max_frame_time: ft.max,
            avg_frame_time: ft.avg,
            frame_time_std_dev: ft.std_dev,
            frame_time_p50_ns: ft.percentiles.p50,
            frame_time_p95_ns: ft.percentiles.p95,
            frame_time_p99_ns: ft.percentiles.p99,
            total_bytes: stats.total_bytes,
            avg_bytes_per_frame: stats.avg_bytes_per_frame,
            mem_alloc_bytes: memory.alloc_bytes,
            mem_alloc_objects: memory.allocs,
            gc_count: memory.collections,
            gc_pause_total: Duration::ZERO,
            ended_early: stats.ended_early,
        }
    }

    /// Full-duration run that never captured a frame
    pub fn is_frameless(&self) -> bool {
        self.frames_captured == 0
    }
}

/// Outcome of one scenario in a multi-scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    /// Ran and captured frames
    Success,
    /// Ran to completion without capturing a single frame
    NoFrames,
    /// Not run (pixel format not recognized)
    Skipped,
    /// Executor or artifact failure
    Failed,
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScenarioStatus::Success => "SUCCESS",
            ScenarioStatus::NoFrames => "NO_FRAMES",
            ScenarioStatus::Skipped => "SKIPPED",
            ScenarioStatus::Failed => "FAILED",
        })
    }
}

/// Per-scenario entry in the run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    /// Scenario name from the table
    pub name: String,
    /// How the scenario ended
    pub status: ScenarioStatus,
    /// Present when the executor completed
    pub results: Option<BenchmarkResults>,
    /// Result file, when one was written
    pub result_file: Option<String>,
    /// Failure or skip reason
    pub error: Option<String>,
}

/// Host description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system
    pub os: String,
    /// CPU architecture
    pub arch: String,
    /// CPU model name
    pub cpu: String,
    /// Logical cores available to the process
    pub cpu_cores: u32,
}

/// Run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    /// loopbench version
    pub version: String,
    /// When the run started
    pub timestamp: DateTime<Utc>,
    /// Capture device node
    pub device: String,
    /// Capture window per scenario
    #[serde(with = "duration_ns", rename = "duration_ns")]
    pub duration: Duration,
    /// Host the run executed on
    pub system: SystemInfo,
}

/// Everything written to `summary.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run metadata
    pub meta: RunMeta,
    /// In scenario table order
    pub scenarios: Vec<ScenarioRecord>,
}

impl RunSummary {
    /// Number of scenarios with the given status
    pub fn count(&self, status: ScenarioStatus) -> usize {
        self.scenarios.iter().filter(|s| s.status == status).count()
    }
}

mod duration_ns {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopbench_stats::StatisticsCollector;
    use std::time::Instant;

    #[test]
    fn test_from_parts() {
        let start = Instant::now();
        let mut collector = StatisticsCollector::new(start);
        for ms in [100, 133, 166] {
            collector.record(1000, start + Duration::from_millis(ms));
        }
        let stats = collector.finish(start + Duration::from_secs(1));
        let memory = MemoryDelta {
            alloc_bytes: 4096,
            allocs: 12,
            collections: 0,
        };

        let results = BenchmarkResults::from_parts(&stats, &memory);
        assert_eq!(results.frames_captured, 3);
        assert_eq!(results.total_bytes, 3000);
        assert_eq!(results.min_frame_time, Duration::from_millis(33));
        assert_eq!(results.mem_alloc_bytes, 4096);
        assert_eq!(results.mem_alloc_objects, 12);
        assert!(!results.is_frameless());
    }

    #[test]
    fn test_status_display_and_serde() {
        assert_eq!(ScenarioStatus::NoFrames.to_string(), "NO_FRAMES");
        assert_eq!(
            serde_json::to_string(&ScenarioStatus::NoFrames).unwrap(),
            "\"NO_FRAMES\""
        );
        assert_eq!(ScenarioStatus::Success.to_string(), "SUCCESS");
    }

    #[test]
    fn test_durations_serialize_as_nanos() {
        let results = BenchmarkResults {
            avg_frame_time: Duration::from_micros(33_333),
            ..Default::default()
        };
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["avg_frame_time_ns"], 33_333_000);
        let back: BenchmarkResults = serde_json::from_value(json).unwrap();
        assert_eq!(back, results);
    }
}
