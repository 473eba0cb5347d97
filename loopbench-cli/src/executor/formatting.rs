//! Output Formatting
//!
//! Human-readable results text for one scenario run. The same text is
//! printed in single mode and persisted as `<name>_results.txt` in
//! multi-scenario mode.
//!
//! Sections:
//! - Configuration
//! - Capture Statistics
//! - Timing Statistics (min/avg/max, percentiles, jitter, target frame time)
//! - Memory Statistics (allocations per frame)
//! - Performance Metrics (time per frame, throughput)
//! - Artifact paths

use super::execution::BenchmarkConfig;
use loopbench_report::{BenchmarkResults, format_duration};
use std::time::Duration;

const MIB: f64 = 1024.0 * 1024.0;

/// Format one run's results for display
pub fn format_results(config: &BenchmarkConfig, r: &BenchmarkResults) -> String {
    let separator = "=".repeat(70);
    let mut output = String::new();

    output.push('\n');
    output.push_str(&separator);
    output.push_str("\nBENCHMARK RESULTS\n");
    output.push_str(&separator);
    output.push('\n');

    output.push_str("\nConfiguration:\n");
    output.push_str(&format!("  Device:        {}\n", config.device_path.display()));
    output.push_str(&format!("  Resolution:    {}x{}\n", config.width, config.height));
    output.push_str(&format!("  Format:        {}\n", config.pixel_format));
    output.push_str(&format!("  Target FPS:    {}\n", config.fps));
    output.push_str(&format!("  Duration:      {}\n", format_duration(config.duration)));
    output.push_str(&format!("  Buffers:       {}\n", config.buffer_count));

    output.push_str("\nCapture Statistics:\n");
    output.push_str(&format!("  Frames Captured:   {}\n", r.frames_captured));
    output.push_str(&format!("  Frames Dropped:    {}\n", r.frames_dropped));
    output.push_str(&format!("  Actual Duration:   {}\n", format_duration(r.wall_duration)));
    output.push_str(&format!("  Average FPS:       {:.2}\n", r.avg_fps));
    output.push_str(&format!("  Total Data:        {:.2} MB\n", r.total_bytes as f64 / MIB));
    output.push_str(&format!("  Avg Bytes/Frame:   {}\n", r.avg_bytes_per_frame));
    if r.is_frameless() {
        output.push_str("  WARNING: no frames captured; averages are reported as zero\n");
    } else if r.ended_early {
        output.push_str("  WARNING: frame stream ended before the configured duration\n");
    }

    output.push_str("\nTiming Statistics:\n");
    output.push_str(&format!("  Min Frame Time:    {}\n", format_duration(r.min_frame_time)));
    output.push_str(&format!("  Avg Frame Time:    {}\n", format_duration(r.avg_frame_time)));
    output.push_str(&format!("  Max Frame Time:    {}\n", format_duration(r.max_frame_time)));
    output.push_str(&format!(
        "  p50/p95/p99:       {} / {} / {}\n",
        format_duration(nanos(r.frame_time_p50_ns)),
        format_duration(nanos(r.frame_time_p95_ns)),
        format_duration(nanos(r.frame_time_p99_ns))
    ));
    output.push_str(&format!(
        "  Std Deviation:     {}\n",
        format_duration(r.frame_time_std_dev)
    ));
    if config.fps > 0 {
        let target = Duration::from_secs(1) / config.fps;
        output.push_str(&format!("  Target Frame Time: {}\n", format_duration(target)));
    }

    output.push_str("\nMemory Statistics:\n");
    output.push_str(&format!(
        "  Total Allocated:   {:.2} MB\n",
        r.mem_alloc_bytes as f64 / MIB
    ));
    if r.frames_captured > 0 {
        output.push_str(&format!(
            "  Bytes per Frame:   {:.2} MB\n",
            r.mem_alloc_bytes as f64 / r.frames_captured as f64 / MIB
        ));
    }
    output.push_str(&format!("  Total Allocations: {}\n", r.mem_alloc_objects));
    if r.frames_captured > 0 {
        output.push_str(&format!(
            "  Allocs per Frame:  {:.0}\n",
            r.mem_alloc_objects as f64 / r.frames_captured as f64
        ));
    }
    output.push_str(&format!("  GC Runs:           {}\n", r.gc_count));
    output.push_str(&format!("  GC Pause Total:    {}\n", format_duration(r.gc_pause_total)));

    output.push_str("\nPerformance Metrics:\n");
    if r.avg_fps > 0.0 && r.frames_captured > 0 {
        let per_frame = r.wall_duration.div_f64(r.frames_captured as f64);
        output.push_str(&format!("  Time/Frame:        {}\n", format_duration(per_frame)));
        output.push_str(&format!(
            "  Throughput:        {:.2} MB/s\n",
            r.total_bytes as f64 / MIB / r.wall_duration.as_secs_f64()
        ));
    }

    output.push('\n');
    output.push_str(&separator);
    output.push('\n');

    if let Some(path) = &config.cpu_profile {
        output.push_str(&format!("\nCPU Profile: {}\n", path.display()));
        output.push_str(&format!("Analyze with: pprof -top {}\n", path.display()));
    }
    if let Some(path) = &config.mem_profile {
        output.push_str(&format!("Memory Profile: {}\n", path.display()));
    }
    if let Some(path) = &config.trace_file {
        output.push_str(&format!("Trace File: {}\n", path.display()));
        output.push_str(&format!("Analyze with: jq . {}\n", path.display()));
    }

    output
}

fn nanos(ns: f64) -> Duration {
    Duration::from_nanos(ns.max(0.0).round() as u64)
}
