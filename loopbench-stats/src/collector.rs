//! Statistics Collector
//!
//! Consumes frame arrivals for a bounded window and reduces them to
//! `CaptureStatistics`. The recording path only bumps counters and appends
//! one interval, so it stays cheap relative to the frame cadence.

use crate::POLL_INTERVAL;
use crate::percentiles::{Percentiles, compute_percentiles};
use loopbench_core::{Delivery, FrameSource};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Frame-time summary over steady-state intervals
///
/// The interval ending at the first captured frame measures start-up latency
/// and is never included. With fewer than two captured frames every field is
/// zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTimeSummary {
    /// Number of intervals summarized
    pub samples: usize,
    /// Shortest interval
    pub min: Duration,
    /// Longest interval
    pub max: Duration,
    /// Mean interval
    pub avg: Duration,
    /// Population standard deviation (jitter)
    pub std_dev: Duration,
    /// Percentiles in nanoseconds
    pub percentiles: Percentiles,
}

impl FrameTimeSummary {
    fn from_intervals(intervals: &[Duration]) -> Self {
        // First interval is start-up latency
        let steady = match intervals.get(1..) {
            Some(rest) if !rest.is_empty() => rest,
            _ => return Self::default(),
        };

        let mut min = steady[0];
        let mut max = steady[0];
        let mut total = Duration::ZERO;
        for &ft in steady {
            total += ft;
            min = min.min(ft);
            max = max.max(ft);
        }
        let avg = total / steady.len() as u32;

        let nanos: Vec<f64> = steady.iter().map(|d| d.as_nanos() as f64).collect();
        let mean = avg.as_nanos() as f64;
        let variance =
            nanos.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / nanos.len() as f64;

        Self {
            samples: steady.len(),
            min,
            max,
            avg,
            std_dev: Duration::from_nanos(variance.sqrt() as u64),
            percentiles: compute_percentiles(&nanos),
        }
    }
}

/// Capture statistics for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStatistics {
    /// Frames delivered with a payload
    pub frames_captured: u64,
    /// Frames delivered empty
    pub frames_dropped: u64,
    /// Wall time observed by the collector
    pub duration: Duration,
    /// Captured frames per second of wall time (0 when nothing was captured)
    pub avg_fps: f64,
    /// Payload bytes over all captured frames
    pub total_bytes: u64,
    /// Mean payload size (0 when nothing was captured)
    pub avg_bytes_per_frame: u64,
    /// Frame-time summary
    pub frame_times: FrameTimeSummary,
    /// The stream closed before the collection window elapsed
    pub ended_early: bool,
}

/// Accumulates frame arrivals
#[derive(Debug)]
pub struct StatisticsCollector {
    start: Instant,
    last_arrival: Instant,
    frames_captured: u64,
    frames_dropped: u64,
    total_bytes: u64,
    intervals: Vec<Duration>,
    ended_early: bool,
}

impl StatisticsCollector {
    /// Start collecting; `start` is both the wall-clock origin and the
    /// reference for the first interval.
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            last_arrival: start,
            frames_captured: 0,
            frames_dropped: 0,
            total_bytes: 0,
            intervals: Vec::with_capacity(1024),
            ended_early: false,
        }
    }

    /// Record one arrival of `len` payload bytes at `at`. Zero length is a
    /// dropped frame: counted, but its interval is not a frame time.
    pub fn record(&mut self, len: usize, at: Instant) {
        let frame_time = at.saturating_duration_since(self.last_arrival);
        self.last_arrival = at;

        if len == 0 {
            self.frames_dropped += 1;
            tracing::debug!(
                frame = self.frames_captured + self.frames_dropped,
                "Frame dropped"
            );
            return;
        }

        self.frames_captured += 1;
        self.total_bytes += len as u64;
        self.intervals.push(frame_time);
        tracing::trace!(
            target: "loopbench::frames",
            seq = self.frames_captured,
            bytes = len,
            frame_time_ns = frame_time.as_nanos() as u64,
        );

        if self.frames_captured % 100 == 0 {
            let elapsed = at.saturating_duration_since(self.start).as_secs_f64();
            tracing::debug!(
                "Captured {} frames ({:.1} fps)",
                self.frames_captured,
                if elapsed > 0.0 { self.frames_captured as f64 / elapsed } else { 0.0 }
            );
        }
    }

    /// Note that the source ended before the window elapsed
    pub fn mark_ended_early(&mut self) {
        self.ended_early = true;
    }

    /// Frames recorded so far, captured plus dropped
    pub fn frames_seen(&self) -> u64 {
        self.frames_captured + self.frames_dropped
    }

    /// Reduce to statistics, with `end` closing the wall-clock window
    pub fn finish(self, end: Instant) -> CaptureStatistics {
        let duration = end.saturating_duration_since(self.start);

        let (avg_fps, avg_bytes_per_frame) = if self.frames_captured > 0 {
            let secs = duration.as_secs_f64();
            let fps = if secs > 0.0 { self.frames_captured as f64 / secs } else { 0.0 };
            (fps, self.total_bytes / self.frames_captured)
        } else {
            (0.0, 0)
        };

        CaptureStatistics {
            frames_captured: self.frames_captured,
            frames_dropped: self.frames_dropped,
            duration,
            avg_fps,
            total_bytes: self.total_bytes,
            avg_bytes_per_frame,
            frame_times: FrameTimeSummary::from_intervals(&self.intervals),
            ended_early: self.ended_early,
        }
    }
}

/// Drain `source` until `duration` has elapsed or the source closes
pub fn collect<S: FrameSource + ?Sized>(source: &mut S, duration: Duration) -> CaptureStatistics {
    let start = Instant::now();
    let deadline = start + duration;
    let mut collector = StatisticsCollector::new(start);

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match source.next_frame((deadline - now).min(POLL_INTERVAL)) {
            Delivery::Frame(frame) => collector.record(frame.len(), Instant::now()),
            Delivery::Idle => {}
            Delivery::Closed => {
                tracing::warn!(
                    frames = collector.frames_seen(),
                    elapsed = ?start.elapsed(),
                    "Frame stream closed before the capture window elapsed"
                );
                collector.mark_ended_early();
                break;
            }
        }
    }

    collector.finish(Instant::now())
}
