//! Integration tests for loopbench
//!
//! End-to-end runs of the executor and orchestrator against the synthetic
//! capture backend. No V4L2 device, kernel module or root access is needed.

use loopbench::{
    BenchmarkConfig, BenchmarkExecutor, BenchmarkScenario, CaptureBackend, OutputCapture, PixelFormat, RunError, RunSettings, ScenarioOrchestrator, ScenarioOutput,
    ScenarioStatus, SyntheticBackend, collect,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

// Profiling sessions are process-wide; keep full runs from overlapping
static RUNS: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    RUNS.lock().unwrap_or_else(|e| e.into_inner())
}

const SUITE: &[BenchmarkScenario] = &[
    BenchmarkScenario { name: "first_yuyv", width: 80, height: 60, fps: 40, format: "YUYV" },
    BenchmarkScenario { name: "broken_fmt", width: 80, height: 60, fps: 40, format: "NV12" },
    BenchmarkScenario { name: "second_mjpeg", width: 160, height: 120, fps: 25, format: "MJPEG" },
];

fn orchestrator(backend: SyntheticBackend, dir: &Path) -> ScenarioOrchestrator {
    ScenarioOrchestrator::new(
        BenchmarkExecutor::new(Arc::new(backend)),
        RunSettings {
            device_path: PathBuf::from("/dev/video50"),
            duration: Duration::from_millis(250),
            buffer_count: 4,
            output_dir: dir.to_path_buf(),
            verbose: false,
        },
    )
}

/// Frame counts track duration * fps and frame times stay ordered
#[test]
fn test_capture_statistics_from_device() {
    let backend = SyntheticBackend::new();
    let config = loopbench::CaptureConfig {
        pixel_format: PixelFormat::Mjpeg,
        width: 640,
        height: 480,
        fps: 30,
        buffer_count: 4,
    };
    let mut device = backend.open(Path::new("/dev/video50"), &config).unwrap();
    let mut stream = device.start().unwrap();
    let stats = collect(&mut stream, Duration::from_secs(1));
    drop(stream);
    device.stop();

    // ~30 frames; wide tolerance for scheduler jitter
    assert!(stats.frames_captured >= 20, "{stats:?}");
    assert!(stats.frames_captured <= 35, "{stats:?}");
    assert_eq!(stats.frames_dropped, 0);
    assert!(!stats.ended_early);
    let ft = &stats.frame_times;
    assert_eq!(ft.samples as u64, stats.frames_captured - 1);
    assert!(ft.min <= ft.avg && ft.avg <= ft.max);
    assert!(ft.percentiles.p50 <= ft.percentiles.p99);
}

/// Two scenarios back to back: each result file only holds its own run
#[test]
fn test_scenario_output_isolation() {
    let _serial = serial();
    let tmp = tempfile::tempdir().unwrap();
    let report = orchestrator(SyntheticBackend::new(), tmp.path())
        .run(SUITE, &mut std::io::sink())
        .unwrap();

    let first = std::fs::read_to_string(tmp.path().join("first_yuyv_results.txt")).unwrap();
    let second = std::fs::read_to_string(tmp.path().join("second_mjpeg_results.txt")).unwrap();

    assert!(first.contains("Format: 80x60 @ 40 fps (YUYV)"));
    assert!(!first.contains("160x120"));
    assert!(!first.contains("MJPEG"));
    assert!(second.contains("Format: 160x120 @ 25 fps (MJPEG)"));
    assert!(!second.contains("80x60"));
    assert!(!second.contains("YUYV"));

    // Orchestrator progress never leaks into scenario output
    assert!(!first.contains("Running:"));
    assert!(!second.contains("Running:"));

    // Logs come before the results block
    let log_at = first.find("Capturing frames...").unwrap();
    let results_at = first.find("BENCHMARK RESULTS").unwrap();
    assert!(log_at < results_at);

    assert_eq!(report.summary.count(ScenarioStatus::Success), 2);
    for name in ["first_yuyv", "second_mjpeg"] {
        assert!(tmp.path().join(format!("{name}_cpu.prof")).exists());
        assert!(tmp.path().join(format!("{name}_mem.prof")).exists());
        assert!(tmp.path().join(format!("{name}_trace.out")).exists());
    }
}

/// Summary order follows the table regardless of per-scenario outcome
#[test]
fn test_summary_order_and_statuses() {
    let _serial = serial();
    let tmp = tempfile::tempdir().unwrap();
    let mut progress = Vec::new();
    let report = orchestrator(SyntheticBackend::new(), tmp.path())
        .run(SUITE, &mut progress)
        .unwrap();

    let names: Vec<_> = report.summary.scenarios.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["first_yuyv", "broken_fmt", "second_mjpeg"]);
    assert_eq!(report.summary.scenarios[1].status, ScenarioStatus::Skipped);

    let summary = std::fs::read_to_string(&report.summary_path).unwrap();
    let a = summary.find("## first_yuyv").unwrap();
    let b = summary.find("## second_mjpeg").unwrap();
    assert!(a < b);
    assert!(!summary.contains("## broken_fmt"));

    let progress = String::from_utf8(progress).unwrap();
    let table = progress.split("Results:").nth(1).unwrap();
    let ok = table.find("[SUCCESS] first_yuyv").unwrap();
    let skipped = table.find("[SKIPPED] broken_fmt").unwrap();
    let last = table.find("[SUCCESS] second_mjpeg").unwrap();
    assert!(ok < skipped && skipped < last);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report.json_path).unwrap()).unwrap();
    assert_eq!(json["meta"]["device"], "/dev/video50");
    assert_eq!(json["scenarios"].as_array().unwrap().len(), 3);
}

/// An unknown scenario aborts before the device or the filesystem is touched
#[test]
fn test_unknown_scenario_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("results");
    let backend = SyntheticBackend::new();
    let err = orchestrator(backend.clone(), &out)
        .run_selected(SUITE, Some("nope"), &mut std::io::sink())
        .unwrap_err();

    assert!(matches!(err, RunError::ScenarioNotFound(ref n) if n == "nope"));
    assert_eq!(backend.opened(), 0);
    assert!(!out.exists());
}

/// A source that closes immediately yields NO_FRAMES with zeroed averages
#[test]
fn test_no_frames_scenario() {
    let _serial = serial();
    let tmp = tempfile::tempdir().unwrap();
    let report = orchestrator(SyntheticBackend::new().close_after(0), tmp.path())
        .run(&SUITE[..1], &mut std::io::sink())
        .unwrap();

    let record = &report.summary.scenarios[0];
    assert_eq!(record.status, ScenarioStatus::NoFrames);
    let results = record.results.as_ref().unwrap();
    assert_eq!(results.avg_fps, 0.0);
    assert_eq!(results.avg_bytes_per_frame, 0);

    let text = std::fs::read_to_string(tmp.path().join("first_yuyv_results.txt")).unwrap();
    assert!(text.contains("WARNING: no frames captured"));
}

/// Device failures are scenario-local in multi mode
#[test]
fn test_open_failure_is_scenario_local() {
    let _serial = serial();
    let tmp = tempfile::tempdir().unwrap();
    let report = orchestrator(SyntheticBackend::new().fail_open(), tmp.path())
        .run(SUITE, &mut std::io::sink())
        .unwrap();

    let statuses: Vec<_> = report.summary.scenarios.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [ScenarioStatus::Failed, ScenarioStatus::Skipped, ScenarioStatus::Failed]
    );
    let text = std::fs::read_to_string(tmp.path().join("second_mjpeg_results.txt")).unwrap();
    assert!(text.contains("Failed to open device /dev/video50"));
}

/// Single-scenario execution with explicit output capture
#[test]
fn test_executor_with_captured_output() {
    let _serial = serial();
    let capture = OutputCapture::start().unwrap();
    let output = ScenarioOutput::Captured(capture.writer());
    let config = BenchmarkConfig {
        device_path: PathBuf::from("/dev/video50"),
        width: 320,
        height: 240,
        pixel_format: PixelFormat::Yuyv,
        fps: 60,
        duration: Duration::from_millis(300),
        buffer_count: 2,
        cpu_profile: None,
        mem_profile: None,
        trace_file: None,
        verbose: true,
    };
    let results = BenchmarkExecutor::new(Arc::new(SyntheticBackend::new().drop_every(5)))
        .run(&config, &output)
        .unwrap();
    drop(output);
    let log = capture.finish();

    assert!(results.frames_captured > 0);
    assert!(results.frames_dropped > 0);
    assert_eq!(results.avg_bytes_per_frame, 320 * 240 * 2);
    // Verbose runs log every dropped frame
    assert!(log.contains("Frame dropped"));
}
