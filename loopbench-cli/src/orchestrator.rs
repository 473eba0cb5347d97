//! Scenario Orchestration
//!
//! Runs scenarios one after another against a single device, writing
//! per-scenario artifacts and a combined summary.
//!
//! ```text
//!  for each scenario (table order)
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │ OutputCapture ──> BenchmarkExecutor::run ──> results text    │
//!  │      │                 (profiling inside)        │           │
//!  │      └──────────── finish (join drain) <─────────┘           │
//!  │                            │                                 │
//!  │                            ▼                                 │
//!  │                  <name>_results.txt                          │
//!  └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                 summary.txt + summary.json + status table
//! ```
//!
//! Scenario-local failures (unknown pixel format, device errors, result
//! file write errors) are recorded in the status table and the run moves on.
//! Only configuration errors found before any device interaction, and
//! failures to create the output directory or write the summary, end the run.

use crate::capture::{OutputCapture, ScenarioOutput};
use crate::executor::{BenchmarkConfig, BenchmarkExecutor, build_run_meta, format_results};
use crate::scenarios::{BenchmarkScenario, select_scenarios};
use chrono::Utc;
use loopbench_core::PixelFormat;
use loopbench_report::{
    RunSummary, ScenarioRecord, ScenarioStatus, format_duration, generate_json_summary,
    generate_text_summary,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Run-level failures
#[derive(Debug, Error)]
pub enum RunError {
    /// Requested scenario is not in the table
    #[error("Unknown scenario: {0} (use -list to see available scenarios)")]
    ScenarioNotFound(String),

    /// Pixel format name not recognized (single mode)
    #[error("Unknown pixel format: {0} (expected MJPEG, YUYV or H264)")]
    UnknownFormat(String),

    /// Output directory could not be created
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        /// Directory path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// A run-level artifact could not be written
    #[error("Failed to write {path}: {source}")]
    ArtifactWriteFailed {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Summary serialization failed
    #[error("Failed to serialize summary: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Progress output or scenario capture failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Artifact files of one scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// `<name>_results.txt`
    pub results: PathBuf,
    /// `<name>_cpu.prof`
    pub cpu_profile: PathBuf,
    /// `<name>_mem.prof`
    pub mem_profile: PathBuf,
    /// `<name>_trace.out`
    pub trace: PathBuf,
}

impl ArtifactPaths {
    /// Paths for scenario `name` inside `dir`
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            results: dir.join(format!("{name}_results.txt")),
            cpu_profile: dir.join(format!("{name}_cpu.prof")),
            mem_profile: dir.join(format!("{name}_mem.prof")),
            trace: dir.join(format!("{name}_trace.out")),
        }
    }
}

/// Settings shared by every scenario of a run
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Device all scenarios capture from
    pub device_path: PathBuf,
    /// Capture window per scenario
    pub duration: Duration,
    /// Driver buffers per capture session
    pub buffer_count: u32,
    /// Artifact directory, created if missing
    pub output_dir: PathBuf,
    /// Debug-level scenario logs
    pub verbose: bool,
}

/// Outcome of a multi-scenario run
#[derive(Debug)]
pub struct RunReport {
    /// Everything written to `summary.json`
    pub summary: RunSummary,
    /// Artifact directory
    pub output_dir: PathBuf,
    /// `summary.txt`
    pub summary_path: PathBuf,
    /// `summary.json`
    pub json_path: PathBuf,
}

/// Sequential multi-scenario runner
pub struct ScenarioOrchestrator {
    executor: BenchmarkExecutor,
    settings: RunSettings,
}

impl ScenarioOrchestrator {
    /// Orchestrator running every scenario through `executor`
    pub fn new(executor: BenchmarkExecutor, settings: RunSettings) -> Self {
        Self { executor, settings }
    }

    /// Run settings
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Select `name` from `table` (all when `None` or empty), then run.
    ///
    /// An unknown name fails before the output directory is created or the
    /// device is touched.
    pub fn run_selected(
        &self,
        table: &[BenchmarkScenario],
        name: Option<&str>,
        progress: &mut dyn Write,
    ) -> Result<RunReport, RunError> {
        let scenarios = select_scenarios(table, name)?;
        self.run(&scenarios, progress)
    }

    /// Run `scenarios` in order, printing progress to `progress`
    pub fn run(
        &self,
        scenarios: &[BenchmarkScenario],
        progress: &mut dyn Write,
    ) -> Result<RunReport, RunError> {
        let dir = &self.settings.output_dir;
        std::fs::create_dir_all(dir).map_err(|source| RunError::OutputDir {
            path: dir.clone(),
            source,
        })?;

        let banner = "=".repeat(40);
        writeln!(progress, "{banner}")?;
        writeln!(progress, "loopbench Frame Capture Benchmark Suite")?;
        writeln!(progress, "{banner}")?;
        writeln!(progress, "Device:   {}", self.settings.device_path.display())?;
        writeln!(progress, "Duration: {}", format_duration(self.settings.duration))?;
        writeln!(progress, "Output:   {}", dir.display())?;
        writeln!(progress)?;

        let meta = build_run_meta(&self.settings.device_path, self.settings.duration);
        let mut records = Vec::with_capacity(scenarios.len());
        let mut sections: Vec<(&str, String)> = Vec::new();

        for (i, scenario) in scenarios.iter().enumerate() {
            writeln!(
                progress,
                "[{}/{}] Running: {} ({})",
                i + 1,
                scenarios.len(),
                scenario.name,
                scenario
            )?;

            let (record, text) = self.run_scenario(scenario, progress)?;
            if let Some(text) = text {
                sections.push((scenario.name, text));
            }
            records.push(record);
            writeln!(progress)?;
        }

        let summary = RunSummary {
            meta,
            scenarios: records,
        };
        write_final_report(progress, &summary, dir)?;

        let summary_path = dir.join("summary.txt");
        let text = generate_text_summary(
            Utc::now(),
            sections.iter().map(|(name, text)| (*name, text.as_str())),
        );
        write_artifact(&summary_path, text.as_bytes())?;
        writeln!(progress, "Summary written to: {}", summary_path.display())?;

        let json_path = dir.join("summary.json");
        write_artifact(&json_path, generate_json_summary(&summary)?.as_bytes())?;

        Ok(RunReport {
            summary,
            output_dir: dir.clone(),
            summary_path,
            json_path,
        })
    }

    /// Run one scenario into its own capture. Returns the record and, when
    /// the result file was written, its text.
    fn run_scenario(
        &self,
        scenario: &BenchmarkScenario,
        progress: &mut dyn Write,
    ) -> Result<(ScenarioRecord, Option<String>), RunError> {
        let mut record = ScenarioRecord {
            name: scenario.name.to_string(),
            status: ScenarioStatus::Skipped,
            results: None,
            result_file: None,
            error: None,
        };

        let pixel_format: PixelFormat = match scenario.format.parse() {
            Ok(format) => format,
            Err(e) => {
                tracing::warn!("Unknown format {}, skipping {}", scenario.format, scenario.name);
                writeln!(progress, "  Warning: Unknown format {}, skipping", scenario.format)?;
                record.error = Some(e.to_string());
                return Ok((record, None));
            }
        };

        let paths = ArtifactPaths::new(&self.settings.output_dir, scenario.name);
        let config = BenchmarkConfig {
            device_path: self.settings.device_path.clone(),
            width: scenario.width,
            height: scenario.height,
            pixel_format,
            fps: scenario.fps,
            duration: self.settings.duration,
            buffer_count: self.settings.buffer_count,
            cpu_profile: Some(paths.cpu_profile.clone()),
            mem_profile: Some(paths.mem_profile.clone()),
            trace_file: Some(paths.trace.clone()),
            verbose: self.settings.verbose,
        };

        let capture = OutputCapture::start()?;
        let mut output = ScenarioOutput::Captured(capture.writer());
        let written = match self.executor.run(&config, &output) {
            Ok(results) => {
                record.status = if results.is_frameless() {
                    ScenarioStatus::NoFrames
                } else {
                    ScenarioStatus::Success
                };
                let written = output.write_all(format_results(&config, &results).as_bytes());
                record.results = Some(results);
                written
            }
            Err(e) => {
                record.status = ScenarioStatus::Failed;
                record.error = Some(e.to_string());
                writeln!(output, "ERROR: {e}")
            }
        };
        drop(output);
        let text = capture.finish();
        if let Err(e) = written {
            tracing::warn!("Scenario output for {} incomplete: {}", scenario.name, e);
        }

        if let Err(e) = std::fs::write(&paths.results, &text) {
            tracing::warn!("Failed to write result file {}: {}", paths.results.display(), e);
            writeln!(progress, "  ✗ Failed to write result file: {e}")?;
            record.status = ScenarioStatus::Failed;
            if record.error.is_none() {
                record.error = Some(e.to_string());
            }
            return Ok((record, None));
        }
        record.result_file = paths
            .results
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        match record.status {
            ScenarioStatus::Success => writeln!(progress, "  ✓ Complete")?,
            ScenarioStatus::NoFrames => writeln!(progress, "  ⚠ Complete, no frames captured")?,
            _ => writeln!(
                progress,
                "  ✗ Failed: {}",
                record.error.as_deref().unwrap_or("unknown error")
            )?,
        }

        Ok((record, Some(text)))
    }
}

fn write_artifact(path: &Path, contents: &[u8]) -> Result<(), RunError> {
    std::fs::write(path, contents).map_err(|source| RunError::ArtifactWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn write_final_report(
    progress: &mut dyn Write,
    summary: &RunSummary,
    dir: &Path,
) -> io::Result<()> {
    let banner = "=".repeat(40);
    let dir = dir.display();
    writeln!(progress, "{banner}")?;
    writeln!(progress, "Benchmarks Complete!")?;
    writeln!(progress, "{banner}")?;
    writeln!(progress)?;
    writeln!(progress, "Results:")?;
    for record in &summary.scenarios {
        writeln!(progress, "  [{}] {}", record.status, record.name)?;
    }
    writeln!(progress)?;
    writeln!(progress, "Output directory: {dir}")?;
    writeln!(progress)?;
    writeln!(progress, "View results:")?;
    writeln!(progress, "  cat {dir}/*_results.txt")?;
    writeln!(progress)?;
    writeln!(progress, "Analyze CPU profiles:")?;
    writeln!(progress, "  pprof -top {dir}/*_cpu.prof")?;
    writeln!(progress)?;
    writeln!(progress, "Inspect memory profiles:")?;
    writeln!(progress, "  cat {dir}/*_mem.prof")?;
    writeln!(progress)?;
    writeln!(progress, "View execution traces:")?;
    writeln!(progress, "  jq . {dir}/*_trace.out")?;
    writeln!(progress)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::PROFILER_LOCK;
    use loopbench_core::SyntheticBackend;
    use std::sync::{Arc, MutexGuard};

    fn profiler() -> MutexGuard<'static, ()> {
        PROFILER_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    const TABLE: &[BenchmarkScenario] = &[
        BenchmarkScenario { name: "small_yuyv", width: 64, height: 48, fps: 50, format: "YUYV" },
        BenchmarkScenario { name: "bad_format", width: 64, height: 48, fps: 50, format: "RGB3" },
        BenchmarkScenario { name: "small_mjpeg", width: 64, height: 48, fps: 50, format: "MJPEG" },
    ];

    fn orchestrator(backend: SyntheticBackend, dir: &Path) -> ScenarioOrchestrator {
        ScenarioOrchestrator::new(
            BenchmarkExecutor::new(Arc::new(backend)),
            RunSettings {
                device_path: PathBuf::from("/dev/video50"),
                duration: Duration::from_millis(150),
                buffer_count: 4,
                output_dir: dir.to_path_buf(),
                verbose: false,
            },
        )
    }

    #[test]
    fn test_artifact_paths() {
        let paths = ArtifactPaths::new(Path::new("out"), "fps_720p_60fps");
        assert_eq!(paths.results, Path::new("out/fps_720p_60fps_results.txt"));
        assert_eq!(paths.cpu_profile, Path::new("out/fps_720p_60fps_cpu.prof"));
        assert_eq!(paths.mem_profile, Path::new("out/fps_720p_60fps_mem.prof"));
        assert_eq!(paths.trace, Path::new("out/fps_720p_60fps_trace.out"));
    }

    #[test]
    fn test_unknown_format_skipped_and_run_continues() {
        let _profiler = profiler();
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("run");
        let mut progress = Vec::new();
        let report = orchestrator(SyntheticBackend::new(), &dir)
            .run(TABLE, &mut progress)
            .unwrap();

        let statuses: Vec<_> = report.summary.scenarios.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            [ScenarioStatus::Success, ScenarioStatus::Skipped, ScenarioStatus::Success]
        );
        assert!(dir.join("small_yuyv_results.txt").exists());
        assert!(!dir.join("bad_format_results.txt").exists());
        assert!(dir.join("small_mjpeg_results.txt").exists());

        let progress = String::from_utf8(progress).unwrap();
        assert!(progress.contains("[1/3] Running: small_yuyv (64x48 @ 50 fps, YUYV)"));
        assert!(progress.contains("Warning: Unknown format RGB3, skipping"));
        assert!(progress.contains("  [SKIPPED] bad_format\n"));
        assert!(progress.contains("Summary written to:"));
    }

    #[test]
    fn test_every_scenario_writes_cpu_profile() {
        let _profiler = profiler();
        let tmp = tempfile::tempdir().unwrap();
        let report = orchestrator(SyntheticBackend::new(), tmp.path())
            .run(TABLE, &mut io::sink())
            .unwrap();

        assert_eq!(report.summary.count(ScenarioStatus::Success), 2);
        for name in ["small_yuyv", "small_mjpeg"] {
            let paths = ArtifactPaths::new(tmp.path(), name);
            assert!(paths.cpu_profile.is_file(), "{name}");
            assert!(paths.mem_profile.is_file(), "{name}");
            assert!(paths.trace.is_file(), "{name}");
        }
        assert!(!ArtifactPaths::new(tmp.path(), "bad_format").cpu_profile.exists());
    }

    #[test]
    fn test_summary_in_table_order() {
        let _profiler = profiler();
        let tmp = tempfile::tempdir().unwrap();
        let report = orchestrator(SyntheticBackend::new(), tmp.path())
            .run(TABLE, &mut io::sink())
            .unwrap();

        let summary = std::fs::read_to_string(&report.summary_path).unwrap();
        assert!(summary.starts_with("# Benchmark Summary\n\nGenerated: "));
        let first = summary.find("## small_yuyv\n\n").unwrap();
        let second = summary.find("## small_mjpeg\n\n").unwrap();
        assert!(first < second);
        assert!(!summary.contains("## bad_format"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report.json_path).unwrap()).unwrap();
        assert_eq!(json["scenarios"][1]["status"], "SKIPPED");
        assert_eq!(json["scenarios"][0]["result_file"], "small_yuyv_results.txt");
    }

    #[test]
    fn test_executor_failure_recorded_and_persisted() {
        let _profiler = profiler();
        let tmp = tempfile::tempdir().unwrap();
        let report = orchestrator(SyntheticBackend::new().fail_start(), tmp.path())
            .run(&TABLE[..1], &mut io::sink())
            .unwrap();

        let record = &report.summary.scenarios[0];
        assert_eq!(record.status, ScenarioStatus::Failed);
        assert!(record.results.is_none());
        let text = std::fs::read_to_string(tmp.path().join("small_yuyv_results.txt")).unwrap();
        assert!(text.contains("ERROR: "));
        assert!(text.contains("Opening device"));
    }

    #[test]
    fn test_no_frames_status() {
        let _profiler = profiler();
        let tmp = tempfile::tempdir().unwrap();
        let report = orchestrator(SyntheticBackend::new().close_after(0), tmp.path())
            .run(&TABLE[..1], &mut io::sink())
            .unwrap();
        assert_eq!(report.summary.scenarios[0].status, ScenarioStatus::NoFrames);
        assert_eq!(report.summary.count(ScenarioStatus::NoFrames), 1);
    }

    #[test]
    fn test_unknown_scenario_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("never");
        let backend = SyntheticBackend::new();
        let err = orchestrator(backend.clone(), &dir)
            .run_selected(TABLE, Some("nope"), &mut io::sink())
            .unwrap_err();
        assert!(matches!(err, RunError::ScenarioNotFound(_)));
        assert!(!dir.exists());
        assert_eq!(backend.opened(), 0);
    }

    #[test]
    fn test_result_write_failure_marks_failed() {
        let _profiler = profiler();
        let tmp = tempfile::tempdir().unwrap();
        // A directory where the result file should go makes the write fail
        std::fs::create_dir(tmp.path().join("small_yuyv_results.txt")).unwrap();
        let report = orchestrator(SyntheticBackend::new(), tmp.path())
            .run(TABLE, &mut io::sink())
            .unwrap();

        let statuses: Vec<_> = report.summary.scenarios.iter().map(|r| r.status).collect();
        assert_eq!(statuses[0], ScenarioStatus::Failed);
        assert_eq!(statuses[2], ScenarioStatus::Success);
        assert!(report.summary.scenarios[0].result_file.is_none());
        let summary = std::fs::read_to_string(&report.summary_path).unwrap();
        assert!(!summary.contains("## small_yuyv"));
        assert!(summary.contains("## small_mjpeg"));
    }
}
