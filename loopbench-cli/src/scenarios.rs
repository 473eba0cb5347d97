//! Scenario table
//!
//! Fixed capture configurations. Table order is the order scenarios run in
//! and the order they appear in every report.

use crate::orchestrator::RunError;
use std::fmt;

/// One named capture configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkScenario {
    /// Unique name, also the artifact file prefix
    pub name: &'static str,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame rate
    pub fps: u32,
    /// Pixel format name, parsed when the scenario runs
    pub format: &'static str,
}

impl fmt::Display for BenchmarkScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ {} fps, {}",
            self.width, self.height, self.fps, self.format
        )
    }
}

/// All scenarios, in run order
pub const SCENARIOS: &[BenchmarkScenario] = &[
    // Baselines
    BenchmarkScenario { name: "baseline_480p_mjpeg", width: 640, height: 480, fps: 30, format: "MJPEG" },
    BenchmarkScenario { name: "baseline_720p_mjpeg", width: 1280, height: 720, fps: 30, format: "MJPEG" },
    BenchmarkScenario { name: "baseline_1080p_mjpeg", width: 1920, height: 1080, fps: 30, format: "MJPEG" },
    // Format comparison at 480p
    BenchmarkScenario { name: "format_480p_yuyv", width: 640, height: 480, fps: 30, format: "YUYV" },
    // Frame rate sweep at 720p
    BenchmarkScenario { name: "fps_720p_15fps", width: 1280, height: 720, fps: 15, format: "MJPEG" },
    BenchmarkScenario { name: "fps_720p_30fps", width: 1280, height: 720, fps: 30, format: "MJPEG" },
    BenchmarkScenario { name: "fps_720p_60fps", width: 1280, height: 720, fps: 60, format: "MJPEG" },
];

/// Pick the scenarios to run: the named one, or the whole table.
pub fn select_scenarios(
    table: &[BenchmarkScenario],
    name: Option<&str>,
) -> Result<Vec<BenchmarkScenario>, RunError> {
    match name.filter(|n| !n.is_empty()) {
        None => Ok(table.to_vec()),
        Some(name) => table
            .iter()
            .find(|s| s.name == name)
            .map(|s| vec![*s])
            .ok_or_else(|| RunError::ScenarioNotFound(name.to_string())),
    }
}

/// Text printed by `-list`
pub fn format_scenario_list(table: &[BenchmarkScenario]) -> String {
    let mut output = String::from("Available benchmark scenarios:\n");
    for s in table {
        output.push_str(&format!(
            "  {}: {}x{} @ {} fps ({})\n",
            s.name, s.width, s.height, s.fps, s.format
        ));
    }
    output
}
