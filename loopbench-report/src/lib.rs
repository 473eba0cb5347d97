#![warn(missing_docs)]
//! loopbench Report - Results and Summaries
//!
//! Generates the run-level outputs:
//! - `BenchmarkResults`, one record per scenario run
//! - Markdown-style text summary (`summary.txt`)
//! - JSON summary with host metadata (`summary.json`)

mod json;
mod report;
mod text;

pub use json::generate_json_summary;
pub use report::{
    BenchmarkResults, RunMeta, RunSummary, ScenarioRecord, ScenarioStatus, SystemInfo,
};
pub use text::{format_duration, generate_text_summary};
