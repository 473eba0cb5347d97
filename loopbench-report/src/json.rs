//! JSON Output

use crate::report::RunSummary;

/// Generate the prettified `summary.json` content.
pub fn generate_json_summary(summary: &RunSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}
