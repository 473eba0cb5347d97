//! Text Output
//!
//! `summary.txt` and the duration notation used throughout the text reports.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Concatenate per-scenario result texts under a generation header.
///
/// `sections` is `(scenario name, result text)` in the order they should
/// appear; callers pass only scenarios whose result file was written.
pub fn generate_text_summary<'a, I>(generated: DateTime<Utc>, sections: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut summary = String::from("# Benchmark Summary\n\n");
    summary.push_str(&format!(
        "Generated: {}\n\n",
        generated.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));

    for (name, content) in sections {
        summary.push_str(&format!("## {}\n\n", name));
        summary.push_str(content);
        summary.push_str("\n\n");
    }
    summary
}

/// Compact duration: `850ns`, `12.5µs`, `33.333ms`, `2.001s`
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    let (value, unit) = if nanos < 1_000 {
        return format!("{}ns", nanos);
    } else if nanos < 1_000_000 {
        (nanos as f64 / 1e3, "µs")
    } else if nanos < 1_000_000_000 {
        (nanos as f64 / 1e6, "ms")
    } else {
        (d.as_secs_f64(), "s")
    };

    let mut text = format!("{:.3}", value);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    text.push_str(unit);
    text
}
