//! Percentile Computation
//!
//! Percentiles over frame-time samples in nanoseconds. Tail values are the
//! interesting signal for capture jitter, so nothing is filtered out.

use serde::{Deserialize, Serialize};

/// Frame-time percentiles reported per scenario
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    /// 50th percentile (median)
    pub p50: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

/// Compute a single percentile from samples
///
/// Uses linear interpolation between nearest ranks.
///
/// ```
/// # use loopbench_stats::compute_percentile;
/// let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(compute_percentile(&samples, 50.0), 3.0);
/// ```
pub fn compute_percentile(samples: &[f64], percentile: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    if samples.len() == 1 {
        return samples[0];
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_of_sorted(&sorted, percentile)
}

fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> f64 {
    let n = sorted.len();
    let rank = (percentile / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = (lower_idx + 1).min(n - 1);
    let fraction = rank - lower_idx as f64;

    sorted[lower_idx] + fraction * (sorted[upper_idx] - sorted[lower_idx])
}

/// Compute the reported percentiles, sorting once
pub fn compute_percentiles(samples: &[f64]) -> Percentiles {
    match samples.len() {
        0 => Percentiles::default(),
        1 => Percentiles {
            p50: samples[0],
            p95: samples[0],
            p99: samples[0],
        },
        _ => {
            let mut sorted = samples.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            Percentiles {
                p50: percentile_of_sorted(&sorted, 50.0),
                p95: percentile_of_sorted(&sorted, 95.0),
                p99: percentile_of_sorted(&sorted, 99.0),
            }
        }
    }
}
