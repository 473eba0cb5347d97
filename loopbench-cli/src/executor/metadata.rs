//! System Metadata Collection
//!
//! Host description for `summary.json`. Linux-specific data (CPU model)
//! degrades to "Unknown" on other platforms.

use chrono::Utc;
use loopbench_report::{RunMeta, SystemInfo};
use std::path::Path;
use std::time::Duration;

/// Build run metadata for a run against `device` with the given per-scenario duration
pub fn build_run_meta(device: &Path, duration: Duration) -> RunMeta {
    let system = SystemInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cpu: get_cpu_model().unwrap_or_else(|| "Unknown".to_string()),
        cpu_cores: num_cpus(),
    };

    RunMeta {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        device: device.display().to_string(),
        duration,
        system,
    }
}

/// Get CPU model name from /proc/cpuinfo (Linux only)
fn get_cpu_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("model name"))
                    .and_then(|l| l.split(':').nth(1))
                    .map(|s| s.trim().to_string())
            })
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn num_cpus() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_meta() {
        let meta = build_run_meta(Path::new("/dev/video50"), Duration::from_secs(10));
        assert_eq!(meta.device, "/dev/video50");
        assert_eq!(meta.duration, Duration::from_secs(10));
        assert_eq!(meta.system.os, std::env::consts::OS);
        assert!(meta.system.cpu_cores >= 1);
        assert!(!meta.system.cpu.is_empty());
    }
}
