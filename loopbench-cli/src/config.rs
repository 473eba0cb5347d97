//! Configuration loading from loopbench.toml
//!
//! Host and run defaults can be set in a `loopbench.toml` file. The file is
//! discovered by walking up from the current directory. Command-line flags
//! override file values, and file values override built-in defaults.

use anyhow::Context;
use loopbench_loopback::ProvisionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file searched for
pub const CONFIG_FILE: &str = "loopbench.toml";

/// loopbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoopbenchConfig {
    /// Virtual device provisioning
    #[serde(default)]
    pub loopback: LoopbackConfig,
    /// Benchmark run defaults
    #[serde(default)]
    pub run: RunConfig,
}

/// `[loopback]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopbackConfig {
    /// Kernel module name
    #[serde(default = "default_module")]
    pub module: String,
    /// Card label of the created device
    #[serde(default = "default_card_label")]
    pub card_label: String,
    /// Generator executable
    #[serde(default = "default_generator")]
    pub generator: String,
    /// Longest wait for the device node after loading the module (e.g., "2s")
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout: String,
    /// Generator warm-up before the device is used (e.g., "1s")
    #[serde(default = "default_warmup")]
    pub warmup: String,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            module: default_module(),
            card_label: default_card_label(),
            generator: default_generator(),
            settle_timeout: default_settle_timeout(),
            warmup: default_warmup(),
        }
    }
}

/// `[run]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Capture duration per scenario (e.g., "10s")
    #[serde(default = "default_duration")]
    pub duration: String,
    /// Prefix of the generated output directory name
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    /// Driver buffers per capture session
    #[serde(default = "default_buffers")]
    pub buffers: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            output_prefix: default_output_prefix(),
            buffers: default_buffers(),
        }
    }
}

fn default_module() -> String {
    "v4l2loopback".to_string()
}
fn default_card_label() -> String {
    "loopbench".to_string()
}
fn default_generator() -> String {
    "ffmpeg".to_string()
}
fn default_settle_timeout() -> String {
    "2s".to_string()
}
fn default_warmup() -> String {
    "1s".to_string()
}
fn default_duration() -> String {
    "10s".to_string()
}
fn default_output_prefix() -> String {
    "results".to_string()
}
fn default_buffers() -> u32 {
    4
}

impl LoopbenchConfig {
    /// Load configuration from a specific file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        tracing::warn!("Ignoring {}: {:#}", config_path.display(), e);
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Provisioner settings derived from `[loopback]`
    pub fn provision_config(&self) -> anyhow::Result<ProvisionConfig> {
        let settle_timeout = Self::parse_duration(&self.loopback.settle_timeout)
            .context("loopback.settle_timeout")?;
        let warmup = Self::parse_duration(&self.loopback.warmup).context("loopback.warmup")?;
        Ok(ProvisionConfig {
            module: self.loopback.module.clone(),
            card_label: self.loopback.card_label.clone(),
            generator: self.loopback.generator.clone(),
            settle_timeout,
            warmup,
            ..ProvisionConfig::default()
        })
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# loopbench configuration

[loopback]
# Kernel module providing the virtual capture device
module = "v4l2loopback"
# Card label shown by v4l2-ctl --list-devices
card_label = "loopbench"
# Synthetic video generator
generator = "ffmpeg"
# Longest wait for /dev/videoN after loading the module
settle_timeout = "2s"
# Generator must stay up this long before capture starts
warmup = "1s"

[run]
# Capture duration per scenario
duration = "10s"
# Output directory is <prefix>_<timestamp> unless -output is given
output_prefix = "results"
# Driver buffers per capture session
buffers = 4
"#
        .to_string()
    }

    /// Parse a duration string like "500ms", "2s", "1.5s" or "1m".
    ///
    /// A bare number is taken as seconds.
    pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            return Err(anyhow::anyhow!("Invalid duration: {}", s));
        }

        let multiplier: f64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" | "" => 1e9,
            "m" | "min" => 60e9,
            "h" => 3600e9,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok(Duration::from_nanos((value * multiplier) as u64))
    }
}
