//! Virtual device provisioning
//!
//! `VirtualDeviceProvisioner::provision` returns a `VirtualDevice` only once
//! the device node exists and the generator survived warm-up. The device owns
//! the loaded module and the generator process; `release` (or drop) tears
//! both down, generator first.

use crate::pattern::{generator_args, generator_source};
use crate::tools::{GeneratorProcess, HostTools, SystemTools, ToolFailure};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Provisioning and release failures
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Something already occupies the device path
    #[error("Device {0} already exists, unload v4l2loopback first")]
    AlreadyExists(PathBuf),

    /// A required host tool is not installed
    #[error("{what} not found: {hint}")]
    PrerequisiteMissing {
        /// Missing tool or module
        what: String,
        /// Install hint
        hint: String,
    },

    /// The module loader reported failure
    #[error("Failed to load {module}: {failure}")]
    ModuleLoadFailed {
        /// Module name
        module: String,
        /// Loader status and combined output
        failure: ToolFailure,
    },

    /// The module loaded but the device node never appeared
    #[error("Device {path} not created after loading module (waited {waited:?})")]
    DeviceNotCreated {
        /// Expected device path
        path: PathBuf,
        /// How long the node was waited for
        waited: Duration,
    },

    /// The generator could not be started or died during warm-up
    #[error("Failed to start generator: {0}")]
    GeneratorStartFailed(String),

    /// Test pattern has no generator translation
    #[error("Invalid test pattern: {0}")]
    InvalidPattern(String),

    /// The module could not be unloaded during release
    #[error("Failed to unload {module}: {failure}")]
    ModuleUnloadFailed {
        /// Module name
        module: String,
        /// Loader status and combined output
        failure: ToolFailure,
    },
}

/// Host-specific provisioning settings
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Kernel module providing loopback devices
    pub module: String,
    /// Card label given to the created device
    pub card_label: String,
    /// Generator executable name or path
    pub generator: String,
    /// Longest wait for the device node after module load
    pub settle_timeout: Duration,
    /// How long the generator must stay alive before the device is handed out
    pub warmup: Duration,
    /// Poll period for settle and warm-up checks
    pub poll_interval: Duration,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            module: "v4l2loopback".to_string(),
            card_label: "loopbench".to_string(),
            generator: "ffmpeg".to_string(),
            settle_timeout: Duration::from_secs(2),
            warmup: Duration::from_secs(1),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Device node path for a loopback index
pub fn device_path(index: u32) -> PathBuf {
    PathBuf::from(format!("/dev/video{index}"))
}

/// Observable lifecycle of a `VirtualDevice`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Nothing has been created on the host yet
    Unprovisioned,
    /// Module loaded (generator possibly running)
    Provisioned,
    /// Torn down; further releases are no-ops
    Released,
}

enum State {
    Unprovisioned,
    Provisioned {
        generator: Option<Box<dyn GeneratorProcess>>,
    },
    Released,
}

/// A provisioned loopback device and the host resources behind it
pub struct VirtualDevice {
    path: PathBuf,
    index: u32,
    module: String,
    tools: Arc<dyn HostTools>,
    state: State,
}

impl fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDevice")
            .field("path", &self.path)
            .field("index", &self.index)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

impl VirtualDevice {
    /// Device node path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loopback device index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        match self.state {
            State::Unprovisioned => Lifecycle::Unprovisioned,
            State::Provisioned { .. } => Lifecycle::Provisioned,
            State::Released => Lifecycle::Released,
        }
    }

    /// Tear down the generator and unload the module.
    ///
    /// Generator termination errors are logged and never prevent the unload;
    /// the unload result is returned. Calling this again is a no-op.
    pub fn release(&mut self) -> Result<(), ProvisionError> {
        let generator = match std::mem::replace(&mut self.state, State::Released) {
            State::Provisioned { generator } => generator,
            State::Unprovisioned | State::Released => return Ok(()),
        };

        if let Some(mut generator) = generator {
            let pid = generator.id();
            match generator.terminate() {
                Ok(()) => tracing::debug!(pid, "Generator stopped"),
                Err(e) => tracing::warn!(pid, error = %e, "Failed to stop generator"),
            }
        }

        self.tools
            .unload_module(&self.module)
            .map_err(|failure| ProvisionError::ModuleUnloadFailed {
                module: self.module.clone(),
                failure,
            })?;
        tracing::info!(device = %self.path.display(), "Virtual device released");
        Ok(())
    }

    fn rollback(&mut self, cause: ProvisionError) -> ProvisionError {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "Rollback could not unload module");
        }
        cause
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "Virtual device release failed");
        }
    }
}

/// Creates `VirtualDevice`s on the host
pub struct VirtualDeviceProvisioner {
    tools: Arc<dyn HostTools>,
    config: ProvisionConfig,
}

impl Default for VirtualDeviceProvisioner {
    fn default() -> Self {
        Self::new(ProvisionConfig::default())
    }
}

impl VirtualDeviceProvisioner {
    /// Provisioner acting on the real host
    pub fn new(config: ProvisionConfig) -> Self {
        Self::with_tools(Arc::new(SystemTools), config)
    }

    /// Provisioner acting through `tools`
    pub fn with_tools(tools: Arc<dyn HostTools>, config: ProvisionConfig) -> Self {
        Self { tools, config }
    }

    /// Settings in use
    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Verify the generator binary and the kernel module are installed
    pub fn check_prerequisites(&self) -> Result<PathBuf, ProvisionError> {
        let generator = self.tools.find_tool(&self.config.generator).ok_or_else(|| {
            ProvisionError::PrerequisiteMissing {
                what: self.config.generator.clone(),
                hint: format!("install with 'sudo apt install {}'", self.config.generator),
            }
        })?;

        if !self.tools.module_available(&self.config.module) {
            return Err(ProvisionError::PrerequisiteMissing {
                what: format!("{} kernel module", self.config.module),
                hint: format!("install with 'sudo apt install {}-dkms'", self.config.module),
            });
        }
        Ok(generator)
    }

    /// Whether provisioning can work on this host
    pub fn is_available(&self) -> bool {
        self.check_prerequisites().is_ok()
    }

    /// Create `/dev/video<index>` fed with `pattern` at the given geometry.
    pub fn provision(
        &self,
        index: u32,
        width: u32,
        height: u32,
        fps: u32,
        pattern: &str,
    ) -> Result<VirtualDevice, ProvisionError> {
        let path = device_path(index);

        // Pre-flight: nothing on the host changes before the module load
        if self.tools.path_exists(&path) {
            return Err(ProvisionError::AlreadyExists(path));
        }
        let source = generator_source(pattern, width, height, fps)?;
        let generator_bin = self.check_prerequisites()?;

        let mut device = VirtualDevice {
            path,
            index,
            module: self.config.module.clone(),
            tools: Arc::clone(&self.tools),
            state: State::Unprovisioned,
        };

        let params = vec![
            format!("video_nr={index}"),
            format!("card_label={}", self.config.card_label),
            "exclusive_caps=1".to_string(),
        ];
        self.tools
            .load_module(&self.config.module, &params)
            .map_err(|failure| ProvisionError::ModuleLoadFailed {
                module: self.config.module.clone(),
                failure,
            })?;
        device.state = State::Provisioned { generator: None };
        tracing::debug!(module = %self.config.module, ?params, "Module loaded");

        if !self.wait_until(self.config.settle_timeout, || self.tools.path_exists(&device.path)) {
            let cause = ProvisionError::DeviceNotCreated {
                path: device.path.clone(),
                waited: self.config.settle_timeout,
            };
            return Err(device.rollback(cause));
        }

        let args = generator_args(&source, &device.path);
        let generator = match self.tools.spawn_generator(&generator_bin, &args) {
            Ok(generator) => generator,
            Err(e) => return Err(device.rollback(ProvisionError::GeneratorStartFailed(e.to_string()))),
        };
        tracing::debug!(pid = generator.id(), %source, "Generator started");

        let mut exited = false;
        if let State::Provisioned { generator: slot } = &mut device.state {
            let generator = slot.insert(generator);
            // Warm-up: the generator has to stay up for the whole interval
            exited = self.wait_until(self.config.warmup, || generator.has_exited());
        }
        if exited {
            let cause = ProvisionError::GeneratorStartFailed(format!(
                "{} exited during warm-up",
                self.config.generator
            ));
            return Err(device.rollback(cause));
        }

        tracing::info!(
            device = %device.path.display(),
            "{}x{} @ {} fps, pattern {}",
            width,
            height,
            fps,
            if pattern.is_empty() { "testsrc" } else { pattern }
        );
        Ok(device)
    }

    /// Poll `ready` until it holds or `limit` elapses. Returns whether it held.
    fn wait_until(&self, limit: Duration, mut ready: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if ready() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(self.config.poll_interval.min(deadline - now));
        }
    }
}

/// Whether the generator and loopback module are installed, using default settings
pub fn is_available() -> bool {
    VirtualDeviceProvisioner::default().is_available()
}
