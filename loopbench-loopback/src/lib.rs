#![warn(missing_docs)]
//! loopbench Loopback - Virtual Capture Devices
//!
//! Provisions a throwaway capture device: loads the `v4l2loopback` kernel
//! module and starts a generator process (ffmpeg) writing synthetic video
//! into it. Every step after the module load is rolled back on failure.
//!
//! ```text
//!  path free? ─> tools present? ─> modprobe ─> node appears? ─> spawn generator ─> warm-up
//!      │              │               │             │                 │               │
//!  AlreadyExists  Prerequisite   ModuleLoad    DeviceNotCreated  GeneratorStart  GeneratorStart
//!                  Missing        Failed          (unload)         (unload)     (kill, unload)
//! ```

mod pattern;
mod provisioner;
mod tools;

pub use pattern::{generator_args, generator_source};
pub use provisioner::{
    Lifecycle, ProvisionConfig, ProvisionError, VirtualDevice, VirtualDeviceProvisioner,
    device_path, is_available,
};
pub use tools::{GeneratorProcess, HostTools, SystemTools, ToolFailure};
