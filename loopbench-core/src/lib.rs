#![warn(missing_docs)]
//! loopbench Core - Capture Runtime
//!
//! This crate provides the pieces every benchmark run stands on:
//! - `CaptureBackend` / `CaptureDevice` traits, the seam to the capture library
//! - `FrameStream`, the bounded channel a capture session delivers frames through
//! - `PixelFormat` and `FormatInfo` for requested and negotiated formats
//! - Global allocator interceptor for memory accounting (`TrackingAllocator`)
//! - A V4L2 backend (feature `v4l2`) and a software `SyntheticBackend`

mod allocator;
mod capture;
mod format;
pub mod synthetic;
#[cfg(all(feature = "v4l2", target_os = "linux"))]
mod v4l2;

pub use allocator::{MemoryDelta, MemorySnapshot, TrackingAllocator, is_tracking, memory_snapshot};
pub use capture::{
    CaptureBackend, CaptureConfig, CaptureDevice, CaptureError, Delivery, FrameSender,
    FrameSource, FrameStream, frame_channel, spawn_producer,
};
pub use format::{FormatInfo, PixelFormat};
pub use synthetic::SyntheticBackend;
#[cfg(all(feature = "v4l2", target_os = "linux"))]
pub use v4l2::V4lBackend;
