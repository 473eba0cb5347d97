//! Capture Sessions
//!
//! The capture library is reached only through `CaptureBackend` and
//! `CaptureDevice`. A started session hands back a `FrameStream`, a bounded
//! channel the producer blocks on once the consumer falls behind.
//!
//! ```text
//! ┌──────────────┐  open   ┌───────────────┐  start  ┌─────────────┐
//! │CaptureBackend│ ──────> │ CaptureDevice │ ──────> │ FrameStream │
//! └──────────────┘         └───────────────┘         └─────────────┘
//!                                 │ stop / drop             │ next_frame
//!                                 v                         v
//!                          buffers released          Frame | Idle | Closed
//! ```

use crate::format::{FormatInfo, PixelFormat};
use std::path::Path;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a capture backend
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device could not be opened or configured
    #[error("Failed to open device {path}: {reason}")]
    DeviceOpenFailed {
        /// Device path
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Negotiated format could not be read back
    #[error("Failed to get format: {0}")]
    FormatQueryFailed(String),

    /// Streaming could not be started
    #[error("Failed to start capture: {0}")]
    SessionStartFailed(String),

    /// Pixel format name not recognized
    #[error("Unknown pixel format: {0}")]
    UnknownFormat(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters a device is opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Requested pixel format
    pub pixel_format: PixelFormat,
    /// Requested width in pixels
    pub width: u32,
    /// Requested height in pixels
    pub height: u32,
    /// Requested frame rate
    pub fps: u32,
    /// Number of driver buffers, also the frame channel capacity
    pub buffer_count: u32,
}

/// Outcome of one wait on a frame stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A frame arrived. An empty payload marks a frame the driver flagged bad.
    Frame(Vec<u8>),
    /// Nothing arrived within the wait
    Idle,
    /// The session ended and no more frames will come
    Closed,
}

/// Anything frames can be pulled from
pub trait FrameSource {
    /// Wait up to `timeout` for the next delivery
    fn next_frame(&mut self, timeout: Duration) -> Delivery;
}

/// Producer half of a frame channel
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: SyncSender<Vec<u8>>,
}

impl FrameSender {
    /// Blocking send. Returns false once the consumer is gone.
    pub fn send(&self, frame: Vec<u8>) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Consumer half of a frame channel
#[derive(Debug)]
pub struct FrameStream {
    rx: Receiver<Vec<u8>>,
}

impl FrameSource for FrameStream {
    fn next_frame(&mut self, timeout: Duration) -> Delivery {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Delivery::Frame(frame),
            Err(RecvTimeoutError::Timeout) => Delivery::Idle,
            Err(RecvTimeoutError::Disconnected) => Delivery::Closed,
        }
    }
}

/// Create a bounded frame channel holding at most `capacity` frames
pub fn frame_channel(capacity: usize) -> (FrameSender, FrameStream) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (FrameSender { tx }, FrameStream { rx })
}

/// Spawn a named producer thread that logs through the caller's dispatcher
///
/// A scenario's subscriber is only installed on the thread running it, so
/// producer diagnostics would otherwise bypass the scenario output.
pub fn spawn_producer<F>(name: &str, body: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, body))
}

/// An opened capture device
///
/// Dropping the device closes it. The stream returned by `start` should be
/// dropped before calling `stop` so a blocked producer can exit.
pub trait CaptureDevice: Send {
    /// Format the driver actually applied
    fn format(&self) -> Result<FormatInfo, CaptureError>;

    /// Begin streaming
    fn start(&mut self) -> Result<FrameStream, CaptureError>;

    /// Stop streaming and release driver buffers. Safe to call more than once.
    fn stop(&mut self);
}

/// Factory for capture devices
pub trait CaptureBackend: Send + Sync {
    /// Open and configure the device at `path`
    fn open(&self, path: &Path, config: &CaptureConfig)
    -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_channel_delivery() {
        let (tx, mut stream) = frame_channel(2);
        assert!(tx.send(vec![1, 2, 3]));
        assert!(tx.send(Vec::new()));
        assert_eq!(
            stream.next_frame(Duration::from_millis(10)),
            Delivery::Frame(vec![1, 2, 3])
        );
        assert_eq!(
            stream.next_frame(Duration::from_millis(10)),
            Delivery::Frame(Vec::new())
        );
        assert_eq!(stream.next_frame(Duration::from_millis(10)), Delivery::Idle);
        drop(tx);
        assert_eq!(stream.next_frame(Duration::from_millis(10)), Delivery::Closed);
    }

    #[test]
    fn test_send_after_consumer_dropped() {
        let (tx, stream) = frame_channel(1);
        drop(stream);
        assert!(!tx.send(vec![0]));
    }

    #[test]
    fn test_error_messages() {
        let err = CaptureError::DeviceOpenFailed {
            path: "/dev/video42".into(),
            reason: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to open device /dev/video42: No such file or directory"
        );
    }
}
