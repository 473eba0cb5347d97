//! Synthetic Capture Backend
//!
//! Produces frames in software at the configured rate. Used where no capture
//! hardware or loopback module is available, and to exercise failure paths
//! (open, format query, session start, dropped frames, early close).

use crate::capture::{
    CaptureBackend, CaptureConfig, CaptureDevice, CaptureError, FrameStream, frame_channel,
    spawn_producer,
};
use crate::format::FormatInfo;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Software frame producer implementing `CaptureBackend`
///
/// ```
/// use loopbench_core::SyntheticBackend;
///
/// let backend = SyntheticBackend::new().drop_every(10).close_after(100);
/// assert_eq!(backend.opened(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend {
    drop_every: Option<u64>,
    close_after: Option<u64>,
    fail_open: bool,
    fail_format: bool,
    fail_start: bool,
    opened: Arc<AtomicUsize>,
}

impl SyntheticBackend {
    /// Backend that delivers every frame at the configured rate
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver every `n`th frame as an empty (dropped) frame
    pub fn drop_every(mut self, n: u64) -> Self {
        self.drop_every = (n > 0).then_some(n);
        self
    }

    /// End the session after `n` deliveries
    pub fn close_after(mut self, n: u64) -> Self {
        self.close_after = Some(n);
        self
    }

    /// Make `open` fail
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make `format` fail
    pub fn fail_format(mut self) -> Self {
        self.fail_format = true;
        self
    }

    /// Make `start` fail
    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Number of devices opened through this backend (shared across clones)
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for SyntheticBackend {
    fn open(
        &self,
        path: &Path,
        config: &CaptureConfig,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        if self.fail_open {
            return Err(CaptureError::DeviceOpenFailed {
                path: path.display().to_string(),
                reason: "synthetic open failure".to_string(),
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticDevice {
            config: config.clone(),
            backend: self.clone(),
            session: None,
        }))
    }
}

struct SyntheticDevice {
    config: CaptureConfig,
    backend: SyntheticBackend,
    session: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

impl CaptureDevice for SyntheticDevice {
    fn format(&self) -> Result<FormatInfo, CaptureError> {
        if self.backend.fail_format {
            return Err(CaptureError::FormatQueryFailed(
                "synthetic format failure".to_string(),
            ));
        }
        let size = self
            .config
            .pixel_format
            .estimated_frame_size(self.config.width, self.config.height);
        Ok(FormatInfo {
            width: self.config.width,
            height: self.config.height,
            fourcc: self.config.pixel_format.fourcc(),
            bytes_per_line: match self.config.pixel_format {
                crate::PixelFormat::Yuyv => self.config.width * 2,
                _ => 0,
            },
            size_image: size as u32,
        })
    }

    fn start(&mut self) -> Result<FrameStream, CaptureError> {
        if self.backend.fail_start {
            return Err(CaptureError::SessionStartFailed(
                "synthetic start failure".to_string(),
            ));
        }
        if self.session.is_some() {
            return Err(CaptureError::SessionStartFailed(
                "capture already running".to_string(),
            ));
        }

        let (tx, stream) = frame_channel(self.config.buffer_count as usize);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let interval = Duration::from_secs_f64(1.0 / f64::from(self.config.fps.max(1)));
        let frame_size = self
            .config
            .pixel_format
            .estimated_frame_size(self.config.width, self.config.height);
        let drop_every = self.backend.drop_every;
        let close_after = self.backend.close_after;

        let thread = spawn_producer("synthetic-capture", move || {
            let start = Instant::now();
            let mut sent: u64 = 0;
            while !thread_stop.load(Ordering::SeqCst) {
                if close_after.is_some_and(|limit| sent >= limit) {
                    tracing::info!("Synthetic source closed after {} frames", sent);
                    break;
                }
                let due = start + interval.mul_f64(sent as f64);
                let now = Instant::now();
                if due > now {
                    std::thread::sleep(due - now);
                }
                sent += 1;
                let frame = match drop_every {
                    Some(n) if sent % n == 0 => Vec::new(),
                    _ => vec![(sent & 0xFF) as u8; frame_size],
                };
                if !tx.send(frame) {
                    break;
                }
            }
        })
        .map_err(|e| CaptureError::SessionStartFailed(e.to_string()))?;

        self.session = Some((stop, thread));
        Ok(stream)
    }

    fn stop(&mut self) {
        if let Some((stop, thread)) = self.session.take() {
            stop.store(true, Ordering::SeqCst);
            let _ = thread.join();
        }
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Delivery, FrameSource};
    use crate::format::PixelFormat;

    fn config(fps: u32) -> CaptureConfig {
        CaptureConfig {
            pixel_format: PixelFormat::Yuyv,
            width: 64,
            height: 48,
            fps,
            buffer_count: 4,
        }
    }

    #[test]
    fn test_delivers_frames_of_expected_size() {
        let backend = SyntheticBackend::new().close_after(3);
        let mut device = backend.open(Path::new("/dev/null"), &config(200)).unwrap();
        let mut stream = device.start().unwrap();

        let mut frames = Vec::new();
        loop {
            match stream.next_frame(Duration::from_secs(1)) {
                Delivery::Frame(f) => frames.push(f),
                Delivery::Idle => continue,
                Delivery::Closed => break,
            }
        }
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == 64 * 48 * 2));

        drop(stream);
        device.stop();
        assert_eq!(backend.opened(), 1);
    }

    #[test]
    fn test_drop_every_yields_empty_frames() {
        let backend = SyntheticBackend::new().drop_every(2).close_after(4);
        let mut device = backend.open(Path::new("/dev/null"), &config(500)).unwrap();
        let mut stream = device.start().unwrap();

        let mut empty = 0;
        let mut full = 0;
        loop {
            match stream.next_frame(Duration::from_secs(1)) {
                Delivery::Frame(f) if f.is_empty() => empty += 1,
                Delivery::Frame(_) => full += 1,
                Delivery::Idle => continue,
                Delivery::Closed => break,
            }
        }
        assert_eq!((full, empty), (2, 2));
    }

    #[test]
    fn test_stop_with_full_channel_returns() {
        let backend = SyntheticBackend::new();
        let mut device = backend.open(Path::new("/dev/null"), &config(1000)).unwrap();
        let stream = device.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        drop(stream);
        device.stop();
        device.stop();
    }

    #[test]
    fn test_injected_failures() {
        let err = SyntheticBackend::new()
            .fail_open()
            .open(Path::new("/dev/video9"), &config(30))
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::DeviceOpenFailed { .. }));

        let device = SyntheticBackend::new()
            .fail_format()
            .open(Path::new("/dev/video9"), &config(30))
            .unwrap();
        assert!(matches!(
            device.format(),
            Err(CaptureError::FormatQueryFailed(_))
        ));

        let mut device = SyntheticBackend::new()
            .fail_start()
            .open(Path::new("/dev/video9"), &config(30))
            .unwrap();
        assert!(matches!(
            device.start(),
            Err(CaptureError::SessionStartFailed(_))
        ));
    }
}
