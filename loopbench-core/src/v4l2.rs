//! V4L2 Capture Backend
//!
//! Opens a real device node through the `v4l` crate and streams frames from
//! memory-mapped driver buffers on a dedicated thread.

use crate::capture::{
    CaptureBackend, CaptureConfig, CaptureDevice, CaptureError, FrameSender, FrameStream,
    frame_channel, spawn_producer,
};
use crate::format::FormatInfo;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use v4l::buffer::{Flags, Metadata, Type};
use v4l::format::FieldOrder;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

/// How long one readiness poll may block before the stop flag is rechecked
const POLL_TIMEOUT_MS: i32 = 100;

/// How long the first frame may take once streaming is switched on
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Capture backend backed by the kernel V4L2 API
#[derive(Debug, Default, Clone, Copy)]
pub struct V4lBackend;

impl CaptureBackend for V4lBackend {
    fn open(
        &self,
        path: &Path,
        config: &CaptureConfig,
    ) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let open_failed = |e: io::Error| CaptureError::DeviceOpenFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let device = Device::with_path(path).map_err(open_failed)?;

        let mut format = Format::new(
            config.width,
            config.height,
            FourCC::new(&config.pixel_format.fourcc()),
        );
        format.field_order = FieldOrder::Progressive;
        device.set_format(&format).map_err(open_failed)?;
        device
            .set_params(&Parameters::with_fps(config.fps))
            .map_err(open_failed)?;

        tracing::debug!(path = %path.display(), format = %config.pixel_format, "Opened V4L2 device");

        Ok(Box::new(V4lDevice {
            device: Arc::new(device),
            buffer_count: config.buffer_count.max(1),
            session: None,
        }))
    }
}

struct Session {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

struct V4lDevice {
    device: Arc<Device>,
    buffer_count: u32,
    session: Option<Session>,
}

impl CaptureDevice for V4lDevice {
    fn format(&self) -> Result<FormatInfo, CaptureError> {
        let format = self
            .device
            .format()
            .map_err(|e| CaptureError::FormatQueryFailed(e.to_string()))?;
        Ok(FormatInfo {
            width: format.width,
            height: format.height,
            fourcc: format.fourcc.repr,
            bytes_per_line: format.stride,
            size_image: format.size,
        })
    }

    fn start(&mut self) -> Result<FrameStream, CaptureError> {
        if self.session.is_some() {
            return Err(CaptureError::SessionStartFailed(
                "capture already running".to_string(),
            ));
        }

        let (tx, stream) = frame_channel(self.buffer_count as usize);
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let device = Arc::clone(&self.device);
        let buffer_count = self.buffer_count;
        let thread_stop = Arc::clone(&stop);
        let thread = spawn_producer("v4l2-capture", move || {
            stream_loop(&device, buffer_count, &tx, &thread_stop, ready_tx)
        })
        .map_err(|e| CaptureError::SessionStartFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.session = Some(Session { stop, thread });
                Ok(stream)
            }
            Ok(Err(reason)) => {
                let _ = thread.join();
                Err(CaptureError::SessionStartFailed(reason))
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::SessionStartFailed(
                    "capture thread exited during setup".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop.store(true, Ordering::SeqCst);
            if session.thread.join().is_err() {
                tracing::warn!("V4L2 capture thread panicked");
            }
        }
    }
}

impl Drop for V4lDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

fn frame_bytes(buf: &[u8], meta: &Metadata) -> Vec<u8> {
    if meta.bytesused == 0 || meta.flags.contains(Flags::ERROR) {
        Vec::new()
    } else {
        let used = (meta.bytesused as usize).min(buf.len());
        buf[..used].to_vec()
    }
}

fn stream_loop(
    device: &Device,
    buffer_count: u32,
    tx: &FrameSender,
    stop: &AtomicBool,
    ready: mpsc::Sender<Result<(), String>>,
) {
    let mut stream = match MmapStream::with_buffers(device, Type::VideoCapture, buffer_count) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };

    // The first `next` queues every buffer and issues STREAMON; the session
    // only counts as started once that succeeded
    stream.set_timeout(FIRST_FRAME_TIMEOUT);
    let first = match stream.next() {
        Ok((buf, meta)) => Some(frame_bytes(buf, meta)),
        Err(e) if e.kind() == io::ErrorKind::TimedOut => None,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let Some(first) = first else {
        tracing::warn!(
            "No frame within {:?} of stream on, ending capture",
            FIRST_FRAME_TIMEOUT
        );
        return;
    };
    if !tx.send(first) {
        return;
    }

    // `next` re-queues the previous buffer before dequeuing, so it must only
    // run once a buffer is ready; a timeout inside it would queue twice
    stream.clear_timeout();
    let handle = stream.handle();
    while !stop.load(Ordering::SeqCst) {
        match handle.poll(libc::POLLIN, POLL_TIMEOUT_MS) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(error = %e, "Poll failed, ending capture");
                break;
            }
        }

        let frame = match stream.next() {
            Ok((buf, meta)) => frame_bytes(buf, meta),
            Err(e) => {
                tracing::warn!(error = %e, "Dequeue failed, ending capture");
                break;
            }
        };

        if !tx.send(frame) {
            break;
        }
    }
    // Dropping `stream` turns streaming off and unmaps the buffers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bytes_trims_to_bytesused() {
        let meta = Metadata { bytesused: 3, ..Metadata::default() };
        assert_eq!(frame_bytes(&[1, 2, 3, 4, 5], &meta), vec![1, 2, 3]);
    }

    #[test]
    fn test_errored_or_empty_buffers_are_dropped_frames() {
        let empty = Metadata::default();
        assert!(frame_bytes(&[1, 2, 3], &empty).is_empty());

        let errored = Metadata { bytesused: 3, flags: Flags::ERROR, ..Metadata::default() };
        assert!(frame_bytes(&[1, 2, 3], &errored).is_empty());
    }

    #[test]
    fn test_missing_device_fails_open() {
        let config = CaptureConfig {
            pixel_format: crate::format::PixelFormat::Yuyv,
            width: 64,
            height: 48,
            fps: 30,
            buffer_count: 2,
        };
        let err = V4lBackend
            .open(Path::new("/dev/loopbench-missing"), &config)
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::DeviceOpenFailed { .. }));
    }
}
