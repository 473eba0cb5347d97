//! Scoped Profiling
//!
//! A profiling session brackets exactly one capture window:
//! - CPU profile: `pprof` sampling profiler, written as protobuf on finish
//! - Execution trace: JSON-lines tracing layer, armed only while the session runs
//!
//! The CPU profiler is process-wide, so at most one session may be active.
//! A second `start` while one is running fails with `ProfilingError::Busy`.

use loopbench_core::MemorySnapshot;
use pprof::protos::Message;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::registry::LookupSpan;

/// CPU profiler sampling frequency in Hz
const SAMPLING_FREQUENCY: i32 = 1000;

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Serializes tests that open profiling sessions
#[cfg(test)]
pub(crate) static PROFILER_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Profiling failures; none of them abort a scenario
#[derive(Debug, Error)]
pub enum ProfilingError {
    /// Another profiling session is running
    #[error("Another profiling session is already active")]
    Busy,

    /// Profile or trace file could not be written
    #[error("Could not write {path}: {source}")]
    Io {
        /// Target file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The sampling profiler failed
    #[error("CPU profiler error: {0}")]
    Profiler(#[from] pprof::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ProfilingError + '_ {
    move |source| ProfilingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Destination of the execution trace for one scenario
///
/// The layer is installed for the whole scenario but records nothing until a
/// `ProfilingSession` arms it.
pub struct TraceSink {
    path: PathBuf,
    file: Arc<File>,
    armed: Arc<AtomicBool>,
}

impl TraceSink {
    /// Create (truncate) the trace file
    pub fn create(path: &Path) -> Result<Self, ProfilingError> {
        let file = File::create(path).map_err(io_error(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(file),
            armed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Trace file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// JSON layer writing every `loopbench*` event while armed
    pub fn layer<S>(&self) -> impl Layer<S> + Send + Sync + 'static
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let armed = Arc::clone(&self.armed);
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(Arc::clone(&self.file))
            .with_thread_ids(true)
            .with_filter(filter_fn(move |meta| {
                armed.load(Ordering::Relaxed) && meta.target().starts_with("loopbench")
            }))
    }
}

/// An active profiling window
pub struct ProfilingSession<'a> {
    cpu: Option<(pprof::ProfilerGuard<'static>, PathBuf)>,
    trace: Option<&'a TraceSink>,
}

impl<'a> ProfilingSession<'a> {
    /// Start CPU profiling to `cpu_profile` (if given) and arm `trace` (if given)
    pub fn start(
        cpu_profile: Option<&Path>,
        trace: Option<&'a TraceSink>,
    ) -> Result<Self, ProfilingError> {
        if SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ProfilingError::Busy);
        }

        // From here on, dropping `session` frees the slot
        let mut session = Self { cpu: None, trace: None };

        if let Some(path) = cpu_profile {
            let guard = pprof::ProfilerGuardBuilder::default()
                .frequency(SAMPLING_FREQUENCY)
                .blocklist(&["libc", "libgcc", "pthread", "vdso"])
                .build()?;
            session.cpu = Some((guard, path.to_path_buf()));
            tracing::info!("CPU profiling enabled: {}", path.display());
        }

        if let Some(sink) = trace {
            sink.armed.store(true, Ordering::SeqCst);
            session.trace = Some(sink);
            tracing::info!("Execution trace enabled: {}", sink.path().display());
        }

        Ok(session)
    }

    /// Stop profiling and write the CPU profile. Failures are logged.
    pub fn finish(mut self) {
        self.disarm_trace();
        if let Some((guard, path)) = self.cpu.take() {
            match write_cpu_profile(&guard, &path) {
                Ok(()) => tracing::debug!("CPU profile written: {}", path.display()),
                Err(e) => tracing::warn!("{}", e),
            }
        }
    }

    fn disarm_trace(&mut self) {
        if let Some(sink) = self.trace.take() {
            sink.armed.store(false, Ordering::SeqCst);
            if let Err(e) = (&*sink.file).flush() {
                tracing::warn!("Could not flush trace {}: {}", sink.path().display(), e);
            }
        }
    }
}

impl Drop for ProfilingSession<'_> {
    fn drop(&mut self) {
        self.disarm_trace();
        // Dropping the guard stops the sampling timer before the slot frees up
        self.cpu = None;
        SESSION_ACTIVE.store(false, Ordering::SeqCst);
    }
}

fn write_cpu_profile(
    guard: &pprof::ProfilerGuard<'static>,
    path: &Path,
) -> Result<(), ProfilingError> {
    let profile = guard.report().build()?.pprof()?;
    let bytes = profile.encode_to_vec();
    std::fs::write(path, bytes).map_err(io_error(path))
}

/// Contents of `<name>_mem.prof`
#[derive(Debug, Serialize)]
pub struct MemoryProfile {
    /// Whether the tracking allocator is installed
    pub tracking: bool,
    /// Counters before capture started
    pub before_capture: MemorySnapshot,
    /// Counters after capture stopped
    pub after_capture: MemorySnapshot,
    /// Counters after the device and its buffers were released
    pub after_release: MemorySnapshot,
}

/// Write the memory profile as pretty JSON
pub fn write_memory_profile(path: &Path, profile: &MemoryProfile) -> Result<(), ProfilingError> {
    let file = File::create(path).map_err(io_error(path))?;
    serde_json::to_writer_pretty(file, profile)
        .map_err(|e| ProfilingError::Io {
            path: path.to_path_buf(),
            source: e.into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_session_is_busy() {
        let _lock = PROFILER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let first = ProfilingSession::start(None, None).unwrap();
        assert!(matches!(
            ProfilingSession::start(None, None),
            Err(ProfilingError::Busy)
        ));
        first.finish();
        let again = ProfilingSession::start(None, None).unwrap();
        drop(again);
    }

    #[test]
    fn test_trace_only_armed_inside_session() {
        let _lock = PROFILER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.out");
        let sink = TraceSink::create(&path).unwrap();

        use tracing_subscriber::layer::SubscriberExt;
        let subscriber = tracing_subscriber::registry().with(sink.layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "loopbench::test", "before");
            let session = ProfilingSession::start(None, Some(&sink)).unwrap();
            tracing::info!(target: "loopbench::test", "during");
            session.finish();
            tracing::info!(target: "loopbench::test", "after");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("during"));
        assert!(!content.contains("before"));
        assert!(!content.contains("\"after\""));
        for line in content.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[test]
    fn test_cpu_profile_written() {
        let _lock = PROFILER_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpu.prof");
        let session = ProfilingSession::start(Some(&path), None).unwrap();
        let mut x = 0u64;
        for i in 0..2_000_000u64 {
            x = x.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(x);
        session.finish();
        assert!(path.exists());
    }

    #[test]
    fn test_memory_profile_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mem.prof");
        let profile = MemoryProfile {
            tracking: false,
            before_capture: MemorySnapshot::default(),
            after_capture: MemorySnapshot::default(),
            after_release: MemorySnapshot::default(),
        };
        write_memory_profile(&path, &profile).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["after_release"]["live_bytes"], 0);
    }
}
