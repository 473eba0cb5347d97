//! Scenario output capture
//!
//! Each scenario writes its diagnostics and results into a `ScenarioOutput`
//! handed to it explicitly. For multi-scenario runs that output is an
//! `OutputCapture`: writes go into an unbounded channel, a drain thread
//! accumulates them, and `finish` joins the drain before the text is used.
//!
//! ```text
//!  executor ─┐                      ┌──────────────┐
//!  tracing  ─┼─> CaptureWriter ───> │ drain thread │ ──> finish() ──> String
//!  results  ─┘     (clone)    Eof ─>└──────────────┘      (join)
//! ```

use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;

enum Chunk {
    Data(Vec<u8>),
    Eof,
}

/// Isolated sink for one scenario's output
pub struct OutputCapture {
    tx: Sender<Chunk>,
    drain: JoinHandle<Vec<u8>>,
}

impl OutputCapture {
    /// Start the drain thread
    pub fn start() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let drain = std::thread::Builder::new()
            .name("output-drain".to_string())
            .spawn(move || drain(rx))?;
        Ok(Self { tx, drain })
    }

    /// A writer feeding this capture
    pub fn writer(&self) -> CaptureWriter {
        CaptureWriter {
            tx: self.tx.clone(),
        }
    }

    /// Signal end of output, wait for the drain to consume everything and
    /// return the captured text. Writes issued after this point fail with
    /// `BrokenPipe`.
    pub fn finish(self) -> String {
        let _ = self.tx.send(Chunk::Eof);
        drop(self.tx);
        let bytes = match self.drain.join() {
            Ok(bytes) => bytes,
            Err(_) => {
                tracing::warn!("Output drain thread panicked");
                Vec::new()
            }
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn drain(rx: Receiver<Chunk>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4096);
    // Writers may outlive the capture, so the sentinel rather than
    // disconnection marks the end.
    while let Ok(chunk) = rx.recv() {
        match chunk {
            Chunk::Data(bytes) => buf.extend_from_slice(&bytes),
            Chunk::Eof => break,
        }
    }
    buf
}

/// Write half of an `OutputCapture`
#[derive(Clone)]
pub struct CaptureWriter {
    tx: Sender<Chunk>,
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(Chunk::Data(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "output capture finished"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Where a scenario's output goes
#[derive(Clone)]
pub enum ScenarioOutput {
    /// Process stdout
    Stdout,
    /// Process stderr
    Stderr,
    /// An isolated capture
    Captured(CaptureWriter),
}

impl Write for ScenarioOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ScenarioOutput::Stdout => io::stdout().write(buf),
            ScenarioOutput::Stderr => io::stderr().write(buf),
            ScenarioOutput::Captured(w) => w.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            ScenarioOutput::Stdout => io::stdout().lock().write_all(buf),
            ScenarioOutput::Stderr => io::stderr().lock().write_all(buf),
            // One chunk per call keeps a formatted event contiguous
            ScenarioOutput::Captured(w) => w.write(buf).map(|_| ()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ScenarioOutput::Stdout => io::stdout().flush(),
            ScenarioOutput::Stderr => io::stderr().flush(),
            ScenarioOutput::Captured(w) => w.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for ScenarioOutput {
    type Writer = ScenarioOutput;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_collects_all_writers() {
        let capture = OutputCapture::start().unwrap();
        let mut a = capture.writer();
        let mut b = ScenarioOutput::Captured(capture.writer());

        writeln!(a, "first").unwrap();
        writeln!(b, "second").unwrap();
        let text = capture.finish();
        assert_eq!(text, "first\nsecond\n");

        // Late writes are rejected rather than lost silently
        assert_eq!(
            a.write(b"late").unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }

    #[test]
    fn test_capture_from_other_thread() {
        let capture = OutputCapture::start().unwrap();
        let mut w = capture.writer();
        std::thread::spawn(move || {
            for i in 0..1000 {
                writeln!(w, "line {i}").unwrap();
            }
        })
        .join()
        .unwrap();
        let text = capture.finish();
        assert_eq!(text.lines().count(), 1000);
        assert!(text.ends_with("line 999\n"));
    }

    #[test]
    fn test_captures_are_isolated() {
        let first = OutputCapture::start().unwrap();
        let second = OutputCapture::start().unwrap();
        writeln!(first.writer(), "one").unwrap();
        writeln!(second.writer(), "two").unwrap();
        assert_eq!(first.finish(), "one\n");
        assert_eq!(second.finish(), "two\n");
    }

    #[test]
    fn test_scoped_tracing_goes_to_capture() {
        let capture = OutputCapture::start().unwrap();
        let output = ScenarioOutput::Captured(capture.writer());
        let subscriber = tracing_subscriber::fmt()
            .with_writer(output)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("inside the scenario");
        });
        let text = capture.finish();
        assert!(text.contains("inside the scenario"));
    }
}
