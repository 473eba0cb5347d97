//! Host tool invocation
//!
//! Everything the provisioner does to the host goes through `HostTools`:
//! filesystem probes, the module loader and the generator process. The
//! production implementation shells out; tests substitute a recording fake.

use std::env;
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// A host tool ran but reported failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    /// Exit code, if the tool exited normally
    pub status: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "exit status {code}")?,
            None => write!(f, "terminated by signal")?,
        }
        let output = self.output.trim();
        if !output.is_empty() {
            write!(f, ": {output}")?;
        }
        Ok(())
    }
}

/// A running generator process
pub trait GeneratorProcess: Send {
    /// Process id
    fn id(&self) -> u32;

    /// Whether the process has already exited
    fn has_exited(&mut self) -> bool;

    /// Stop the process and reap it
    fn terminate(&mut self) -> io::Result<()>;
}

/// Host operations needed to provision a loopback device
pub trait HostTools: Send + Sync {
    /// Whether a filesystem entry exists at `path`
    fn path_exists(&self, path: &Path) -> bool;

    /// Locate an executable on `PATH`
    fn find_tool(&self, name: &str) -> Option<PathBuf>;

    /// Whether the kernel module can be loaded on this host
    fn module_available(&self, module: &str) -> bool;

    /// Load a kernel module with parameters
    fn load_module(&self, module: &str, params: &[String]) -> Result<(), ToolFailure>;

    /// Unload a kernel module
    fn unload_module(&self, module: &str) -> Result<(), ToolFailure>;

    /// Start the generator with its output discarded
    fn spawn_generator(
        &self,
        program: &Path,
        args: &[String],
    ) -> io::Result<Box<dyn GeneratorProcess>>;
}

/// `HostTools` backed by `modprobe`, `modinfo` and real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTools;

impl SystemTools {
    fn run_combined<I, S>(program: &str, args: I) -> Result<(), ToolFailure>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ToolFailure {
                status: None,
                output: format!("failed to run {program}: {e}"),
            })?;

        if output.status.success() {
            return Ok(());
        }
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(ToolFailure {
            status: output.status.code(),
            output: combined,
        })
    }
}

impl HostTools for SystemTools {
    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn find_tool(&self, name: &str) -> Option<PathBuf> {
        let candidate = Path::new(name);
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }
        let path = env::var_os("PATH")?;
        env::split_paths(&path)
            .map(|dir| dir.join(name))
            .find(|p| is_executable(p))
    }

    fn module_available(&self, module: &str) -> bool {
        Command::new("modinfo")
            .arg(module)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn load_module(&self, module: &str, params: &[String]) -> Result<(), ToolFailure> {
        Self::run_combined(
            "modprobe",
            std::iter::once(module).chain(params.iter().map(String::as_str)),
        )
    }

    fn unload_module(&self, module: &str) -> Result<(), ToolFailure> {
        Self::run_combined("modprobe", ["-r", module])
    }

    fn spawn_generator(
        &self,
        program: &Path,
        args: &[String],
    ) -> io::Result<Box<dyn GeneratorProcess>> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(Box::new(ChildGenerator { child }))
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Send SIGTERM to a process. Returns `Err` if the signal could not be delivered.
fn send_sigterm(pid: u32) -> Result<(), io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

struct ChildGenerator {
    child: Child,
}

impl GeneratorProcess for ChildGenerator {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self) -> io::Result<()> {
        if !self.has_exited() {
            // Graceful: SIGTERM first so ffmpeg releases the device, then SIGKILL
            let _ = send_sigterm(self.child.id());
            for _ in 0..10 {
                std::thread::sleep(Duration::from_millis(20));
                if self.has_exited() {
                    break;
                }
            }
            if !self.has_exited() {
                self.child.kill()?;
            }
        }
        // Reaping an already reaped child is not an error worth reporting
        let _ = self.child.wait();
        Ok(())
    }
}

impl Drop for ChildGenerator {
    fn drop(&mut self) {
        let _ = self.terminate();
    }
}
