//! Byte channels carrying raw frames from the capture process.
//!
//! [`StdoutChannel`] reads the process's standard output directly.
//! [`NamedPipeChannel`] creates a FIFO the process writes into; it is created
//! before launch and opened for reading afterwards, since ffmpeg blocks opening
//! the FIFO for writing until a reader attaches.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use crate::traits::{CaptureError, CaptureProcess, FrameChannel, OutputTarget, Result, StdoutMode};

/// Interval between liveness checks while waiting for the writer to attach.
const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Which channel a device reads frames through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelKind {
    /// Read the process's stdout.
    #[default]
    Stdout,
    /// Read a FIFO in the configured FIFO directory.
    NamedPipe,
}

/// Reads frames from the capture process's stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutChannel;

impl FrameChannel for StdoutChannel {
    fn output_target(&self) -> OutputTarget {
        OutputTarget::Stdout
    }

    fn stdout_mode(&self) -> StdoutMode {
        StdoutMode::Piped
    }

    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    fn open(&self, process: &mut dyn CaptureProcess) -> Result<Box<dyn Read + Send>> {
        process.take_stdout().ok_or_else(|| {
            CaptureError::CaptureStart(format!("process {} has no stdout pipe", process.id()))
        })
    }

    fn release(&self) {}
}

/// Reads frames from a FIFO whose path is derived from the device identifier.
#[derive(Debug, Clone)]
pub struct NamedPipeChannel {
    path: PathBuf,
}

impl NamedPipeChannel {
    /// Channel for `device`, with its FIFO under `fifo_dir`.
    #[must_use]
    pub fn new(fifo_dir: &Path, device: &str) -> Self {
        Self {
            path: provision_path(fifo_dir, device),
        }
    }

    /// FIFO path used by this channel.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release a helper stuck opening the FIFO after the writer died.
    fn abandon_open(&self, pid: u32, rx: &Receiver<io::Result<File>>) -> CaptureError {
        warn!(pid, path = %self.path.display(), "capture process exited before opening fifo");
        if rx.try_recv().is_err() {
            // blocks until the helper's reader end is open, then both proceed
            match OpenOptions::new().write(true).open(&self.path) {
                Ok(_writer) => {
                    let _ = rx.recv();
                }
                Err(err) => warn!(path = %self.path.display(), "cannot release fifo opener: {err}"),
            }
        }
        CaptureError::CaptureStart(format!(
            "process {pid} exited before opening {}",
            self.path.display()
        ))
    }
}

impl FrameChannel for NamedPipeChannel {
    fn output_target(&self) -> OutputTarget {
        OutputTarget::Path(self.path.clone())
    }

    fn stdout_mode(&self) -> StdoutMode {
        StdoutMode::Discard
    }

    fn prepare(&self) -> Result<()> {
        purge_pending_fifos();
        create_fifo(&self.path)
    }

    /// Opening a FIFO for reading blocks until a writer attaches, so the open
    /// runs on a helper thread while the process is polled. If the process
    /// exits first, the FIFO is opened for writing once to release the helper.
    fn open(&self, process: &mut dyn CaptureProcess) -> Result<Box<dyn Read + Send>> {
        debug!(path = %self.path.display(), "opening fifo for reading");
        let (tx, rx) = bounded(1);
        let path = self.path.clone();
        thread::Builder::new()
            .name("fifo-open".to_owned())
            .spawn(move || {
                let _ = tx.send(File::open(&path));
            })
            .map_err(|err| {
                CaptureError::CaptureStart(format!("failed to spawn fifo opener: {err}"))
            })?;

        let opened = loop {
            match rx.recv_timeout(ATTACH_POLL_INTERVAL) {
                Ok(opened) => break opened,
                Err(RecvTimeoutError::Timeout) if process.is_alive() => {}
                Err(RecvTimeoutError::Timeout) => {
                    return Err(self.abandon_open(process.id(), &rx));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CaptureError::CaptureStart(
                        "fifo opener exited without a result".to_owned(),
                    ));
                }
            }
        };

        let file = opened.map_err(|err| {
            CaptureError::CaptureStart(format!("failed to open {}: {err}", self.path.display()))
        })?;
        Ok(Box::new(file))
    }

    fn release(&self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "cannot remove fifo, deferring: {err}");
                schedule_removal(self.path.clone());
            }
        }
    }
}

/// Deterministic FIFO path for `device` inside `fifo_dir`.
///
/// The readable part is the last path component of the identifier; the hash of
/// the whole identifier keeps distinct devices apart.
#[must_use]
pub fn provision_path(fifo_dir: &Path, device: &str) -> PathBuf {
    let base: String = device
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(device)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    fifo_dir.join(format!("{base}-{:016x}.raw", fnv1a(device.as_bytes())))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Create a FIFO at `path` with the `mkfifo` utility, replacing a stale node.
pub fn create_fifo(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale fifo"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(CaptureError::CaptureStart(format!(
                "cannot replace {}: {err}",
                path.display()
            )))
        }
    }

    debug!(path = %path.display(), "mkfifo");
    let status = Command::new("mkfifo")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|err| CaptureError::CaptureStart(format!("failed to run mkfifo: {err}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(CaptureError::CaptureStart(format!(
            "mkfifo {} failed: {status}",
            path.display()
        )))
    }
}

static PENDING_REMOVALS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

fn schedule_removal(path: PathBuf) {
    let mut pending = PENDING_REMOVALS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if !pending.contains(&path) {
        pending.push(path);
    }
}

/// Retry removal of FIFOs whose deletion failed on close.
///
/// Call before process exit. Paths that still cannot be removed stay queued.
pub fn purge_pending_fifos() {
    let mut pending = PENDING_REMOVALS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    pending.retain(|path| match fs::remove_file(path) {
        Ok(()) => false,
        Err(err) => err.kind() != io::ErrorKind::NotFound,
    });
}
