//! Mock launcher and processes for testing without ffmpeg.

use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::traits::{
    CaptureError, CaptureProcess, Launcher, Resolution, Result, StdoutMode, BYTES_PER_PIXEL,
};

/// Delivers `data` in chunks of at most `chunk` bytes, then end of stream.
pub struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl ChunkedReader {
    /// Reader over `data` delivering at most `chunk` bytes per read.
    #[must_use]
    pub fn new(data: Vec<u8>, chunk: usize) -> Self {
        Self {
            data,
            pos: 0,
            chunk: chunk.max(1),
        }
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data.get(self.pos..).unwrap_or_default();
        let n = remaining.len().min(buf.len()).min(self.chunk);
        if let (Some(dst), Some(src)) = (buf.get_mut(..n), remaining.get(..n)) {
            dst.copy_from_slice(src);
        }
        self.pos += n;
        Ok(n)
    }
}

/// Delivers `data`, then fails every read with `kind`.
pub struct FailingReader {
    inner: ChunkedReader,
    kind: io::ErrorKind,
    interrupt_first: bool,
}

impl FailingReader {
    /// Reader that yields `data` and then errors.
    #[must_use]
    pub fn new(data: Vec<u8>, kind: io::ErrorKind) -> Self {
        Self {
            inner: ChunkedReader::new(data, usize::MAX),
            kind,
            interrupt_first: false,
        }
    }

    /// Return `Interrupted` once before delivering anything.
    #[must_use]
    pub const fn interrupted_first(mut self) -> Self {
        self.interrupt_first = true;
        self
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.interrupt_first {
            self.interrupt_first = false;
            return Err(io::ErrorKind::Interrupted.into());
        }
        match self.inner.read(buf)? {
            0 => Err(self.kind.into()),
            n => Ok(n),
        }
    }
}

/// Shared counters observed by tests.
#[derive(Debug, Default)]
pub struct Spy {
    /// Number of processes launched.
    pub launches: AtomicUsize,
    /// Number of processes terminated.
    pub terminations: AtomicUsize,
    /// Argument vector of the most recent launch.
    pub last_args: Mutex<Vec<String>>,
}

impl Spy {
    /// Launch count.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Termination count.
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Arguments of the most recent launch.
    pub fn last_args(&self) -> Vec<String> {
        self.last_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Mock capture process.
pub struct MockProcess {
    alive: bool,
    stdout: Option<Box<dyn Read + Send>>,
    spy: Arc<Spy>,
    fail_wait: bool,
}

impl MockProcess {
    /// A live process whose stdout yields `data`.
    #[must_use]
    pub fn with_stdout(data: Vec<u8>) -> Self {
        Self {
            alive: true,
            stdout: Some(Box::new(ChunkedReader::new(data, usize::MAX))),
            spy: Arc::default(),
            fail_wait: false,
        }
    }

    /// Report the process as already exited.
    #[must_use]
    pub fn exited(mut self) -> Self {
        self.alive = false;
        self
    }
}

impl CaptureProcess for MockProcess {
    fn id(&self) -> u32 {
        4242
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }

    fn terminate(&mut self) -> Result<()> {
        self.alive = false;
        self.spy.terminations.fetch_add(1, Ordering::SeqCst);
        if self.fail_wait {
            return Err(CaptureError::Fatal("wait interrupted".to_owned()));
        }
        Ok(())
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stdout.take()
    }
}

type SourceFactory = dyn Fn() -> Box<dyn Read + Send> + Send + Sync;

/// Launcher producing [`MockProcess`]es with scripted stdout.
pub struct MockLauncher {
    spy: Arc<Spy>,
    source: Box<SourceFactory>,
    exit_immediately: bool,
    fail_launch: bool,
    fail_wait: bool,
    launch_delay: Duration,
}

impl MockLauncher {
    /// Every launched process emits `frames` full zero frames at `resolution`.
    #[must_use]
    pub fn zero_frames(resolution: Resolution, frames: usize) -> Self {
        let len = resolution.frame_size() * frames;
        Self::with_source(move || Box::new(ChunkedReader::new(vec![0; len], 64 * 1024)))
    }

    /// Every launched process reads from a source built by `source`.
    #[must_use]
    pub fn with_source<F>(source: F) -> Self
    where
        F: Fn() -> Box<dyn Read + Send> + Send + Sync + 'static,
    {
        Self {
            spy: Arc::default(),
            source: Box::new(source),
            exit_immediately: false,
            fail_launch: false,
            fail_wait: false,
            launch_delay: Duration::ZERO,
        }
    }

    /// Processes report themselves dead right after launch.
    #[must_use]
    pub const fn exiting(mut self) -> Self {
        self.exit_immediately = true;
        self
    }

    /// Every launch fails.
    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    /// Waiting for termination fails.
    #[must_use]
    pub const fn failing_wait(mut self) -> Self {
        self.fail_wait = true;
        self
    }

    /// Sleep inside `launch`, widening race windows.
    #[must_use]
    pub const fn slow(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Counters shared with every process this launcher starts.
    #[must_use]
    pub fn spy(&self) -> Arc<Spy> {
        Arc::clone(&self.spy)
    }
}

impl Launcher for MockLauncher {
    fn launch(
        &self,
        _program: &Path,
        args: &[String],
        stdout: StdoutMode,
    ) -> Result<Box<dyn CaptureProcess>> {
        if !self.launch_delay.is_zero() {
            thread::sleep(self.launch_delay);
        }
        if self.fail_launch {
            return Err(CaptureError::CaptureStart("mock launch failure".to_owned()));
        }

        self.spy.launches.fetch_add(1, Ordering::SeqCst);
        *self
            .spy
            .last_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = args.to_vec();

        let stdout = match stdout {
            StdoutMode::Piped => Some((self.source)()),
            StdoutMode::Discard => None,
        };
        Ok(Box::new(MockProcess {
            alive: !self.exit_immediately,
            stdout,
            spy: Arc::clone(&self.spy),
            fail_wait: self.fail_wait,
        }))
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Horizontal gray ramp from dark to light.
    Gradient,
    /// Solid color given as (b, g, r).
    Solid(u8, u8, u8),
}

/// Generate one BGR24 frame.
#[must_use]
pub fn generate_test_frame(resolution: Resolution, pattern: TestPattern) -> Vec<u8> {
    let width = resolution.width;
    let mut data = Vec::with_capacity(resolution.frame_size());

    for _y in 0..resolution.height {
        for x in 0..width {
            let (b, g, r) = match pattern {
                TestPattern::Gradient => {
                    #[allow(clippy::cast_possible_truncation)]
                    let v = ((x * 255) / width.max(1)) as u8;
                    (v, v, v)
                }
                TestPattern::Solid(b, g, r) => (b, g, r),
            };
            data.extend_from_slice(&[b, g, r]);
        }
    }

    debug_assert_eq!(data.len(), resolution.frame_size());
    debug_assert_eq!(data.len() % BYTES_PER_PIXEL, 0);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunked_reader_respects_chunk_size() {
        let mut reader = ChunkedReader::new(vec![1, 2, 3, 4, 5], 2);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).expect("read"), 2);
        assert_eq!(reader.read(&mut buf).expect("read"), 2);
        assert_eq!(reader.read(&mut buf).expect("read"), 1);
        assert_eq!(reader.read(&mut buf).expect("read"), 0);
    }

    #[test]
    fn test_mock_launcher_counts_launches() {
        let launcher = MockLauncher::zero_frames(Resolution::new(2, 2), 1);
        let spy = launcher.spy();
        let mut process = launcher
            .launch(Path::new("ffmpeg"), &["-y".to_owned()], StdoutMode::Piped)
            .expect("launch should succeed");

        assert_eq!(spy.launches(), 1);
        assert_eq!(spy.last_args(), vec!["-y".to_owned()]);
        assert!(process.is_alive());
        assert!(process.take_stdout().is_some());

        process.terminate().expect("terminate should succeed");
        assert!(!process.is_alive());
        assert_eq!(spy.terminations(), 1);
    }

    #[test]
    fn test_solid_pattern() {
        let resolution = Resolution::new(4, 3);
        let data = generate_test_frame(resolution, TestPattern::Solid(1, 2, 3));
        assert_eq!(data.len(), resolution.frame_size());
        assert!(data.chunks_exact(3).all(|px| px == [1, 2, 3]));
    }

    #[test]
    fn test_gradient_pattern() {
        let data = generate_test_frame(Resolution::new(640, 2), TestPattern::Gradient);
        assert!(data.first().copied().unwrap_or(255) < 10);
        let last_row_end = data.get(640 * 3 * 2 - 3).copied().unwrap_or(0);
        assert!(last_row_end > 200);
    }
}
