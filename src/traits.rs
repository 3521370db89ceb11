//! Core traits and types for subprocess-backed frame capture.

use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Bytes per pixel of the BGR24 frame layout.
pub const BYTES_PER_PIXEL: usize = 3;

/// Frame dimensions supported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Create a new resolution.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size in bytes of one BGR24 frame at this resolution.
    ///
    /// Saturates at `usize::MAX`; resolutions parsed from a catalog are
    /// bounded so this never happens for them.
    #[must_use]
    pub const fn frame_size(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(BYTES_PER_PIXEL)
    }

    /// Size in bytes of one BGR24 frame, or `None` if it overflows `usize`.
    #[must_use]
    pub const fn checked_frame_size(&self) -> Option<usize> {
        match (self.width as usize).checked_mul(self.height as usize) {
            Some(pixels) => pixels.checked_mul(BYTES_PER_PIXEL),
            None => None,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A captured BGR24 frame.
///
/// `data` always holds `width * height * 3` bytes. When the source ended early
/// only the first `filled` bytes came from the stream and the rest are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw BGR24 pixel data, row-major, no padding.
    pub data: Vec<u8>,
    /// Resolution the frame was captured at.
    pub resolution: Resolution,
    /// Number of bytes actually delivered by the source.
    pub filled: usize,
}

impl Frame {
    /// Whether every byte of the frame came from the source.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.filled == self.data.len()
    }

    /// Get RGB values for a pixel at the specified coordinates.
    ///
    /// Returns `None` for coordinates outside the frame.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.resolution.width || y >= self.resolution.height {
            return None;
        }
        let offset = (y as usize * self.resolution.width as usize + x as usize) * BYTES_PER_PIXEL;
        let bgr = self.data.get(offset..offset + BYTES_PER_PIXEL)?;
        match *bgr {
            [b, g, r] => Some((r, g, b)),
            _ => None,
        }
    }

    /// Convert the BGR payload into an RGB image.
    #[must_use]
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        let mut rgb = self.data.clone();
        for px in rgb.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.swap(0, 2);
        }
        image::RgbImage::from_raw(self.resolution.width, self.resolution.height, rgb)
    }
}

/// Device capability flags reported by the platform capture layer.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device configuration is unusable (e.g. empty resolution list).
    #[error("configuration error: {0}")]
    Config(String),
    /// A resolution token is not of the form `<W>x<H>`.
    #[error("malformed resolution token {token:?}")]
    Format {
        /// The offending token.
        token: String,
    },
    /// Launching the capture process or setting up its channel failed.
    #[error("failed to start capture: {0}")]
    CaptureStart(String),
    /// Reading frame bytes failed while the process was still running.
    #[error("stream error: {0}")]
    Stream(#[source] io::Error),
    /// Waiting for the capture process to exit failed.
    #[error("fatal: {0}")]
    Fatal(String),
    /// The device was disposed and cannot be reopened.
    #[error("device has been disposed")]
    Disposed,
    /// Caller-supplied buffer cannot hold a frame.
    #[error("buffer too small: need {needed} bytes, got {available}")]
    BufferTooSmall {
        /// Bytes required for one frame.
        needed: usize,
        /// Bytes available in the caller's buffer.
        available: usize,
    },
    /// Querying device capabilities failed.
    #[error("device query failed: {0}")]
    DeviceQuery(String),
    /// Frame content does not match what was expected.
    #[error("frame validation failed: {0}")]
    Validation(String),
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Where the capture process writes raw frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// The process's own standard output (`-`).
    Stdout,
    /// A filesystem path, normally a FIFO.
    Path(PathBuf),
}

impl OutputTarget {
    /// Argument form understood by ffmpeg.
    #[must_use]
    pub fn as_arg(&self) -> String {
        match self {
            Self::Stdout => "-".to_owned(),
            Self::Path(path) => path.display().to_string(),
        }
    }
}

/// How the launcher should wire the child's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdoutMode {
    /// Pipe stdout back to us; frames arrive there.
    Piped,
    /// Discard stdout; frames go elsewhere.
    Discard,
}

/// A running capture process, exclusively owned by one device.
pub trait CaptureProcess: Send {
    /// OS process id.
    fn id(&self) -> u32;

    /// Whether the process has no observable exit status yet. Never blocks.
    fn is_alive(&mut self) -> bool;

    /// Request termination and wait for the process to exit.
    fn terminate(&mut self) -> Result<()>;

    /// Hand out the process's stdout stream. Returns `None` after the first call
    /// or when stdout was not piped.
    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>>;
}

/// Starts capture processes.
pub trait Launcher: Send + Sync {
    /// Launch `program` with `args`.
    fn launch(
        &self,
        program: &Path,
        args: &[String],
        stdout: StdoutMode,
    ) -> Result<Box<dyn CaptureProcess>>;
}

/// A byte source that yields raw frame data from a capture process.
pub trait FrameChannel: Send + Sync {
    /// Output target the process must be told to write to.
    fn output_target(&self) -> OutputTarget;

    /// How the process's stdout must be wired for this channel.
    fn stdout_mode(&self) -> StdoutMode;

    /// Create channel resources. Runs before the process is launched.
    fn prepare(&self) -> Result<()>;

    /// Open the byte source once the process is running.
    fn open(&self, process: &mut dyn CaptureProcess) -> Result<Box<dyn Read + Send>>;

    /// Release channel resources after the process has exited. Best effort.
    fn release(&self);
}
