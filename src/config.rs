//! Host platform facts and capture settings.

use std::env;
use std::path::PathBuf;

/// Environment variable naming the directory that holds the ffmpeg binary.
pub const FFMPEG_DIR_ENV: &str = "FFMPEG_CLI_DIR";
/// Environment variable overriding where FIFOs are created.
pub const FIFO_DIR_ENV: &str = "FFMPEG_CLI_FIFO_DIR";

/// Platform family, as far as ffmpeg invocation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux (video4linux2).
    Linux,
    /// Windows (DirectShow).
    Windows,
    /// macOS (AVFoundation).
    MacOs,
    /// Anything else; treated like Linux.
    Other,
}

impl Platform {
    /// Platform this binary was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Other
        }
    }

    /// ffmpeg input format used for camera capture.
    #[must_use]
    pub const fn capture_driver(self) -> &'static str {
        match self {
            Self::Windows => "dshow",
            Self::MacOs => "avfoundation",
            Self::Linux | Self::Other => "video4linux2",
        }
    }

    /// File name of the ffmpeg executable.
    #[must_use]
    pub const fn executable_name(self) -> &'static str {
        match self {
            Self::Windows => "ffmpeg.exe",
            Self::Linux | Self::MacOs | Self::Other => "ffmpeg",
        }
    }
}

/// Settings shared by every device created from it.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Directory containing the ffmpeg binary; `None` resolves through `PATH`.
    pub ffmpeg_dir: Option<PathBuf>,
    /// Platform whose naming rules apply.
    pub platform: Platform,
    /// Overrides the platform's capture driver (e.g. `rawvideo` to read a raw file).
    pub capture_driver: Option<String>,
    /// Directory where FIFOs are created.
    pub fifo_dir: PathBuf,
    /// Requested input frame rate.
    pub input_framerate: String,
    /// Output frame rate fraction.
    pub output_rate: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ffmpeg_dir: None,
            platform: Platform::current(),
            capture_driver: None,
            fifo_dir: env::temp_dir(),
            input_framerate: "1".to_owned(),
            output_rate: "1:2".to_owned(),
        }
    }
}

impl CaptureConfig {
    /// Defaults overridden by `FFMPEG_CLI_DIR` and `FFMPEG_CLI_FIFO_DIR`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env::var_os(FFMPEG_DIR_ENV) {
            config.ffmpeg_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = env::var_os(FIFO_DIR_ENV) {
            config.fifo_dir = PathBuf::from(dir);
        }
        config
    }

    /// Set the ffmpeg directory.
    #[must_use]
    pub fn with_ffmpeg_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.ffmpeg_dir = Some(dir.into());
        self
    }

    /// Set the platform whose naming rules apply.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Override the capture driver.
    #[must_use]
    pub fn with_capture_driver<S: Into<String>>(mut self, driver: S) -> Self {
        self.capture_driver = Some(driver.into());
        self
    }

    /// Set the FIFO directory.
    #[must_use]
    pub fn with_fifo_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.fifo_dir = dir.into();
        self
    }

    /// Set input frame rate and output rate fraction.
    #[must_use]
    pub fn with_rates<I: Into<String>, O: Into<String>>(mut self, input: I, output: O) -> Self {
        self.input_framerate = input.into();
        self.output_rate = output.into();
        self
    }

    /// Capture driver in effect.
    #[must_use]
    pub fn capture_driver(&self) -> &str {
        self.capture_driver
            .as_deref()
            .unwrap_or_else(|| self.platform.capture_driver())
    }

    /// Path of the ffmpeg executable.
    #[must_use]
    pub fn executable(&self) -> PathBuf {
        let name = self.platform.executable_name();
        self.ffmpeg_dir
            .as_ref()
            .map_or_else(|| PathBuf::from(name), |dir| dir.join(name))
    }
}
