//! Capture device backed by an ffmpeg subprocess.
//!
//! A [`Device`] owns at most one running process and the byte source reading
//! its frames. `open`, `close` and `dispose` may race from any thread: the
//! state change is a compare-and-set performed under the lifecycle lock, so
//! exactly one caller runs the side effects and the others see a no-op.
//!
//! Frame reads take a separate reader lock and never wait for the lifecycle
//! lock. Closing while another thread reads a frame terminates the process
//! first, which ends the read with a degraded frame. Nothing cancels a read
//! from a process that stalls without exiting.

use std::fmt;
use std::io::Read;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::{debug, info, warn};

use crate::accumulator::read_frame;
use crate::channel::{ChannelKind, NamedPipeChannel, StdoutChannel};
use crate::config::CaptureConfig;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::process::{build_arguments, SystemLauncher};
use crate::resolution;
use crate::traits::{
    CaptureError, CaptureProcess, Frame, FrameChannel, Launcher, Resolution, Result,
};

type ProcessSlot = Option<Box<dyn CaptureProcess>>;
type SourceSlot = Option<Box<dyn Read + Send>>;

/// Camera captured through an external ffmpeg process.
pub struct Device {
    name: String,
    config: CaptureConfig,
    resolutions: Vec<Resolution>,
    default_resolution: Resolution,
    selected: Mutex<Option<Resolution>>,
    channel: Box<dyn FrameChannel>,
    launcher: Box<dyn Launcher>,
    lifecycle: Lifecycle,
    process: Mutex<ProcessSlot>,
    source: Mutex<SourceSlot>,
}

impl Device {
    /// Create a closed device.
    ///
    /// # Arguments
    ///
    /// * `name` - Device identifier passed to ffmpeg's `-i`
    /// * `resolutions` - Catalog such as `"640x480 320x240"`; the first entry is
    ///   the default resolution
    /// * `config` - Executable location, capture driver and FIFO directory
    /// * `channel` - Whether frames arrive on stdout or through a FIFO
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Format`] or [`CaptureError::Config`] when the
    /// catalog does not parse.
    pub fn new(
        name: &str,
        resolutions: &str,
        config: CaptureConfig,
        channel: ChannelKind,
    ) -> Result<Self> {
        let resolutions = resolution::parse(resolutions)?;
        let default_resolution = *resolutions
            .first()
            .ok_or_else(|| CaptureError::Config("empty resolution catalog".to_owned()))?;

        let channel: Box<dyn FrameChannel> = match channel {
            ChannelKind::Stdout => Box::new(StdoutChannel),
            ChannelKind::NamedPipe => Box::new(NamedPipeChannel::new(&config.fifo_dir, name)),
        };
        debug!(device = name, ?resolutions, "created capture device");

        Ok(Self {
            name: name.to_owned(),
            config,
            resolutions,
            default_resolution,
            selected: Mutex::new(None),
            channel,
            launcher: Box::new(SystemLauncher),
            lifecycle: Lifecycle::new(),
            process: Mutex::new(None),
            source: Mutex::new(None),
        })
    }

    /// Replace the process launcher.
    #[must_use]
    pub fn with_launcher<L: Launcher + 'static>(mut self, launcher: L) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    /// Device identifier passed to ffmpeg.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Supported resolutions, in catalog order.
    pub fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    /// Selected resolution; the first catalog entry until one is chosen.
    pub fn resolution(&self) -> Resolution {
        *lock(&self.selected).get_or_insert(self.default_resolution)
    }

    /// Select a resolution from the catalog.
    ///
    /// A running process keeps its resolution; the choice applies from the
    /// next `open`.
    pub fn set_resolution(&self, resolution: Resolution) -> Result<()> {
        if !self.resolutions.contains(&resolution) {
            return Err(CaptureError::Config(format!(
                "{resolution} is not supported by {}",
                self.name
            )));
        }
        if self.is_open() {
            warn!(device = %self.name, %resolution, "resolution changed while open");
        }
        *lock(&self.selected) = Some(resolution);
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    /// Whether frames can be read.
    pub fn is_open(&self) -> bool {
        self.state() == LifecycleState::Open
    }

    /// Start the capture process. No-op if already open.
    ///
    /// Prepares the channel, launches ffmpeg at the selected resolution and
    /// attaches to its output. For a FIFO this waits until ffmpeg opens the
    /// pipe for writing, or until it exits.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Disposed`] after [`Device::dispose`].
    /// Returns [`CaptureError::CaptureStart`] if the FIFO cannot be created,
    /// the process cannot be spawned, or it exits before its output can be
    /// read; the device is then closed again and nothing is left running.
    pub fn open(&self) -> Result<()> {
        let mut slot = lock(&self.process);
        match self
            .lifecycle
            .transition(LifecycleState::Closed, LifecycleState::Open)
        {
            Ok(()) => {}
            Err(LifecycleState::Open) => return Ok(()),
            Err(_) => return Err(CaptureError::Disposed),
        }

        match self.start() {
            Ok((process, source)) => {
                info!(device = %self.name, pid = process.id(), resolution = %self.resolution(), "capture opened");
                *slot = Some(process);
                *lock(&self.source) = Some(source);
                Ok(())
            }
            Err(err) => {
                warn!(device = %self.name, "failed to open capture: {err}");
                let _ = self
                    .lifecycle
                    .transition(LifecycleState::Open, LifecycleState::Closed);
                Err(err)
            }
        }
    }

    /// Create the channel, launch ffmpeg, open the byte source.
    fn start(&self) -> Result<(Box<dyn CaptureProcess>, Box<dyn Read + Send>)> {
        self.channel.prepare().map_err(start_error)?;

        let args = build_arguments(
            &self.name,
            self.resolution(),
            &self.channel.output_target(),
            &self.config,
        );
        let mut process = match self.launcher.launch(
            &self.config.executable(),
            &args,
            self.channel.stdout_mode(),
        ) {
            Ok(process) => process,
            Err(err) => {
                self.channel.release();
                return Err(start_error(err));
            }
        };

        match self.channel.open(process.as_mut()) {
            Ok(source) => Ok((process, source)),
            Err(err) => {
                if let Err(term) = process.terminate() {
                    warn!(device = %self.name, "cleanup after failed open: {term}");
                }
                self.channel.release();
                Err(start_error(err))
            }
        }
    }

    /// Stop the capture process. No-op if not open.
    pub fn close(&self) -> Result<()> {
        let mut slot = lock(&self.process);
        if self
            .lifecycle
            .transition(LifecycleState::Open, LifecycleState::Closed)
            .is_err()
        {
            return Ok(());
        }
        self.shutdown(&mut slot)
    }

    /// Close if open and refuse any further use. Idempotent.
    pub fn dispose(&self) -> Result<()> {
        let mut slot = lock(&self.process);
        match self.lifecycle.dispose() {
            LifecycleState::Open => {
                debug!(device = %self.name, "disposing open device");
                self.shutdown(&mut slot)
            }
            LifecycleState::Closed | LifecycleState::Disposed => Ok(()),
        }
    }

    /// Drop the byte source, terminate the process, release the channel.
    fn shutdown(&self, slot: &mut ProcessSlot) -> Result<()> {
        let process = slot.take();

        match self.source.try_lock() {
            Ok(mut source) => drop(source.take()),
            Err(TryLockError::Poisoned(poisoned)) => drop(poisoned.into_inner().take()),
            Err(TryLockError::WouldBlock) => {
                debug!(device = %self.name, "frame read in flight, terminating process first");
            }
        }

        let result = process.map_or(Ok(()), |mut process| process.terminate());

        // an in-flight reader sees end of stream once the process is gone
        drop(lock(&self.source).take());
        self.channel.release();

        match &result {
            Ok(()) => info!(device = %self.name, "capture closed"),
            Err(err) => warn!(device = %self.name, "capture process did not exit cleanly: {err}"),
        }
        result
    }

    /// Liveness check used while reading; a busy lifecycle lock counts as dead.
    fn process_alive(&self) -> bool {
        let mut slot = match self.process.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        slot.as_mut().is_some_and(|process| process.is_alive())
    }

    /// Read the next frame. Returns `None` when the device is not open.
    ///
    /// A frame cut short by the process exiting is returned as is; check
    /// [`Frame::is_complete`].
    pub fn get_frame(&self) -> Result<Option<Frame>> {
        if !self.is_open() {
            return Ok(None);
        }
        let resolution = self.resolution();

        let mut source = lock(&self.source);
        let Some(reader) = source.as_mut() else {
            return Ok(None);
        };
        let (data, filled) = read_frame(reader.as_mut(), resolution.frame_size(), || {
            self.process_alive()
        })?;

        Ok(Some(Frame {
            data,
            resolution,
            filled,
        }))
    }

    /// Read the next frame as an RGB image.
    pub fn get_image(&self) -> Result<Option<image::RgbImage>> {
        Ok(self.get_frame()?.and_then(|frame| frame.to_rgb_image()))
    }

    /// Read the next frame's raw BGR24 bytes.
    ///
    /// The buffer is always a full frame; a degraded frame's unfilled tail is
    /// zero and cannot be told apart here. Use [`Device::get_frame`] or
    /// [`Device::read_frame_into`] when that matters.
    pub fn get_frame_bytes(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.get_frame()?.map(|frame| frame.data))
    }

    /// Read the next frame into `buf`.
    ///
    /// # Arguments
    ///
    /// * `buf` - Destination holding at least one frame at the selected
    ///   resolution
    ///
    /// # Returns
    ///
    /// The number of bytes delivered by the source. A full frame is always
    /// written; when the count is below the frame size the rest is zero.
    /// Returns 0 without writing when the device is not open.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::BufferTooSmall`] before reading anything if
    /// `buf` cannot hold a frame, and [`CaptureError::Stream`] if the stream
    /// fails while the process is alive.
    pub fn read_frame_into(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.is_open() {
            return Ok(0);
        }
        let needed = self.resolution().frame_size();
        if buf.len() < needed {
            return Err(CaptureError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }

        let Some(frame) = self.get_frame()? else {
            return Ok(0);
        };
        let available = buf.len();
        let dst = buf
            .get_mut(..frame.data.len())
            .ok_or(CaptureError::BufferTooSmall {
                needed: frame.data.len(),
                available,
            })?;
        dst.copy_from_slice(&frame.data);
        Ok(frame.filled)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device({}, {:?}, {}, {}, {})",
            self.name,
            self.resolutions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            self.resolution(),
            self.channel.output_target().as_arg(),
            self.state()
        )
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!(device = %self.name, "dispose on drop failed: {err}");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn start_error(err: CaptureError) -> CaptureError {
    match err {
        CaptureError::CaptureStart(_) => err,
        other => CaptureError::CaptureStart(other.to_string()),
    }
}
