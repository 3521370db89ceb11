//! ffmpeg-cli-capture: camera frame capture through an ffmpeg subprocess.
//!
//! A [`Device`] launches ffmpeg against a camera, reads raw BGR24 frames from
//! its stdout or from a named pipe, and hands them out one at a time. Process
//! launching and byte channels sit behind traits so the lifecycle can be tested
//! without ffmpeg.

pub mod accumulator;
#[cfg(target_os = "linux")]
pub mod capabilities;
pub mod channel;
pub mod config;
pub mod device;
pub mod lifecycle;
pub mod process;
pub mod resolution;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use channel::{purge_pending_fifos, ChannelKind, NamedPipeChannel, StdoutChannel};
pub use config::{CaptureConfig, Platform};
pub use device::Device;
pub use lifecycle::LifecycleState;
pub use process::{build_arguments, quote_device_name, SystemLauncher};
pub use traits::{
    CaptureError, CaptureProcess, DeviceCapabilities, Frame, FrameChannel, Launcher,
    OutputTarget, Resolution, Result, StdoutMode,
};
