//! V4L2 capability queries for Linux capture devices.
//!
//! ffmpeg does the actual capture; this only checks what the device node
//! claims to support before a process is launched against it.

use std::path::Path;

use v4l::video::Capture;
use v4l::Device;

use crate::traits::{CaptureError, DeviceCapabilities, Resolution, Result};

/// Query driver name and capture/streaming support of a device node.
pub fn query<P: AsRef<Path>>(path: P) -> Result<DeviceCapabilities> {
    let device = open(path.as_ref())?;
    let caps = device
        .query_caps()
        .map_err(|err| CaptureError::DeviceQuery(err.to_string()))?;

    Ok(DeviceCapabilities {
        driver: caps.driver,
        card: caps.card,
        bus_info: caps.bus,
        can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
        can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
    })
}

/// Resolution the device is currently configured for.
pub fn current_resolution<P: AsRef<Path>>(path: P) -> Result<Resolution> {
    let device = open(path.as_ref())?;
    let fmt = device
        .format()
        .map_err(|err| CaptureError::DeviceQuery(err.to_string()))?;
    Ok(Resolution::new(fmt.width, fmt.height))
}

fn open(path: &Path) -> Result<Device> {
    Device::with_path(path)
        .map_err(|err| CaptureError::DeviceQuery(format!("{}: {err}", path.display())))
}
