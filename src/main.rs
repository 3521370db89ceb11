//! ffmpeg-cli-capture binary for testing camera capture.
//!
//! Usage: `ffmpeg-cli-capture [device] [resolutions] [frames] [stdout|pipe]`

use std::env;

use ffmpeg_cli_capture::validation::validate_complete;
use ffmpeg_cli_capture::{purge_pending_fifos, CaptureConfig, CaptureError, ChannelKind, Device};
use tracing::info;
#[cfg(target_os = "linux")]
use tracing::warn;

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_RESOLUTIONS: &str = "640x480";
const DEFAULT_FRAMES: usize = 5;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ffmpeg_cli_capture=info".into()),
        )
        .init();

    let result = run();
    purge_pending_fifos();
    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> ffmpeg_cli_capture::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let device_name = args.first().map_or(DEFAULT_DEVICE, String::as_str);
    let resolutions = args.get(1).map_or(DEFAULT_RESOLUTIONS, String::as_str);
    let frames = match args.get(2) {
        Some(count) => count
            .parse()
            .map_err(|_| CaptureError::Config(format!("invalid frame count {count:?}")))?,
        None => DEFAULT_FRAMES,
    };
    let channel = match args.get(3).map(String::as_str) {
        None | Some("stdout") => ChannelKind::Stdout,
        Some("pipe") => ChannelKind::NamedPipe,
        Some(other) => {
            return Err(CaptureError::Config(format!("unknown channel {other:?}")));
        }
    };

    report_capabilities(device_name);

    let device = Device::new(device_name, resolutions, CaptureConfig::from_env(), channel)?;
    println!("Resolution: {}", device.resolution());

    device.open()?;
    for index in 0..frames {
        let Some(frame) = device.get_frame()? else {
            break;
        };
        println!(
            "Frame {index}: {} bytes, {} filled",
            frame.data.len(),
            frame.filled
        );
        if let Err(err) = validate_complete(&frame) {
            info!("capture ended early: {err}");
            break;
        }
    }
    device.dispose()
}

#[cfg(target_os = "linux")]
fn report_capabilities(device_name: &str) {
    match ffmpeg_cli_capture::capabilities::query(device_name) {
        Ok(caps) => {
            println!("Device: {}", caps.card);
            println!("Driver: {}", caps.driver);
            if !caps.can_capture {
                warn!(device = device_name, "device does not report video capture");
            }
        }
        Err(err) => warn!(device = device_name, "capability query failed: {err}"),
    }
    match ffmpeg_cli_capture::capabilities::current_resolution(device_name) {
        Ok(resolution) => println!("Current format: {resolution}"),
        Err(err) => warn!(device = device_name, "format query failed: {err}"),
    }
}

#[cfg(not(target_os = "linux"))]
fn report_capabilities(device_name: &str) {
    info!(device = device_name, "capability query is only available on Linux");
}
