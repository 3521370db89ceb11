//! ffmpeg process invocation: argument vector, launching, liveness, termination.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use crate::config::{CaptureConfig, Platform};
use crate::traits::{
    CaptureError, CaptureProcess, Launcher, OutputTarget, Resolution, Result, StdoutMode,
};

/// Device identifier as ffmpeg expects it on `platform`.
///
/// DirectShow wants `"video=<name>"` including the quotes; everywhere else the
/// name is used as is. [`SystemLauncher`] passes such pre-quoted arguments to
/// the Windows command line verbatim.
#[must_use]
pub fn quote_device_name(platform: Platform, name: &str) -> String {
    match platform {
        Platform::Windows => format!("\"video={name}\""),
        Platform::Linux | Platform::MacOs | Platform::Other => name.to_owned(),
    }
}

/// Build the ffmpeg argument vector, without the executable.
#[must_use]
pub fn build_arguments(
    device: &str,
    resolution: Resolution,
    output: &OutputTarget,
    config: &CaptureConfig,
) -> Vec<String> {
    let size = resolution.to_string();
    let input = quote_device_name(config.platform, device);
    let target = output.as_arg();

    [
        // quiet, non-interactive, overwrite output
        "-loglevel",
        "panic",
        "-nostdin",
        "-y",
        // input
        "-f",
        config.capture_driver(),
        "-s",
        size.as_str(),
        "-framerate",
        config.input_framerate.as_str(),
        "-i",
        input.as_str(),
        // raw BGR24 output, no duplicated frames
        "-vcodec",
        "rawvideo",
        "-r",
        config.output_rate.as_str(),
        "-f",
        "rawvideo",
        "-vsync",
        "vfr",
        "-pix_fmt",
        "bgr24",
        target.as_str(),
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

/// Launches real processes through `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(
        &self,
        program: &Path,
        args: &[String],
        stdout: StdoutMode,
    ) -> Result<Box<dyn CaptureProcess>> {
        debug!(program = %program.display(), ?args, "launching capture process");

        let stdout = match stdout {
            StdoutMode::Piped => Stdio::piped(),
            StdoutMode::Discard => Stdio::null(),
        };

        let mut command = Command::new(program);
        for arg in args {
            push_arg(&mut command, arg);
        }

        // ffmpeg diagnostics must never reach the frame stream
        let child = command
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                CaptureError::CaptureStart(format!("failed to spawn {}: {err}", program.display()))
            })?;

        debug!(pid = child.id(), "capture process started");
        Ok(Box::new(SystemProcess { child }))
    }
}

/// Whether `arg` already carries its own command-line quoting.
#[cfg(any(windows, test))]
fn is_prequoted(arg: &str) -> bool {
    arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"')
}

#[cfg(windows)]
fn push_arg(command: &mut Command, arg: &str) {
    use std::os::windows::process::CommandExt;

    if is_prequoted(arg) {
        command.raw_arg(arg);
    } else {
        command.arg(arg);
    }
}

#[cfg(not(windows))]
fn push_arg(command: &mut Command, arg: &str) {
    command.arg(arg);
}

/// A child process started by [`SystemLauncher`].
#[derive(Debug)]
pub struct SystemProcess {
    child: Child,
}

impl CaptureProcess for SystemProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(pid = self.child.id(), %status, "capture process exited");
                false
            }
            Err(err) => {
                warn!(pid = self.child.id(), "cannot query capture process status: {err}");
                false
            }
        }
    }

    fn terminate(&mut self) -> Result<()> {
        let pid = self.child.id();
        match self.child.kill() {
            Ok(()) => {}
            // already exited and reaped
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => {}
            Err(err) => warn!(pid, "failed to signal capture process: {err}"),
        }

        let status = self
            .child
            .wait()
            .map_err(|err| CaptureError::Fatal(format!("waiting for process {pid}: {err}")))?;
        debug!(pid, %status, "capture process terminated");
        Ok(())
    }

    fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as Box<dyn Read + Send>)
    }
}
