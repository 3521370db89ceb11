//! Turns an unbounded byte stream into fixed-size frames.

use std::io::{ErrorKind, Read};

use tracing::{trace, warn};

use crate::traits::{CaptureError, Result};

/// Read one frame of `frame_size` bytes from `source`.
///
/// Short reads are re-requested until the buffer is full. Blocks until the
/// frame is complete or the stream gives out. There is no timeout.
///
/// # Arguments
///
/// * `source` - Byte stream carrying back-to-back frames
/// * `frame_size` - Exact number of bytes in one frame
/// * `is_alive` - Liveness check for the producing process, consulted when the
///   stream ends or a read fails
///
/// # Returns
///
/// The frame buffer, always `frame_size` long, and how many bytes of it were
/// filled. If the stream ends first, or a read fails after `is_alive` reports
/// the process gone, the partially filled buffer is returned; the unfilled
/// tail stays zero.
///
/// # Errors
///
/// Returns [`CaptureError::Stream`] if a read fails while the process is
/// still alive.
pub fn read_frame<R, F>(source: &mut R, frame_size: usize, mut is_alive: F) -> Result<(Vec<u8>, usize)>
where
    R: Read + ?Sized,
    F: FnMut() -> bool,
{
    let mut buffer = vec![0u8; frame_size];
    let mut cursor = 0;

    while let Some(missing) = buffer.get_mut(cursor..).filter(|rest| !rest.is_empty()) {
        trace!(missing = missing.len(), "reading frame bytes");
        match source.read(missing) {
            Ok(0) => {
                warn!(
                    filled = cursor,
                    expected = frame_size,
                    alive = is_alive(),
                    "frame source ended mid-frame"
                );
                break;
            }
            Ok(n) => cursor += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                if is_alive() {
                    return Err(CaptureError::Stream(err));
                }
                warn!(
                    filled = cursor,
                    expected = frame_size,
                    "capture process exited mid-frame: {err}"
                );
                break;
            }
        }
    }

    Ok((buffer, cursor))
}
