//! Frame validation utilities for test pattern verification.
//!
//! These check captured BGR24 frames against known synthetic sources, such as
//! the raw test pictures fed to ffmpeg by the integration tests or the crate's
//! own mock patterns.

use crate::traits::{CaptureError, Frame, Result};

/// Checks that the frame carries a full payload from the source.
pub fn validate_complete(frame: &Frame) -> Result<()> {
    let expected = frame.resolution.frame_size();
    if frame.data.len() != expected {
        return Err(CaptureError::Validation(format!(
            "frame holds {} bytes, expected {expected} for {}",
            frame.data.len(),
            frame.resolution
        )));
    }
    if !frame.is_complete() {
        return Err(CaptureError::Validation(format!(
            "degraded frame: {} of {expected} bytes delivered",
            frame.filled
        )));
    }
    Ok(())
}

/// Validates a left-to-right luminance ramp on the middle row.
///
/// Luminance must never drop by more than rounding noise and must rise by at
/// least 50 across the frame.
pub fn validate_gradient(frame: &Frame) -> Result<()> {
    let width = frame.resolution.width;
    let center_y = frame.resolution.height / 2;
    let step = (width / 64).max(1);

    let mut first: Option<f32> = None;
    let mut prev: Option<f32> = None;

    for x in (0..width).step_by(step as usize) {
        let (r, g, b) = sample(frame, x, center_y)?;
        let luminance = 0.114f32.mul_add(
            f32::from(b),
            0.587f32.mul_add(f32::from(g), 0.299 * f32::from(r)),
        );

        if let Some(prev) = prev {
            if luminance < prev - 1.0 {
                return Err(CaptureError::Validation(format!(
                    "gradient not increasing at x={x}: {luminance} < {prev}"
                )));
            }
        }
        first.get_or_insert(luminance);
        prev = Some(luminance);
    }

    if let (Some(first), Some(last)) = (first, prev) {
        if last - first < 50.0 {
            return Err(CaptureError::Validation(format!(
                "insufficient luminance change for gradient: {}",
                last - first
            )));
        }
    }

    Ok(())
}

/// Validates that every pixel matches the first one within `tolerance`.
pub fn validate_uniform(frame: &Frame, tolerance: u32) -> Result<()> {
    let reference = sample(frame, 0, 0)?;
    for y in 0..frame.resolution.height {
        for x in 0..frame.resolution.width {
            let actual = sample(frame, x, y)?;
            if !colors_match(actual, reference, tolerance) {
                return Err(CaptureError::Validation(format!(
                    "pixel ({x}, {y}) is RGB{actual:?}, expected RGB{reference:?}"
                )));
            }
        }
    }
    Ok(())
}

fn sample(frame: &Frame, x: u32, y: u32) -> Result<(u8, u8, u8)> {
    frame
        .pixel_at(x, y)
        .ok_or_else(|| CaptureError::Validation(format!("failed to get pixel at ({x}, {y})")))
}

/// Whether all three channels are within `tolerance` of each other.
fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u32) -> bool {
    let (ar, ag, ab) = actual;
    let (er, eg, eb) = expected;

    u32::from(ar.abs_diff(er)) <= tolerance
        && u32::from(ag.abs_diff(eg)) <= tolerance
        && u32::from(ab.abs_diff(eb)) <= tolerance
}
