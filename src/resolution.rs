//! Parsing of resolution catalogs such as `"640x480 320x240"`.

use std::str::FromStr;

use crate::traits::{CaptureError, Resolution, Result};

/// Largest accepted width or height, in pixels.
pub const MAX_DIMENSION: u32 = 16_384;

impl FromStr for Resolution {
    type Err = CaptureError;

    fn from_str(token: &str) -> Result<Self> {
        let malformed = || CaptureError::Format {
            token: token.to_owned(),
        };
        let (w, h) = token.split_once('x').ok_or_else(malformed)?;
        let width: u32 = w.parse().map_err(|_| malformed())?;
        let height: u32 = h.parse().map_err(|_| malformed())?;
        if !(1..=MAX_DIMENSION).contains(&width) || !(1..=MAX_DIMENSION).contains(&height) {
            return Err(malformed());
        }
        let resolution = Self::new(width, height);
        resolution.checked_frame_size().ok_or_else(malformed)?;
        Ok(resolution)
    }
}

/// Parse a whitespace-separated list of `<W>x<H>` tokens.
///
/// Order is preserved; the first entry is the device default.
///
/// # Arguments
///
/// * `list` - Catalog text such as `"640x480 320x240"`
///
/// # Returns
///
/// The resolutions in catalog order, never empty.
///
/// # Errors
///
/// Returns [`CaptureError::Format`] naming the first token that is not two
/// positive integers joined by `x`, or whose sides exceed [`MAX_DIMENSION`].
/// Returns [`CaptureError::Config`] if the list holds no tokens.
pub fn parse(list: &str) -> Result<Vec<Resolution>> {
    let resolutions = list
        .split_ascii_whitespace()
        .map(str::parse)
        .collect::<Result<Vec<Resolution>>>()?;

    if resolutions.is_empty() {
        return Err(CaptureError::Config(format!(
            "no resolutions in {list:?}"
        )));
    }
    Ok(resolutions)
}
