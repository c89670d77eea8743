//! Preview images

use crate::error::{Result, StoreError};
use crate::pixel::Pixel;
use std::path::Path;

/// Save row-major `pixels` as an 8-bit RGB image; the format follows the extension
pub fn save_rgb8<P: Pixel>(path: &Path, rows: u64, cols: u64, pixels: &[P]) -> Result<()> {
    let too_large = || StoreError::InvalidParameter(format!("{}x{} is too large for an image", rows, cols));
    let width = u32::try_from(cols).map_err(|_| too_large())?;
    let height = u32::try_from(rows).map_err(|_| too_large())?;
    if pixels.len() as u64 != rows * cols {
        return Err(StoreError::BufferSize {
            expected: (rows * cols) as usize,
            actual: pixels.len(),
        });
    }

    let mut raw = Vec::with_capacity(pixels.len() * 3);
    for pixel in pixels {
        raw.extend_from_slice(&pixel.to_rgb8());
    }
    let img = image::RgbImage::from_raw(width, height, raw)
        .ok_or_else(|| StoreError::InvalidParameter("invalid image buffer".to_string()))?;
    img.save(path)?;
    Ok(())
}
