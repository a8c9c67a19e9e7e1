//! Lossless grayscale frame files.
//!
//! Frames are written as 16-bit grayscale images in the container chosen by the
//! file extension (`tiff`, `tif` or `png`) and read back as `f64` arrays of raw
//! sensor counts. No rescaling happens in either direction, so background
//! subtraction operates on the values the sensor produced.
//!
//! Colour files (as written by a colour camera stack) are reduced to luma on read.

use image::error::{ParameterError, ParameterErrorKind};
use image::{ColorType, ImageBuffer, ImageError, ImageFormat, Luma};
use ndarray::Array2;
use std::path::Path;

/// Write a frame of raw counts, choosing the container from the extension of `path`.
///
/// # Errors
///
/// Returns an error if the extension is not a known image format, the file cannot
/// be created, or encoding fails.
pub fn write_frame<P: AsRef<Path>>(pixels: &Array2<u16>, path: P) -> Result<(), ImageError> {
    let path = path.as_ref();
    let (rows, cols) = pixels.dim();

    // iter() walks in logical row-major order regardless of memory layout
    let raw: Vec<u16> = pixels.iter().copied().collect();
    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(cols as u32, rows as u32, raw).ok_or_else(dimension_mismatch)?;

    let format = ImageFormat::from_path(path)?;
    img.save_with_format(path, format)?;

    tracing::debug!(
        path = ?path,
        dimensions = format!("{}x{}", cols, rows),
        "Wrote 16-bit frame"
    );
    Ok(())
}

/// Read a frame as raw counts, shape `(rows, cols)`.
///
/// 16-bit files keep their full range; everything else is read as 8-bit luma.
pub fn read_frame<P: AsRef<Path>>(path: P) -> Result<Array2<f64>, ImageError> {
    let img = image::open(path.as_ref())?;
    let (width, height) = (img.width() as usize, img.height() as usize);

    let data: Vec<f64> = match img.color() {
        ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => img
            .to_luma16()
            .into_raw()
            .into_iter()
            .map(f64::from)
            .collect(),
        _ => img
            .to_luma8()
            .into_raw()
            .into_iter()
            .map(f64::from)
            .collect(),
    };

    Array2::from_shape_vec((height, width), data).map_err(|_| dimension_mismatch())
}

fn dimension_mismatch() -> ImageError {
    ImageError::Parameter(ParameterError::from_kind(
        ParameterErrorKind::DimensionMismatch,
    ))
}
