//! Derived views of a reflectance cube.
//!
//! Spectra, angular profiles and RGB renderings computed from a
//! [`ReflectanceCube`]. Every function validates its indices and masks and
//! reports a bad selection as [`HyperPiError::InvalidSelection`] instead of
//! panicking.

use ndarray::{Array2, Array3, ArrayView2, Axis as NdAxis, Zip};

use crate::analysis::reconstruction::ReflectanceCube;
use crate::data::dataset::Polarization;
use crate::error::{AppResult, HyperPiError};

/// Mean copolarized and depolarized reflectance per sampler angle.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarProfile {
    /// Wavelength of the profile.
    pub wavelength_nm: u32,
    /// Sampler angles, in cube order.
    pub angles: Vec<Option<f64>>,
    /// Mean copolarized reflectance per angle.
    pub copol: Vec<f64>,
    /// Mean depolarized reflectance per angle.
    pub depol: Vec<f64>,
}

fn check_wavelength(cube: &ReflectanceCube, wavelength: usize) -> AppResult<()> {
    if wavelength >= cube.wavelengths.len() {
        return Err(HyperPiError::InvalidSelection(format!(
            "wavelength index {wavelength} out of range ({} wavelengths)",
            cube.wavelengths.len()
        )));
    }
    Ok(())
}

fn check_angle(cube: &ReflectanceCube, angle: usize) -> AppResult<()> {
    if angle >= cube.angles.len() {
        return Err(HyperPiError::InvalidSelection(format!(
            "angle index {angle} out of range ({} angles)",
            cube.angles.len()
        )));
    }
    Ok(())
}

fn check_mask(cube: &ReflectanceCube, mask: &Array2<bool>) -> AppResult<usize> {
    if mask.dim() != cube.frame_shape() {
        return Err(HyperPiError::InvalidSelection(format!(
            "mask shape {:?} differs from frame shape {:?}",
            mask.dim(),
            cube.frame_shape()
        )));
    }
    let selected = mask.iter().filter(|&&m| m).count();
    if selected == 0 {
        return Err(HyperPiError::InvalidSelection(
            "mask selects no pixel".to_string(),
        ));
    }
    Ok(selected)
}

fn masked_mean(image: ArrayView2<'_, f32>, mask: &Array2<bool>, selected: usize) -> f64 {
    let mut sum = 0.0;
    Zip::from(&image).and(mask).for_each(|&v, &m| {
        if m {
            sum += f64::from(v);
        }
    });
    sum / selected as f64
}

fn spatial_mean(image: ArrayView2<'_, f32>) -> f64 {
    if image.is_empty() {
        return 0.0;
    }
    image.iter().map(|&v| f64::from(v)).sum::<f64>() / image.len() as f64
}

/// Mean reflectance inside `mask` for every wavelength, at one angle and polarization.
pub fn roi_spectrum(
    cube: &ReflectanceCube,
    mask: &Array2<bool>,
    angle: usize,
    polarization: Polarization,
) -> AppResult<Vec<f64>> {
    check_angle(cube, angle)?;
    let selected = check_mask(cube, mask)?;
    Ok((0..cube.wavelengths.len())
        .map(|w| masked_mean(cube.slice(w, angle, polarization), mask, selected))
        .collect())
}

/// Spatially averaged copol and depol reflectance at each sampler angle.
pub fn polar_profile(cube: &ReflectanceCube, wavelength: usize) -> AppResult<PolarProfile> {
    check_wavelength(cube, wavelength)?;
    let n = cube.angles.len();
    let profile = |polarization: Polarization| -> Vec<f64> {
        (0..n)
            .map(|a| spatial_mean(cube.slice(wavelength, a, polarization)))
            .collect()
    };
    Ok(PolarProfile {
        wavelength_nm: cube.wavelengths[wavelength],
        angles: cube.angles.clone(),
        copol: profile(Polarization::Copolarized),
        depol: profile(Polarization::Depolarized),
    })
}

/// RGB image `(rows, cols, 3)` from three wavelength bands, each `√max(x, 0)`.
///
/// The square root compresses the dynamic range the way the bench display does;
/// values are not rescaled.
pub fn false_color(
    cube: &ReflectanceCube,
    bands: [usize; 3],
    angle: usize,
    polarization: Polarization,
) -> AppResult<Array3<f32>> {
    check_angle(cube, angle)?;
    for &band in &bands {
        check_wavelength(cube, band)?;
    }
    let (rows, cols) = cube.frame_shape();
    let mut rgb = Array3::<f32>::zeros((rows, cols, 3));
    for (channel, &band) in bands.iter().enumerate() {
        rgb.index_axis_mut(NdAxis(2), channel)
            .assign(&cube.slice(band, angle, polarization).mapv(|v| v.max(0.0).sqrt()));
    }
    Ok(rgb)
}

/// RGB image `(rows, cols, 3)` contrasting polarization states at one wavelength.
///
/// Red is the depolarized reflectance, green the copolarized excess over it
/// (specular component), blue is zero. Channels are clipped to [0, 1].
pub fn polarization_composite(
    cube: &ReflectanceCube,
    wavelength: usize,
    angle: usize,
) -> AppResult<Array3<f32>> {
    check_wavelength(cube, wavelength)?;
    check_angle(cube, angle)?;
    let copol = cube.slice(wavelength, angle, Polarization::Copolarized);
    let depol = cube.slice(wavelength, angle, Polarization::Depolarized);

    let (rows, cols) = cube.frame_shape();
    let mut rgb = Array3::<f32>::zeros((rows, cols, 3));
    rgb.index_axis_mut(NdAxis(2), 0)
        .assign(&depol.mapv(|v| v.clamp(0.0, 1.0)));
    Zip::from(rgb.index_axis_mut(NdAxis(2), 1))
        .and(&copol)
        .and(&depol)
        .for_each(|g, &c, &d| *g = (c - d).clamp(0.0, 1.0));
    Ok(rgb)
}

/// Boolean mask of the pixels inside a polygon, by the even-odd rule.
///
/// Vertices are `(x, y)` = `(col, row)` in pixel units; a pixel is tested at its
/// integer coordinates.
pub fn polygon_mask(height: usize, width: usize, vertices: &[(f64, f64)]) -> AppResult<Array2<bool>> {
    if vertices.len() < 3 {
        return Err(HyperPiError::InvalidSelection(format!(
            "polygon needs at least 3 vertices, got {}",
            vertices.len()
        )));
    }
    Ok(Array2::from_shape_fn((height, width), |(r, c)| {
        point_in_polygon(c as f64, r as f64, vertices)
    }))
}

fn point_in_polygon(x: f64, y: f64, vertices: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
