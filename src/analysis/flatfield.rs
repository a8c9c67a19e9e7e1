//! Flat-field regression.
//!
//! Fits a smooth bivariate cubic surface to an image and evaluates it on the
//! image grid. The fit removes pixel noise and sample texture from reference
//! frames, leaving only the slowly varying illumination profile.
//!
//! Coordinates are normalized to [-1, 1] along both axes (x along columns, y
//! along rows) and the model is
//!
//! ```text
//! z = c0 + c1·x + c2·x² + c3·x³ + c4·y + c5·y² + c6·y³ + c7·xy + c8·xy² + c9·x²y
//! ```
//!
//! The coefficients are the minimum-norm least-squares solution, so degenerate
//! grids (a single row or column) still produce a surface instead of an error.

use nalgebra::{SMatrix, SVector};
use ndarray::Array2;

/// Number of polynomial basis terms.
pub const BASIS_TERMS: usize = 10;

/// Gram singular values below this fraction of the largest are treated as zero.
const RELATIVE_CUTOFF: f64 = 1e-10;

type Gram = SMatrix<f64, BASIS_TERMS, BASIS_TERMS>;
type Basis = SVector<f64, BASIS_TERMS>;

/// Basis terms evaluated at `(x, y)`, in coefficient order.
fn basis(x: f64, y: f64) -> Basis {
    Basis::from([
        1.0,
        x,
        x * x,
        x * x * x,
        y,
        y * y,
        y * y * y,
        x * y,
        x * y * y,
        x * x * y,
    ])
}

/// `n` evenly spaced points from -1 to 1. A single point sits at -1.
fn normalized_axis(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![-1.0],
        _ => (0..n)
            .map(|i| -1.0 + 2.0 * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// Least-squares coefficients of the cubic surface through `image`.
///
/// Solves the normal equations with an SVD pseudo-inverse, which yields the same
/// minimum-norm solution as a direct solve on the design matrix without
/// materializing it. An empty image gives all-zero coefficients.
pub fn fit_coefficients(image: &Array2<f64>) -> [f64; BASIS_TERMS] {
    let (rows, cols) = image.dim();
    let xs = normalized_axis(cols);
    let ys = normalized_axis(rows);

    let mut gram = Gram::zeros();
    let mut rhs = Basis::zeros();
    for ((r, c), &value) in image.indexed_iter() {
        let phi = basis(xs[c], ys[r]);
        gram += phi * phi.transpose();
        rhs += phi * value;
    }

    let svd = gram.svd(true, true);
    let largest = svd.singular_values.max();
    // singular values of the Gram matrix are squares of the design matrix's
    let tolerance = RELATIVE_CUTOFF * largest;

    let mut coefficients = [0.0; BASIS_TERMS];
    match svd.solve(&rhs, tolerance) {
        Ok(solution) => coefficients.copy_from_slice(solution.as_slice()),
        // only reachable when U or Vᵀ were not computed, which svd(true, true) rules out
        Err(reason) => tracing::warn!(reason, "Flat-field solve failed, using a zero surface"),
    }
    coefficients
}

/// Evaluate a fitted surface on a `(rows, cols)` grid.
pub fn evaluate_surface(coefficients: &[f64; BASIS_TERMS], shape: (usize, usize)) -> Array2<f64> {
    let (rows, cols) = shape;
    let xs = normalized_axis(cols);
    let ys = normalized_axis(rows);
    let c = Basis::from(*coefficients);
    Array2::from_shape_fn(shape, |(r, col)| basis(xs[col], ys[r]).dot(&c))
}

/// Fit the cubic surface to `image` and evaluate it on the same grid.
pub fn fit_surface(image: &Array2<f64>) -> Array2<f64> {
    evaluate_surface(&fit_coefficients(image), image.dim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn axis_spans_minus_one_to_one() {
        assert_eq!(normalized_axis(3), vec![-1.0, 0.0, 1.0]);
        assert_eq!(normalized_axis(1), vec![-1.0]);
        assert!(normalized_axis(0).is_empty());
    }

    #[test]
    fn polynomial_in_the_basis_is_reproduced() {
        let truth = [3.0, 0.5, -1.2, 0.3, 0.8, 0.1, -0.4, 0.25, -0.6, 0.9];
        let image = evaluate_surface(&truth, (40, 60));

        let coefficients = fit_coefficients(&image);
        for (fitted, expected) in coefficients.iter().zip(truth.iter()) {
            assert!((fitted - expected).abs() < 1e-8, "{fitted} vs {expected}");
        }
        assert!(max_abs_diff(&fit_surface(&image), &image) < 1e-8);
    }

    #[test]
    fn fitting_is_idempotent() {
        let image = Array2::from_shape_fn((25, 30), |(r, c)| {
            ((r * 7 + c * 13) % 17) as f64 + 0.01 * (r * c) as f64
        });
        let once = fit_surface(&image);
        let twice = fit_surface(&once);
        assert!(max_abs_diff(&once, &twice) < 1e-8);
    }

    #[test]
    fn constant_image_gives_constant_surface() {
        let image = Array2::from_elem((12, 9), 250.0);
        let surface = fit_surface(&image);
        assert!(surface.iter().all(|&v| (v - 250.0).abs() < 1e-9));
    }

    #[test]
    fn rank_deficient_grid_does_not_fail() {
        // a single row makes every y term collinear with the constant
        let image = Array2::from_shape_fn((1, 16), |(_, c)| 2.0 + c as f64);
        let surface = fit_surface(&image);
        assert_eq!(surface.dim(), (1, 16));
        assert!(max_abs_diff(&surface, &image) < 1e-8);

        let single = Array2::from_elem((1, 1), 5.0);
        assert!((fit_surface(&single)[[0, 0]] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn empty_image_gives_empty_surface() {
        let image = Array2::<f64>::zeros((0, 4));
        assert_eq!(fit_surface(&image).dim(), (0, 4));
    }
}
