//! Common utilities and types for the trajectory optimizer

use crate::error::{ImprovementError, Result};

/// Common types and utilities used across the codebase
pub mod types {
    use nalgebra::{DMatrix, DVector};

    /// One vector per dimension (parameters, noise, per-timestep costs)
    pub type PerDimension = Vec<DVector<f64>>;

    /// One square matrix per dimension (control costs, projections)
    pub type PerDimensionMatrix = Vec<DMatrix<f64>>;

    /// Per-dimension parameter sets of several rollouts
    pub type RolloutParameters = Vec<PerDimension>;
}

/// Allocate one zero vector per entry of `sizes`
pub fn zeros_per_dimension(sizes: &[usize]) -> types::PerDimension {
    sizes
        .iter()
        .map(|&n| nalgebra::DVector::zeros(n))
        .collect()
}

/// Invert `matrix`, rejecting it as singular when it is numerically rank deficient
///
/// The rank is taken from the singular values with the usual
/// `n * eps * sigma_max` tolerance; an exactly nonzero LU pivot alone does not
/// make a matrix invertible in floating point.
pub fn invert_full_rank(
    matrix: &nalgebra::DMatrix<f64>,
    dimension: usize,
    name: &'static str,
) -> Result<nalgebra::DMatrix<f64>> {
    let singular = ImprovementError::SingularMatrix {
        dimension,
        matrix: name,
    };
    let n = matrix.nrows();
    if n == 0 || !matrix.is_square() || matrix.iter().any(|x| !x.is_finite()) {
        return Err(singular);
    }

    let svd = matrix.clone().svd(false, false);
    let largest = svd.singular_values.max();
    let tolerance = n as f64 * f64::EPSILON * largest;
    if largest <= 0.0 || svd.rank(tolerance) < n {
        return Err(singular);
    }

    matrix.clone().full_piv_lu().try_inverse().ok_or(singular)
}
