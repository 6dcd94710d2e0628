//! Noise sampling shaped by the control-cost metric
pub mod projection;

pub use self::projection::ProjectionTransform;

use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};
use rand::Rng;
use rand_distr::StandardNormal;

/// Zero-mean multivariate Gaussian sampler with a fixed covariance
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    // Lower-triangular factor with `factor * factor^T == covariance`
    factor: DMatrix<f64>,
    // Scratch for the standard-normal draw
    standard: DVector<f64>,
}

impl NoiseGenerator {
    /// Create a sampler for `covariance`
    ///
    /// Falls back to an eigendecomposition when the covariance is not
    /// numerically positive definite; negative eigenvalues are clamped to zero.
    pub fn new(covariance: &DMatrix<f64>) -> Self {
        let n = covariance.nrows();
        let factor = match Cholesky::new(covariance.clone()) {
            Some(chol) => chol.l(),
            None => {
                tracing::warn!("covariance is not positive definite, using eigendecomposition");
                let eigen = SymmetricEigen::new(covariance.clone());
                let roots = eigen.eigenvalues.map(|v| v.max(0.0).sqrt());
                eigen.eigenvectors * DMatrix::from_diagonal(&roots)
            }
        };

        NoiseGenerator {
            factor,
            standard: DVector::zeros(n),
        }
    }

    /// Dimension of the samples
    pub fn dim(&self) -> usize {
        self.factor.nrows()
    }

    /// Draw one sample into `out`
    pub fn sample<R: Rng>(&mut self, rng: &mut R, out: &mut DVector<f64>) {
        for z in self.standard.iter_mut() {
            *z = rng.sample(StandardNormal);
        }
        self.factor.mul_to(&self.standard, out);
    }
}
