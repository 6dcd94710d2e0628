//! Noise projection into a column-normalized space
//!
//! The forward map is the inverse control-cost matrix with every column
//! scaled by `1 / (n * max|column|)`, so no single parameter's projected
//! noise can dominate however many parameters a dimension has.

use crate::common::invert_full_rank;
use crate::error::{ImprovementError, Result};
use nalgebra::{DMatrix, DVector};

/// Linear projection of one dimension's noise and its inverse
#[derive(Debug, Clone)]
pub struct ProjectionTransform {
    forward: DMatrix<f64>,
    inverse: DMatrix<f64>,
}

impl ProjectionTransform {
    /// Build the projection of `dimension` from its inverse control-cost matrix
    pub fn new(inv_control_cost: &DMatrix<f64>, dimension: usize) -> Result<Self> {
        let n = inv_control_cost.ncols();
        let mut forward = inv_control_cost.clone();

        for mut column in forward.column_iter_mut() {
            let column_max = column.amax();
            if column_max == 0.0 || !column_max.is_finite() {
                return Err(ImprovementError::SingularMatrix {
                    dimension,
                    matrix: "projection",
                });
            }
            column /= n as f64 * column_max;
        }

        let inverse = invert_full_rank(&forward, dimension, "projection")?;

        Ok(ProjectionTransform { forward, inverse })
    }

    /// Forward projection matrix
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.forward
    }

    /// Inverse projection matrix
    pub fn inverse_matrix(&self) -> &DMatrix<f64> {
        &self.inverse
    }

    /// `out = P * noise`
    pub fn project(&self, noise: &DVector<f64>, out: &mut DVector<f64>) {
        self.forward.mul_to(noise, out);
    }

    /// `out = P^-1 * projected`
    pub fn unproject(&self, projected: &DVector<f64>, out: &mut DVector<f64>) {
        self.inverse.mul_to(projected, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn columns_are_normalized_by_their_max() {
        let inv = DMatrix::from_row_slice(2, 2, &[4.0, -1.0, 2.0, 0.5]);
        let proj = ProjectionTransform::new(&inv, 0).unwrap();

        // column 0 max 4 -> scale 1/8; column 1 max 1 -> scale 1/2
        let expected = DMatrix::from_row_slice(2, 2, &[0.5, -0.5, 0.25, 0.25]);
        assert_relative_eq!(proj.matrix(), &expected, epsilon = 1e-12);
        assert_relative_eq!(
            proj.matrix() * proj.inverse_matrix(),
            DMatrix::identity(2, 2),
            epsilon = 1e-12
        );
    }

    #[test]
    fn project_then_unproject_is_identity() {
        let inv = DMatrix::from_row_slice(3, 3, &[2.0, 0.5, 0.1, 0.5, 1.0, 0.2, 0.1, 0.2, 3.0]);
        let proj = ProjectionTransform::new(&inv, 0).unwrap();
        let noise = DVector::from_vec(vec![0.2, -1.3, 0.7]);
        let mut projected = DVector::zeros(3);
        let mut back = DVector::zeros(3);

        proj.project(&noise, &mut projected);
        proj.unproject(&projected, &mut back);
        assert_relative_eq!(back, noise, epsilon = 1e-12);
    }

    #[test]
    fn nearly_singular_inverse_metric_is_rejected() {
        // columns stay nonzero after scaling but remain parallel
        let inv = DMatrix::from_row_slice(2, 2, &[0.1, 0.3, 0.3, 0.9]);
        assert_eq!(
            ProjectionTransform::new(&inv, 1).unwrap_err(),
            ImprovementError::SingularMatrix {
                dimension: 1,
                matrix: "projection",
            }
        );
    }

    #[test]
    fn zero_column_is_singular() {
        let inv = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(
            ProjectionTransform::new(&inv, 3).unwrap_err(),
            ImprovementError::SingularMatrix {
                dimension: 3,
                matrix: "projection",
            }
        );
    }
}
