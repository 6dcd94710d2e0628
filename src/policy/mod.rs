//! Policy interface consumed by the improvement engine
pub mod covariant;

pub use self::covariant::CovariantTrajectoryPolicy;

use nalgebra::{DMatrix, DVector};

/// Parameterized trajectory whose parameters are being optimized
///
/// The engine only borrows a policy for the duration of a call; it never
/// keeps one.
pub trait Policy {
    /// Name of the policy, for logging
    fn name(&self) -> &str;

    /// Number of independently optimized dimensions (e.g. joints)
    fn num_dimensions(&self) -> Result<usize, String>;

    /// Number of parameters of each dimension
    fn num_parameters(&self) -> Result<Vec<usize>, String>;

    /// Symmetric positive-definite control-cost matrix of each dimension
    fn control_costs(&self) -> Result<Vec<DMatrix<f64>>, String>;

    /// Current parameters of each dimension
    fn parameters(&self) -> Result<Vec<DVector<f64>>, String>;

    /// Replace the parameters of each dimension
    fn set_parameters(&mut self, parameters: &[DVector<f64>]) -> Result<(), String>;

    /// Per-timestep control cost of `parameters + noise`, written into `costs`
    fn compute_control_costs(
        &self,
        parameters: &[DVector<f64>],
        noise: &[DVector<f64>],
        weight: f64,
        costs: &mut [DVector<f64>],
    ) -> Result<(), String>;

    /// Add a per-dimension update to the parameters
    fn apply_updates(&mut self, updates: &[DVector<f64>]) -> Result<(), String> {
        let mut parameters = self.parameters()?;
        if parameters.len() != updates.len() {
            return Err(format!(
                "{}: got updates for {} dimensions, policy has {}",
                self.name(),
                updates.len(),
                parameters.len()
            ));
        }
        for (param, update) in parameters.iter_mut().zip(updates) {
            if param.len() != update.len() {
                return Err(format!(
                    "{}: update of length {} for {} parameters",
                    self.name(),
                    update.len(),
                    param.len()
                ));
            }
            *param += update;
        }
        self.set_parameters(&parameters)
    }
}
