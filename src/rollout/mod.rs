//! Rollouts: sampled variants of the trajectory parameters
pub mod pool;

pub use self::pool::{RolloutCounts, RolloutPool};

use crate::common::types::PerDimension;
use crate::common::zeros_per_dimension;
use nalgebra::DVector;

/// One noisy trajectory sample and its cost breakdown
#[derive(Debug, Clone, PartialEq)]
pub struct Rollout {
    /// Mean parameters the noise was applied to
    pub parameters: PerDimension,
    /// Raw noise in parameter space
    pub noise: PerDimension,
    /// Noise after the projection transform
    pub noise_projected: PerDimension,
    /// `parameters + noise`
    pub parameters_noisy: PerDimension,
    /// `parameters + noise_projected`
    pub parameters_noisy_projected: PerDimension,
    /// Per-timestep control cost of each dimension
    pub control_costs: PerDimension,
    /// Per-timestep state cost, shared by all dimensions
    pub state_costs: DVector<f64>,
    /// `state_costs + control_costs` per dimension
    pub total_costs: PerDimension,
    /// Cost-to-go (or total cost in instantaneous mode) per dimension
    pub cumulative_costs: PerDimension,
    /// Per-timestep importance weight of each dimension
    pub probabilities: PerDimension,
}

impl Rollout {
    /// Create a zero-filled rollout
    pub fn new(num_parameters: &[usize], num_timesteps: usize) -> Self {
        let per_timestep = vec![num_timesteps; num_parameters.len()];
        Rollout {
            parameters: zeros_per_dimension(num_parameters),
            noise: zeros_per_dimension(num_parameters),
            noise_projected: zeros_per_dimension(num_parameters),
            parameters_noisy: zeros_per_dimension(num_parameters),
            parameters_noisy_projected: zeros_per_dimension(num_parameters),
            control_costs: zeros_per_dimension(&per_timestep),
            state_costs: DVector::zeros(num_timesteps),
            total_costs: zeros_per_dimension(&per_timestep),
            cumulative_costs: zeros_per_dimension(&per_timestep),
            probabilities: zeros_per_dimension(&per_timestep),
        }
    }

    /// Total cost: every control-cost entry plus every state-cost entry
    pub fn cost(&self) -> f64 {
        let control: f64 = self.control_costs.iter().map(|c| c.sum()).sum();
        control + self.state_costs.sum()
    }

    /// Overwrite this rollout with `other` without reallocating
    ///
    /// Both rollouts must have been allocated with the same sizes.
    pub fn copy_from(&mut self, other: &Rollout) {
        fn copy(dst: &mut PerDimension, src: &PerDimension) {
            for (d, s) in dst.iter_mut().zip(src) {
                d.copy_from(s);
            }
        }
        copy(&mut self.parameters, &other.parameters);
        copy(&mut self.noise, &other.noise);
        copy(&mut self.noise_projected, &other.noise_projected);
        copy(&mut self.parameters_noisy, &other.parameters_noisy);
        copy(
            &mut self.parameters_noisy_projected,
            &other.parameters_noisy_projected,
        );
        copy(&mut self.control_costs, &other.control_costs);
        self.state_costs.copy_from(&other.state_costs);
        copy(&mut self.total_costs, &other.total_costs);
        copy(&mut self.cumulative_costs, &other.cumulative_costs);
        copy(&mut self.probabilities, &other.probabilities);
    }

    /// `noise = parameters_noisy - parameters`
    pub fn compute_noise(&mut self) {
        for ((noise, noisy), mean) in self
            .noise
            .iter_mut()
            .zip(&self.parameters_noisy)
            .zip(&self.parameters)
        {
            noise.copy_from(noisy);
            *noise -= mean;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_sums_control_and_state_costs() {
        let mut rollout = Rollout::new(&[3, 3], 3);
        rollout.control_costs[0] = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        rollout.control_costs[1] = DVector::from_vec(vec![0.5, 0.5, 0.0]);
        rollout.state_costs = DVector::from_vec(vec![10.0, 0.0, 1.0]);
        assert_eq!(rollout.cost(), 18.0);
    }

    #[test]
    fn compute_noise_subtracts_the_mean() {
        let mut rollout = Rollout::new(&[2], 2);
        rollout.parameters[0] = DVector::from_vec(vec![1.0, 2.0]);
        rollout.parameters_noisy[0] = DVector::from_vec(vec![1.5, 1.0]);
        rollout.compute_noise();
        assert_eq!(rollout.noise[0], DVector::from_vec(vec![0.5, -1.0]));
    }

    #[test]
    fn copy_from_copies_every_field() {
        let mut src = Rollout::new(&[2], 2);
        src.noise_projected[0] = DVector::from_vec(vec![0.1, 0.2]);
        src.state_costs = DVector::from_vec(vec![3.0, 4.0]);
        src.probabilities[0] = DVector::from_vec(vec![0.25, 0.75]);

        let mut dst = Rollout::new(&[2], 2);
        dst.copy_from(&src);
        assert_eq!(dst, src);
    }
}
