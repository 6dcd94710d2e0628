//! Covariant trajectory policy
//!
//! One parameter per timestep per dimension: the parameters are the
//! waypoints of the trajectory between a fixed start and goal. The control
//! cost penalizes squared accelerations, computed with a second-order finite
//! difference over the padded waypoint sequence.

use super::Policy;
use nalgebra::{DMatrix, DVector};

/// Trajectory policy with an acceleration-based control-cost metric
#[derive(Debug, Clone)]
pub struct CovariantTrajectoryPolicy {
    num_timesteps: usize,
    start: Vec<f64>,
    goal: Vec<f64>,
    parameters: Vec<DVector<f64>>,
    // Acceleration operator on the interior waypoints
    differentiation: DMatrix<f64>,
    // Normalization making the largest entry of the inverse metric one
    cost_scale: f64,
}

impl CovariantTrajectoryPolicy {
    /// Create a straight-line trajectory from `start` to `goal`
    pub fn new(start: &[f64], goal: &[f64], num_timesteps: usize) -> Result<Self, String> {
        if start.len() != goal.len() {
            return Err(format!(
                "start has {} dimensions, goal has {}",
                start.len(),
                goal.len()
            ));
        }
        if start.is_empty() {
            return Err("trajectory needs at least one dimension".to_string());
        }
        if num_timesteps == 0 {
            return Err("trajectory needs at least one timestep".to_string());
        }

        let differentiation = acceleration_matrix(num_timesteps);
        let metric = differentiation.transpose() * &differentiation;
        let inverse = metric
            .try_inverse()
            .ok_or_else(|| "acceleration metric is singular".to_string())?;
        let cost_scale = inverse.amax();

        let parameters = start
            .iter()
            .zip(goal)
            .map(|(&s, &g)| {
                DVector::from_fn(num_timesteps, |t, _| {
                    s + (g - s) * (t + 1) as f64 / (num_timesteps + 1) as f64
                })
            })
            .collect();

        Ok(CovariantTrajectoryPolicy {
            num_timesteps,
            start: start.to_vec(),
            goal: goal.to_vec(),
            parameters,
            differentiation,
            cost_scale,
        })
    }

    /// Number of waypoints per dimension
    pub fn num_timesteps(&self) -> usize {
        self.num_timesteps
    }

    /// Waypoints of dimension `d`
    pub fn waypoints(&self, d: usize) -> Option<&DVector<f64>> {
        self.parameters.get(d)
    }

    /// Accelerations of a waypoint vector, with start and goal as padding
    fn accelerations(&self, d: usize, waypoints: &DVector<f64>) -> DVector<f64> {
        let mut acc = &self.differentiation * waypoints;
        acc[0] += self.start[d];
        acc[self.num_timesteps - 1] += self.goal[d];
        acc
    }
}

/// Second difference `x[t-1] - 2 x[t] + x[t+1]` with zero padding
fn acceleration_matrix(n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            -2.0
        } else if i.abs_diff(j) == 1 {
            1.0
        } else {
            0.0
        }
    })
}

impl Policy for CovariantTrajectoryPolicy {
    fn name(&self) -> &str {
        "CovariantTrajectoryPolicy"
    }

    fn num_dimensions(&self) -> Result<usize, String> {
        Ok(self.parameters.len())
    }

    fn num_parameters(&self) -> Result<Vec<usize>, String> {
        Ok(vec![self.num_timesteps; self.parameters.len()])
    }

    fn control_costs(&self) -> Result<Vec<DMatrix<f64>>, String> {
        let metric = self.differentiation.transpose() * &self.differentiation * self.cost_scale;
        Ok(vec![metric; self.parameters.len()])
    }

    fn parameters(&self) -> Result<Vec<DVector<f64>>, String> {
        Ok(self.parameters.clone())
    }

    fn set_parameters(&mut self, parameters: &[DVector<f64>]) -> Result<(), String> {
        if parameters.len() != self.parameters.len() {
            return Err(format!(
                "expected {} dimensions, got {}",
                self.parameters.len(),
                parameters.len()
            ));
        }
        if let Some(bad) = parameters.iter().find(|p| p.len() != self.num_timesteps) {
            return Err(format!(
                "expected {} parameters per dimension, got {}",
                self.num_timesteps,
                bad.len()
            ));
        }
        self.parameters = parameters.to_vec();
        Ok(())
    }

    fn compute_control_costs(
        &self,
        parameters: &[DVector<f64>],
        noise: &[DVector<f64>],
        weight: f64,
        costs: &mut [DVector<f64>],
    ) -> Result<(), String> {
        let dims = self.parameters.len();
        if parameters.len() != dims || noise.len() != dims || costs.len() != dims {
            return Err(format!("control cost inputs must cover {} dimensions", dims));
        }

        for d in 0..dims {
            let waypoints = &parameters[d] + &noise[d];
            let acc = self.accelerations(d, &waypoints);
            for (cost, a) in costs[d].iter_mut().zip(acc.iter()) {
                *cost = 0.5 * weight * self.cost_scale * a * a;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn straight_line_has_zero_control_cost() {
        let policy = CovariantTrajectoryPolicy::new(&[0.0, 1.0], &[1.0, -1.0], 9).unwrap();
        let params = policy.parameters().unwrap();
        let noise = vec![DVector::zeros(9); 2];
        let mut costs = vec![DVector::from_element(9, 1.0); 2];

        policy
            .compute_control_costs(&params, &noise, 1.0, &mut costs)
            .unwrap();

        for c in &costs {
            assert_relative_eq!(c.sum(), 0.0, epsilon = 1e-12);
        }
        assert_relative_eq!(params[0][4], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn control_cost_matches_the_quadratic_form() {
        let policy = CovariantTrajectoryPolicy::new(&[0.0], &[0.0], 6).unwrap();
        let params = policy.parameters().unwrap();
        let noise = vec![DVector::from_vec(vec![0.3, -0.1, 0.2, 0.5, -0.4, 0.1])];
        let mut costs = vec![DVector::zeros(6)];

        policy
            .compute_control_costs(&params, &noise, 2.0, &mut costs)
            .unwrap();

        let metric = &policy.control_costs().unwrap()[0];
        let quadratic = (noise[0].transpose() * metric * &noise[0])[(0, 0)];
        assert_relative_eq!(costs[0].sum(), quadratic, epsilon = 1e-10);
    }

    #[test]
    fn inverse_metric_is_normalized() {
        let policy = CovariantTrajectoryPolicy::new(&[0.0], &[1.0], 12).unwrap();
        let metric = policy.control_costs().unwrap().remove(0);
        let inverse = metric.try_inverse().unwrap();
        assert_relative_eq!(inverse.amax(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn rejects_mismatched_endpoints() {
        assert!(CovariantTrajectoryPolicy::new(&[0.0], &[1.0, 2.0], 5).is_err());
        assert!(CovariantTrajectoryPolicy::new(&[0.0], &[1.0], 0).is_err());
    }

    #[test]
    fn apply_updates_adds_to_parameters() {
        let mut policy = CovariantTrajectoryPolicy::new(&[0.0], &[0.0], 3).unwrap();
        policy
            .apply_updates(&[DVector::from_vec(vec![1.0, 2.0, 3.0])])
            .unwrap();
        assert_eq!(
            policy.waypoints(0).unwrap(),
            &DVector::from_vec(vec![1.0, 2.0, 3.0])
        );
        assert!(policy.apply_updates(&[DVector::zeros(2)]).is_err());
    }
}
