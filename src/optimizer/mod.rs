//! Iteration loop around the policy improvement engine
//!
//! Each iteration samples rollouts, has them scored by a [`CostEvaluator`],
//! applies the resulting update to the policy and shrinks the exploration
//! noise. The best noiseless trajectory seen is restored at the end.

use crate::common::types::PerDimension;
use crate::config::{ImprovementConfig, OptimizerConfig};
use crate::error::{ImprovementError, Result};
use crate::improvement::PolicyImprovement;
use crate::policy::Policy;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

/// Scores candidate trajectories
pub trait CostEvaluator {
    /// Per-timestep state costs, one row per candidate and one column per timestep
    fn evaluate(
        &mut self,
        candidates: &[PerDimension],
    ) -> std::result::Result<DMatrix<f64>, String>;
}

/// Outcome of [`StompOptimizer::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationSummary {
    /// Iterations performed
    pub iterations: usize,
    /// Iteration whose trajectory was kept (0 is the initial trajectory)
    pub best_iteration: usize,
    /// Cost of the kept trajectory
    pub best_cost: f64,
    /// Noiseless trajectory cost before the first and after every iteration
    pub cost_history: Vec<f64>,
}

/// Optimizer owning a policy, its cost evaluator and the improvement engine
pub struct StompOptimizer<P: Policy, E: CostEvaluator> {
    config: OptimizerConfig,
    improvement: PolicyImprovement,
    policy: P,
    evaluator: E,
    noise_stddev: Vec<f64>,
}

impl<P: Policy, E: CostEvaluator> StompOptimizer<P, E> {
    /// Create an optimizer and initialize its engine from `policy`
    pub fn new(
        improvement_config: ImprovementConfig,
        config: OptimizerConfig,
        policy: P,
        evaluator: E,
    ) -> Result<Self> {
        config.validate()?;
        let mut improvement = PolicyImprovement::new();
        improvement.initialize(improvement_config, &policy)?;
        ImprovementError::check_len(
            "noise standard deviations",
            improvement.num_dimensions(),
            config.noise_stddev.len(),
        )?;

        Ok(StompOptimizer {
            noise_stddev: config.noise_stddev.clone(),
            config,
            improvement,
            policy,
            evaluator,
        })
    }

    /// The policy being optimized
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Give back the policy
    pub fn into_policy(self) -> P {
        self.policy
    }

    /// The underlying engine
    pub fn improvement(&self) -> &PolicyImprovement {
        &self.improvement
    }

    /// Current exploration noise per dimension
    pub fn noise_stddev(&self) -> &[f64] {
        &self.noise_stddev
    }

    /// Run one full generate → evaluate → improve cycle and update the policy
    pub fn iterate(&mut self) -> Result<()> {
        let counts = self
            .improvement
            .generate_rollouts(&self.policy, &self.noise_stddev)?;
        self.improvement.compute_projected_noise()?;

        let candidates = self.improvement.projected_rollouts()?;
        let costs = self
            .evaluator
            .evaluate(&candidates)
            .map_err(ImprovementError::UpstreamFailure)?;
        let totals = self.improvement.set_rollout_costs(
            &self.policy,
            &costs,
            self.config.control_cost_weight,
        )?;
        debug!(
            generated = counts.generated,
            active = totals.len(),
            min_cost = totals.iter().cloned().fold(f64::INFINITY, f64::min),
            "rollouts evaluated"
        );

        let updates = self.improvement.improve_policy()?;
        self.policy
            .apply_updates(updates)
            .map_err(ImprovementError::UpstreamFailure)?;

        for (stddev, decay) in self.noise_stddev.iter_mut().zip(&self.config.noise_decay) {
            *stddev *= decay;
        }
        Ok(())
    }

    /// State plus control cost of the policy's current, noiseless trajectory
    pub fn trajectory_cost(&mut self) -> Result<f64> {
        let parameters = self
            .policy
            .parameters()
            .map_err(ImprovementError::UpstreamFailure)?;
        let state_costs = self
            .evaluator
            .evaluate(std::slice::from_ref(&parameters))
            .map_err(ImprovementError::UpstreamFailure)?;
        ImprovementError::check_len("state cost rows", 1, state_costs.nrows())?;

        let zero_noise: PerDimension = parameters.iter().map(|p| DVector::zeros(p.len())).collect();
        let mut control_costs: PerDimension = parameters
            .iter()
            .map(|_| DVector::zeros(self.improvement.config().num_timesteps))
            .collect();
        self.policy
            .compute_control_costs(
                &parameters,
                &zero_noise,
                self.config.control_cost_weight,
                &mut control_costs,
            )
            .map_err(ImprovementError::UpstreamFailure)?;

        let control: f64 = control_costs.iter().map(|c| c.sum()).sum();
        Ok(state_costs.row(0).sum() + control)
    }

    /// Run `max_iterations` iterations and keep the cheapest trajectory
    pub fn run(&mut self) -> Result<OptimizationSummary> {
        let mut best_cost = self.trajectory_cost()?;
        let mut best_parameters = self
            .policy
            .parameters()
            .map_err(ImprovementError::UpstreamFailure)?;
        let mut best_iteration = 0;
        let mut cost_history = Vec::with_capacity(self.config.max_iterations + 1);
        cost_history.push(best_cost);

        for iteration in 1..=self.config.max_iterations {
            self.iterate()?;
            let cost = self.trajectory_cost()?;
            cost_history.push(cost);
            info!(iteration, cost, "optimizer iteration");

            if cost < best_cost {
                best_cost = cost;
                best_iteration = iteration;
                best_parameters = self
                    .policy
                    .parameters()
                    .map_err(ImprovementError::UpstreamFailure)?;
            }
        }

        self.policy
            .set_parameters(&best_parameters)
            .map_err(ImprovementError::UpstreamFailure)?;
        info!(best_iteration, best_cost, "optimization finished");

        Ok(OptimizationSummary {
            iterations: self.config.max_iterations,
            best_iteration,
            best_cost,
            cost_history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::CovariantTrajectoryPolicy;

    /// Squared distance of every waypoint from a target value
    struct TargetCost {
        target: f64,
    }

    impl CostEvaluator for TargetCost {
        fn evaluate(
            &mut self,
            candidates: &[PerDimension],
        ) -> std::result::Result<DMatrix<f64>, String> {
            let steps = candidates[0][0].len();
            Ok(DMatrix::from_fn(candidates.len(), steps, |r, t| {
                candidates[r]
                    .iter()
                    .map(|dim| (dim[t] - self.target).powi(2))
                    .sum()
            }))
        }
    }

    struct FailingCost;

    impl CostEvaluator for FailingCost {
        fn evaluate(&mut self, _: &[PerDimension]) -> std::result::Result<DMatrix<f64>, String> {
            Err("simulator offline".to_string())
        }
    }

    fn configs(iterations: usize) -> (ImprovementConfig, OptimizerConfig) {
        let improvement = ImprovementConfig::new(10)
            .with_rollouts(5, 10, 5)
            .with_seed(3);
        let mut optimizer = OptimizerConfig::new(1);
        optimizer.max_iterations = iterations;
        optimizer.noise_stddev = vec![0.5];
        optimizer.noise_decay = vec![0.9];
        optimizer.control_cost_weight = 0.0;
        (improvement, optimizer)
    }

    #[test]
    fn noise_decays_every_iteration() {
        let policy = CovariantTrajectoryPolicy::new(&[0.0], &[0.0], 10).unwrap();
        let (improvement, config) = configs(2);
        let evaluator = TargetCost { target: 1.0 };
        let mut optimizer = StompOptimizer::new(improvement, config, policy, evaluator).unwrap();

        optimizer.iterate().unwrap();
        optimizer.iterate().unwrap();
        approx::assert_relative_eq!(optimizer.noise_stddev()[0], 0.5 * 0.81, epsilon = 1e-12);
    }

    #[test]
    fn run_never_returns_a_worse_trajectory() {
        let policy = CovariantTrajectoryPolicy::new(&[0.0], &[0.0], 10).unwrap();
        let (improvement, config) = configs(15);
        let evaluator = TargetCost { target: 1.0 };
        let mut optimizer = StompOptimizer::new(improvement, config, policy, evaluator).unwrap();

        let summary = optimizer.run().unwrap();
        assert_eq!(summary.cost_history.len(), 16);
        assert!(summary.best_cost <= summary.cost_history[0]);
        assert_eq!(
            summary.best_cost,
            summary.cost_history[summary.best_iteration]
        );

        let final_cost = optimizer.trajectory_cost().unwrap();
        approx::assert_relative_eq!(final_cost, summary.best_cost, epsilon = 1e-9);
    }

    #[test]
    fn evaluator_failure_is_upstream() {
        let policy = CovariantTrajectoryPolicy::new(&[0.0], &[0.0], 10).unwrap();
        let (improvement, config) = configs(1);
        let mut optimizer = StompOptimizer::new(improvement, config, policy, FailingCost).unwrap();

        assert_eq!(
            optimizer.iterate(),
            Err(ImprovementError::UpstreamFailure(
                "simulator offline".to_string()
            ))
        );
    }

    #[test]
    fn noise_must_cover_every_dimension() {
        let policy = CovariantTrajectoryPolicy::new(&[0.0, 0.0], &[1.0, 1.0], 10).unwrap();
        let (improvement, config) = configs(1);
        let result = StompOptimizer::new(improvement, config, policy, FailingCost);
        assert!(matches!(
            result,
            Err(ImprovementError::DimensionMismatch { .. })
        ));
    }
}
