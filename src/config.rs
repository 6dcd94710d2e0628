//! Configuration for the policy improvement engine and the optimizer loop
//!
//! Both configurations can be built directly or updated from a string-keyed
//! parameter map. Every supplied key is validated before it is applied.

use crate::error::{ImprovementError, Result};
use std::collections::HashMap;

fn invalid(field: &'static str, reason: &'static str) -> ImprovementError {
    ImprovementError::InvalidConfig { field, reason }
}

/// Read a count parameter, rejecting negative and fractional values
fn count_param(params: &HashMap<String, f64>, key: &'static str) -> Result<Option<usize>> {
    match params.get(key) {
        None => Ok(None),
        Some(&value) => {
            if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
                return Err(invalid(key, "must be a non-negative integer"));
            }
            Ok(Some(value as usize))
        }
    }
}

/// Settings of the rollout pool and cost accumulation
#[derive(Debug, Clone, PartialEq)]
pub struct ImprovementConfig {
    /// Number of timesteps of the trajectory
    pub num_timesteps: usize,
    /// Lower bound of active rollouts per iteration
    pub min_rollouts: usize,
    /// Pool capacity
    pub max_rollouts: usize,
    /// Fresh rollouts sampled per iteration
    pub rollouts_per_iteration: usize,
    /// Accumulate costs backward in time (cost-to-go)
    pub use_cumulative_costs: bool,
    /// Seed for the noise generator; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for ImprovementConfig {
    fn default() -> Self {
        ImprovementConfig {
            num_timesteps: 100,
            min_rollouts: 5,
            max_rollouts: 10,
            rollouts_per_iteration: 5,
            use_cumulative_costs: true,
            seed: None,
        }
    }
}

impl ImprovementConfig {
    /// Create a configuration for `num_timesteps` with default rollout counts
    pub fn new(num_timesteps: usize) -> Self {
        ImprovementConfig {
            num_timesteps,
            ..Default::default()
        }
    }

    /// Set the rollout counts
    pub fn with_rollouts(mut self, min: usize, max: usize, per_iteration: usize) -> Self {
        self.min_rollouts = min;
        self.max_rollouts = max;
        self.rollouts_per_iteration = per_iteration;
        self
    }

    /// Select cumulative or instantaneous cost accumulation
    pub fn with_cumulative_costs(mut self, use_cumulative_costs: bool) -> Self {
        self.use_cumulative_costs = use_cumulative_costs;
        self
    }

    /// Make sampling reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check the rollout bounds against each other
    pub fn validate(&self) -> Result<()> {
        if self.num_timesteps == 0 {
            return Err(invalid("num_timesteps", "must be positive"));
        }
        if self.max_rollouts == 0 {
            return Err(invalid("max_rollouts", "must be positive"));
        }
        if self.min_rollouts > self.max_rollouts {
            return Err(invalid("min_rollouts", "must not exceed max_rollouts"));
        }
        if self.rollouts_per_iteration == 0 {
            return Err(invalid("rollouts_per_iteration", "must be positive"));
        }
        if self.rollouts_per_iteration > self.max_rollouts {
            return Err(invalid(
                "rollouts_per_iteration",
                "must not exceed max_rollouts",
            ));
        }
        Ok(())
    }

    /// Update from a parameter map, leaving the config untouched on error
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        let mut updated = self.clone();

        if let Some(steps) = count_param(params, "num_timesteps")? {
            updated.num_timesteps = steps;
        }
        if let Some(min) = count_param(params, "min_rollouts")? {
            updated.min_rollouts = min;
        }
        if let Some(max) = count_param(params, "max_rollouts")? {
            updated.max_rollouts = max;
        }
        if let Some(per_iteration) = count_param(params, "rollouts_per_iteration")? {
            updated.rollouts_per_iteration = per_iteration;
        }
        if let Some(&flag) = params.get("use_cumulative_costs") {
            updated.use_cumulative_costs = flag != 0.0;
        }
        if let Some(seed) = count_param(params, "seed")? {
            updated.seed = Some(seed as u64);
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

/// Settings of the iteration loop driving the engine
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Iterations to run
    pub max_iterations: usize,
    /// Initial noise standard deviation per dimension
    pub noise_stddev: Vec<f64>,
    /// Factor applied to each dimension's standard deviation after every iteration
    pub noise_decay: Vec<f64>,
    /// Weight of the control cost relative to the state cost
    pub control_cost_weight: f64,
}

impl OptimizerConfig {
    /// Create a configuration with uniform noise over `num_dimensions`
    pub fn new(num_dimensions: usize) -> Self {
        OptimizerConfig {
            max_iterations: 50,
            noise_stddev: vec![1.0; num_dimensions],
            noise_decay: vec![0.95; num_dimensions],
            control_cost_weight: 0.001,
        }
    }

    /// Check the values
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be positive"));
        }
        if self.noise_stddev.len() != self.noise_decay.len() {
            return Err(invalid(
                "noise_decay",
                "must have one entry per noise dimension",
            ));
        }
        if self.noise_stddev.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(invalid("noise_stddev", "must be finite and non-negative"));
        }
        if self
            .noise_decay
            .iter()
            .any(|f| !f.is_finite() || *f <= 0.0 || *f > 1.0)
        {
            return Err(invalid("noise_decay", "must lie in (0, 1]"));
        }
        if !self.control_cost_weight.is_finite() || self.control_cost_weight < 0.0 {
            return Err(invalid(
                "control_cost_weight",
                "must be finite and non-negative",
            ));
        }
        Ok(())
    }

    /// Update from a parameter map; `noise_stddev` and `noise_decay` apply to every dimension
    pub fn configure(&mut self, params: &HashMap<String, f64>) -> Result<()> {
        let mut updated = self.clone();

        if let Some(iterations) = count_param(params, "max_iterations")? {
            updated.max_iterations = iterations;
        }
        if let Some(&stddev) = params.get("noise_stddev") {
            updated.noise_stddev.iter_mut().for_each(|s| *s = stddev);
        }
        if let Some(&decay) = params.get("noise_decay") {
            updated.noise_decay.iter_mut().for_each(|f| *f = decay);
        }
        if let Some(&weight) = params.get("control_cost_weight") {
            updated.control_cost_weight = weight;
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
