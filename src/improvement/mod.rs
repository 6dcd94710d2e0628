//! Policy improvement engine
//!
//! Drives one iteration of path-integral policy improvement:
//! rollouts are generated (reusing the cheapest ones from earlier
//! iterations), the caller evaluates them and reports their state costs,
//! and the engine turns the costs into a per-dimension parameter update.
//!
//! The call sequence per iteration is
//! `generate_rollouts` → `compute_projected_noise` → external evaluation →
//! `set_rollout_costs` → `improve_policy`.
pub mod weighting;

use crate::common::types::{PerDimension, PerDimensionMatrix, RolloutParameters};
use crate::common::{invert_full_rank, zeros_per_dimension};
use crate::config::ImprovementConfig;
use crate::error::{ImprovementError, Result};
use crate::noise::{NoiseGenerator, ProjectionTransform};
use crate::policy::Policy;
use crate::rollout::{Rollout, RolloutCounts, RolloutPool};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

/// Path-integral policy improvement over a bounded rollout pool
pub struct PolicyImprovement {
    initialized: bool,
    config: ImprovementConfig,
    num_parameters: Vec<usize>,
    parameters: PerDimension,
    control_costs: PerDimensionMatrix,
    inv_control_costs: PerDimensionMatrix,
    noise_generators: Vec<NoiseGenerator>,
    projections: Vec<ProjectionTransform>,
    pool: RolloutPool,
    timestep_weights: PerDimension,
    parameter_updates: PerDimension,
    update_accumulator: PerDimension,
    control_cost_weight: f64,
    rng: StdRng,
}

impl Default for PolicyImprovement {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyImprovement {
    /// Create an engine that still has to be initialized
    pub fn new() -> Self {
        PolicyImprovement {
            initialized: false,
            config: ImprovementConfig::default(),
            num_parameters: Vec::new(),
            parameters: Vec::new(),
            control_costs: Vec::new(),
            inv_control_costs: Vec::new(),
            noise_generators: Vec::new(),
            projections: Vec::new(),
            pool: RolloutPool::new(0, &[], 0),
            timestep_weights: Vec::new(),
            parameter_updates: Vec::new(),
            update_accumulator: Vec::new(),
            control_cost_weight: 0.0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Query the policy, invert its control costs and allocate the rollout pool
    ///
    /// On failure the engine is left uninitialized.
    pub fn initialize(&mut self, config: ImprovementConfig, policy: &dyn Policy) -> Result<()> {
        self.initialized = false;
        config.validate()?;

        let num_dimensions = policy
            .num_dimensions()
            .map_err(ImprovementError::UpstreamFailure)?;
        let num_parameters = policy
            .num_parameters()
            .map_err(ImprovementError::UpstreamFailure)?;
        ImprovementError::check_len("parameter counts", num_dimensions, num_parameters.len())?;
        for &n in &num_parameters {
            // one parameter per timestep
            ImprovementError::check_len("parameters per dimension", config.num_timesteps, n)?;
        }

        let control_costs = policy
            .control_costs()
            .map_err(ImprovementError::UpstreamFailure)?;
        ImprovementError::check_len("control cost matrices", num_dimensions, control_costs.len())?;
        for (matrix, &n) in control_costs.iter().zip(&num_parameters) {
            ImprovementError::check_len("control cost rows", n, matrix.nrows())?;
            ImprovementError::check_len("control cost columns", n, matrix.ncols())?;
        }

        let parameters = policy
            .parameters()
            .map_err(ImprovementError::UpstreamFailure)?;
        check_per_dimension("policy parameters", &num_parameters, &parameters)?;

        let mut inv_control_costs = Vec::with_capacity(num_dimensions);
        let mut noise_generators = Vec::with_capacity(num_dimensions);
        let mut projections = Vec::with_capacity(num_dimensions);
        for (d, matrix) in control_costs.iter().enumerate() {
            let inverse = invert_full_rank(matrix, d, "control cost")?;
            noise_generators.push(NoiseGenerator::new(&inverse));
            projections.push(ProjectionTransform::new(&inverse, d)?);
            inv_control_costs.push(inverse);
        }

        let per_timestep = vec![config.num_timesteps; num_dimensions];
        self.pool = RolloutPool::new(config.max_rollouts, &num_parameters, config.num_timesteps);
        self.timestep_weights = zeros_per_dimension(&per_timestep);
        self.parameter_updates = zeros_per_dimension(&num_parameters);
        self.update_accumulator = zeros_per_dimension(&num_parameters);
        self.rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.num_parameters = num_parameters;
        self.parameters = parameters;
        self.control_costs = control_costs;
        self.inv_control_costs = inv_control_costs;
        self.noise_generators = noise_generators;
        self.projections = projections;

        info!(
            policy = policy.name(),
            dimensions = num_dimensions,
            timesteps = config.num_timesteps,
            max_rollouts = config.max_rollouts,
            "policy improvement initialized"
        );
        self.config = config;
        self.initialized = true;
        Ok(())
    }

    /// Whether `initialize` has succeeded
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(ImprovementError::NotInitialized)
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ImprovementConfig {
        &self.config
    }

    /// Number of optimized dimensions
    pub fn num_dimensions(&self) -> usize {
        self.num_parameters.len()
    }

    /// Rollouts holding valid samples this iteration
    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    /// Rollouts freshly sampled this iteration
    pub fn generated_count(&self) -> usize {
        self.pool.generated_count()
    }

    /// Mean parameters the current rollouts are centered on
    pub fn parameters(&self) -> &[DVector<f64>] {
        &self.parameters
    }

    /// Control-cost matrix of each dimension
    pub fn control_costs(&self) -> &[DMatrix<f64>] {
        &self.control_costs
    }

    /// Inverse control-cost matrix (the noise covariance) of each dimension
    pub fn inv_control_costs(&self) -> &[DMatrix<f64>] {
        &self.inv_control_costs
    }

    /// Projection transform of dimension `d`
    pub fn projection(&self, d: usize) -> Option<&ProjectionTransform> {
        self.projections.get(d)
    }

    /// Unclipped per-timestep cost spread of each dimension, from the last `improve_policy`
    pub fn timestep_weights(&self) -> &[DVector<f64>] {
        &self.timestep_weights
    }

    /// Every active rollout, fresh ones first, in pool order
    pub fn all_rollouts(&self) -> &[Rollout] {
        self.pool.active()
    }

    fn copy_parameters_from(&mut self, policy: &dyn Policy) -> Result<()> {
        let parameters = policy
            .parameters()
            .map_err(ImprovementError::UpstreamFailure)?;
        check_per_dimension("policy parameters", &self.num_parameters, &parameters)?;
        for (mean, p) in self.parameters.iter_mut().zip(&parameters) {
            mean.copy_from(p);
        }
        Ok(())
    }

    /// Reuse the cheapest previous rollouts and sample fresh ones around the policy's mean
    ///
    /// `noise_stddev` scales the sampled noise of each dimension.
    pub fn generate_rollouts(
        &mut self,
        policy: &dyn Policy,
        noise_stddev: &[f64],
    ) -> Result<RolloutCounts> {
        self.ensure_initialized()?;
        ImprovementError::check_len(
            "noise standard deviations",
            self.num_dimensions(),
            noise_stddev.len(),
        )?;
        self.copy_parameters_from(policy)?;

        let counts = self
            .pool
            .plan(self.config.min_rollouts, self.config.rollouts_per_iteration);
        self.pool.select(counts);
        debug!(
            generated = counts.generated,
            reused = counts.reused,
            discarded = counts.discarded,
            "rollout pool updated"
        );

        // Projected noisy parameters are kept; everything else follows from the new mean.
        let parameters = &self.parameters;
        let projections = &self.projections;
        for rollout in self.pool.reused_mut() {
            for (d, mean) in parameters.iter().enumerate() {
                rollout.parameters[d].copy_from(mean);
                rollout.noise_projected[d].copy_from(&rollout.parameters_noisy_projected[d]);
                rollout.noise_projected[d] -= mean;
                projections[d].unproject(&rollout.noise_projected[d], &mut rollout.noise[d]);
                rollout.parameters_noisy[d].copy_from(mean);
                rollout.parameters_noisy[d] += &rollout.noise[d];
            }
        }

        for rollout in self.pool.generated_mut() {
            for (d, mean) in parameters.iter().enumerate() {
                self.noise_generators[d].sample(&mut self.rng, &mut rollout.noise[d]);
                rollout.noise[d] *= noise_stddev[d];
                rollout.parameters[d].copy_from(mean);
                rollout.parameters_noisy[d].copy_from(mean);
                rollout.parameters_noisy[d] += &rollout.noise[d];
            }
        }

        Ok(counts)
    }

    /// Noisy parameters of the rollouts sampled this iteration
    pub fn rollouts(&self) -> Result<RolloutParameters> {
        self.ensure_initialized()?;
        Ok(self
            .pool
            .generated()
            .iter()
            .map(|r| r.parameters_noisy.clone())
            .collect())
    }

    /// Projected noisy parameters of the rollouts sampled this iteration
    pub fn projected_rollouts(&self) -> Result<RolloutParameters> {
        self.ensure_initialized()?;
        Ok(self
            .pool
            .generated()
            .iter()
            .map(|r| r.parameters_noisy_projected.clone())
            .collect())
    }

    /// Replace the noisy parameters of this iteration's rollouts and derive their noise
    pub fn set_rollouts(&mut self, rollouts: &[PerDimension]) -> Result<()> {
        self.ensure_initialized()?;
        ImprovementError::check_len("rollouts", self.generated_count(), rollouts.len())?;
        for candidate in rollouts {
            check_per_dimension("rollout parameters", &self.num_parameters, candidate)?;
        }

        for (rollout, candidate) in self.pool.generated_mut().iter_mut().zip(rollouts) {
            for (noisy, c) in rollout.parameters_noisy.iter_mut().zip(candidate) {
                noisy.copy_from(c);
            }
            rollout.compute_noise();
        }
        Ok(())
    }

    /// Project the raw noise of every active rollout
    pub fn compute_projected_noise(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let projections = &self.projections;
        for rollout in self.pool.active_mut() {
            for (d, projection) in projections.iter().enumerate() {
                projection.project(&rollout.noise[d], &mut rollout.noise_projected[d]);
                rollout.parameters_noisy_projected[d].copy_from(&rollout.parameters[d]);
                rollout.parameters_noisy_projected[d] += &rollout.noise_projected[d];
            }
        }
        Ok(())
    }

    /// Record the state costs of this iteration's rollouts
    ///
    /// `costs` has one row per generated rollout and one column per timestep.
    /// Control costs of all active rollouts are recomputed with
    /// `control_cost_weight`. Returns the total cost of every active rollout.
    pub fn set_rollout_costs(
        &mut self,
        policy: &dyn Policy,
        costs: &DMatrix<f64>,
        control_cost_weight: f64,
    ) -> Result<Vec<f64>> {
        self.ensure_initialized()?;
        ImprovementError::check_len("state cost rows", self.generated_count(), costs.nrows())?;
        ImprovementError::check_len(
            "state cost columns",
            self.config.num_timesteps,
            costs.ncols(),
        )?;

        self.control_cost_weight = control_cost_weight;
        self.compute_rollout_control_costs(policy)?;

        for (r, rollout) in self.pool.generated_mut().iter_mut().enumerate() {
            for (state, &c) in rollout.state_costs.iter_mut().zip(costs.row(r).iter()) {
                *state = c;
            }
            debug!(rollout = r, cost = rollout.cost(), "noisy rollout");
        }

        Ok(self.pool.active().iter().map(Rollout::cost).collect())
    }

    /// Control costs of every active rollout from its projected noise
    fn compute_rollout_control_costs(&mut self, policy: &dyn Policy) -> Result<()> {
        let weight = self.control_cost_weight;
        for rollout in self.pool.active_mut() {
            policy
                .compute_control_costs(
                    &rollout.parameters,
                    &rollout.noise_projected,
                    weight,
                    &mut rollout.control_costs,
                )
                .map_err(ImprovementError::UpstreamFailure)?;
        }
        Ok(())
    }

    /// Weight the active rollouts and compute the per-dimension parameter update
    ///
    /// The returned vectors are deltas to add to the policy's parameters.
    pub fn improve_policy(&mut self) -> Result<&[DVector<f64>]> {
        self.ensure_initialized()?;
        if self.pool.active_count() == 0 {
            return Err(ImprovementError::NoRollouts);
        }

        weighting::accumulate_costs(self.pool.active_mut(), self.config.use_cumulative_costs);
        weighting::compute_probabilities(self.pool.active_mut(), &mut self.timestep_weights)?;

        let rollouts = self.pool.active();
        for d in 0..self.parameter_updates.len() {
            weighting::compute_parameter_update(
                rollouts,
                d,
                &self.timestep_weights[d],
                &self.projections[d],
                &mut self.update_accumulator[d],
                &mut self.parameter_updates[d],
            );
        }

        Ok(self.parameter_updates.as_slice())
    }

    /// Drop every rollout kept from earlier iterations
    pub fn clear_reused_rollouts(&mut self) {
        self.pool.clear();
    }
}

fn check_per_dimension(
    what: &'static str,
    num_parameters: &[usize],
    vectors: &[DVector<f64>],
) -> Result<()> {
    ImprovementError::check_len(what, num_parameters.len(), vectors.len())?;
    for (v, &n) in vectors.iter().zip(num_parameters) {
        ImprovementError::check_len(what, n, v.len())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Identity metric, quadratic control cost on the projected noise
    struct IdentityPolicy {
        parameters: Vec<DVector<f64>>,
    }

    impl IdentityPolicy {
        fn new(dims: usize, n: usize) -> Self {
            IdentityPolicy {
                parameters: vec![DVector::zeros(n); dims],
            }
        }
    }

    impl Policy for IdentityPolicy {
        fn name(&self) -> &str {
            "IdentityPolicy"
        }
        fn num_dimensions(&self) -> std::result::Result<usize, String> {
            Ok(self.parameters.len())
        }
        fn num_parameters(&self) -> std::result::Result<Vec<usize>, String> {
            Ok(self.parameters.iter().map(|p| p.len()).collect())
        }
        fn control_costs(&self) -> std::result::Result<Vec<DMatrix<f64>>, String> {
            Ok(self
                .parameters
                .iter()
                .map(|p| DMatrix::identity(p.len(), p.len()))
                .collect())
        }
        fn parameters(&self) -> std::result::Result<Vec<DVector<f64>>, String> {
            Ok(self.parameters.clone())
        }
        fn set_parameters(
            &mut self,
            parameters: &[DVector<f64>],
        ) -> std::result::Result<(), String> {
            self.parameters = parameters.to_vec();
            Ok(())
        }
        fn compute_control_costs(
            &self,
            _parameters: &[DVector<f64>],
            noise: &[DVector<f64>],
            weight: f64,
            costs: &mut [DVector<f64>],
        ) -> std::result::Result<(), String> {
            for (cost, n) in costs.iter_mut().zip(noise) {
                *cost = n.map(|x| weight * x * x);
            }
            Ok(())
        }
    }

    fn engine(min: usize, max: usize, per_iteration: usize) -> (PolicyImprovement, IdentityPolicy) {
        let policy = IdentityPolicy::new(2, 4);
        let mut engine = PolicyImprovement::new();
        let config = ImprovementConfig::new(4)
            .with_rollouts(min, max, per_iteration)
            .with_seed(11);
        engine.initialize(config, &policy).unwrap();
        (engine, policy)
    }

    #[test]
    fn operations_require_initialization() {
        let policy = IdentityPolicy::new(1, 3);
        let mut engine = PolicyImprovement::new();
        assert_eq!(
            engine.generate_rollouts(&policy, &[1.0]),
            Err(ImprovementError::NotInitialized)
        );
        assert_eq!(engine.rollouts(), Err(ImprovementError::NotInitialized));
        assert!(matches!(
            engine.improve_policy(),
            Err(ImprovementError::NotInitialized)
        ));
    }

    #[test]
    fn parameter_count_must_match_timesteps() {
        let policy = IdentityPolicy::new(1, 3);
        let mut engine = PolicyImprovement::new();
        let err = engine
            .initialize(ImprovementConfig::new(5), &policy)
            .unwrap_err();
        assert!(matches!(err, ImprovementError::DimensionMismatch { .. }));
        assert!(!engine.is_initialized());
    }

    #[test]
    fn rejects_wrong_noise_dimension() {
        let (mut engine, policy) = engine(2, 4, 2);
        assert_eq!(
            engine.generate_rollouts(&policy, &[1.0]),
            Err(ImprovementError::DimensionMismatch {
                what: "noise standard deviations",
                expected: 2,
                found: 1,
            })
        );
    }

    #[test]
    fn generated_rollouts_are_mean_plus_scaled_noise() {
        let (mut engine, mut policy) = engine(2, 4, 2);
        policy.parameters[1] = DVector::from_element(4, 3.0);
        engine.generate_rollouts(&policy, &[1.0, 0.0]).unwrap();

        for rollout in engine.all_rollouts() {
            assert_eq!(rollout.noise[1], DVector::zeros(4));
            assert_eq!(rollout.parameters_noisy[1], DVector::from_element(4, 3.0));
            assert_relative_eq!(
                &rollout.parameters_noisy[0] - &rollout.parameters[0],
                rollout.noise[0].clone(),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn set_rollout_costs_checks_shape() {
        let (mut engine, policy) = engine(2, 4, 2);
        engine.generate_rollouts(&policy, &[1.0, 1.0]).unwrap();
        engine.compute_projected_noise().unwrap();

        let err = engine
            .set_rollout_costs(&policy, &DMatrix::zeros(3, 4), 0.0)
            .unwrap_err();
        assert_eq!(
            err,
            ImprovementError::DimensionMismatch {
                what: "state cost rows",
                expected: 2,
                found: 3,
            }
        );

        let totals = engine
            .set_rollout_costs(&policy, &DMatrix::from_element(2, 4, 0.5), 0.0)
            .unwrap();
        assert_eq!(totals, vec![2.0, 2.0]);
    }

    #[test]
    fn clear_drops_reused_rollouts() {
        let (mut engine, policy) = engine(2, 4, 2);
        engine.generate_rollouts(&policy, &[1.0, 1.0]).unwrap();
        engine.clear_reused_rollouts();
        assert_eq!(engine.active_count(), 0);

        let counts = engine.generate_rollouts(&policy, &[1.0, 1.0]).unwrap();
        assert_eq!(counts.reused, 0);
        assert_eq!(engine.active_count(), 2);
    }

    #[test]
    fn improve_without_rollouts_fails() {
        let (mut engine, _) = engine(2, 4, 2);
        assert!(matches!(
            engine.improve_policy(),
            Err(ImprovementError::NoRollouts)
        ));
    }
}
