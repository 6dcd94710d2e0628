//! Cost accumulation, importance weights and the parameter update rule

use crate::error::{ImprovementError, Result};
use crate::noise::ProjectionTransform;
use crate::rollout::Rollout;
use nalgebra::DVector;

/// Exponent scale of the per-timestep softmax
pub const TEMPERATURE: f64 = 10.0;

/// Smallest cost spread used as a softmax denominator
pub const MIN_COST_SPREAD: f64 = 1e-8;

/// Smallest timestep weight sum used when normalizing the update
pub const MIN_WEIGHT_SUM: f64 = 1e-6;

/// Total and cumulative costs of every rollout
///
/// With `use_cumulative_costs` the cumulative cost at `t` is the cost-to-go
/// from `t` to the end of the trajectory.
pub fn accumulate_costs(rollouts: &mut [Rollout], use_cumulative_costs: bool) {
    for rollout in rollouts.iter_mut() {
        for d in 0..rollout.control_costs.len() {
            let total = &mut rollout.total_costs[d];
            total.copy_from(&rollout.state_costs);
            *total += &rollout.control_costs[d];

            let cumulative = &mut rollout.cumulative_costs[d];
            cumulative.copy_from(&*total);
            if use_cumulative_costs {
                for t in (0..cumulative.len().saturating_sub(1)).rev() {
                    let next = cumulative[t + 1];
                    cumulative[t] += next;
                }
            }
        }
    }
}

/// Per-timestep softmax over the rollouts' cumulative costs
///
/// `timestep_weights[d][t]` receives the unclipped cost spread at `(d, t)`.
pub fn compute_probabilities(
    rollouts: &mut [Rollout],
    timestep_weights: &mut [DVector<f64>],
) -> Result<()> {
    if rollouts.is_empty() {
        return Err(ImprovementError::NoRollouts);
    }

    for (d, weights) in timestep_weights.iter_mut().enumerate() {
        for t in 0..weights.len() {
            let (min_cost, max_cost) = rollouts
                .iter()
                .map(|r| r.cumulative_costs[d][t])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                    (lo.min(c), hi.max(c))
                });

            let spread = max_cost - min_cost;
            weights[t] = spread;
            let denom = if spread < MIN_COST_SPREAD {
                MIN_COST_SPREAD
            } else {
                spread
            };

            let mut sum = 0.0;
            for rollout in rollouts.iter_mut() {
                let p = (-TEMPERATURE * (rollout.cumulative_costs[d][t] - min_cost) / denom).exp();
                rollout.probabilities[d][t] = p;
                sum += p;
            }
            for rollout in rollouts.iter_mut() {
                rollout.probabilities[d][t] /= sum;
            }
        }
    }
    Ok(())
}

/// Probability-weighted noise of dimension `d`, reweighted per timestep and projected
///
/// `accumulator` is scratch space; the result is written to `update`.
pub fn compute_parameter_update(
    rollouts: &[Rollout],
    d: usize,
    timestep_weights: &DVector<f64>,
    projection: &ProjectionTransform,
    accumulator: &mut DVector<f64>,
    update: &mut DVector<f64>,
) {
    accumulator.fill(0.0);
    for rollout in rollouts {
        for ((acc, noise), p) in accumulator
            .iter_mut()
            .zip(rollout.noise[d].iter())
            .zip(rollout.probabilities[d].iter())
        {
            *acc += noise * p;
        }
    }

    let mut weight_sum = 0.0;
    let mut max_weight = 0.0_f64;
    for (acc, &weight) in accumulator.iter_mut().zip(timestep_weights.iter()) {
        *acc *= weight;
        weight_sum += weight;
        max_weight = max_weight.max(weight);
    }
    if weight_sum < MIN_WEIGHT_SUM {
        tracing::warn!(dimension = d, "rollout costs do not vary, update vanishes");
        weight_sum = MIN_WEIGHT_SUM;
    }

    let divisor = (weight_sum / timestep_weights.len() as f64).max(max_weight);
    *accumulator /= divisor;

    projection.project(accumulator, update);
}
