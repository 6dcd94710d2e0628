use anyhow::{Context, Result};
use nalgebra::DMatrix;
use std::collections::HashMap;
use stomp_core::common::types::PerDimension;
use stomp_core::{
    CostEvaluator, CovariantTrajectoryPolicy, ImprovementConfig, OptimizerConfig, StompOptimizer,
};
use tracing_subscriber::EnvFilter;

/// Planar disc obstacle with a smooth cost falloff
struct DiscObstacle {
    center: (f64, f64),
    radius: f64,
    weight: f64,
}

impl CostEvaluator for DiscObstacle {
    fn evaluate(&mut self, candidates: &[PerDimension]) -> Result<DMatrix<f64>, String> {
        let steps = candidates
            .first()
            .and_then(|c| c.first())
            .map(|d| d.len())
            .ok_or_else(|| "no candidates to evaluate".to_string())?;

        Ok(DMatrix::from_fn(candidates.len(), steps, |r, t| {
            let dx = candidates[r][0][t] - self.center.0;
            let dy = candidates[r][1][t] - self.center.1;
            let dist_sq = dx * dx + dy * dy;
            self.weight * (-dist_sq / (2.0 * self.radius * self.radius)).exp()
        }))
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let num_timesteps = 40;

    // Configure the engine and the iteration loop
    let mut params = HashMap::new();
    params.insert("min_rollouts".to_string(), 10.0);
    params.insert("max_rollouts".to_string(), 20.0);
    params.insert("rollouts_per_iteration".to_string(), 10.0);
    params.insert("seed".to_string(), 42.0);
    let mut improvement_config = ImprovementConfig::new(num_timesteps);
    improvement_config
        .configure(&params)
        .context("invalid improvement parameters")?;

    let mut params = HashMap::new();
    params.insert("max_iterations".to_string(), 60.0);
    params.insert("noise_stddev".to_string(), 0.3);
    params.insert("noise_decay".to_string(), 0.97);
    params.insert("control_cost_weight".to_string(), 0.01);
    let mut optimizer_config = OptimizerConfig::new(2);
    optimizer_config
        .configure(&params)
        .context("invalid optimizer parameters")?;

    // Straight line from (0, 0) to (1, 1) passes right through the obstacle
    let policy = CovariantTrajectoryPolicy::new(&[0.0, 0.0], &[1.0, 1.0], num_timesteps)
        .map_err(anyhow::Error::msg)?;
    let obstacle = DiscObstacle {
        center: (0.5, 0.45),
        radius: 0.15,
        weight: 10.0,
    };

    let mut optimizer =
        StompOptimizer::new(improvement_config, optimizer_config, policy, obstacle)
            .context("failed to set up optimizer")?;
    let summary = optimizer.run().context("optimization failed")?;

    println!(
        "Initial cost {:.4}, best cost {:.4} at iteration {}",
        summary.cost_history[0], summary.best_cost, summary.best_iteration
    );

    let policy = optimizer.into_policy();
    if let (Some(xs), Some(ys)) = (policy.waypoints(0), policy.waypoints(1)) {
        for (t, (x, y)) in xs.iter().zip(ys.iter()).enumerate() {
            println!("{:3} {:8.4} {:8.4}", t, x, y);
        }
    }

    Ok(())
}
