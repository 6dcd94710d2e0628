//! Policy improvement core of a stochastic trajectory optimizer
//!
//! Noisy variants of a parameterized trajectory are sampled with a
//! covariance shaped by a control-cost metric, scored by an external cost
//! evaluator, and combined into a parameter update through per-timestep
//! importance weights.
pub mod common;
pub mod config;
pub mod error;
pub mod improvement;
pub mod noise;
pub mod optimizer;
pub mod policy;
pub mod rollout;

pub use crate::config::{ImprovementConfig, OptimizerConfig};
pub use crate::error::{ImprovementError, Result};
pub use crate::improvement::PolicyImprovement;
pub use crate::optimizer::{CostEvaluator, OptimizationSummary, StompOptimizer};
pub use crate::policy::{CovariantTrajectoryPolicy, Policy};
pub use crate::rollout::{Rollout, RolloutCounts};
