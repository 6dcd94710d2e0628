//! Fixed-capacity pool of reusable rollouts
//!
//! Slots are allocated once. Each iteration the freshly sampled rollouts
//! occupy the first `generated` slots and the reused ones follow them, so
//! the active rollouts are always the prefix `0..active`.

use super::Rollout;

/// How an iteration splits the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloutCounts {
    /// Fresh samples drawn this iteration
    pub generated: usize,
    /// Previously active rollouts kept
    pub reused: usize,
    /// Previously active rollouts dropped
    pub discarded: usize,
}

impl RolloutCounts {
    /// Rollouts active after the split
    pub fn active(&self) -> usize {
        self.generated + self.reused
    }
}

/// Bounded set of rollout slots plus a scratch buffer for reuse selection
#[derive(Debug, Clone)]
pub struct RolloutPool {
    rollouts: Vec<Rollout>,
    scratch: Vec<Rollout>,
    // (cost, slot) pairs, sorted during reuse selection
    order: Vec<(f64, usize)>,
    active: usize,
    generated: usize,
}

impl RolloutPool {
    /// Allocate `capacity` zero-filled slots
    pub fn new(capacity: usize, num_parameters: &[usize], num_timesteps: usize) -> Self {
        let template = Rollout::new(num_parameters, num_timesteps);
        RolloutPool {
            rollouts: vec![template.clone(); capacity],
            scratch: vec![template; capacity],
            order: Vec::with_capacity(capacity),
            active: 0,
            generated: 0,
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.rollouts.len()
    }

    /// Slots holding valid samples
    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Slots sampled during the current iteration
    pub fn generated_count(&self) -> usize {
        self.generated
    }

    /// Decide how many rollouts to generate, reuse and discard
    pub fn plan(&self, min_rollouts: usize, per_iteration: usize) -> RolloutCounts {
        let capacity = self.capacity();
        let mut generated = per_iteration.min(capacity);
        let mut discarded = 0;

        if self.active + generated < min_rollouts {
            generated = min_rollouts.min(capacity) - self.active;
        } else if self.active + generated > capacity {
            discarded = self.active + generated - capacity;
        }

        RolloutCounts {
            generated,
            reused: self.active - discarded,
            discarded,
        }
    }

    /// Keep the `counts.reused` cheapest active rollouts behind the fresh slots
    ///
    /// Ranking is by total cost, ties broken by slot index.
    pub fn select(&mut self, counts: RolloutCounts) {
        if counts.reused > 0 {
            self.order.clear();
            self.order.extend(
                self.rollouts[..self.active]
                    .iter()
                    .enumerate()
                    .map(|(slot, rollout)| (rollout.cost(), slot)),
            );
            self.order.sort_by(|a, b| a.0.total_cmp(&b.0));

            for (dst, &(_, src)) in self.order.iter().take(counts.reused).enumerate() {
                self.scratch[dst].copy_from(&self.rollouts[src]);
            }
            for r in 0..counts.reused {
                self.rollouts[counts.generated + r].copy_from(&self.scratch[r]);
            }
        }

        self.active = counts.active();
        self.generated = counts.generated;
    }

    /// Forget every sample
    pub fn clear(&mut self) {
        self.active = 0;
        self.generated = 0;
    }

    /// Active rollouts, fresh ones first
    pub fn active(&self) -> &[Rollout] {
        &self.rollouts[..self.active]
    }

    /// Mutable view of the active rollouts
    pub fn active_mut(&mut self) -> &mut [Rollout] {
        &mut self.rollouts[..self.active]
    }

    /// Rollouts sampled during the current iteration
    pub fn generated(&self) -> &[Rollout] {
        &self.rollouts[..self.generated]
    }

    /// Mutable view of the rollouts sampled during the current iteration
    pub fn generated_mut(&mut self) -> &mut [Rollout] {
        &mut self.rollouts[..self.generated]
    }

    /// Mutable view of the reused rollouts
    pub fn reused_mut(&mut self) -> &mut [Rollout] {
        &mut self.rollouts[self.generated..self.active]
    }
}
