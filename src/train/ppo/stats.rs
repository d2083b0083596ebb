//! Training statistics for PPO updates

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Statistics for a PPO update
///
/// Per-minibatch values are accumulated with [`TrainingStats::add`] and
/// averaged at the end of the update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Clipped surrogate policy loss
    pub policy_loss: f64,

    /// Value function loss
    pub value_loss: f64,

    /// Mean policy entropy
    pub entropy: f64,

    /// Goal-prediction cross-entropy (0 when disabled)
    pub goal_loss: f64,

    /// Weighted total loss
    pub total_loss: f64,

    /// Fraction of samples whose ratio left the clip range
    pub clip_fraction: f64,

    /// Approximate KL divergence between old and new policies
    pub approx_kl: f64,

    /// Explained variance of the rollout values (whole batch)
    pub explained_var: f64,

    /// Number of gradient updates performed
    pub num_updates: usize,

    /// Number of epochs completed before any KL early stop
    pub epochs: usize,
}

impl TrainingStats {
    /// Create zero-initialized statistics
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Add another statistics instance to this one
    pub fn add(&mut self, other: &TrainingStats) {
        self.policy_loss += other.policy_loss;
        self.value_loss += other.value_loss;
        self.entropy += other.entropy;
        self.goal_loss += other.goal_loss;
        self.total_loss += other.total_loss;
        self.clip_fraction += other.clip_fraction;
        self.approx_kl += other.approx_kl;
        self.num_updates += other.num_updates;
    }

    /// Average the accumulated per-minibatch values
    pub fn average(&self) -> Self {
        if self.num_updates == 0 {
            return Self::zeros();
        }
        let scale = self.num_updates as f64;

        Self {
            policy_loss: self.policy_loss / scale,
            value_loss: self.value_loss / scale,
            entropy: self.entropy / scale,
            goal_loss: self.goal_loss / scale,
            total_loss: self.total_loss / scale,
            clip_fraction: self.clip_fraction / scale,
            approx_kl: self.approx_kl / scale,
            explained_var: self.explained_var,
            num_updates: self.num_updates,
            epochs: self.epochs,
        }
    }
}

impl AddAssign<&TrainingStats> for TrainingStats {
    fn add_assign(&mut self, other: &TrainingStats) {
        self.add(other);
    }
}

/// Exponential moving average weight for [`AggregatedStats`]
const EMA_ALPHA: f64 = 0.1;

fn ema(previous: f64, sample: f64) -> f64 {
    EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * previous
}

/// Running view of update statistics for one learner
#[derive(Debug, Clone)]
pub struct AggregatedStats {
    /// Statistics from the latest update
    pub current: TrainingStats,

    /// Exponential moving average of recent updates
    pub running_avg: TrainingStats,

    /// Lowest policy loss seen so far
    pub best_policy_loss: f64,

    /// Lowest value loss seen so far
    pub best_value_loss: f64,

    /// Number of updates recorded
    pub total_updates: usize,
}

impl Default for AggregatedStats {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatedStats {
    /// Create empty aggregated statistics
    pub fn new() -> Self {
        Self {
            current: TrainingStats::zeros(),
            running_avg: TrainingStats::zeros(),
            best_policy_loss: f64::INFINITY,
            best_value_loss: f64::INFINITY,
            total_updates: 0,
        }
    }

    /// Record the statistics of one update
    pub fn update(&mut self, stats: &TrainingStats) {
        let avg = &mut self.running_avg;
        if self.total_updates == 0 {
            *avg = stats.clone();
        } else {
            avg.policy_loss = ema(avg.policy_loss, stats.policy_loss);
            avg.value_loss = ema(avg.value_loss, stats.value_loss);
            avg.entropy = ema(avg.entropy, stats.entropy);
            avg.goal_loss = ema(avg.goal_loss, stats.goal_loss);
            avg.total_loss = ema(avg.total_loss, stats.total_loss);
            avg.clip_fraction = ema(avg.clip_fraction, stats.clip_fraction);
            avg.approx_kl = ema(avg.approx_kl, stats.approx_kl);
            if stats.explained_var.is_finite() {
                avg.explained_var = ema(avg.explained_var, stats.explained_var);
            }
        }

        self.best_policy_loss = self.best_policy_loss.min(stats.policy_loss);
        self.best_value_loss = self.best_value_loss.min(stats.value_loss);
        self.current = stats.clone();
        self.total_updates += 1;
    }
}
