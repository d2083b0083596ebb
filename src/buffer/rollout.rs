//! Rollout buffer for storing and processing trajectories
//!
//! This module implements experience storage for PPO training, including:
//! - Trajectory storage (observations, goal info, recurrent state, actions,
//!   rewards, value estimates)
//! - GAE (Generalized Advantage Estimation) computation
//! - Minibatch sampling for training
//!
//! # Buffer Layout
//!
//! The buffer uses a `[num_steps, num_envs]` layout where:
//! - `num_steps`: Number of timesteps per rollout
//! - `num_envs`: Number of parallel environments
//!
//! Batches are flattened step-major, so sample `step * num_envs + env_id`
//! comes from environment `env_id` at step `step`.

mod gae;
mod sampling;
#[cfg(test)]
mod tests;

pub use gae::compute_gae_single_env;
pub use sampling::{TensorBatch, generate_minibatch_indices};

use crate::env::color_grid::NUM_COLORS;

/// One agent's experience for one environment step
#[derive(Debug, Clone)]
pub struct Transition {
    /// Flattened observation planes
    pub observation: Vec<f32>,
    /// Goal information visible to the agent
    pub goal_info: [f32; NUM_COLORS],
    /// True goal colour index
    pub goal_target: i64,
    /// Recurrent `(h, c)` state the action was sampled with
    pub recurrent_state: Option<(Vec<f32>, Vec<f32>)>,
    /// Action taken
    pub action: i64,
    /// Log probability of the action
    pub log_prob: f32,
    /// Value estimate of the observation
    pub value: f32,
    /// Reward received after acting
    pub reward: f32,
    /// Whether the observation is the first of an episode
    pub episode_start: bool,
}

/// Rollout buffer for PPO training
///
/// Stores trajectories collected from environment interactions and
/// computes advantages using Generalized Advantage Estimation (GAE).
#[derive(Debug)]
pub struct RolloutBuffer {
    /// Number of steps per rollout
    num_steps: usize,

    /// Number of parallel environments
    num_envs: usize,

    /// Observation dimensionality
    obs_dim: usize,

    /// Recurrent state size (0 when the policy is not recurrent)
    hidden_dim: usize,

    /// Observations: [num_steps, num_envs, obs_dim]
    observations: Vec<Vec<Vec<f32>>>,

    /// Goal info: [num_steps, num_envs, NUM_COLORS]
    goal_info: Vec<Vec<[f32; NUM_COLORS]>>,

    /// Goal targets: [num_steps, num_envs]
    goal_targets: Vec<Vec<i64>>,

    /// Recurrent hidden state: [num_steps, num_envs, hidden_dim]
    hidden: Vec<Vec<Vec<f32>>>,

    /// Recurrent cell state: [num_steps, num_envs, hidden_dim]
    cell: Vec<Vec<Vec<f32>>>,

    /// Actions: [num_steps, num_envs]
    actions: Vec<Vec<i64>>,

    /// Rewards: [num_steps, num_envs]
    rewards: Vec<Vec<f32>>,

    /// Value estimates: [num_steps, num_envs]
    values: Vec<Vec<f32>>,

    /// Log probabilities: [num_steps, num_envs]
    log_probs: Vec<Vec<f32>>,

    /// Episode-start flags: [num_steps, num_envs]
    episode_starts: Vec<Vec<bool>>,

    /// Computed advantages: [num_steps, num_envs]
    advantages: Vec<Vec<f32>>,

    /// Computed returns: [num_steps, num_envs]
    returns: Vec<Vec<f32>>,

    /// Number of steps written for every environment
    pos: usize,

    /// Whether advantages have been computed
    advantages_computed: bool,
}

impl RolloutBuffer {
    /// Create a new rollout buffer
    ///
    /// # Arguments
    ///
    /// * `num_steps` - Number of timesteps per rollout
    /// * `num_envs` - Number of parallel environments
    /// * `obs_dim` - Dimensionality of flattened observations
    /// * `hidden_dim` - Recurrent state size, 0 for feed-forward policies
    pub fn new(num_steps: usize, num_envs: usize, obs_dim: usize, hidden_dim: usize) -> Self {
        Self {
            num_steps,
            num_envs,
            obs_dim,
            hidden_dim,
            observations: vec![vec![vec![0.0; obs_dim]; num_envs]; num_steps],
            goal_info: vec![vec![[0.0; NUM_COLORS]; num_envs]; num_steps],
            goal_targets: vec![vec![0; num_envs]; num_steps],
            hidden: vec![vec![vec![0.0; hidden_dim]; num_envs]; num_steps],
            cell: vec![vec![vec![0.0; hidden_dim]; num_envs]; num_steps],
            actions: vec![vec![0; num_envs]; num_steps],
            rewards: vec![vec![0.0; num_envs]; num_steps],
            values: vec![vec![0.0; num_envs]; num_steps],
            log_probs: vec![vec![0.0; num_envs]; num_steps],
            episode_starts: vec![vec![false; num_envs]; num_steps],
            advantages: vec![vec![0.0; num_envs]; num_steps],
            returns: vec![vec![0.0; num_envs]; num_steps],
            pos: 0,
            advantages_computed: false,
        }
    }

    /// Add a transition to the buffer
    ///
    /// # Arguments
    ///
    /// * `step` - Current step index (0 to num_steps-1)
    /// * `env_id` - Environment index (0 to num_envs-1)
    /// * `transition` - Experience for this step
    pub fn add(&mut self, step: usize, env_id: usize, transition: Transition) {
        assert!(step < self.num_steps, "Step index out of bounds");
        assert!(env_id < self.num_envs, "Environment index out of bounds");
        assert_eq!(transition.observation.len(), self.obs_dim, "Observation dimension mismatch");

        if let Some((h, c)) = transition.recurrent_state {
            assert_eq!(h.len(), self.hidden_dim, "Recurrent state dimension mismatch");
            assert_eq!(c.len(), self.hidden_dim, "Recurrent state dimension mismatch");
            self.hidden[step][env_id] = h;
            self.cell[step][env_id] = c;
        }

        self.observations[step][env_id] = transition.observation;
        self.goal_info[step][env_id] = transition.goal_info;
        self.goal_targets[step][env_id] = transition.goal_target;
        self.actions[step][env_id] = transition.action;
        self.rewards[step][env_id] = transition.reward;
        self.values[step][env_id] = transition.value;
        self.log_probs[step][env_id] = transition.log_prob;
        self.episode_starts[step][env_id] = transition.episode_start;

        self.pos = self.pos.max(step + 1);
        self.advantages_computed = false;
    }

    /// Compute advantages using Generalized Advantage Estimation (GAE)
    ///
    /// Implements the GAE algorithm from "High-Dimensional Continuous Control
    /// Using Generalized Advantage Estimation" (Schulman et al., 2016) with
    /// episode-start flags, see [`compute_gae_single_env`].
    ///
    /// # Arguments
    ///
    /// * `last_values` - Value estimates of the observations after the final
    ///   step (bootstrap values)
    /// * `last_dones` - Whether those observations start new episodes
    /// * `gamma` - Discount factor
    /// * `gae_lambda` - GAE lambda parameter
    pub fn compute_advantages(
        &mut self,
        last_values: &[f32],
        last_dones: &[bool],
        gamma: f32,
        gae_lambda: f32,
    ) {
        assert_eq!(
            last_values.len(),
            self.num_envs,
            "Last values must match number of environments"
        );
        assert_eq!(last_dones.len(), self.num_envs, "Last dones must match number of environments");

        let mut env_advantages = vec![0.0; self.num_steps];
        let mut env_returns = vec![0.0; self.num_steps];

        for env_id in 0..self.num_envs {
            let rewards: Vec<f32> = self.rewards.iter().map(|step| step[env_id]).collect();
            let values: Vec<f32> = self.values.iter().map(|step| step[env_id]).collect();
            let starts: Vec<bool> = self.episode_starts.iter().map(|step| step[env_id]).collect();

            compute_gae_single_env(
                &rewards,
                &values,
                &starts,
                last_values[env_id],
                last_dones[env_id],
                gamma,
                gae_lambda,
                &mut env_advantages,
                &mut env_returns,
            );

            for step in 0..self.num_steps {
                self.advantages[step][env_id] = env_advantages[step];
                self.returns[step][env_id] = env_returns[step];
            }
        }

        self.advantages_computed = true;
    }

    /// Get a flattened batch of all data for training
    ///
    /// # Panics
    ///
    /// Panics if advantages haven't been computed yet. Call
    /// `compute_advantages` first.
    pub fn get_batch(&self) -> RolloutBatch {
        assert!(self.advantages_computed, "Must compute advantages before getting batch");

        let total_size = self.num_steps * self.num_envs;
        let mut batch = RolloutBatch {
            obs_dim: self.obs_dim,
            hidden_dim: self.hidden_dim,
            observations: Vec::with_capacity(total_size * self.obs_dim),
            goal_info: Vec::with_capacity(total_size * NUM_COLORS),
            goal_targets: Vec::with_capacity(total_size),
            hidden: Vec::with_capacity(total_size * self.hidden_dim),
            cell: Vec::with_capacity(total_size * self.hidden_dim),
            actions: Vec::with_capacity(total_size),
            values: Vec::with_capacity(total_size),
            log_probs: Vec::with_capacity(total_size),
            advantages: Vec::with_capacity(total_size),
            returns: Vec::with_capacity(total_size),
        };

        // Flatten [steps, envs] step-major
        for step in 0..self.num_steps {
            for env_id in 0..self.num_envs {
                batch.observations.extend_from_slice(&self.observations[step][env_id]);
                batch.goal_info.extend_from_slice(&self.goal_info[step][env_id]);
                batch.goal_targets.push(self.goal_targets[step][env_id]);
                batch.hidden.extend_from_slice(&self.hidden[step][env_id]);
                batch.cell.extend_from_slice(&self.cell[step][env_id]);
                batch.actions.push(self.actions[step][env_id]);
                batch.values.push(self.values[step][env_id]);
                batch.log_probs.push(self.log_probs[step][env_id]);
                batch.advantages.push(self.advantages[step][env_id]);
                batch.returns.push(self.returns[step][env_id]);
            }
        }

        batch
    }

    /// Reward summed over steps, averaged over environments
    pub fn mean_episode_reward(&self) -> f32 {
        if self.num_envs == 0 {
            return 0.0;
        }
        let total: f32 = self.rewards.iter().flatten().sum();
        total / self.num_envs as f32
    }

    /// Observation recorded for one environment at one step
    pub fn observation(&self, step: usize, env_id: usize) -> &[f32] {
        &self.observations[step][env_id]
    }

    /// Rewards recorded for one environment, in step order
    pub fn env_rewards(&self, env_id: usize) -> Vec<f32> {
        self.rewards.iter().map(|step| step[env_id]).collect()
    }

    /// Advantages computed for one environment, in step order
    pub fn env_advantages(&self, env_id: usize) -> Vec<f32> {
        self.advantages.iter().map(|step| step[env_id]).collect()
    }

    /// Returns computed for one environment, in step order
    pub fn env_returns(&self, env_id: usize) -> Vec<f32> {
        self.returns.iter().map(|step| step[env_id]).collect()
    }

    /// Reset buffer for new rollout collection
    pub fn reset(&mut self) {
        self.pos = 0;
        self.advantages_computed = false;
    }

    /// Get buffer dimensions `(num_steps, num_envs, obs_dim)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.num_steps, self.num_envs, self.obs_dim)
    }

    /// Recurrent state size
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Whether every step slot has been written
    pub fn is_full(&self) -> bool {
        self.pos == self.num_steps
    }

    /// Get number of samples currently in buffer
    pub fn len(&self) -> usize {
        self.pos * self.num_envs
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }
}

/// A batch of rollout data ready for training, flattened step-major
#[derive(Debug, Clone)]
pub struct RolloutBatch {
    /// Observation dimensionality
    pub obs_dim: usize,

    /// Recurrent state size (0 when not recurrent)
    pub hidden_dim: usize,

    /// Observations: \[batch_size * obs_dim\]
    pub observations: Vec<f32>,

    /// Goal info: \[batch_size * NUM_COLORS\]
    pub goal_info: Vec<f32>,

    /// Goal targets: \[batch_size\]
    pub goal_targets: Vec<i64>,

    /// Recurrent hidden state: \[batch_size * hidden_dim\]
    pub hidden: Vec<f32>,

    /// Recurrent cell state: \[batch_size * hidden_dim\]
    pub cell: Vec<f32>,

    /// Actions: \[batch_size\]
    pub actions: Vec<i64>,

    /// Old value estimates: \[batch_size\]
    pub values: Vec<f32>,

    /// Old log probabilities: \[batch_size\]
    pub log_probs: Vec<f32>,

    /// Computed advantages: \[batch_size\]
    pub advantages: Vec<f32>,

    /// Computed returns: \[batch_size\]
    pub returns: Vec<f32>,
}

impl RolloutBatch {
    /// Get batch size
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
