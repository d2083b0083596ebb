//! Training run configuration
//!
//! Everything a leader/follower run needs, persisted as `config.json` in the
//! run directory.

use std::path::PathBuf;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::{
    env::color_grid::{ColorGridConfig, FollowerProximityPenalty},
    policy::actor_critic::MIN_GRID_SIZE,
    train::PPOConfig,
};

/// Configuration of a leader/follower PPO run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Run name; `run_<unix seconds>` when absent
    pub run_name: Option<String>,
    /// Environment steps to train for, summed over envs
    pub total_timesteps: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Number of parallel environments
    pub num_envs: usize,
    /// Steps per environment per rollout
    pub num_steps_per_rollout: usize,
    /// Minibatches per PPO epoch
    pub num_minibatches: usize,
    /// PPO epochs per rollout
    pub ppo_update_epochs: usize,
    /// Discount factor
    pub gamma: f64,
    /// GAE lambda
    pub gae_lambda: f64,
    /// PPO clip range
    pub clip_param: f64,
    /// Entropy bonus coefficient
    pub entropy_coef: f64,
    /// Value loss coefficient
    pub value_func_coef: f64,
    /// Gradient norm clip
    pub max_grad_norm: f64,
    /// KL early-stop threshold
    pub target_kl: Option<f64>,
    /// Normalize advantages per minibatch
    pub norm_advantage: bool,
    /// Clip the value loss
    pub clip_vloss: bool,
    /// Goal-prediction loss coefficient
    pub goalinfo_loss_coef: f64,
    /// Keep the leader's weights fixed
    pub frozen_leader: bool,
    /// Checkpoint to initialise the leader from
    pub warmstart_leader_path: Option<PathBuf>,
    /// Use the LSTM policy
    pub use_lstm: bool,
    /// Record trajectories every N iterations (0 disables)
    pub save_data_iters: usize,
    /// Save checkpoints every N iterations (0 disables)
    pub checkpoint_iters: usize,
    /// Write per-iteration metrics to `metrics.jsonl`
    pub log_metrics: bool,
    /// Report per-iteration lines at info level
    pub debug_print: bool,
    /// Seed for libtorch, environments and minibatch shuffling
    pub seed: u64,
    /// Directory holding run directories
    pub results_dir: PathBuf,
    /// Directory holding recorded trajectories
    pub trajectories_dir: PathBuf,
    /// Environment configuration
    pub env: ColorGridConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            run_name: None,
            total_timesteps: 500_000,
            learning_rate: 1e-4,
            num_envs: 4,
            num_steps_per_rollout: 128,
            num_minibatches: 4,
            ppo_update_epochs: 4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_param: 0.2,
            entropy_coef: 0.01,
            value_func_coef: 0.5,
            max_grad_norm: 0.5,
            target_kl: None,
            norm_advantage: true,
            clip_vloss: true,
            goalinfo_loss_coef: 0.0,
            frozen_leader: false,
            warmstart_leader_path: None,
            use_lstm: false,
            save_data_iters: 100,
            checkpoint_iters: 0,
            log_metrics: true,
            debug_print: false,
            seed: 42,
            results_dir: PathBuf::from("results"),
            trajectories_dir: PathBuf::from("trajectories"),
            env: ColorGridConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples per rollout: `num_envs * num_steps_per_rollout`
    pub fn batch_size(&self) -> usize {
        self.num_envs * self.num_steps_per_rollout
    }

    /// Samples per minibatch
    pub fn minibatch_size(&self) -> usize {
        self.batch_size() / self.num_minibatches.max(1)
    }

    /// Number of collect-and-update iterations
    pub fn num_iterations(&self) -> usize {
        match self.batch_size() {
            0 => 0,
            batch => self.total_timesteps / batch,
        }
    }

    /// PPO hyperparameters derived from this configuration
    pub fn ppo_config(&self) -> PPOConfig {
        PPOConfig::new()
            .learning_rate(self.learning_rate)
            .n_epochs(self.ppo_update_epochs)
            .batch_size(self.minibatch_size())
            .gamma(self.gamma)
            .gae_lambda(self.gae_lambda)
            .clip_range(self.clip_param)
            .clip_vloss(self.clip_vloss)
            .vf_coef(self.value_func_coef)
            .ent_coef(self.entropy_coef)
            .max_grad_norm(self.max_grad_norm)
            .target_kl(self.target_kl)
            .norm_advantage(self.norm_advantage)
            .goal_info_coef(self.goalinfo_loss_coef)
    }

    /// Set total timesteps
    pub fn total_timesteps(mut self, steps: usize) -> Self {
        self.total_timesteps = steps;
        self
    }

    /// Set environment count and rollout length
    pub fn rollout(mut self, num_envs: usize, num_steps_per_rollout: usize) -> Self {
        self.num_envs = num_envs;
        self.num_steps_per_rollout = num_steps_per_rollout;
        self
    }

    /// Set seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set environment configuration
    pub fn env(mut self, env: ColorGridConfig) -> Self {
        self.env = env;
        self
    }

    /// Enable the follower proximity penalty with the given magnitude
    pub fn proximity_penalty(mut self, penalty: f32) -> Self {
        self.env = self.env.proximity_penalty(FollowerProximityPenalty::with_penalty(penalty));
        self
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.num_envs == 0 {
            bail!("num_envs must be positive");
        }
        if self.num_steps_per_rollout == 0 {
            bail!("num_steps_per_rollout must be positive");
        }
        if self.num_minibatches == 0 {
            bail!("num_minibatches must be positive");
        }
        if self.num_minibatches > self.batch_size() {
            bail!(
                "num_minibatches ({}) exceeds the batch size ({})",
                self.num_minibatches,
                self.batch_size()
            );
        }
        if self.total_timesteps < self.batch_size() {
            bail!(
                "total_timesteps ({}) must be at least num_envs * num_steps_per_rollout ({})",
                self.total_timesteps,
                self.batch_size()
            );
        }
        if self.env.width < MIN_GRID_SIZE || self.env.height < MIN_GRID_SIZE {
            bail!(
                "grid_width and grid_height must be at least {MIN_GRID_SIZE} (got {}x{})",
                self.env.width,
                self.env.height
            );
        }
        if let Some(path) = &self.warmstart_leader_path
            && !path.is_file()
        {
            bail!("warmstart_leader_path {} does not exist", path.display());
        }
        self.env.validate()?;
        self.ppo_config().validate()?;
        Ok(())
    }
}
