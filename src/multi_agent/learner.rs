//! Per-agent learner
//!
//! Each agent owns its policy and PPO trainer. Frozen learners act during
//! collection but are never updated.

use std::path::Path;

use anyhow::{Context, Result};

use crate::{
    buffer::{RolloutBuffer, TensorBatch},
    env::AgentRole,
    policy::{ActorCritic, RecurrentState},
    train::{AggregatedStats, PPOConfig, PPOTrainer, TrainingStats},
};

/// One agent's policy, optimizer and update statistics
#[derive(Debug)]
pub struct AgentLearner {
    role: AgentRole,
    trainer: PPOTrainer<ActorCritic>,
    frozen: bool,
    stats: AggregatedStats,
}

impl AgentLearner {
    /// Create a learner
    ///
    /// # Arguments
    /// * `role` - Agent this learner trains
    /// * `policy` - Policy network (already warm-started if needed)
    /// * `config` - PPO hyperparameters
    /// * `frozen` - Never update this agent
    /// * `seed` - Seed for minibatch shuffling
    pub fn new(
        role: AgentRole,
        mut policy: ActorCritic,
        config: PPOConfig,
        frozen: bool,
        seed: u64,
    ) -> Result<Self> {
        let optimizer = if frozen {
            policy.freeze();
            None
        } else {
            Some(policy.optimizer(config.learning_rate)?)
        };

        let mut trainer = PPOTrainer::new(config, policy)?.with_seed(seed);
        if let Some(optimizer) = optimizer {
            trainer.set_optimizer(optimizer);
        }
        tracing::info!(role = %role, frozen, "Created learner");

        Ok(Self { role, trainer, frozen, stats: AggregatedStats::new() })
    }

    /// Agent this learner trains
    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Whether updates are skipped
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Policy network
    pub fn policy(&self) -> &ActorCritic {
        self.trainer.policy()
    }

    /// Running update statistics
    pub fn stats(&self) -> &AggregatedStats {
        &self.stats
    }

    /// Load policy weights from a checkpoint
    pub fn warm_start<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.trainer
            .policy_mut()
            .load(path)
            .with_context(|| format!("failed to warm-start {}", self.role))?;
        tracing::info!("Warm-started {} from {}", self.role, path.display());
        Ok(())
    }

    /// Run a PPO update on a filled buffer with computed advantages
    ///
    /// Returns `None` for frozen learners.
    pub fn update(&mut self, buffer: &RolloutBuffer) -> Result<Option<TrainingStats>> {
        if self.frozen {
            return Ok(None);
        }

        let device = self.policy().device();
        let batch = TensorBatch::from_batch(&buffer.get_batch(), device);
        let stats = self.trainer.train_step(&batch, |policy, mb| {
            let state = mb.recurrent_state.as_ref().map(|(h, c)| RecurrentState {
                h: h.shallow_clone(),
                c: c.shallow_clone(),
            });
            policy.evaluate(&mb.observations, &mb.goal_info, &mb.actions, state.as_ref())
        })?;

        self.stats.update(&stats);
        Ok(Some(stats))
    }

    /// Save the policy weights
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.policy().save(path)
    }
}
