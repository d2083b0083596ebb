//! PPO Trainer implementation

use anyhow::{Result, anyhow};
use rand::{SeedableRng, rngs::StdRng};
use tch::Kind;

use super::{
    config::PPOConfig,
    loss::{
        compute_entropy_loss, compute_goal_loss, compute_policy_loss, compute_value_loss,
        normalize_advantages,
    },
    stats::TrainingStats,
};
use crate::{
    buffer::rollout::{TensorBatch, generate_minibatch_indices},
    policy::Evaluation,
};

/// PPO Trainer for policy optimization
///
/// Owns the policy and its optimizer. The policy is evaluated through a
/// caller-supplied closure so the trainer stays independent of the network
/// architecture.
#[derive(Debug)]
pub struct PPOTrainer<P> {
    config: PPOConfig,
    policy: P,
    optimizer: Option<tch::nn::Optimizer>,
    rng: StdRng,
    total_updates: usize,
}

impl<P> PPOTrainer<P> {
    /// Create a new PPO trainer
    ///
    /// # Arguments
    ///
    /// * `config` - PPO configuration parameters
    /// * `policy` - Policy network
    pub fn new(config: PPOConfig, policy: P) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            policy,
            optimizer: None,
            rng: StdRng::from_entropy(),
            total_updates: 0,
        })
    }

    /// Seed the minibatch shuffling
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Set the optimizer for training
    ///
    /// This must be called before training starts.
    pub fn set_optimizer(&mut self, optimizer: tch::nn::Optimizer) {
        self.optimizer = Some(optimizer);
    }

    /// Whether an optimizer has been set
    pub fn has_optimizer(&self) -> bool {
        self.optimizer.is_some()
    }

    /// Get reference to the policy
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Get mutable reference to the policy
    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    /// Get the configuration
    pub fn config(&self) -> &PPOConfig {
        &self.config
    }

    /// Total gradient updates performed
    pub fn total_updates(&self) -> usize {
        self.total_updates
    }

    /// Run one PPO update over a rollout batch
    ///
    /// # Arguments
    ///
    /// * `batch` - Rollout data on the policy's device
    /// * `evaluate_fn` - Re-evaluates a minibatch's stored actions
    ///
    /// # Returns
    /// Averaged statistics for this update
    pub fn train_step<F>(
        &mut self,
        batch: &TensorBatch,
        mut evaluate_fn: F,
    ) -> Result<TrainingStats>
    where
        F: FnMut(&P, &TensorBatch) -> Evaluation,
    {
        let optimizer = self
            .optimizer
            .as_mut()
            .ok_or_else(|| anyhow!("Optimizer not set. Call set_optimizer() first."))?;
        if batch.is_empty() {
            return Err(anyhow!("cannot train on an empty batch"));
        }

        let config = &self.config;
        let value_clip = config.clip_vloss.then_some(config.clip_range);
        let mut stats_sum = TrainingStats::zeros();

        for epoch in 0..config.n_epochs {
            let minibatches =
                generate_minibatch_indices(batch.len(), config.batch_size, &mut self.rng);
            let mut last_kl = 0.0;

            for indices in &minibatches {
                let mb = batch.select(indices);
                let eval = evaluate_fn(&self.policy, &mb);

                let advantages = if config.norm_advantage {
                    normalize_advantages(&mb.advantages)
                } else {
                    mb.advantages.shallow_clone()
                };

                let (policy_loss, clip_fraction, approx_kl) = compute_policy_loss(
                    &eval.log_probs,
                    &mb.old_log_probs,
                    &advantages,
                    config.clip_range,
                );
                let value_loss =
                    compute_value_loss(&eval.values, &mb.old_values, &mb.returns, value_clip);
                let entropy_loss = compute_entropy_loss(&eval.entropy);

                let mut loss =
                    &policy_loss + config.ent_coef * &entropy_loss + config.vf_coef * &value_loss;
                let mut goal_loss_val = 0.0;
                if config.goal_info_coef > 0.0 {
                    let goal_loss = compute_goal_loss(&eval.goal_logits, &mb.goal_targets);
                    goal_loss_val = goal_loss.double_value(&[]);
                    loss = loss + config.goal_info_coef * goal_loss;
                }

                optimizer.zero_grad();
                loss.backward();
                optimizer.clip_grad_norm(config.max_grad_norm);
                optimizer.step();

                stats_sum.add(&TrainingStats {
                    policy_loss: policy_loss.double_value(&[]),
                    value_loss: value_loss.double_value(&[]),
                    entropy: eval.entropy.mean(Kind::Float).double_value(&[]),
                    goal_loss: goal_loss_val,
                    total_loss: loss.double_value(&[]),
                    clip_fraction,
                    approx_kl,
                    num_updates: 1,
                    ..Default::default()
                });
                last_kl = approx_kl;
            }

            stats_sum.epochs = epoch + 1;
            if let Some(target_kl) = config.target_kl
                && last_kl > target_kl
            {
                tracing::debug!(epoch, approx_kl = last_kl, target_kl, "KL early stop");
                break;
            }
        }

        self.total_updates += stats_sum.num_updates;
        stats_sum.explained_var = batch.explained_variance();
        Ok(stats_sum.average())
    }
}

#[cfg(test)]
mod tests {
    use tch::{Device, Tensor};

    use super::*;
    use crate::{
        buffer::{RolloutBuffer, Transition},
        env::color_grid::NUM_PLANES,
        policy::{ActorCritic, ActorCriticConfig},
    };

    const SIDE: usize = 15;

    fn policy() -> ActorCritic {
        tch::manual_seed(0);
        ActorCritic::with_device(ActorCriticConfig::new(SIDE, SIDE, false), Device::Cpu).unwrap()
    }

    fn batch(policy: &ActorCritic) -> TensorBatch {
        let obs_dim = NUM_PLANES * SIDE * SIDE;
        let (steps, envs) = (8, 2);
        let mut buffer = RolloutBuffer::new(steps, envs, obs_dim, 0);

        let obs =
            Tensor::rand([(steps * envs) as i64, obs_dim as i64], tch::kind::FLOAT_CPU).round();
        let goal = Tensor::zeros([(steps * envs) as i64, 3], tch::kind::FLOAT_CPU);
        let _ = goal.narrow(1, 1, 1).fill_(1.0);
        let out = policy.act(&obs, &goal, None);

        let obs_rows = Vec::<f32>::try_from(&obs.view([-1])).unwrap();
        let actions = Vec::<i64>::try_from(&out.actions).unwrap();
        let log_probs = Vec::<f32>::try_from(&out.log_probs).unwrap();
        let values = Vec::<f32>::try_from(&out.values).unwrap();
        for step in 0..steps {
            for env in 0..envs {
                let i = step * envs + env;
                buffer.add(step, env, Transition {
                    observation: obs_rows[i * obs_dim..(i + 1) * obs_dim].to_vec(),
                    goal_info: [0.0, 1.0, 0.0],
                    goal_target: 1,
                    recurrent_state: None,
                    action: actions[i],
                    log_prob: log_probs[i],
                    value: values[i],
                    reward: if actions[i] == 0 { 1.0 } else { 0.0 },
                    episode_start: step == 0,
                });
            }
        }
        buffer.compute_advantages(&[0.0; 2], &[false; 2], 0.99, 0.95);
        TensorBatch::from_batch(&buffer.get_batch(), Device::Cpu)
    }

    fn evaluate(policy: &ActorCritic, mb: &TensorBatch) -> Evaluation {
        policy.evaluate(&mb.observations, &mb.goal_info, &mb.actions, None)
    }

    #[test]
    fn test_train_step_requires_optimizer() {
        let policy = policy();
        let data = batch(&policy);
        let mut trainer = PPOTrainer::new(PPOConfig::new().batch_size(4), policy).unwrap();
        assert!(trainer.train_step(&data, evaluate).is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(PPOTrainer::new(PPOConfig::new().batch_size(0), ()).is_err());
    }

    #[test]
    fn test_train_step_updates_policy() {
        let policy = policy();
        let data = batch(&policy);
        let before = policy.forward(&data.observations, &data.goal_info, None).logits;

        let optimizer = policy.optimizer(1e-3).unwrap();
        let config = PPOConfig::new().batch_size(4).n_epochs(2).goal_info_coef(0.5);
        let mut trainer = PPOTrainer::new(config, policy).unwrap().with_seed(7);
        trainer.set_optimizer(optimizer);

        let stats = trainer.train_step(&data, evaluate).unwrap();
        assert_eq!(stats.num_updates, 8);
        assert_eq!(stats.epochs, 2);
        assert_eq!(trainer.total_updates(), 8);
        assert!(stats.policy_loss.is_finite());
        assert!(stats.value_loss >= 0.0);
        assert!(stats.goal_loss > 0.0);
        assert!(stats.entropy > 0.0);
        assert!((0.0..=1.0).contains(&stats.clip_fraction));

        let after = trainer.policy().forward(&data.observations, &data.goal_info, None).logits;
        let diff = (&before - &after).abs().max().double_value(&[]);
        assert!(diff > 0.0);
    }

    #[test]
    fn test_goal_loss_disabled_by_default() {
        let policy = policy();
        let data = batch(&policy);
        let optimizer = policy.optimizer(1e-4).unwrap();
        let mut trainer =
            PPOTrainer::new(PPOConfig::new().batch_size(8).n_epochs(1), policy).unwrap();
        trainer.set_optimizer(optimizer);

        let stats = trainer.train_step(&data, evaluate).unwrap();
        assert_eq!(stats.goal_loss, 0.0);
        assert_eq!(stats.num_updates, 2);
    }

    #[test]
    fn test_target_kl_stops_after_first_epoch() {
        let policy = policy();
        let data = batch(&policy);
        let optimizer = policy.optimizer(0.05).unwrap();
        let config = PPOConfig::new().batch_size(4).n_epochs(10).target_kl(Some(1e-12));
        let mut trainer = PPOTrainer::new(config, policy).unwrap().with_seed(0);
        trainer.set_optimizer(optimizer);

        let stats = trainer.train_step(&data, evaluate).unwrap();
        assert_eq!(stats.epochs, 1);
        assert_eq!(stats.num_updates, 4);
    }
}
