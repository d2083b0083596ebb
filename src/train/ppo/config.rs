//! PPO hyperparameters
//!
//! Builder-style setters plus `validate()`.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// PPO configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PPOConfig {
    /// Adam learning rate
    pub learning_rate: f64,

    /// Number of passes over each rollout
    pub n_epochs: usize,

    /// Minibatch size
    pub batch_size: usize,

    /// Discount factor (gamma)
    pub gamma: f64,

    /// GAE lambda parameter
    pub gae_lambda: f64,

    /// PPO clipping parameter (epsilon), also used for value clipping
    pub clip_range: f64,

    /// Clip the value loss around the old value estimates
    pub clip_vloss: bool,

    /// Value function loss coefficient
    pub vf_coef: f64,

    /// Entropy bonus coefficient
    pub ent_coef: f64,

    /// Maximum gradient norm for clipping
    pub max_grad_norm: f64,

    /// Stop the update after an epoch whose approx KL exceeds this
    pub target_kl: Option<f64>,

    /// Normalize advantages per minibatch
    pub norm_advantage: bool,

    /// Goal-prediction loss coefficient (0 disables the loss)
    pub goal_info_coef: f64,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            n_epochs: 4,
            batch_size: 128,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            clip_vloss: true,
            vf_coef: 0.5,
            ent_coef: 0.01,
            max_grad_norm: 0.5,
            target_kl: None,
            norm_advantage: true,
            goal_info_coef: 0.0,
        }
    }
}

impl PPOConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(anyhow!("learning_rate must be positive"));
        }
        if self.n_epochs == 0 {
            return Err(anyhow!("n_epochs must be positive"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("batch_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(anyhow!("gamma must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(anyhow!("gae_lambda must be in [0, 1]"));
        }
        if self.clip_range <= 0.0 {
            return Err(anyhow!("clip_range must be positive"));
        }
        if self.vf_coef < 0.0 {
            return Err(anyhow!("vf_coef must be non-negative"));
        }
        if self.ent_coef < 0.0 {
            return Err(anyhow!("ent_coef must be non-negative"));
        }
        if self.goal_info_coef < 0.0 {
            return Err(anyhow!("goal_info_coef must be non-negative"));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(anyhow!("max_grad_norm must be positive"));
        }
        if let Some(kl) = self.target_kl
            && kl <= 0.0
        {
            return Err(anyhow!("target_kl must be positive when set"));
        }
        Ok(())
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set number of training epochs
    pub fn n_epochs(mut self, epochs: usize) -> Self {
        self.n_epochs = epochs;
        self
    }

    /// Set minibatch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set discount factor
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set GAE lambda
    pub fn gae_lambda(mut self, lambda: f64) -> Self {
        self.gae_lambda = lambda;
        self
    }

    /// Set PPO clipping parameter
    pub fn clip_range(mut self, clip: f64) -> Self {
        self.clip_range = clip;
        self
    }

    /// Enable or disable value loss clipping
    pub fn clip_vloss(mut self, enabled: bool) -> Self {
        self.clip_vloss = enabled;
        self
    }

    /// Set value function loss coefficient
    pub fn vf_coef(mut self, coef: f64) -> Self {
        self.vf_coef = coef;
        self
    }

    /// Set entropy bonus coefficient
    pub fn ent_coef(mut self, coef: f64) -> Self {
        self.ent_coef = coef;
        self
    }

    /// Set maximum gradient norm
    pub fn max_grad_norm(mut self, norm: f64) -> Self {
        self.max_grad_norm = norm;
        self
    }

    /// Set target KL divergence
    pub fn target_kl(mut self, kl: Option<f64>) -> Self {
        self.target_kl = kl;
        self
    }

    /// Enable or disable per-minibatch advantage normalization
    pub fn norm_advantage(mut self, enabled: bool) -> Self {
        self.norm_advantage = enabled;
        self
    }

    /// Set goal-prediction loss coefficient
    pub fn goal_info_coef(mut self, coef: f64) -> Self {
        self.goal_info_coef = coef;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PPOConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.n_epochs, 4);
        assert!(config.clip_vloss);
        assert!(config.norm_advantage);
        assert_eq!(config.target_kl, None);
        assert_eq!(config.goal_info_coef, 0.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(PPOConfig::new().learning_rate(0.0).validate().is_err());
        assert!(PPOConfig::new().gamma(1.5).validate().is_err());
        assert!(PPOConfig::new().gae_lambda(-0.1).validate().is_err());
        assert!(PPOConfig::new().n_epochs(0).validate().is_err());
        assert!(PPOConfig::new().batch_size(0).validate().is_err());
        assert!(PPOConfig::new().clip_range(0.0).validate().is_err());
        assert!(PPOConfig::new().goal_info_coef(-1.0).validate().is_err());
        assert!(PPOConfig::new().target_kl(Some(0.0)).validate().is_err());

        // Zero coefficients are allowed
        assert!(PPOConfig::new().vf_coef(0.0).ent_coef(0.0).validate().is_ok());
        assert!(PPOConfig::new().target_kl(Some(0.015)).validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PPOConfig::new()
            .learning_rate(3e-4)
            .n_epochs(10)
            .batch_size(64)
            .clip_vloss(false)
            .norm_advantage(false)
            .goal_info_coef(0.5);

        assert_eq!(config.learning_rate, 3e-4);
        assert_eq!(config.n_epochs, 10);
        assert_eq!(config.batch_size, 64);
        assert!(!config.clip_vloss);
        assert!(!config.norm_advantage);
        assert_eq!(config.goal_info_coef, 0.5);

        // Other values remain default
        assert_eq!(config.gae_lambda, 0.95);
        assert_eq!(config.vf_coef, 0.5);
    }
}
