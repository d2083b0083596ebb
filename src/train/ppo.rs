//! Proximal Policy Optimization (PPO)
//!
//! Clipped-surrogate PPO in the CleanRL formulation, with an auxiliary
//! goal-prediction loss.
//!
//! # Update Overview
//!
//! ```text
//! For each epoch:
//!   1. Shuffle the rollout indices
//!   2. For each minibatch:
//!      a. Re-evaluate stored actions under the current policy
//!      b. Policy, value, entropy and goal losses
//!      c. Adam step with gradient norm clipping
//!   3. Stop early if approx KL exceeds target_kl
//! ```
//!
//! # References
//!
//! - [Proximal Policy Optimization Algorithms](https://arxiv.org/abs/1707.06347)
//! - [The 37 Implementation Details of PPO](https://iclr-blog-track.github.io/2022/03/25/ppo-implementation-details/)

mod config;
mod loss;
mod stats;
mod trainer;

pub use config::PPOConfig;
pub use loss::{
    compute_entropy_loss, compute_goal_loss, compute_policy_loss, compute_value_loss,
    normalize_advantages,
};
pub use stats::{AggregatedStats, TrainingStats};
pub use trainer::PPOTrainer;
