//! Experience buffers
//!
//! On-policy rollout storage for PPO.

pub mod rollout;

pub use rollout::{RolloutBatch, RolloutBuffer, TensorBatch, Transition};
