//! Training algorithms

pub mod ppo;

pub use ppo::{AggregatedStats, PPOConfig, PPOTrainer, TrainingStats};
