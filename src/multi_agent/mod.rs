//! Leader/follower training
//!
//! Two agents share every ColorGrid environment. Each has its own
//! [`AgentLearner`] (policy, PPO trainer, optimizer); the leader can be
//! warm-started from a checkpoint and frozen.
//!
//! # Example
//!
//! ```rust,no_run
//! use colorgrid_rl::multi_agent::{MultiAgentTrainer, TrainConfig};
//!
//! let config = TrainConfig { run_name: Some("demo".into()), ..Default::default() };
//! let mut trainer = MultiAgentTrainer::new(config)?;
//! let summary = trainer.run()?;
//! println!("final follower checkpoint: {}", summary.final_checkpoints.follower.display());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod collector;
pub mod config;
pub mod learner;
pub mod trainer;

pub use collector::{RolloutCollector, RolloutSummary};
pub use config::TrainConfig;
pub use learner::AgentLearner;
pub use trainer::{MultiAgentTrainer, TrainingSummary};
