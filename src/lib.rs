//! # ColorGrid RL
//!
//! Leader/follower reinforcement learning on a coloured-block grid world.
//!
//! Two agents share a grid of red, blue and green blocks. Collecting a block
//! of the episode's goal colour rewards both agents, any other colour
//! penalises both. In asymmetric mode only the leader observes the goal, so
//! the follower has to infer it from the leader's behaviour. Both agents are
//! trained with PPO (CNN actor-critic on libtorch via tch-rs); the leader can
//! be warm-started from a checkpoint and frozen.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use colorgrid_rl::prelude::*;
//!
//! let config = TrainConfig { total_timesteps: 100_000, ..Default::default() };
//! let summary = MultiAgentTrainer::new(config)?.run()?;
//! println!("run stored in {}", summary.run_dir.display());
//! # Ok::<(), anyhow::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Environment trait, ColorGrid and the parallel pool
pub mod env;

/// Typed environment errors
pub mod error;

/// Actor-critic policy network
pub mod policy;

/// Rollout storage and GAE
pub mod buffer;

/// PPO update
pub mod train;

/// Leader/follower training loop
pub mod multi_agent;

/// Run directory and checkpoint naming
pub mod checkpoint;

/// Trajectory recording and replay
pub mod trajectory;

/// Per-iteration metrics logging
pub mod metrics;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        env::{
            AgentRole, Environment, PerAgent,
            color_grid::{Action, BlockColor, ColorGrid, ColorGridConfig},
            pool::EnvPool,
        },
        multi_agent::{MultiAgentTrainer, TrainConfig, TrainingSummary},
        policy::{ActorCritic, ActorCriticConfig},
        train::{PPOConfig, PPOTrainer},
    };
}

/// Current version of colorgrid-rl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }
}
