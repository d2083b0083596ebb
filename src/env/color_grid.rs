//! ColorGrid: a two-agent cooperative gridworld
//!
//! A leader and a follower walk a grid scattered with red, blue and green
//! blocks. Stepping on a block consumes it: the goal colour pays both agents
//! `positive_reward`, the other colours cost them `negative_reward`. Consumed
//! blocks respawn elsewhere, so block counts never change within an episode.
//! In asymmetric mode only the leader is told which colour is the goal.

pub use config::ColorGridConfig;
pub use environment::{ColorGrid, ColorGridObservation};
pub use rewards::{FollowerProximityPenalty, RewardShaping, ShapingContext};
pub use types::{Action, BlockColor, GridSnapshot, Position};

mod config;
mod environment;
mod rewards;
mod types;

/// Number of observation planes: three block colours plus the two agents
pub const NUM_PLANES: usize = 5;

/// Number of block colours (and length of the goal-info vector)
pub const NUM_COLORS: usize = 3;

/// Number of discrete actions
pub const NUM_ACTIONS: usize = 4;
