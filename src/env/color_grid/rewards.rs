//! Reward shaping for ColorGrid
//!
//! Shaping terms run after the shared block reward has been assigned and may
//! adjust each agent's reward independently.

use std::fmt::Debug;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::types::Position;
use crate::env::PerAgent;

/// State visible to reward shaping terms
#[derive(Debug, Clone, Copy)]
pub struct ShapingContext {
    /// Timestep of the step being rewarded (0 for the first step)
    pub timestep: usize,
    /// Agent positions after moving
    pub positions: PerAgent<Position>,
}

/// A per-agent reward adjustment applied on every step
pub trait RewardShaping: Debug + Send + Sync {
    /// Adjust `rewards` in place
    fn shape(&self, context: &ShapingContext, rewards: &mut PerAgent<f32>);
}

/// Penalises the follower for staying near the leader early in an episode
///
/// While `timestep < timestep_expiry` and the Manhattan distance between the
/// agents is below `close_threshold`, the follower loses `penalty`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FollowerProximityPenalty {
    /// Distance below which the follower counts as close
    pub close_threshold: i32,
    /// Timestep after which the penalty no longer applies
    pub timestep_expiry: usize,
    /// Amount subtracted from the follower's reward
    pub penalty: f32,
}

impl Default for FollowerProximityPenalty {
    fn default() -> Self {
        Self { close_threshold: 10, timestep_expiry: 500, penalty: 0.1 }
    }
}

impl FollowerProximityPenalty {
    /// Default thresholds with a custom penalty
    pub fn with_penalty(penalty: f32) -> Self {
        Self { penalty, ..Self::default() }
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if self.close_threshold <= 0 {
            bail!("close_threshold must be positive, got {}", self.close_threshold);
        }
        if self.penalty < 0.0 {
            bail!("proximity penalty must be non-negative, got {}", self.penalty);
        }
        Ok(())
    }
}

impl RewardShaping for FollowerProximityPenalty {
    fn shape(&self, context: &ShapingContext, rewards: &mut PerAgent<f32>) {
        if context.timestep >= self.timestep_expiry {
            return;
        }
        let distance = context.positions.leader.manhattan_distance(context.positions.follower);
        if distance < self.close_threshold {
            rewards.follower -= self.penalty;
        }
    }
}
