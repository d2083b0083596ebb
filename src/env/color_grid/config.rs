//! ColorGrid environment configuration

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::{NUM_COLORS, rewards::FollowerProximityPenalty};

/// Configuration for a [`ColorGrid`](super::ColorGrid) environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorGridConfig {
    /// Grid width
    pub width: usize,

    /// Grid height
    pub height: usize,

    /// Fraction of cells holding a block
    pub block_density: f32,

    /// Reward for consuming a goal-coloured block
    pub positive_reward: f32,

    /// Penalty magnitude for consuming any other block
    pub negative_reward: f32,

    /// Episode length before truncation
    pub max_steps: usize,

    /// Only the leader observes the goal colour
    pub asymmetric: bool,

    /// Seed for block placement and goal sampling
    pub seed: Option<u64>,

    /// Optional penalty for a follower that stays close to the leader
    pub proximity_penalty: Option<FollowerProximityPenalty>,
}

impl Default for ColorGridConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            block_density: 0.10,
            positive_reward: 1.0,
            negative_reward: 1.0,
            max_steps: 1000,
            asymmetric: false,
            seed: None,
            proximity_penalty: None,
        }
    }
}

impl ColorGridConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set grid dimensions
    pub fn grid_size(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set block density
    pub fn block_density(mut self, density: f32) -> Self {
        self.block_density = density;
        self
    }

    /// Set reward magnitudes
    pub fn rewards(mut self, positive: f32, negative: f32) -> Self {
        self.positive_reward = positive;
        self.negative_reward = negative;
        self
    }

    /// Set maximum episode length
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Toggle asymmetric goal visibility
    pub fn asymmetric(mut self, asymmetric: bool) -> Self {
        self.asymmetric = asymmetric;
        self
    }

    /// Set the RNG seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enable the follower proximity penalty
    pub fn proximity_penalty(mut self, penalty: FollowerProximityPenalty) -> Self {
        self.proximity_penalty = Some(penalty);
        self
    }

    /// Number of blocks placed at reset
    ///
    /// `round(density * width * height)`, but never fewer than one block
    /// per colour.
    pub fn num_blocks(&self) -> usize {
        let cells = (self.width * self.height) as f32;
        ((self.block_density * cells).round() as usize).max(NUM_COLORS)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.width < 2 || self.height < 2 {
            bail!("grid must be at least 2x2, got {}x{}", self.width, self.height);
        }
        if self.width > i32::MAX as usize || self.height > i32::MAX as usize {
            bail!("grid dimensions {}x{} are too large", self.width, self.height);
        }
        if !(self.block_density > 0.0 && self.block_density < 1.0) {
            bail!("block_density must be in (0, 1), got {}", self.block_density);
        }
        if self.positive_reward < 0.0 {
            bail!("positive_reward must be non-negative, got {}", self.positive_reward);
        }
        if self.negative_reward < 0.0 {
            bail!("negative_reward must be non-negative, got {}", self.negative_reward);
        }
        if self.max_steps == 0 {
            bail!("max_steps must be positive");
        }
        // Every block, both agents and one spare cell for respawning
        let needed = self.num_blocks() + 3;
        if needed > self.width * self.height {
            bail!(
                "{} blocks do not fit on a {}x{} grid",
                self.num_blocks(),
                self.width,
                self.height
            );
        }
        if let Some(penalty) = &self.proximity_penalty {
            penalty.validate()?;
        }
        Ok(())
    }
}
