//! Environment traits and implementations
//!
//! This module defines the two-agent environment interface used by the
//! training loop and provides the ColorGrid environment plus a parallel
//! environment pool.

use anyhow::Result;

pub mod agents;
pub mod color_grid;
pub mod pool;

pub use agents::{AgentRole, PerAgent};

/// Core trait for two-agent RL environments
///
/// Both agents act simultaneously; rewards are reported per agent.
pub trait Environment {
    /// Observation type (covers both agents)
    type Observation;

    /// Joint action type
    type Action;

    /// Compact per-step frame used for trajectory recording
    type Snapshot;

    /// Reseed the environment's random number generator
    fn seed(&mut self, seed: u64);

    /// Reset the environment and return the initial observation
    fn reset(&mut self) -> Result<Self::Observation>;

    /// Step the environment with a joint action
    fn step(&mut self, action: Self::Action) -> Result<StepResult<Self::Observation>>;

    /// Capture the current state for recording
    fn snapshot(&self) -> Self::Snapshot;

    /// Get the per-agent observation space dimensions
    fn observation_space(&self) -> SpaceInfo;

    /// Get the per-agent action space dimensions
    fn action_space(&self) -> SpaceInfo;
}

/// Result of an environment step
#[derive(Debug, Clone)]
pub struct StepResult<O> {
    /// Next observation
    pub observation: O,

    /// Reward received by each agent
    pub reward: PerAgent<f32>,

    /// Whether the episode terminated
    pub terminated: bool,

    /// Whether the episode was truncated
    pub truncated: bool,

    /// Additional info
    pub info: StepInfo,
}

impl<O> StepResult<O> {
    /// Whether the episode ended on this step
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Space information for observations and actions
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceInfo {
    /// Shape of the space
    pub shape: Vec<usize>,

    /// Data type
    pub dtype: SpaceType,
}

/// Space data types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpaceType {
    /// Discrete space with n options
    Discrete(usize),

    /// Continuous space (Box)
    Continuous,
}

/// Additional step information
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    /// Timestep of the episode after this step
    pub timestep: usize,

    /// Return of the episode that just finished, set by the pool on auto-reset
    pub episode_return: Option<PerAgent<f32>>,

    /// Length of the episode that just finished, set by the pool on auto-reset
    pub episode_length: Option<usize>,
}
