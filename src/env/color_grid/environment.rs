//! ColorGrid environment implementation
//!
//! This module implements the ColorGrid struct and the Environment trait.

use anyhow::Result;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::{
    NUM_ACTIONS, NUM_COLORS, NUM_PLANES,
    config::ColorGridConfig,
    rewards::{RewardShaping, ShapingContext},
    types::{Action, BlockColor, GridSnapshot, Position},
};
use crate::{
    env::{AgentRole, Environment, PerAgent, SpaceInfo, SpaceType, StepInfo, StepResult},
    error::ColorGridError,
};

/// Observation of the full grid for both agents
///
/// The grid is fully observable, so both agents share the same planes and
/// differ only in the goal information they are given.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorGridObservation {
    /// `[NUM_PLANES, width, height]` one-hot planes, flattened
    pub planes: Vec<f32>,

    /// Goal information per agent (all zeros when hidden)
    pub goal_info: PerAgent<[f32; NUM_COLORS]>,

    /// True goal colour, used as the goal-prediction target
    pub goal: BlockColor,
}

/// Two-agent ColorGrid environment
#[derive(Debug)]
pub struct ColorGrid {
    /// Environment configuration
    config: ColorGridConfig,
    /// Block per cell, indexed `x * height + y`
    blocks: Vec<Option<BlockColor>>,
    /// Agent positions
    positions: PerAgent<Position>,
    /// Rewarded colour for the current episode
    goal: BlockColor,
    /// Steps taken in the current episode
    timestep: usize,
    /// Random number generator for placement and goal sampling
    rng: StdRng,
    /// Reward shaping terms applied after the shared reward
    shaping: Vec<Box<dyn RewardShaping>>,
    /// Whether reset has been called
    initialized: bool,
}

impl ColorGrid {
    /// Create a new environment from a validated configuration
    pub fn new(config: ColorGridConfig) -> Result<Self> {
        config.validate().map_err(|e| ColorGridError::InvalidConfig(e.to_string()))?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut shaping: Vec<Box<dyn RewardShaping>> = Vec::new();
        if let Some(penalty) = config.proximity_penalty {
            shaping.push(Box::new(penalty));
        }

        Ok(Self {
            blocks: vec![None; config.width * config.height],
            positions: Self::start_positions(&config),
            goal: BlockColor::Red,
            timestep: 0,
            rng,
            shaping,
            initialized: false,
            config,
        })
    }

    /// Add a reward shaping term
    pub fn with_shaping(mut self, shaping: Box<dyn RewardShaping>) -> Self {
        self.shaping.push(shaping);
        self
    }

    /// Environment configuration
    pub fn config(&self) -> &ColorGridConfig {
        &self.config
    }

    /// Current agent positions
    pub fn positions(&self) -> PerAgent<Position> {
        self.positions
    }

    /// Goal colour of the current episode
    pub fn goal(&self) -> BlockColor {
        self.goal
    }

    /// Steps taken in the current episode
    pub fn timestep(&self) -> usize {
        self.timestep
    }

    /// Block at a position, if any
    pub fn block_at(&self, position: Position) -> Option<BlockColor> {
        if !position.in_bounds(self.config.width, self.config.height) {
            return None;
        }
        self.blocks[self.cell_index(position)]
    }

    /// Number of blocks of each colour, in plane order
    pub fn block_counts(&self) -> [usize; NUM_COLORS] {
        let mut counts = [0; NUM_COLORS];
        for color in self.blocks.iter().flatten() {
            counts[color.index()] += 1;
        }
        counts
    }

    /// Step with raw action indices as produced by a policy
    pub fn step_indices(
        &mut self,
        actions: PerAgent<i64>,
    ) -> Result<StepResult<ColorGridObservation>> {
        let actions = PerAgent::new(
            Action::from_index(actions.leader)?,
            Action::from_index(actions.follower)?,
        );
        self.step(actions)
    }

    /// Render the current state as text
    pub fn render(&self) -> String {
        self.snapshot().render()
    }

    fn start_positions(config: &ColorGridConfig) -> PerAgent<Position> {
        PerAgent::new(
            Position::new(0, 0),
            Position::new(config.width as i32 - 1, config.height as i32 - 1),
        )
    }

    fn cell_index(&self, position: Position) -> usize {
        position.x as usize * self.config.height + position.y as usize
    }

    fn position_of(&self, index: usize) -> Position {
        Position::new((index / self.config.height) as i32, (index % self.config.height) as i32)
    }

    fn is_agent_cell(&self, index: usize) -> bool {
        let position = self.position_of(index);
        position == self.positions.leader || position == self.positions.follower
    }

    /// Place a block of `color` on a uniformly random free cell
    fn spawn_block(&mut self, color: BlockColor) -> Result<(), ColorGridError> {
        let free: Vec<usize> = (0..self.blocks.len())
            .filter(|&i| self.blocks[i].is_none() && !self.is_agent_cell(i))
            .collect();
        let &cell = free
            .choose(&mut self.rng)
            .ok_or(ColorGridError::NoFreeCell { color: color.name() })?;
        self.blocks[cell] = Some(color);
        Ok(())
    }

    /// Move `role` one cell unless the target is off the grid or occupied by
    /// the other agent
    fn move_agent(&mut self, role: AgentRole, action: Action) {
        let target = self.positions[role].moved(action);
        if target.in_bounds(self.config.width, self.config.height)
            && target != self.positions[role.other()]
        {
            self.positions[role] = target;
        }
    }

    fn observation(&self) -> ColorGridObservation {
        let plane_size = self.config.width * self.config.height;
        let mut planes = vec![0.0; NUM_PLANES * plane_size];

        for (cell, block) in self.blocks.iter().enumerate() {
            if let Some(color) = block {
                planes[color.index() * plane_size + cell] = 1.0;
            }
        }
        for (offset, role) in AgentRole::ALL.into_iter().enumerate() {
            let cell = self.cell_index(self.positions[role]);
            planes[(NUM_COLORS + offset) * plane_size + cell] = 1.0;
        }

        let visible = self.goal.one_hot();
        let hidden = if self.config.asymmetric { [0.0; NUM_COLORS] } else { visible };

        ColorGridObservation {
            planes,
            goal_info: PerAgent::new(visible, hidden),
            goal: self.goal,
        }
    }
}

impl Environment for ColorGrid {
    type Observation = ColorGridObservation;
    type Action = PerAgent<Action>;
    type Snapshot = GridSnapshot;

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn reset(&mut self) -> Result<ColorGridObservation> {
        self.timestep = 0;
        self.positions = Self::start_positions(&self.config);
        self.blocks.iter_mut().for_each(|block| *block = None);

        let num_blocks = self.config.num_blocks();
        let mut candidates: Vec<usize> =
            (0..self.blocks.len()).filter(|&i| !self.is_agent_cell(i)).collect();
        let (chosen, _) = candidates.partial_shuffle(&mut self.rng, num_blocks);
        for (k, &cell) in chosen.iter().enumerate() {
            self.blocks[cell] = Some(BlockColor::ALL[k % NUM_COLORS]);
        }

        self.goal = BlockColor::ALL[self.rng.gen_range(0..NUM_COLORS)];
        self.initialized = true;

        tracing::trace!(goal = self.goal.name(), num_blocks, "ColorGrid reset");
        Ok(self.observation())
    }

    fn step(&mut self, actions: PerAgent<Action>) -> Result<StepResult<ColorGridObservation>> {
        if !self.initialized {
            return Err(ColorGridError::NotReset.into());
        }

        // Leader moves first so the follower sees its new position
        for (role, &action) in actions.iter() {
            self.move_agent(role, action);
        }

        let mut shared = 0.0;
        for role in AgentRole::ALL {
            let cell = self.cell_index(self.positions[role]);
            if let Some(color) = self.blocks[cell].take() {
                shared += if color == self.goal {
                    self.config.positive_reward
                } else {
                    -self.config.negative_reward
                };
                self.spawn_block(color)?;
            }
        }

        let mut reward = PerAgent::splat(shared);
        let context = ShapingContext { timestep: self.timestep, positions: self.positions };
        for term in &self.shaping {
            term.shape(&context, &mut reward);
        }

        self.timestep += 1;
        let truncated = self.timestep >= self.config.max_steps;

        Ok(StepResult {
            observation: self.observation(),
            reward,
            terminated: false,
            truncated,
            info: StepInfo { timestep: self.timestep, ..Default::default() },
        })
    }

    fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            width: self.config.width,
            height: self.config.height,
            timestep: self.timestep,
            cells: self.blocks.iter().map(|&block| GridSnapshot::encode_cell(block)).collect(),
            positions: self.positions,
            goal: self.goal,
            reward: PerAgent::default(),
        }
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo {
            shape: vec![NUM_PLANES, self.config.width, self.config.height],
            dtype: SpaceType::Continuous,
        }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![], dtype: SpaceType::Discrete(NUM_ACTIONS) }
    }
}
