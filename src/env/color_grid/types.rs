//! Basic types for the ColorGrid environment
//!
//! Block colours, movement actions, grid positions and the serializable
//! snapshot used for trajectory files.

use serde::{Deserialize, Serialize};

use super::NUM_COLORS;
use crate::{env::PerAgent, error::ColorGridError};

/// Colour of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockColor {
    /// Red block, plane 0
    Red,
    /// Blue block, plane 1
    Blue,
    /// Green block, plane 2
    Green,
}

impl BlockColor {
    /// All colours in plane order
    pub const ALL: [BlockColor; 3] = [BlockColor::Red, BlockColor::Blue, BlockColor::Green];

    /// Plane / goal-info index of this colour
    pub fn index(self) -> usize {
        match self {
            BlockColor::Red => 0,
            BlockColor::Blue => 1,
            BlockColor::Green => 2,
        }
    }

    /// Colour for a plane index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Lowercase colour name
    pub fn name(self) -> &'static str {
        match self {
            BlockColor::Red => "red",
            BlockColor::Blue => "blue",
            BlockColor::Green => "green",
        }
    }

    /// Single-character symbol used by text rendering
    pub fn symbol(self) -> char {
        match self {
            BlockColor::Red => 'R',
            BlockColor::Blue => 'B',
            BlockColor::Green => 'G',
        }
    }

    /// One-hot encoding of this colour
    pub fn one_hot(self) -> [f32; NUM_COLORS] {
        let mut encoding = [0.0; NUM_COLORS];
        encoding[self.index()] = 1.0;
        encoding
    }
}

/// Movement action of a single agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// `y + 1`
    Up,
    /// `y - 1`
    Down,
    /// `x - 1`
    Left,
    /// `x + 1`
    Right,
}

impl Action {
    /// All actions in index order
    pub const ALL: [Action; 4] = [Action::Up, Action::Down, Action::Left, Action::Right];

    /// Parse an action from a policy output index
    pub fn from_index(index: i64) -> Result<Self, ColorGridError> {
        match index {
            0 => Ok(Action::Up),
            1 => Ok(Action::Down),
            2 => Ok(Action::Left),
            3 => Ok(Action::Right),
            other => Err(ColorGridError::InvalidAction(other)),
        }
    }

    /// Index of this action
    pub fn index(self) -> i64 {
        match self {
            Action::Up => 0,
            Action::Down => 1,
            Action::Left => 2,
            Action::Right => 3,
        }
    }

    /// Convert action to (dx, dy) delta; `y` grows upwards
    pub fn to_delta(self) -> (i32, i32) {
        match self {
            Action::Up => (0, 1),
            Action::Down => (0, -1),
            Action::Left => (-1, 0),
            Action::Right => (1, 0),
        }
    }
}

impl TryFrom<i64> for Action {
    type Error = ColorGridError;

    fn try_from(index: i64) -> Result<Self, Self::Error> {
        Action::from_index(index)
    }
}

/// Position on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Column, `0..width`
    pub x: i32,
    /// Row, `0..height`, growing upwards
    pub y: i32,
}

impl Position {
    /// Create new position
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Position after applying an action (may be out of bounds)
    pub fn moved(self, action: Action) -> Self {
        let (dx, dy) = action.to_delta();
        Self::new(self.x + dx, self.y + dy)
    }

    /// Check if position is within bounds
    pub fn in_bounds(self, width: usize, height: usize) -> bool {
        self.x >= 0 && (self.x as usize) < width && self.y >= 0 && (self.y as usize) < height
    }

    /// Manhattan distance to another position
    pub fn manhattan_distance(self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// A single recorded frame of a ColorGrid episode
///
/// `cells` is column-major (`x * height + y`), matching the observation
/// layout: 0 empty, 1 red, 2 blue, 3 green.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Grid width
    pub width: usize,
    /// Grid height
    pub height: usize,
    /// Episode timestep of this frame
    pub timestep: usize,
    /// Encoded cell contents
    pub cells: Vec<u8>,
    /// Agent positions
    pub positions: PerAgent<Position>,
    /// Goal colour of the episode
    pub goal: BlockColor,
    /// Reward each agent received for the step taken from this frame
    ///
    /// Zero until the step is known, see [`GridSnapshot::with_reward`].
    pub reward: PerAgent<f32>,
}

impl GridSnapshot {
    /// Attach the reward of the step taken from this frame
    pub fn with_reward(mut self, reward: PerAgent<f32>) -> Self {
        self.reward = reward;
        self
    }

    /// Encode an optional block into a cell code
    pub fn encode_cell(block: Option<BlockColor>) -> u8 {
        block.map_or(0, |color| color.index() as u8 + 1)
    }

    /// Block stored at a cell, if any
    pub fn block_at(&self, x: usize, y: usize) -> Option<BlockColor> {
        match self.cells.get(x * self.height + y) {
            Some(&code) if code > 0 => BlockColor::from_index(code as usize - 1),
            _ => None,
        }
    }

    /// Render the frame as text with `y` increasing upwards
    ///
    /// Agents are drawn as `L` and `F`, blocks as `R`, `B`, `G`, empty
    /// cells as `.`.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity((self.width + 1) * self.height);
        for y in (0..self.height).rev() {
            for x in 0..self.width {
                let here = Position::new(x as i32, y as i32);
                let symbol = if here == self.positions.leader {
                    'L'
                } else if here == self.positions.follower {
                    'F'
                } else {
                    self.block_at(x, y).map_or('.', BlockColor::symbol)
                };
                out.push(symbol);
            }
            out.push('\n');
        }
        out
    }

    /// One-line header describing the frame
    pub fn header(&self) -> String {
        format!(
            "t={} goal={} reward(leader={:.2}, follower={:.2})",
            self.timestep,
            self.goal.name(),
            self.reward.leader,
            self.reward.follower
        )
    }
}
