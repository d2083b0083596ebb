//! Agent roles and per-agent containers
//!
//! ColorGrid always has exactly two agents, so per-agent data lives in a
//! fixed two-slot struct rather than a string-keyed map.

use std::{
    fmt,
    ops::{Index, IndexMut},
};

use serde::{Deserialize, Serialize};

/// Role of an agent in the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// The agent that (in asymmetric mode) knows the goal colour
    Leader,
    /// The agent that has to infer the goal from the leader
    Follower,
}

impl AgentRole {
    /// Both roles, leader first (the order agents move in)
    pub const ALL: [AgentRole; 2] = [AgentRole::Leader, AgentRole::Follower];

    /// Lowercase name used in file names and logs
    pub fn name(self) -> &'static str {
        match self {
            AgentRole::Leader => "leader",
            AgentRole::Follower => "follower",
        }
    }

    /// The other agent
    pub fn other(self) -> Self {
        match self {
            AgentRole::Leader => AgentRole::Follower,
            AgentRole::Follower => AgentRole::Leader,
        }
    }

    /// Parse a role from its lowercase name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "leader" => Some(AgentRole::Leader),
            "follower" => Some(AgentRole::Follower),
            _ => None,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerAgent<T> {
    /// Leader's value
    pub leader: T,
    /// Follower's value
    pub follower: T,
}

impl<T> PerAgent<T> {
    /// Create from explicit leader and follower values
    pub fn new(leader: T, follower: T) -> Self {
        Self { leader, follower }
    }

    /// Build by calling `f` once per role (leader first)
    pub fn from_fn(mut f: impl FnMut(AgentRole) -> T) -> Self {
        let leader = f(AgentRole::Leader);
        let follower = f(AgentRole::Follower);
        Self { leader, follower }
    }

    /// Same value for both agents
    pub fn splat(value: T) -> Self
    where
        T: Clone,
    {
        Self { leader: value.clone(), follower: value }
    }

    /// Transform both values
    pub fn map<U>(self, mut f: impl FnMut(AgentRole, T) -> U) -> PerAgent<U> {
        PerAgent {
            leader: f(AgentRole::Leader, self.leader),
            follower: f(AgentRole::Follower, self.follower),
        }
    }

    /// Borrow both values
    pub fn as_ref(&self) -> PerAgent<&T> {
        PerAgent { leader: &self.leader, follower: &self.follower }
    }

    /// Iterate `(role, value)` pairs, leader first
    pub fn iter(&self) -> impl Iterator<Item = (AgentRole, &T)> {
        [(AgentRole::Leader, &self.leader), (AgentRole::Follower, &self.follower)].into_iter()
    }

    /// Iterate `(role, value)` pairs mutably, leader first
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (AgentRole, &mut T)> {
        [(AgentRole::Leader, &mut self.leader), (AgentRole::Follower, &mut self.follower)]
            .into_iter()
    }
}

impl<T> Index<AgentRole> for PerAgent<T> {
    type Output = T;

    fn index(&self, role: AgentRole) -> &T {
        match role {
            AgentRole::Leader => &self.leader,
            AgentRole::Follower => &self.follower,
        }
    }
}

impl<T> IndexMut<AgentRole> for PerAgent<T> {
    fn index_mut(&mut self, role: AgentRole) -> &mut T {
        match role {
            AgentRole::Leader => &mut self.leader,
            AgentRole::Follower => &mut self.follower,
        }
    }
}
