//! Vectorized environment pool for parallel execution
//!
//! This module provides parallel environment execution using Rayon. Every
//! environment is stepped on the Rayon thread pool and reset automatically
//! when its episode ends, so callers always receive an observation they can
//! act on.
//!
//! # Example
//!
//! ```rust
//! use colorgrid_rl::env::{
//!     PerAgent,
//!     color_grid::{Action, ColorGrid, ColorGridConfig},
//!     pool::EnvPool,
//! };
//!
//! let config = ColorGridConfig::new().grid_size(8, 8).max_steps(10);
//! let mut pool = EnvPool::new(|| ColorGrid::new(config.clone()), 4).unwrap();
//! pool.seed(0);
//!
//! let observations = pool.reset().unwrap();
//! assert_eq!(observations.len(), 4);
//!
//! let actions = vec![PerAgent::new(Action::Up, Action::Down); 4];
//! let results = pool.step(&actions).unwrap();
//! assert_eq!(results.len(), 4);
//! ```

use anyhow::Result;
use rayon::prelude::*;

use crate::env::{Environment, PerAgent, SpaceInfo, StepResult};

/// A pool of environments for parallel execution
///
/// EnvPool manages multiple environment instances and executes operations
/// across them in parallel using Rayon's thread pool. It also tracks the
/// running return of each environment so finished episodes can be reported.
pub struct EnvPool<E: Environment> {
    /// Vector of environment instances
    envs: Vec<E>,

    /// Number of environments
    num_envs: usize,

    /// Return accumulated in the current episode of each environment
    episode_returns: Vec<PerAgent<f32>>,

    /// Steps taken in the current episode of each environment
    episode_lengths: Vec<usize>,
}

impl<E> EnvPool<E>
where
    E: Environment + Send,
    E::Observation: Send,
    E::Action: Clone + Sync,
{
    /// Create a new environment pool
    ///
    /// # Arguments
    ///
    /// * `env_fn` - Factory function to create environment instances
    /// * `num_envs` - Number of parallel environments
    pub fn new<F>(env_fn: F, num_envs: usize) -> Result<Self>
    where
        F: Fn() -> Result<E>,
    {
        anyhow::ensure!(num_envs > 0, "EnvPool needs at least one environment");
        let envs = (0..num_envs).map(|_| env_fn()).collect::<Result<Vec<_>>>()?;
        Ok(Self {
            envs,
            num_envs,
            episode_returns: vec![PerAgent::default(); num_envs],
            episode_lengths: vec![0; num_envs],
        })
    }

    /// Seed every environment, environment `i` with `base_seed + i`
    pub fn seed(&mut self, base_seed: u64) {
        for (i, env) in self.envs.iter_mut().enumerate() {
            env.seed(base_seed.wrapping_add(i as u64));
        }
    }

    /// Reset all environments in parallel
    ///
    /// Returns a vector of initial observations, one per environment.
    pub fn reset(&mut self) -> Result<Vec<E::Observation>> {
        self.episode_returns.iter_mut().for_each(|r| *r = PerAgent::default());
        self.episode_lengths.iter_mut().for_each(|l| *l = 0);
        self.envs.par_iter_mut().map(|env| env.reset()).collect()
    }

    /// Step all environments in parallel with given actions
    ///
    /// An environment whose episode ends is reset immediately: its result
    /// carries `done`, the finished episode's return and length, and the
    /// first observation of the new episode.
    ///
    /// # Arguments
    ///
    /// * `actions` - Slice of joint actions, one per environment
    ///
    /// # Panics
    ///
    /// Panics if the number of actions doesn't match the number of
    /// environments.
    pub fn step(&mut self, actions: &[E::Action]) -> Result<Vec<StepResult<E::Observation>>> {
        assert_eq!(
            actions.len(),
            self.num_envs,
            "Number of actions must match number of environments"
        );

        self.envs
            .par_iter_mut()
            .zip(self.episode_returns.par_iter_mut())
            .zip(self.episode_lengths.par_iter_mut())
            .zip(actions.par_iter())
            .map(|(((env, episode_return), episode_length), action)| {
                let mut result = env.step(action.clone())?;
                episode_return.leader += result.reward.leader;
                episode_return.follower += result.reward.follower;
                *episode_length += 1;

                if result.done() {
                    result.info.episode_return = Some(std::mem::take(episode_return));
                    result.info.episode_length = Some(std::mem::take(episode_length));
                    result.observation = env.reset()?;
                }
                Ok(result)
            })
            .collect()
    }

    /// Get the number of environments in the pool
    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    /// Get observation space information from first environment
    pub fn observation_space(&self) -> SpaceInfo {
        self.envs[0].observation_space()
    }

    /// Get action space information from first environment
    pub fn action_space(&self) -> SpaceInfo {
        self.envs[0].action_space()
    }

    /// Current frame of every environment
    pub fn snapshots(&self) -> Vec<E::Snapshot> {
        self.envs.iter().map(Environment::snapshot).collect()
    }

    /// Borrow the environments
    pub fn envs(&self) -> &[E] {
        &self.envs
    }

    /// Reset a specific environment by index
    ///
    /// # Arguments
    ///
    /// * `env_id` - Index of environment to reset
    ///
    /// # Returns
    ///
    /// Initial observation from the reset environment
    pub fn reset_env(&mut self, env_id: usize) -> Result<E::Observation> {
        self.episode_returns[env_id] = PerAgent::default();
        self.episode_lengths[env_id] = 0;
        self.envs[env_id].reset()
    }

    /// Step all environments and return structured result
    ///
    /// This is a convenience method that unpacks individual StepResults
    /// into a single PoolStepResult with parallel vectors.
    pub fn step_structured(
        &mut self,
        actions: &[E::Action],
    ) -> Result<PoolStepResult<E::Observation>> {
        let results = self.step(actions)?;

        let mut step = PoolStepResult {
            observations: Vec::with_capacity(self.num_envs),
            rewards: Vec::with_capacity(self.num_envs),
            dones: Vec::with_capacity(self.num_envs),
            finished_episodes: Vec::new(),
        };

        for (env_id, result) in results.into_iter().enumerate() {
            step.dones.push(result.done());
            step.rewards.push(result.reward);
            if let (Some(episode_return), Some(length)) =
                (result.info.episode_return, result.info.episode_length)
            {
                step.finished_episodes.push(FinishedEpisode { env_id, episode_return, length });
            }
            step.observations.push(result.observation);
        }

        Ok(step)
    }
}

/// An episode that ended during a pool step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishedEpisode {
    /// Environment the episode ran in
    pub env_id: usize,
    /// Undiscounted return per agent
    pub episode_return: PerAgent<f32>,
    /// Number of steps
    pub length: usize,
}

/// Result of stepping an environment pool
///
/// Contains observations, rewards, and done flags for all environments.
#[derive(Debug, Clone)]
pub struct PoolStepResult<O> {
    /// Observations for each environment (post-reset where done)
    pub observations: Vec<O>,

    /// Rewards for each environment
    pub rewards: Vec<PerAgent<f32>>,

    /// Whether each environment finished an episode on this step
    pub dones: Vec<bool>,

    /// Episodes that finished on this step
    pub finished_episodes: Vec<FinishedEpisode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::color_grid::{Action, ColorGrid, ColorGridConfig};

    fn make_pool(num_envs: usize, max_steps: usize) -> EnvPool<ColorGrid> {
        let config = ColorGridConfig::new().grid_size(8, 6).block_density(0.2).max_steps(max_steps);
        let mut pool = EnvPool::new(|| ColorGrid::new(config.clone()), num_envs).unwrap();
        pool.seed(11);
        pool
    }

    fn joint_actions(n: usize) -> Vec<PerAgent<Action>> {
        vec![PerAgent::new(Action::Right, Action::Left); n]
    }

    #[test]
    fn test_pool_creation() {
        let pool = make_pool(4, 10);
        assert_eq!(pool.num_envs(), 4);
        assert_eq!(pool.observation_space().shape, vec![5, 8, 6]);
        assert_eq!(pool.action_space().shape, Vec::<usize>::new());
    }

    #[test]
    fn test_pool_needs_envs() {
        let result = EnvPool::new(|| ColorGrid::new(ColorGridConfig::default()), 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_pool_reset() {
        let mut pool = make_pool(4, 10);
        let observations = pool.reset().unwrap();

        assert_eq!(observations.len(), 4);
        for obs in observations {
            assert_eq!(obs.planes.len(), 5 * 8 * 6);
        }
    }

    #[test]
    fn test_envs_get_distinct_seeds() {
        let mut pool = make_pool(4, 10);
        pool.reset().unwrap();
        let snapshots = pool.snapshots();
        assert_eq!(snapshots.len(), 4);
        // Layouts are drawn from different seeds
        assert!(snapshots.windows(2).any(|w| w[0].cells != w[1].cells));
    }

    #[test]
    fn test_pool_step() {
        let mut pool = make_pool(4, 10);
        pool.reset().unwrap();
        let results = pool.step(&joint_actions(4)).unwrap();

        assert_eq!(results.len(), 4);
        for result in results {
            assert!(!result.done());
            assert_eq!(result.info.timestep, 1);
            assert!(result.info.episode_return.is_none());
        }
    }

    #[test]
    fn test_pool_auto_reset() {
        let mut pool = make_pool(2, 3);
        pool.reset().unwrap();

        let mut totals = vec![PerAgent::<f32>::default(); 2];
        for step in 1..=3 {
            let results = pool.step(&joint_actions(2)).unwrap();
            for (env_id, result) in results.iter().enumerate() {
                totals[env_id].leader += result.reward.leader;
                totals[env_id].follower += result.reward.follower;
                assert_eq!(result.done(), step == 3);
            }
            if step == 3 {
                for (env_id, result) in results.iter().enumerate() {
                    assert_eq!(result.info.episode_return, Some(totals[env_id]));
                    assert_eq!(result.info.episode_length, Some(3));
                }
            }
        }

        // Environments were reset, so the next step starts a new episode
        for env in pool.envs() {
            assert_eq!(env.timestep(), 0);
            assert_eq!(env.snapshot().timestep, 0);
        }
        let results = pool.step(&joint_actions(2)).unwrap();
        assert!(results.iter().all(|r| r.info.timestep == 1 && !r.done()));
    }

    #[test]
    fn test_pool_step_structured() {
        let mut pool = make_pool(4, 2);
        pool.reset().unwrap();

        let first = pool.step_structured(&joint_actions(4)).unwrap();
        assert_eq!(first.observations.len(), 4);
        assert_eq!(first.rewards.len(), 4);
        assert!(first.dones.iter().all(|&d| !d));
        assert!(first.finished_episodes.is_empty());

        let second = pool.step_structured(&joint_actions(4)).unwrap();
        assert!(second.dones.iter().all(|&d| d));
        let ids: Vec<usize> = second.finished_episodes.iter().map(|e| e.env_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(second.finished_episodes.iter().all(|e| e.length == 2));
    }

    #[test]
    #[should_panic(expected = "Number of actions must match number of environments")]
    fn test_pool_step_wrong_action_count() {
        let mut pool = make_pool(4, 10);
        pool.reset().unwrap();
        let _ = pool.step(&joint_actions(2));
    }

    #[test]
    fn test_reset_env() {
        let mut pool = make_pool(2, 10);
        pool.reset().unwrap();
        pool.step(&joint_actions(2)).unwrap();

        let obs = pool.reset_env(1).unwrap();
        assert_eq!(obs.planes.len(), 5 * 8 * 6);
        assert_eq!(pool.envs()[1].timestep(), 0);
        assert_eq!(pool.envs()[0].timestep(), 1);
    }
}
