//! Rollout collection for both agents
//!
//! Steps every environment of the pool with the leader and follower acting
//! on the same observation planes, writes one transition per agent into that
//! agent's buffer and finishes with GAE.

use anyhow::{Context, Result};
use tch::{Device, Tensor};

use super::learner::AgentLearner;
use crate::{
    buffer::{RolloutBuffer, Transition},
    env::{
        AgentRole, PerAgent,
        color_grid::{Action, ColorGrid, ColorGridObservation, GridSnapshot, NUM_COLORS},
        pool::{EnvPool, FinishedEpisode},
    },
    policy::RecurrentState,
};

/// Outcome of one rollout
#[derive(Debug, Clone, Default)]
pub struct RolloutSummary {
    /// Environment steps taken, summed over envs
    pub steps: usize,
    /// Episodes that ended during the rollout
    pub finished_episodes: Vec<FinishedEpisode>,
    /// Recorded frames, `frames[step][env_id]`, when recording was requested;
    /// each frame carries the reward of the step taken from it
    pub frames: Option<Vec<Vec<GridSnapshot>>>,
}

impl RolloutSummary {
    /// Mean return of the finished episodes, per agent
    pub fn mean_episode_return(&self) -> Option<PerAgent<f32>> {
        if self.finished_episodes.is_empty() {
            return None;
        }
        let n = self.finished_episodes.len() as f32;
        let total = self.finished_episodes.iter().fold(PerAgent::splat(0.0_f32), |acc, ep| {
            acc.map(|role, sum| sum + ep.episode_return[role])
        });
        Some(total.map(|_, sum| sum / n))
    }
}

/// Per-agent outputs of one collection step, moved to the CPU
struct AgentStep {
    actions: Vec<i64>,
    log_probs: Vec<f32>,
    values: Vec<f32>,
    state_rows: Option<Vec<(Vec<f32>, Vec<f32>)>>,
}

fn to_vec<T: tch::kind::Element + Copy>(tensor: &Tensor) -> Result<Vec<T>> {
    Vec::<T>::try_from(&tensor.to_device(Device::Cpu)).context("failed to read policy output")
}

/// Drives an environment pool with both agents' policies
pub struct RolloutCollector {
    pool: EnvPool<ColorGrid>,
    observations: Vec<ColorGridObservation>,
    episode_starts: Vec<bool>,
    states: PerAgent<Option<RecurrentState>>,
    obs_dim: usize,
    global_step: usize,
}

impl std::fmt::Debug for RolloutCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolloutCollector")
            .field("num_envs", &self.pool.num_envs())
            .field("obs_dim", &self.obs_dim)
            .field("global_step", &self.global_step)
            .finish_non_exhaustive()
    }
}

impl RolloutCollector {
    /// Reset the pool and prepare recurrent state for both agents
    pub fn new(mut pool: EnvPool<ColorGrid>, learners: &PerAgent<AgentLearner>) -> Result<Self> {
        let observations = pool.reset()?;
        let num_envs = pool.num_envs();
        let obs_dim = pool.observation_space().shape.iter().product();

        Ok(Self {
            pool,
            observations,
            episode_starts: vec![true; num_envs],
            states: learners.as_ref().map(|_, learner| learner.policy().initial_state(num_envs)),
            obs_dim,
            global_step: 0,
        })
    }

    /// Number of environments
    pub fn num_envs(&self) -> usize {
        self.pool.num_envs()
    }

    /// Flattened observation size
    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    /// Environment steps taken so far, summed over envs
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Underlying environment pool
    pub fn pool(&self) -> &EnvPool<ColorGrid> {
        &self.pool
    }

    /// Collect one rollout into `buffers` and compute advantages
    ///
    /// # Arguments
    /// * `learners` - Policies of both agents
    /// * `buffers` - One buffer per agent, sized `[num_steps, num_envs]`
    /// * `gamma` - Discount factor
    /// * `gae_lambda` - GAE lambda parameter
    /// * `record` - Keep a snapshot of every env before every step, paired
    ///   with the reward that step earned
    pub fn collect(
        &mut self,
        learners: &PerAgent<AgentLearner>,
        buffers: &mut PerAgent<RolloutBuffer>,
        gamma: f32,
        gae_lambda: f32,
        record: bool,
    ) -> Result<RolloutSummary> {
        let num_envs = self.num_envs();
        let (num_steps, buffer_envs, _) = buffers.leader.shape();
        anyhow::ensure!(
            buffer_envs == num_envs,
            "buffer holds {buffer_envs} envs, pool has {num_envs}"
        );

        let mut summary = RolloutSummary {
            frames: record.then(|| Vec::with_capacity(num_steps)),
            ..Default::default()
        };
        for buffer in [&mut buffers.leader, &mut buffers.follower] {
            buffer.reset();
        }

        for step in 0..num_steps {
            if let Some(frames) = summary.frames.as_mut() {
                frames.push(self.pool.snapshots());
            }

            let obs = self.observation_tensor();
            let mut agent_steps = PerAgent::new(
                self.act(AgentRole::Leader, &learners.leader, &obs)?,
                self.act(AgentRole::Follower, &learners.follower, &obs)?,
            );

            let actions = (0..num_envs)
                .map(|i| {
                    Ok(PerAgent::new(
                        Action::from_index(agent_steps.leader.actions[i])?,
                        Action::from_index(agent_steps.follower.actions[i])?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            let result = self.pool.step_structured(&actions)?;

            for role in AgentRole::ALL {
                let agent = &mut agent_steps[role];
                for (env_id, obs) in self.observations.iter().enumerate() {
                    buffers[role].add(step, env_id, Transition {
                        observation: obs.planes.clone(),
                        goal_info: obs.goal_info[role],
                        goal_target: obs.goal.index() as i64,
                        recurrent_state: agent
                            .state_rows
                            .as_mut()
                            .map(|rows| std::mem::take(&mut rows[env_id])),
                        action: agent.actions[env_id],
                        log_prob: agent.log_probs[env_id],
                        value: agent.values[env_id],
                        reward: result.rewards[env_id][role],
                        episode_start: self.episode_starts[env_id],
                    });
                }
            }

            if let Some(step_frames) = summary.frames.as_mut().and_then(|f| f.last_mut()) {
                for (frame, &reward) in step_frames.iter_mut().zip(&result.rewards) {
                    frame.reward = reward;
                }
            }

            self.observations = result.observations;
            self.episode_starts = result.dones;
            summary.finished_episodes.extend(result.finished_episodes);
            summary.steps += num_envs;
        }
        self.global_step += summary.steps;

        let obs = self.observation_tensor();
        for role in AgentRole::ALL {
            let policy = learners[role].policy();
            let state = self.masked_state(role);
            let values = policy.value(&obs, &self.goal_tensor(role), state.as_ref());
            let last_values = to_vec::<f32>(&values)?;
            buffers[role].compute_advantages(&last_values, &self.episode_starts, gamma, gae_lambda);
        }

        tracing::trace!(
            steps = summary.steps,
            episodes = summary.finished_episodes.len(),
            "Collected rollout"
        );
        Ok(summary)
    }

    /// Observation planes of every env, `[num_envs, obs_dim]`
    fn observation_tensor(&self) -> Tensor {
        let flat: Vec<f32> =
            self.observations.iter().flat_map(|o| o.planes.iter().copied()).collect();
        Tensor::from_slice(&flat).view([self.observations.len() as i64, self.obs_dim as i64])
    }

    /// Goal info of one agent for every env, `[num_envs, NUM_COLORS]`
    fn goal_tensor(&self, role: AgentRole) -> Tensor {
        let flat: Vec<f32> = self.observations.iter().flat_map(|o| o.goal_info[role]).collect();
        Tensor::from_slice(&flat).view([self.observations.len() as i64, NUM_COLORS as i64])
    }

    /// Recurrent state with rows of freshly reset envs zeroed
    fn masked_state(&self, role: AgentRole) -> Option<RecurrentState> {
        self.states[role].as_ref().map(|state| {
            let starts: Vec<f32> =
                self.episode_starts.iter().map(|&s| if s { 1.0 } else { 0.0 }).collect();
            state.reset_where(&Tensor::from_slice(&starts).to_device(state.h.device()))
        })
    }

    fn act(&mut self, role: AgentRole, learner: &AgentLearner, obs: &Tensor) -> Result<AgentStep> {
        let state = self.masked_state(role);
        let out = learner.policy().act(obs, &self.goal_tensor(role), state.as_ref());
        let state_rows = state.as_ref().map(RecurrentState::to_rows).transpose()?;
        self.states[role] = out.next_state;

        Ok(AgentStep {
            actions: to_vec(&out.actions)?,
            log_probs: to_vec(&out.log_probs)?,
            values: to_vec(&out.values)?,
            state_rows,
        })
    }
}
