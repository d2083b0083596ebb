//! Leader/follower training loop

use std::{path::PathBuf, time::Instant};

use anyhow::Result;

use super::{collector::RolloutCollector, config::TrainConfig, learner::AgentLearner};
use crate::{
    buffer::RolloutBuffer,
    checkpoint::RunDirectory,
    env::{
        AgentRole, PerAgent,
        color_grid::{ColorGrid, NUM_PLANES},
        pool::EnvPool,
    },
    metrics::{AgentMetrics, IterationMetrics, MetricsLogger},
    policy::{ActorCritic, ActorCriticConfig},
    trajectory::TrajectoryWriter,
};

/// Whether an every-`interval` action runs at `iteration` (0 disables)
fn is_due(iteration: usize, interval: usize) -> bool {
    interval > 0 && iteration % interval == 0
}

/// Result of a finished training run
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// Run directory holding config, metrics and checkpoints
    pub run_dir: PathBuf,
    /// Iterations completed
    pub iterations: usize,
    /// Environment steps taken, summed over envs
    pub global_step: usize,
    /// Final checkpoint of each agent
    pub final_checkpoints: PerAgent<PathBuf>,
    /// Metrics of the last iteration
    pub last_metrics: Option<IterationMetrics>,
}

/// Trains a leader and a follower with independent PPO learners
#[derive(Debug)]
pub struct MultiAgentTrainer {
    config: TrainConfig,
    learners: PerAgent<AgentLearner>,
    collector: RolloutCollector,
    buffers: PerAgent<RolloutBuffer>,
    run_dir: RunDirectory,
    trajectories: TrajectoryWriter,
    metrics: MetricsLogger,
}

impl MultiAgentTrainer {
    /// Validate the configuration and set up the run
    ///
    /// Seeds libtorch and the environments, creates the run directory,
    /// writes `config.json`, builds both learners and warm-starts the leader
    /// when a checkpoint path is configured.
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        tch::manual_seed(config.seed as i64);

        let run_dir = RunDirectory::create(&config.results_dir, config.run_name.as_deref())?;
        run_dir.write_config(&config)?;

        let env_config = config.env.clone();
        let mut pool = EnvPool::new(|| ColorGrid::new(env_config.clone()), config.num_envs)?;
        pool.seed(config.seed);

        let policy_config =
            ActorCriticConfig::new(config.env.width, config.env.height, config.use_lstm);
        let ppo_config = config.ppo_config();

        let mut leader = AgentLearner::new(
            AgentRole::Leader,
            ActorCritic::new(policy_config)?,
            ppo_config.clone(),
            config.frozen_leader,
            config.seed,
        )?;
        if let Some(path) = &config.warmstart_leader_path {
            leader.warm_start(path)?;
        }
        let follower = AgentLearner::new(
            AgentRole::Follower,
            ActorCritic::new(policy_config)?,
            ppo_config,
            false,
            config.seed.wrapping_add(1),
        )?;
        let learners = PerAgent::new(leader, follower);

        let obs_dim = NUM_PLANES * config.env.width * config.env.height;
        let buffers = learners.as_ref().map(|_, learner| {
            RolloutBuffer::new(
                config.num_steps_per_rollout,
                config.num_envs,
                obs_dim,
                learner.policy().hidden_dim(),
            )
        });
        let collector = RolloutCollector::new(pool, &learners)?;

        let metrics = if config.log_metrics {
            MetricsLogger::with_file(run_dir.metrics_path(), config.debug_print)?
        } else {
            MetricsLogger::tracing_only(config.debug_print)
        };
        let trajectories = TrajectoryWriter::new(&config.trajectories_dir, run_dir.run_name());

        Ok(Self { config, learners, collector, buffers, run_dir, trajectories, metrics })
    }

    /// Training configuration
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Run directory
    pub fn run_dir(&self) -> &RunDirectory {
        &self.run_dir
    }

    /// Both learners
    pub fn learners(&self) -> &PerAgent<AgentLearner> {
        &self.learners
    }

    /// Run every iteration and save final checkpoints
    ///
    /// Iterations count from 0, so periodic trajectories and checkpoints
    /// include the first rollout. The final checkpoints are named after the
    /// last iteration.
    pub fn run(&mut self) -> Result<TrainingSummary> {
        let num_iterations = self.config.num_iterations();
        let gamma = self.config.gamma as f32;
        let gae_lambda = self.config.gae_lambda as f32;
        let start = Instant::now();

        tracing::info!(
            "Training {} for {} iterations ({} envs x {} steps, minibatch {})",
            self.run_dir.run_name(),
            num_iterations,
            self.config.num_envs,
            self.config.num_steps_per_rollout,
            self.config.minibatch_size()
        );

        let mut last_metrics = None;
        for iteration in 0..num_iterations {
            let record = is_due(iteration, self.config.save_data_iters);
            let rollout = self.collector.collect(
                &self.learners,
                &mut self.buffers,
                gamma,
                gae_lambda,
                record,
            )?;
            let episode_returns = rollout.mean_episode_return();

            let mut agents = PerAgent::<AgentMetrics>::default();
            for role in AgentRole::ALL {
                let rollout_metrics = AgentMetrics::rollout_only(
                    self.buffers[role].mean_episode_reward(),
                    episode_returns.map(|returns| returns[role]),
                );
                agents[role] = match self.learners[role].update(&self.buffers[role])? {
                    Some(stats) => rollout_metrics.with_training(&stats),
                    None => rollout_metrics,
                };
            }

            let global_step = self.collector.global_step();
            let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);
            let metrics = IterationMetrics {
                iteration,
                global_step,
                steps_per_second: global_step as f64 / elapsed,
                episodes_finished: rollout.finished_episodes.len(),
                agents,
            };
            self.metrics.log(&metrics)?;

            if let Some(frames) = rollout.frames {
                self.trajectories.write_rollout(iteration, frames)?;
            }
            if is_due(iteration, self.config.checkpoint_iters) {
                self.save_checkpoints(iteration)?;
            }
            last_metrics = Some(metrics);
        }

        let final_checkpoints = self.save_checkpoints(num_iterations.saturating_sub(1))?;
        tracing::info!(
            "Finished {} iterations ({} steps) in {:.1}s",
            num_iterations,
            self.collector.global_step(),
            start.elapsed().as_secs_f64()
        );

        Ok(TrainingSummary {
            run_dir: self.run_dir.path().to_path_buf(),
            iterations: num_iterations,
            global_step: self.collector.global_step(),
            final_checkpoints,
            last_metrics,
        })
    }

    /// Save both agents at `iteration`
    pub fn save_checkpoints(&self, iteration: usize) -> Result<PerAgent<PathBuf>> {
        let save = |role: AgentRole| -> Result<PathBuf> {
            let path = self.run_dir.checkpoint_path(role, iteration);
            self.learners[role].save(&path)?;
            Ok(path)
        };
        let paths = PerAgent::new(save(AgentRole::Leader)?, save(AgentRole::Follower)?);
        tracing::debug!(iteration, "Saved checkpoints to {}", self.run_dir.path().display());
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_due_includes_first_iteration() {
        assert!(is_due(0, 1000));
        assert!(!is_due(1, 1000));
        assert!(is_due(2000, 1000));
        assert!(is_due(3, 1));
        assert!(!is_due(0, 0));
    }
}
