//! Per-iteration training metrics
//!
//! Every iteration is reported through `tracing` and, when enabled, written
//! as one JSON object per line to `metrics.jsonl` in the run directory.

use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    env::{AgentRole, PerAgent},
    train::TrainingStats,
};

/// Metrics of one agent for one iteration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Mean over envs of the reward collected during the rollout
    pub rollout_reward: f32,
    /// Mean return of episodes that finished during the rollout
    pub mean_episode_return: Option<f32>,
    /// Whether the agent was updated this iteration
    pub updated: bool,
    /// Weighted total loss
    pub loss: Option<f64>,
    /// Clipped surrogate policy loss
    pub policy_loss: Option<f64>,
    /// Value function loss
    pub value_loss: Option<f64>,
    /// Goal-prediction loss
    pub goal_loss: Option<f64>,
    /// Mean policy entropy
    pub entropy: Option<f64>,
    /// Approximate KL divergence
    pub approx_kl: Option<f64>,
    /// Fraction of clipped ratios
    pub clip_fraction: Option<f64>,
    /// Explained variance (absent when returns were constant)
    pub explained_variance: Option<f64>,
}

impl AgentMetrics {
    /// Metrics of an agent that was not updated
    pub fn rollout_only(rollout_reward: f32, mean_episode_return: Option<f32>) -> Self {
        Self { rollout_reward, mean_episode_return, ..Default::default() }
    }

    /// Attach the statistics of a PPO update
    pub fn with_training(mut self, stats: &TrainingStats) -> Self {
        self.updated = true;
        self.loss = Some(stats.total_loss);
        self.policy_loss = Some(stats.policy_loss);
        self.value_loss = Some(stats.value_loss);
        self.goal_loss = Some(stats.goal_loss);
        self.entropy = Some(stats.entropy);
        self.approx_kl = Some(stats.approx_kl);
        self.clip_fraction = Some(stats.clip_fraction);
        self.explained_variance = stats.explained_var.is_finite().then_some(stats.explained_var);
        self
    }
}

/// Metrics of one training iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationMetrics {
    /// Iteration number (0-based)
    pub iteration: usize,
    /// Environment steps taken so far, summed over envs
    pub global_step: usize,
    /// Environment steps per second since training started
    pub steps_per_second: f64,
    /// Episodes that finished during the rollout
    pub episodes_finished: usize,
    /// Per-agent metrics
    pub agents: PerAgent<AgentMetrics>,
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

impl IterationMetrics {
    /// One-line summary for a role
    pub fn summary(&self, role: AgentRole) -> String {
        let agent = &self.agents[role];
        format!(
            "{role} | reward {:.3} | loss {} | pg {} | v {} | goal {} | ent {} | kl {} | clip {} \
             | ev {}",
            agent.rollout_reward,
            fmt_opt(agent.loss),
            fmt_opt(agent.policy_loss),
            fmt_opt(agent.value_loss),
            fmt_opt(agent.goal_loss),
            fmt_opt(agent.entropy),
            fmt_opt(agent.approx_kl),
            fmt_opt(agent.clip_fraction),
            fmt_opt(agent.explained_variance),
        )
    }
}

/// Reports iteration metrics to tracing and an optional JSONL file
#[derive(Debug)]
pub struct MetricsLogger {
    sink: Option<BufWriter<File>>,
    verbose: bool,
}

impl MetricsLogger {
    /// Logger that only reports through tracing
    ///
    /// `verbose` reports per-iteration lines at info instead of debug.
    pub fn tracing_only(verbose: bool) -> Self {
        Self { sink: None, verbose }
    }

    /// Logger that also writes to `path`
    ///
    /// An existing file is truncated, so a run restarted under the same name
    /// starts a fresh record next to its rewritten `config.json`.
    pub fn with_file<P: AsRef<Path>>(path: P, verbose: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to open metrics file {}", path.display()))?;
        Ok(Self { sink: Some(BufWriter::new(file)), verbose })
    }

    /// Whether a JSONL sink is attached
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Report one iteration
    pub fn log(&mut self, metrics: &IterationMetrics) -> Result<()> {
        let header = format!(
            "Iteration {} | step {} | {:.0} SPS | episodes {}",
            metrics.iteration,
            metrics.global_step,
            metrics.steps_per_second,
            metrics.episodes_finished
        );
        if self.verbose {
            tracing::info!("{header}");
            for role in AgentRole::ALL {
                tracing::info!("  {}", metrics.summary(role));
            }
        } else {
            tracing::debug!("{header}");
            for role in AgentRole::ALL {
                tracing::debug!("  {}", metrics.summary(role));
            }
        }

        if let Some(sink) = self.sink.as_mut() {
            serde_json::to_writer(&mut *sink, metrics)?;
            sink.write_all(b"\n")?;
            sink.flush()?;
        }
        Ok(())
    }
}

/// Read every record of a metrics file
pub fn read_metrics<P: AsRef<Path>>(path: P) -> Result<Vec<IterationMetrics>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("failed to open metrics file {}", path.display()))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn metrics(iteration: usize) -> IterationMetrics {
        let stats = TrainingStats {
            total_loss: 0.5,
            policy_loss: -0.1,
            value_loss: 1.2,
            entropy: 1.38,
            explained_var: f64::NAN,
            num_updates: 4,
            ..Default::default()
        };
        IterationMetrics {
            iteration,
            global_step: iteration * 64,
            steps_per_second: 1000.0,
            episodes_finished: 1,
            agents: PerAgent::new(
                AgentMetrics::rollout_only(2.0, Some(3.0)),
                AgentMetrics::rollout_only(2.0, Some(3.0)).with_training(&stats),
            ),
        }
    }

    #[test]
    fn test_with_training_maps_nan_to_none() {
        let m = metrics(1);
        assert!(!m.agents.leader.updated);
        assert_eq!(m.agents.leader.loss, None);
        assert!(m.agents.follower.updated);
        assert_eq!(m.agents.follower.loss, Some(0.5));
        assert_eq!(m.agents.follower.explained_variance, None);
    }

    #[test]
    fn test_jsonl_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics.jsonl");

        let mut logger = MetricsLogger::with_file(&path, false).unwrap();
        assert!(logger.has_sink());
        logger.log(&metrics(1)).unwrap();
        logger.log(&metrics(2)).unwrap();
        drop(logger);

        let records = read_metrics(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], metrics(2));
    }

    #[test]
    fn test_reopening_starts_fresh_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics.jsonl");

        let mut first = MetricsLogger::with_file(&path, false).unwrap();
        first.log(&metrics(0)).unwrap();
        first.log(&metrics(1)).unwrap();
        drop(first);

        let mut second = MetricsLogger::with_file(&path, false).unwrap();
        second.log(&metrics(0)).unwrap();
        drop(second);

        assert_eq!(read_metrics(&path).unwrap(), vec![metrics(0)]);
    }

    #[test]
    fn test_tracing_only_logger() {
        let mut logger = MetricsLogger::tracing_only(true);
        assert!(!logger.has_sink());
        assert!(logger.log(&metrics(1)).is_ok());
    }

    #[test]
    fn test_summary_line() {
        let m = metrics(1);
        let line = m.summary(AgentRole::Follower);
        assert!(line.starts_with("follower | reward 2.000"));
        assert!(line.contains("ev -"));
        assert!(m.summary(AgentRole::Leader).contains("loss -"));
    }
}
