//! Trajectory recording
//!
//! Each recorded rollout is written as one JSON file per environment at
//! `<trajectories_dir>/<run>/trajectory_iteration=<i>_env=<e>.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::env::color_grid::GridSnapshot;

/// Frames of one environment over one rollout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Run that produced the trajectory
    pub run_name: String,
    /// Training iteration of the rollout
    pub iteration: usize,
    /// Environment index within the pool
    pub env_id: usize,
    /// Frames in step order
    pub frames: Vec<GridSnapshot>,
}

impl Trajectory {
    /// File name for an iteration and environment
    pub fn file_name(iteration: usize, env_id: usize) -> String {
        format!("trajectory_iteration={iteration}_env={env_id}.json")
    }

    /// Save to a JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read trajectory {}", path.display()))?;
        let trajectory = serde_json::from_str(&json)?;
        Ok(trajectory)
    }

    /// Text rendering of every frame, header line first
    pub fn render_frames(&self) -> Vec<String> {
        self.frames.iter().map(|frame| format!("{}\n{}", frame.header(), frame.render())).collect()
    }

    /// Total reward per agent over the recorded frames
    pub fn total_reward(&self) -> (f32, f32) {
        self.frames
            .iter()
            .fold((0.0, 0.0), |(l, f), frame| (l + frame.reward.leader, f + frame.reward.follower))
    }
}

/// Writes trajectories of one run
#[derive(Debug, Clone)]
pub struct TrajectoryWriter {
    dir: PathBuf,
    run_name: String,
}

impl TrajectoryWriter {
    /// Writer for `<trajectories_dir>/<run_name>`; the directory is created
    /// on first write
    pub fn new<P: AsRef<Path>>(trajectories_dir: P, run_name: &str) -> Self {
        Self { dir: trajectories_dir.as_ref().join(run_name), run_name: run_name.to_string() }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one file per environment
    ///
    /// # Arguments
    /// * `iteration` - Training iteration of the rollout
    /// * `frames` - Step-major frames, `frames[step][env_id]`
    pub fn write_rollout(
        &self,
        iteration: usize,
        frames: Vec<Vec<GridSnapshot>>,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let num_envs = frames.first().map_or(0, Vec::len);
        let mut per_env: Vec<Vec<GridSnapshot>> = vec![Vec::with_capacity(frames.len()); num_envs];
        for step in frames {
            for (env_id, frame) in step.into_iter().enumerate() {
                per_env[env_id].push(frame);
            }
        }

        let mut paths = Vec::with_capacity(num_envs);
        for (env_id, frames) in per_env.into_iter().enumerate() {
            let trajectory =
                Trajectory { run_name: self.run_name.clone(), iteration, env_id, frames };
            let path = self.dir.join(Trajectory::file_name(iteration, env_id));
            trajectory.save_json(&path)?;
            paths.push(path);
        }
        tracing::debug!(
            iteration,
            files = paths.len(),
            "Wrote trajectories to {}",
            self.dir.display()
        );
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::env::{
        Environment, PerAgent,
        color_grid::{ColorGrid, ColorGridConfig},
    };

    fn frames(steps: usize, envs: usize) -> Vec<Vec<GridSnapshot>> {
        let mut grids: Vec<ColorGrid> = (0..envs)
            .map(|i| {
                let config =
                    ColorGridConfig::new().grid_size(6, 5).block_density(0.2).seed(i as u64);
                let mut env = ColorGrid::new(config).unwrap();
                env.reset().unwrap();
                env
            })
            .collect();
        (0..steps)
            .map(|_| {
                grids
                    .iter_mut()
                    .map(|env| {
                        let snapshot = env.snapshot();
                        let result = env.step_indices(PerAgent::new(3, 2)).unwrap();
                        snapshot.with_reward(result.reward)
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_file_name() {
        assert_eq!(Trajectory::file_name(100, 3), "trajectory_iteration=100_env=3.json");
    }

    #[test]
    fn test_write_rollout_splits_by_env() {
        let tmp = TempDir::new().unwrap();
        let writer = TrajectoryWriter::new(tmp.path(), "demo");
        let paths = writer.write_rollout(7, frames(4, 2)).unwrap();

        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1], tmp.path().join("demo").join("trajectory_iteration=7_env=1.json"));

        let loaded = Trajectory::load(&paths[1]).unwrap();
        assert_eq!(loaded.run_name, "demo");
        assert_eq!(loaded.iteration, 7);
        assert_eq!(loaded.env_id, 1);
        assert_eq!(loaded.frames.len(), 4);
        assert_eq!(loaded.frames[0].timestep, 0);
        assert_eq!(loaded.frames[3].timestep, 3);
    }

    #[test]
    fn test_render_frames() {
        let trajectory = Trajectory {
            run_name: "r".into(),
            iteration: 0,
            env_id: 0,
            frames: frames(2, 1).into_iter().flatten().collect(),
        };
        let rendered = trajectory.render_frames();
        assert_eq!(rendered.len(), 2);
        assert!(rendered[0].starts_with("t=0 goal="));
        // header plus 5 grid rows
        assert_eq!(rendered[0].lines().count(), 6);
        assert!(rendered[0].contains('L'));
        assert!(rendered[0].contains('F'));
    }

    #[test]
    fn test_total_reward_sums_frames() {
        let mut frames: Vec<GridSnapshot> = frames(3, 1).into_iter().flatten().collect();
        for (frame, reward) in frames.iter_mut().zip([1.0, -1.0, 1.0]) {
            frame.reward = PerAgent::new(reward, reward - 0.1);
        }
        let trajectory = Trajectory { run_name: "r".into(), iteration: 0, env_id: 0, frames };
        let (leader, follower) = trajectory.total_reward();
        assert!((leader - 1.0).abs() < 1e-6);
        assert!((follower - 0.7).abs() < 1e-6);
        assert!(trajectory.render_frames()[1].contains("reward(leader=-1.00, follower=-1.10)"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Trajectory::load("/nonexistent/trajectory_iteration=0_env=0.json").is_err());
    }
}
