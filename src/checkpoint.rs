//! Run directory layout and checkpoint naming
//!
//! ```text
//! results/<run_name>/
//!     config.json
//!     metrics.jsonl
//!     leader_iteration=<n>.safetensors
//!     follower_iteration=<n>.safetensors
//! ```

use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};

use crate::env::AgentRole;

/// File name of the persisted training configuration
pub const CONFIG_FILE: &str = "config.json";

/// File name of the per-iteration metrics log
pub const METRICS_FILE: &str = "metrics.jsonl";

const CHECKPOINT_EXTENSION: &str = "safetensors";

/// Run name used when none is given: `run_<unix seconds>`
pub fn default_run_name() -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    format!("run_{secs}")
}

/// Checkpoint file name for a role and iteration
pub fn checkpoint_file_name(role: AgentRole, iteration: usize) -> String {
    format!("{}_iteration={}.{}", role.name(), iteration, CHECKPOINT_EXTENSION)
}

/// Parse `<role>_iteration=<n>.safetensors` back into its parts
pub fn parse_checkpoint_iteration(path: &Path) -> Option<(AgentRole, usize)> {
    if path.extension()? != CHECKPOINT_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (role, iteration) = stem.split_once("_iteration=")?;
    Some((AgentRole::from_name(role)?, iteration.parse().ok()?))
}

/// One training run's output directory
#[derive(Debug, Clone)]
pub struct RunDirectory {
    root: PathBuf,
    run_name: String,
}

impl RunDirectory {
    /// Create `<results_dir>/<run_name>` (or a timestamped name)
    pub fn create<P: AsRef<Path>>(results_dir: P, run_name: Option<&str>) -> Result<Self> {
        let run_name = run_name.map_or_else(default_run_name, str::to_string);
        let root = results_dir.as_ref().join(&run_name);
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create run directory {}", root.display()))?;
        tracing::info!("Run directory: {}", root.display());
        Ok(Self { root, run_name })
    }

    /// Open an existing run directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        anyhow::ensure!(root.is_dir(), "run directory {} does not exist", root.display());
        let run_name = root
            .file_name()
            .and_then(|name| name.to_str())
            .context("run directory has no name")?
            .to_string();
        Ok(Self { root, run_name })
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Run name (last path component)
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Path of a role's checkpoint at `iteration`
    pub fn checkpoint_path(&self, role: AgentRole, iteration: usize) -> PathBuf {
        self.root.join(checkpoint_file_name(role, iteration))
    }

    /// Path of `config.json`
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Path of `metrics.jsonl`
    pub fn metrics_path(&self) -> PathBuf {
        self.root.join(METRICS_FILE)
    }

    /// All checkpoints of `role`, sorted by iteration
    pub fn list_checkpoints(&self, role: AgentRole) -> Result<Vec<(usize, PathBuf)>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("failed to read {}", self.root.display()))?;

        let mut checkpoints = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if let Some((found, iteration)) = parse_checkpoint_iteration(&path)
                && found == role
            {
                checkpoints.push((iteration, path));
            }
        }
        checkpoints.sort_by_key(|(iteration, _)| *iteration);
        Ok(checkpoints)
    }

    /// Checkpoint of `role` with the highest iteration
    pub fn latest_checkpoint(&self, role: AgentRole) -> Result<Option<PathBuf>> {
        Ok(self.list_checkpoints(role)?.pop().map(|(_, path)| path))
    }

    /// Persist a configuration as pretty JSON
    pub fn write_config<T: Serialize>(&self, config: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        let path = self.config_path();
        std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Read back the persisted configuration
    pub fn read_config<T: DeserializeOwned>(&self) -> Result<T> {
        let path = self.config_path();
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_checkpoint_naming() {
        assert_eq!(
            checkpoint_file_name(AgentRole::Leader, 1000),
            "leader_iteration=1000.safetensors"
        );
        assert_eq!(
            parse_checkpoint_iteration(Path::new("results/x/follower_iteration=25.safetensors")),
            Some((AgentRole::Follower, 25))
        );
        assert_eq!(parse_checkpoint_iteration(Path::new("leader_iteration=abc.safetensors")), None);
        assert_eq!(parse_checkpoint_iteration(Path::new("leader_iteration=3.pt")), None);
        assert_eq!(parse_checkpoint_iteration(Path::new("critic_iteration=3.safetensors")), None);
    }

    #[test]
    fn test_default_run_name() {
        let name = default_run_name();
        assert!(name.starts_with("run_"));
        assert!(name["run_".len()..].parse::<u64>().is_ok());
    }

    #[test]
    fn test_create_and_list_checkpoints() {
        let tmp = TempDir::new().unwrap();
        let run = RunDirectory::create(tmp.path(), Some("demo")).unwrap();
        assert_eq!(run.run_name(), "demo");
        assert!(run.path().is_dir());

        for iteration in [10, 2, 100] {
            std::fs::write(run.checkpoint_path(AgentRole::Leader, iteration), b"").unwrap();
        }
        std::fs::write(run.checkpoint_path(AgentRole::Follower, 5), b"").unwrap();
        std::fs::write(run.path().join("notes.txt"), b"").unwrap();

        let leader: Vec<usize> =
            run.list_checkpoints(AgentRole::Leader).unwrap().into_iter().map(|(i, _)| i).collect();
        assert_eq!(leader, vec![2, 10, 100]);
        assert_eq!(
            run.latest_checkpoint(AgentRole::Leader).unwrap(),
            Some(run.checkpoint_path(AgentRole::Leader, 100))
        );
        assert_eq!(
            run.latest_checkpoint(AgentRole::Follower).unwrap(),
            Some(run.checkpoint_path(AgentRole::Follower, 5))
        );
    }

    #[test]
    fn test_latest_checkpoint_of_empty_run() {
        let tmp = TempDir::new().unwrap();
        let run = RunDirectory::create(tmp.path(), None).unwrap();
        assert_eq!(run.latest_checkpoint(AgentRole::Follower).unwrap(), None);
    }

    #[test]
    fn test_config_round_trip_and_open() {
        let tmp = TempDir::new().unwrap();
        let run = RunDirectory::create(tmp.path(), Some("cfg")).unwrap();
        let config: BTreeMap<String, f64> = [("gamma".to_string(), 0.99)].into_iter().collect();
        run.write_config(&config).unwrap();

        let reopened = RunDirectory::open(run.path()).unwrap();
        assert_eq!(reopened.run_name(), "cfg");
        let restored: BTreeMap<String, f64> = reopened.read_config().unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_open_missing_directory_fails() {
        assert!(RunDirectory::open("/nonexistent/run_0").is_err());
    }
}
