//! Train a leader and a follower on ColorGrid with PPO
//!
//! # Usage
//!
//! ```bash
//! run_ppo --run_name demo --total_timesteps 500000 --num_envs 16 \
//!     --num_steps_per_rollout 128 --save_data_iters 1000 --checkpoint_iters 1000 \
//!     --ppo_update_epochs 4 --seed 0 --block_density 0.10 --goalinfo_loss_coef 0 \
//!     --asymmetric --log_to_wandb False --use_lstm --positive_reward 2 --negative_reward 1
//!
//! # Warm-start a frozen leader from an earlier run
//! run_ppo --run_name follower_only --frozen_leader True \
//!     --warmstart_leader_path results/demo/leader_iteration=244.safetensors
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser};
use colorgrid_rl::{
    env::color_grid::{ColorGridConfig, FollowerProximityPenalty},
    multi_agent::{MultiAgentTrainer, TrainConfig},
};
use tracing_subscriber::EnvFilter;

/// Parse `True/False/true/false/1/0`
fn parse_bool(value: &str) -> Result<bool, String> {
    match value {
        "True" | "true" | "1" => Ok(true),
        "False" | "false" | "0" => Ok(false),
        other => Err(format!("expected True/False/true/false/1/0, got '{other}'")),
    }
}

#[derive(Debug, Parser)]
#[command(name = "run_ppo", about = "Leader/follower PPO on ColorGrid", rename_all = "snake_case")]
struct Args {
    /// Run name (defaults to run_<unix seconds>)
    #[arg(long)]
    run_name: Option<String>,

    /// Environment steps to train for, summed over envs
    #[arg(long, default_value_t = 500_000)]
    total_timesteps: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-4)]
    learning_rate: f64,

    /// Number of parallel environments
    #[arg(long, default_value_t = 4)]
    num_envs: usize,

    /// Steps per environment per rollout
    #[arg(long, default_value_t = 128)]
    num_steps_per_rollout: usize,

    /// Minibatches per PPO epoch
    #[arg(long, default_value_t = 4)]
    num_minibatches: usize,

    /// PPO epochs per rollout
    #[arg(long, default_value_t = 4)]
    ppo_update_epochs: usize,

    /// Discount factor
    #[arg(long, default_value_t = 0.99)]
    gamma: f64,

    /// GAE lambda
    #[arg(long, default_value_t = 0.95)]
    gae_lambda: f64,

    /// PPO clip range
    #[arg(long, default_value_t = 0.2)]
    clip_param: f64,

    /// Entropy bonus coefficient
    #[arg(long, default_value_t = 0.01)]
    entropy_coef: f64,

    /// Value loss coefficient
    #[arg(long, default_value_t = 0.5)]
    value_func_coef: f64,

    /// Gradient norm clip
    #[arg(long, default_value_t = 0.5)]
    max_grad_norm: f64,

    /// Stop an update early once approx KL exceeds this
    #[arg(long)]
    target_kl: Option<f64>,

    /// Normalize advantages per minibatch
    #[arg(long, action = ArgAction::Set, value_parser = parse_bool, default_value = "true")]
    norm_advantage: bool,

    /// Clip the value loss
    #[arg(long, action = ArgAction::Set, value_parser = parse_bool, default_value = "true")]
    clip_vloss: bool,

    /// Goal-prediction loss coefficient
    #[arg(long, default_value_t = 0.0)]
    goalinfo_loss_coef: f64,

    /// Keep the leader's weights fixed
    #[arg(long, action = ArgAction::Set, value_parser = parse_bool, default_value = "false")]
    frozen_leader: bool,

    /// Checkpoint to initialise the leader from
    #[arg(long)]
    warmstart_leader_path: Option<PathBuf>,

    /// Use the LSTM policy
    #[arg(long)]
    use_lstm: bool,

    /// Only the leader observes the goal colour
    #[arg(long)]
    asymmetric: bool,

    /// Record trajectories every N iterations (0 disables)
    #[arg(long, default_value_t = 100)]
    save_data_iters: usize,

    /// Save checkpoints every N iterations (0 disables)
    #[arg(long, default_value_t = 0)]
    checkpoint_iters: usize,

    /// Write per-iteration metrics to metrics.jsonl
    #[arg(
        long,
        alias = "log_metrics",
        action = ArgAction::Set,
        value_parser = parse_bool,
        default_value = "true"
    )]
    log_to_wandb: bool,

    /// Report per-iteration metrics at info level
    #[arg(long, action = ArgAction::Set, value_parser = parse_bool, default_value = "false")]
    debug_print: bool,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Fraction of cells holding a block
    #[arg(long, default_value_t = 0.10)]
    block_density: f32,

    /// Reward for a goal-colour block
    #[arg(long, default_value_t = 1.0)]
    positive_reward: f32,

    /// Penalty for any other colour
    #[arg(long, default_value_t = 1.0)]
    negative_reward: f32,

    /// Grid width
    #[arg(long, default_value_t = 32)]
    grid_width: usize,

    /// Grid height
    #[arg(long, default_value_t = 32)]
    grid_height: usize,

    /// Episode length
    #[arg(long, default_value_t = 1000)]
    max_steps: usize,

    /// Penalise the follower for staying close to the leader early on
    #[arg(long)]
    proximity_penalty: Option<f32>,

    /// Directory holding run directories
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Directory holding recorded trajectories
    #[arg(long, default_value = "trajectories")]
    trajectories_dir: PathBuf,
}

impl Args {
    fn into_config(self) -> TrainConfig {
        let mut env = ColorGridConfig::new()
            .grid_size(self.grid_width, self.grid_height)
            .block_density(self.block_density)
            .rewards(self.positive_reward, self.negative_reward)
            .max_steps(self.max_steps)
            .asymmetric(self.asymmetric);
        if let Some(penalty) = self.proximity_penalty {
            env = env.proximity_penalty(FollowerProximityPenalty::with_penalty(penalty));
        }

        TrainConfig {
            run_name: self.run_name,
            total_timesteps: self.total_timesteps,
            learning_rate: self.learning_rate,
            num_envs: self.num_envs,
            num_steps_per_rollout: self.num_steps_per_rollout,
            num_minibatches: self.num_minibatches,
            ppo_update_epochs: self.ppo_update_epochs,
            gamma: self.gamma,
            gae_lambda: self.gae_lambda,
            clip_param: self.clip_param,
            entropy_coef: self.entropy_coef,
            value_func_coef: self.value_func_coef,
            max_grad_norm: self.max_grad_norm,
            target_kl: self.target_kl,
            norm_advantage: self.norm_advantage,
            clip_vloss: self.clip_vloss,
            goalinfo_loss_coef: self.goalinfo_loss_coef,
            frozen_leader: self.frozen_leader,
            warmstart_leader_path: self.warmstart_leader_path,
            use_lstm: self.use_lstm,
            save_data_iters: self.save_data_iters,
            checkpoint_iters: self.checkpoint_iters,
            log_metrics: self.log_to_wandb,
            debug_print: self.debug_print,
            seed: self.seed,
            results_dir: self.results_dir,
            trajectories_dir: self.trajectories_dir,
            env,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();
    tracing::info!(
        "ColorGrid {}x{} | density {:.2} | asymmetric {} | lstm {} | frozen leader {}",
        config.env.width,
        config.env.height,
        config.env.block_density,
        config.env.asymmetric,
        config.use_lstm,
        config.frozen_leader
    );

    let mut trainer = MultiAgentTrainer::new(config)?;
    let summary = trainer.run()?;

    tracing::info!("Run directory: {}", summary.run_dir.display());
    for (role, path) in summary.final_checkpoints.iter() {
        tracing::info!("Final {} checkpoint: {}", role, path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        for value in ["True", "true", "1"] {
            assert_eq!(parse_bool(value), Ok(true));
        }
        for value in ["False", "false", "0"] {
            assert_eq!(parse_bool(value), Ok(false));
        }
        assert!(parse_bool("yes").is_err());
    }

    #[test]
    fn test_readme_invocation() {
        let args = Args::try_parse_from([
            "run_ppo",
            "--run_name",
            "exp",
            "--total_timesteps",
            "1000000",
            "--frozen_leader",
            "True",
            "--warmstart_leader_path",
            "results/base/leader_iteration=100.safetensors",
            "--num_envs",
            "16",
            "--num_steps_per_rollout",
            "128",
            "--save_data_iters",
            "1000",
            "--checkpoint_iters",
            "1000",
            "--ppo_update_epochs",
            "4",
            "--seed",
            "0",
            "--block_density",
            "0.10",
            "--goalinfo_loss_coef",
            "0",
            "--asymmetric",
            "--log_to_wandb",
            "False",
            "--use_lstm",
            "--positive_reward",
            "2",
            "--negative_reward",
            "1",
        ])
        .unwrap();

        let config = args.into_config();
        assert_eq!(config.run_name.as_deref(), Some("exp"));
        assert!(config.frozen_leader);
        assert!(config.use_lstm);
        assert!(config.env.asymmetric);
        assert!(!config.log_metrics);
        assert_eq!(config.num_envs, 16);
        assert_eq!(config.seed, 0);
        assert_eq!(config.env.positive_reward, 2.0);
        assert_eq!(config.env.negative_reward, 1.0);
        assert_eq!(
            config.warmstart_leader_path,
            Some(PathBuf::from("results/base/leader_iteration=100.safetensors"))
        );
    }

    #[test]
    fn test_defaults_match_train_config() {
        let config = Args::try_parse_from(["run_ppo"]).unwrap().into_config();
        assert_eq!(config, TrainConfig::default());
    }

    #[test]
    fn test_log_metrics_alias_and_penalty() {
        let config = Args::try_parse_from([
            "run_ppo",
            "--log_metrics",
            "0",
            "--proximity_penalty",
            "0.25",
        ])
        .unwrap()
        .into_config();
        assert!(!config.log_metrics);
        assert_eq!(config.env.proximity_penalty.map(|p| p.penalty), Some(0.25));
    }
}
