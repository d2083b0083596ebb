//! Print a recorded ColorGrid trajectory as text frames
//!
//! # Usage
//!
//! ```bash
//! replay_trajectory trajectories/demo/trajectory_iteration=100_env=0.json
//! replay_trajectory <file> --frame 12
//! replay_trajectory <file> --delay_ms 100
//! ```
//!
//! `L` is the leader, `F` the follower, `R`/`B`/`G` are blocks.

use std::{path::PathBuf, thread, time::Duration};

use anyhow::{Result, bail};
use clap::Parser;
use colorgrid_rl::trajectory::Trajectory;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "replay_trajectory",
    about = "Render a recorded trajectory",
    rename_all = "snake_case"
)]
struct Args {
    /// Trajectory JSON file
    path: PathBuf,

    /// Only show this frame
    #[arg(long)]
    frame: Option<usize>,

    /// Pause between frames in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Print only frame headers
    #[arg(long)]
    headers_only: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let trajectory = Trajectory::load(&args.path)?;
    tracing::info!(
        "{} | iteration {} | env {} | {} frames",
        trajectory.run_name,
        trajectory.iteration,
        trajectory.env_id,
        trajectory.frames.len()
    );

    if let Some(index) = args.frame {
        let Some(frame) = trajectory.frames.get(index) else {
            bail!("frame {index} out of range (trajectory has {} frames)", trajectory.frames.len());
        };
        println!("{}\n{}", frame.header(), frame.render());
        return Ok(());
    }

    if args.headers_only {
        for frame in &trajectory.frames {
            println!("{}", frame.header());
        }
    } else {
        for rendered in trajectory.render_frames() {
            println!("{rendered}");
            if args.delay_ms > 0 {
                thread::sleep(Duration::from_millis(args.delay_ms));
            }
        }
    }

    let (leader, follower) = trajectory.total_reward();
    println!("total reward: leader {leader:.2}, follower {follower:.2}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args =
            Args::try_parse_from([
                "replay_trajectory",
                "t.json",
                "--frame",
                "3",
                "--delay_ms",
                "50",
            ])
                .unwrap();
        assert_eq!(args.path, PathBuf::from("t.json"));
        assert_eq!(args.frame, Some(3));
        assert_eq!(args.delay_ms, 50);
        assert!(!args.headers_only);
    }

    #[test]
    fn test_path_is_required() {
        assert!(Args::try_parse_from(["replay_trajectory"]).is_err());
    }
}
