//! voxbot CLI - run voxel robots through locomotion trials
//!
//! Loads a robot description (JSON) and an optional world config (TOML),
//! simulates it and prints the outcome as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use voxbot_math::Vec3;
use voxbot_sim::{Locomotion, Outcome, RobotDescription, Snapshot, WorldConfig};

#[derive(Parser)]
#[command(name = "voxbot")]
#[command(about = "Voxel soft-robot locomotion runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a robot and print the outcome
    Run {
        /// Robot description (.json)
        robot: PathBuf,
        /// World configuration (.toml); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Simulated seconds
        #[arg(short, long, default_value_t = 30.0)]
        duration: f64,
        /// Include every snapshot in the output
        #[arg(long)]
        snapshots: bool,
    },
    /// Validate a robot description and print its dimensions
    Info {
        /// Robot description (.json)
        robot: PathBuf,
    },
}

#[derive(Serialize)]
struct RunReport<'a> {
    duration: f64,
    ticks: usize,
    distance: Option<f64>,
    velocity: Option<f64>,
    start: Option<Vec3>,
    end: Option<Vec3>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshots: Option<&'a [Snapshot]>,
}

impl<'a> RunReport<'a> {
    fn new(duration: f64, outcome: &'a Outcome, with_snapshots: bool) -> Self {
        let snapshots = outcome.snapshots();
        Self {
            duration,
            ticks: snapshots.len(),
            distance: outcome.distance(),
            velocity: outcome.velocity(),
            start: snapshots.first().and_then(Snapshot::first_agent_centroid),
            end: snapshots.last().and_then(Snapshot::first_agent_centroid),
            snapshots: with_snapshots.then_some(snapshots),
        }
    }
}

#[derive(Serialize)]
struct RobotInfo {
    voxels: usize,
    dims: [usize; 3],
    inputs: usize,
    outputs: usize,
    communication: bool,
    attachment: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            robot,
            config,
            duration,
            snapshots,
        } => run(&robot, config.as_deref(), duration, snapshots)?,
        Commands::Info { robot } => show_info(&robot)?,
    }

    Ok(())
}

fn load_robot(path: &Path) -> Result<RobotDescription> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing robot description {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<WorldConfig> {
    let Some(path) = path else {
        return Ok(WorldConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: WorldConfig =
        toml::from_str(&text).with_context(|| format!("parsing world config {}", path.display()))?;
    config.validate().context("invalid world config")?;
    Ok(config)
}

fn run(robot: &Path, config: Option<&Path>, duration: f64, with_snapshots: bool) -> Result<()> {
    let robot = load_robot(robot)?.build().context("building robot")?;
    info!(inputs = robot.input_dim(), outputs = robot.output_dim(), "robot loaded");
    let task = Locomotion {
        config: load_config(config)?,
        ..Locomotion::new(duration)
    };
    let outcome = task.run(robot).context("simulation failed")?;

    let report = RunReport::new(duration, &outcome, with_snapshots);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn show_info(path: &Path) -> Result<()> {
    let description = load_robot(path)?;
    let voxels = description.grid.filled().count();
    let dims = description.grid.dims();
    let robot = description.build().context("building robot")?;
    let options = robot.options();

    let info = RobotInfo {
        voxels,
        dims,
        inputs: robot.input_dim(),
        outputs: robot.output_dim(),
        communication: options.communication,
        attachment: options.attachment,
    };
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
