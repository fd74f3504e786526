//! Evaluation tasks that run one robot in a fresh world.

use serde::{Deserialize, Serialize};
use tracing::info;
use voxbot_math::Vec3;

use crate::config::{Terrain, WorldConfig};
use crate::error::{Result, SimError};
use crate::outcome::Outcome;
use crate::robot::GridRobot;
use crate::world::World;

/// Gap left between the robot and the terrain at placement.
const DROP_CLEARANCE: f64 = 0.01;

/// Run a robot over a terrain for a fixed simulated duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locomotion {
    /// Simulated seconds to run.
    pub duration: f64,
    /// Terrain override; `None` keeps the one in `config`.
    #[serde(default)]
    pub terrain: Option<Terrain>,
    /// World parameters.
    #[serde(default)]
    pub config: WorldConfig,
}

impl Locomotion {
    /// Task with default world parameters.
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            terrain: None,
            config: WorldConfig::default(),
        }
    }

    /// World configuration with the terrain override applied.
    pub fn world_config(&self) -> WorldConfig {
        let mut config = self.config.clone();
        if self.terrain.is_some() {
            config.terrain = self.terrain;
        }
        config
    }

    /// Build a world, rest the robot on the terrain at the origin and tick
    /// until `duration` has elapsed.
    ///
    /// A failing tick ends the run with its error.
    pub fn run(&self, robot: GridRobot) -> Result<Outcome> {
        if !(self.duration.is_finite() && self.duration >= 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "duration must be non-negative, got {}",
                self.duration
            )));
        }
        let config = self.world_config();
        let ground = config
            .terrain
            .as_ref()
            .ok_or(SimError::MissingTerrain)?
            .height_at(0.0, 0.0);
        let mut world = World::new(config)?;

        let placement = Vec3::new(0.0, 0.0, ground + robot.bottom_offset() + DROP_CLEARANCE);
        let agent = world.add_agent(robot, &placement)?;
        info!(agent = agent.0, duration = self.duration, "locomotion started");

        let mut outcome = Outcome::new();
        while world.t() < self.duration {
            outcome.push(world.tick()?);
        }
        info!(
            ticks = outcome.snapshots().len(),
            distance = outcome.distance().unwrap_or(0.0),
            "locomotion finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ConstantController, PhaseSinController};
    use crate::robot::{Grid, RobotOptions, VoxelSpec};
    use crate::voxel::EDGES;

    fn robot(outputs: Box<dyn crate::controller::Controller>) -> GridRobot {
        let grid = Grid::new(vec![vec![vec![Some(VoxelSpec::default())]]]).unwrap();
        GridRobot::new(grid, outputs, RobotOptions::default()).unwrap()
    }

    #[test]
    fn test_tick_count_matches_duration() {
        let task = Locomotion::new(0.5);
        let outcome = task
            .run(robot(Box::new(ConstantController { values: vec![0.0; EDGES] })))
            .unwrap();
        let (mut t, mut ticks) = (0.0, 0);
        while t < 0.5 {
            t += task.config.dt;
            ticks += 1;
        }
        assert_eq!(outcome.snapshots().len(), ticks);
        assert!(outcome.distance().is_some());
    }

    #[test]
    fn test_terrain_override() {
        let task = Locomotion {
            terrain: Some(Terrain::Steps {
                step_length: 1.0,
                step_height: 0.2,
                count: 2,
            }),
            ..Locomotion::new(0.1)
        };
        assert!(matches!(task.world_config().terrain, Some(Terrain::Steps { .. })));
        let controller = PhaseSinController {
            frequency: 2.0,
            amplitude: 1.0,
            phases: vec![0.0; EDGES],
        };
        let outcome = task.run(robot(Box::new(controller))).unwrap();
        let first = outcome.snapshots()[0].first_agent_centroid().unwrap();
        assert!(first.z > 0.2);
    }

    #[test]
    fn test_rejects_negative_duration() {
        let task = Locomotion::new(-1.0);
        assert!(task
            .run(robot(Box::new(ConstantController { values: vec![0.0; EDGES] })))
            .is_err());
    }
}
