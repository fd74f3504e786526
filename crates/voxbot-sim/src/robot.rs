//! Grid-assembled robots.
//!
//! A robot is a 3-D array of optional voxel slots driven by one controller.
//! Neighboring voxels are welded face to face with 4 fixed joints, and all
//! per-voxel I/O is multiplexed through the controller in grid traversal order
//! (X outermost, then Y, then Z).

use serde::{Deserialize, Serialize};
use tracing::warn;
use voxbot_math::Vec3;

use crate::action::Action;
use crate::agent::Agent;
use crate::component::{Component, ComponentId};
use crate::controller::{Controller, ControllerSpec};
use crate::error::{Result, SimError};
use crate::sensor::SensorKind;
use crate::signal::SIDES;
use crate::voxel::{VoxelParams, CORNERS, EDGES};
use crate::world::World;

/// Face output above which attachment is requested, and below whose negation
/// detachment is requested.
const ATTACH_THRESHOLD: f64 = 0.5;

/// A rectangular 3-D array of optional cells, indexed `[x][y][z]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid<T> {
    cells: Vec<Vec<Vec<Option<T>>>>,
}

impl<T> Grid<T> {
    /// Wrap nested cells, rejecting ragged or empty arrays.
    pub fn new(cells: Vec<Vec<Vec<Option<T>>>>) -> Result<Self> {
        let grid = Self { cells };
        grid.validate()?;
        Ok(grid)
    }

    fn validate(&self) -> Result<()> {
        let [_, ny, nz] = self.dims();
        let rectangular = self
            .cells
            .iter()
            .all(|plane| plane.len() == ny && plane.iter().all(|row| row.len() == nz));
        if !rectangular || ny == 0 || nz == 0 {
            return Err(SimError::InvalidConfig("robot grid must be a non-empty box".into()));
        }
        Ok(())
    }

    /// Size along each axis.
    pub fn dims(&self) -> [usize; 3] {
        let nx = self.cells.len();
        let ny = self.cells.first().map_or(0, Vec::len);
        let nz = self
            .cells
            .first()
            .and_then(|plane| plane.first())
            .map_or(0, Vec::len);
        [nx, ny, nz]
    }

    /// Cell at `[x, y, z]`, if filled.
    pub fn get(&self, [x, y, z]: [usize; 3]) -> Option<&T> {
        self.cells.get(x)?.get(y)?.get(z)?.as_ref()
    }

    /// Filled cells in traversal order.
    pub fn filled(&self) -> impl Iterator<Item = ([usize; 3], &T)> {
        self.cells.iter().enumerate().flat_map(|(x, plane)| {
            plane.iter().enumerate().flat_map(move |(y, row)| {
                row.iter()
                    .enumerate()
                    .filter_map(move |(z, cell)| cell.as_ref().map(|c| ([x, y, z], c)))
            })
        })
    }
}

/// One voxel slot of a robot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelSpec {
    /// Physical parameters.
    pub params: VoxelParams,
    /// Sensors, in wiring order.
    pub sensors: Vec<SensorKind>,
}

/// Optional robot capabilities, each adding 6 outputs per voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotOptions {
    /// Emit one signal per face, on the channel of that face, fanned toward
    /// the face corners.
    pub communication: bool,
    /// Request attachment or detachment per face. Also makes the voxels
    /// attachable by others.
    pub attachment: bool,
}

impl RobotOptions {
    /// Controller outputs consumed by one voxel.
    pub fn outputs_per_voxel(&self) -> usize {
        EDGES + SIDES * (usize::from(self.communication) + usize::from(self.attachment))
    }
}

/// A grid of voxels driven by a single controller.
pub struct GridRobot {
    grid: Grid<VoxelSpec>,
    controller: Box<dyn Controller>,
    options: RobotOptions,
    input_dim: usize,
    output_dim: usize,
    components: Vec<ComponentId>,
}

impl GridRobot {
    /// Validate the grid against the controller's declared dimensions.
    pub fn new(grid: Grid<VoxelSpec>, controller: Box<dyn Controller>, options: RobotOptions) -> Result<Self> {
        grid.validate()?;
        let voxels: Vec<&VoxelSpec> = grid.filled().map(|(_, v)| v).collect();
        let first = voxels.first().ok_or(SimError::EmptyRobot)?;
        let side = first.params.side_length;
        for voxel in &voxels {
            voxel.params.validate()?;
            for sensor in &voxel.sensors {
                sensor.validate()?;
            }
            if voxel.params.side_length != side {
                return Err(SimError::InvalidConfig(format!(
                    "grid voxels must share one side length, got {side} and {}",
                    voxel.params.side_length
                )));
            }
        }

        let input_dim = voxels
            .iter()
            .flat_map(|v| &v.sensors)
            .map(SensorKind::dimension)
            .sum();
        let output_dim = voxels.len() * options.outputs_per_voxel();
        if let Some(actual) = controller.input_dim() {
            if actual != input_dim {
                return Err(SimError::DimensionMismatch {
                    what: "controller input",
                    expected: input_dim,
                    actual,
                });
            }
        }
        if controller.output_dim() != output_dim {
            return Err(SimError::DimensionMismatch {
                what: "controller output",
                expected: output_dim,
                actual: controller.output_dim(),
            });
        }

        Ok(Self {
            grid,
            controller,
            options,
            input_dim,
            output_dim,
            components: Vec::new(),
        })
    }

    /// Length of the sensor vector.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Length of the actuation vector.
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Enabled capabilities.
    pub fn options(&self) -> RobotOptions {
        self.options
    }

    fn side_length(&self) -> f64 {
        self.grid
            .filled()
            .next()
            .map_or(0.0, |(_, v)| v.params.side_length)
    }

    fn cell_offset(&self, index: [usize; 3]) -> Vec3 {
        let dims = self.grid.dims();
        let side = self.side_length();
        Vec3::from_fn(|axis, _| side * (index[axis] as f64 - (dims[axis] as f64 - 1.0) / 2.0))
    }

    /// Height of the assembly point above the lowest corner surface.
    pub fn bottom_offset(&self) -> f64 {
        self.grid
            .filled()
            .map(|(index, v)| v.params.half_extent() - self.cell_offset(index).z)
            .fold(0.0, f64::max)
    }
}

impl Agent for GridRobot {
    fn assemble(&mut self, world: &mut World, position: Vec3) -> Result<()> {
        let [nx, ny, nz] = self.grid.dims();
        let mut placed: Vec<Vec<Vec<Option<ComponentId>>>> = vec![vec![vec![None; nz]; ny]; nx];
        let mut cells = Vec::new();
        for (index, spec) in self.grid.filled() {
            let center = position + self.cell_offset(index);
            let id = world.add_voxel(spec.params.clone(), &center, &spec.sensors, self.options.attachment)?;
            placed[index[0]][index[1]][index[2]] = Some(id);
            cells.push((index, id));
        }

        // Weld each pair of face neighbors through the 4 coincident corners.
        for &([x, y, z], a) in &cells {
            for axis in 0..3 {
                let mut next = [x, y, z];
                next[axis] += 1;
                let Some(b) = placed
                    .get(next[0])
                    .and_then(|p| p.get(next[1]))
                    .and_then(|r| r.get(next[2]))
                    .copied()
                    .flatten()
                else {
                    continue;
                };
                let bit = 1 << axis;
                let (ca, cb) = (corners(world, a)?, corners(world, b)?);
                for code in (0..CORNERS).filter(|c| c & bit != 0) {
                    world.add_fixed_joint(ca[code], cb[code ^ bit])?;
                }
            }
        }

        // Voxels sharing a face, edge or corner must not collide with each other.
        for (i, &(ia, a)) in cells.iter().enumerate() {
            for &(ib, b) in &cells[i + 1..] {
                let touching = (0..3).all(|axis| ia[axis].abs_diff(ib[axis]) <= 1);
                if !touching {
                    continue;
                }
                let (ca, cb) = (corners(world, a)?, corners(world, b)?);
                for &ba in &ca {
                    for &bb in &cb {
                        world.add_collision_exception(ba, bb)?;
                    }
                }
            }
        }

        self.components = cells.into_iter().map(|(_, id)| id).collect();
        Ok(())
    }

    fn components(&self) -> &[ComponentId] {
        &self.components
    }

    fn act(&mut self, world: &mut World) -> Result<Vec<Action>> {
        let mut inputs = Vec::with_capacity(self.input_dim);
        for &c in &self.components {
            inputs.extend(world.read_sensors(c)?);
        }

        let mut outputs = self.controller.control(world.t(), &inputs)?;
        if outputs.len() != self.output_dim {
            return Err(SimError::DimensionMismatch {
                what: "controller output",
                expected: self.output_dim,
                actual: outputs.len(),
            });
        }
        let non_finite = outputs.iter().filter(|v| !v.is_finite()).count();
        if non_finite > 0 {
            warn!(count = non_finite, t = world.t(), "non-finite controller outputs replaced by 0");
            outputs.iter_mut().filter(|v| !v.is_finite()).for_each(|v| *v = 0.0);
        }

        let spring_constant = world.config().attach_spring_constant;
        let damping_constant = world.config().attach_damping_constant;
        let stride = self.options.outputs_per_voxel();
        let mut actions = Vec::new();
        for (&c, chunk) in self.components.iter().zip(outputs.chunks(stride)) {
            let (edges, mut rest) = chunk.split_at(EDGES);
            world.actuate(c, edges)?;

            if self.options.communication {
                let shape = world.voxel_shape(c)?;
                let center = shape.center();
                let (signals, tail) = rest.split_at(SIDES);
                for (side, &value) in signals.iter().enumerate() {
                    // Aim at the face corners, where a neighbour's corner spheres sit.
                    let directions: Vec<Vec3> = shape
                        .face_corners(side)
                        .map(|corners| corners.iter().map(|p| p - center).collect())
                        .unwrap_or_default();
                    actions.push(Action::EmitSignal {
                        emitter: c,
                        origin: center,
                        directions,
                        channel: side as u8,
                        value,
                    });
                }
                rest = tail;
            }

            if self.options.attachment {
                let voxel = world
                    .component(c)
                    .and_then(Component::as_voxel)
                    .ok_or(SimError::UnknownComponent)?;
                for (side, &value) in rest[..SIDES].iter().enumerate() {
                    let group = voxel.face_bodies(side);
                    if value > ATTACH_THRESHOLD {
                        actions.push(Action::RequestAttachment {
                            requester: c,
                            group,
                            spring_constant,
                            damping_constant,
                        });
                    } else if value < -ATTACH_THRESHOLD {
                        actions.push(Action::RequestDetachment { requester: c, group });
                    }
                }
            }
        }
        Ok(actions)
    }
}

fn corners(world: &World, id: ComponentId) -> Result<[crate::body::BodyId; CORNERS]> {
    world
        .component(id)
        .and_then(Component::as_voxel)
        .map(|v| *v.corners())
        .ok_or(SimError::UnknownComponent)
}

/// Serializable robot: grid, controller and options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotDescription {
    /// Voxel slots.
    pub grid: Grid<VoxelSpec>,
    /// Controller driving the grid.
    pub controller: ControllerSpec,
    /// Optional capabilities.
    #[serde(default)]
    pub options: RobotOptions,
}

impl RobotDescription {
    /// Instantiate the robot, validating every dimension.
    pub fn build(self) -> Result<GridRobot> {
        GridRobot::new(self.grid, self.controller.into_controller()?, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::controller::ConstantController;
    use crate::voxel::JointOption;

    fn filled(nx: usize, ny: usize, nz: usize, spec: VoxelSpec) -> Grid<VoxelSpec> {
        Grid::new(vec![vec![vec![Some(spec); nz]; ny]; nx]).unwrap()
    }

    fn constant(n: usize) -> Box<dyn Controller> {
        Box::new(ConstantController { values: vec![0.0; n] })
    }

    #[test]
    fn test_two_voxels_get_four_structural_joints() {
        let spec = VoxelSpec {
            params: VoxelParams {
                joint_options: vec![JointOption::Edges],
                ..VoxelParams::default()
            },
            sensors: vec![],
        };
        let grid = filled(2, 1, 1, spec);
        let robot = GridRobot::new(grid, constant(2 * EDGES), RobotOptions::default()).unwrap();

        let mut world = World::new(WorldConfig::default()).unwrap();
        let id = world.add_agent(robot, &Vec3::new(0.0, 0.0, 2.0)).unwrap();
        assert_eq!(world.fixed_joint_count(), 4);
        assert_eq!(world.spring_joint_count(), 2 * EDGES);
        assert_eq!(world.agent_components(id).len(), 2);
    }

    #[test]
    fn test_empty_neighbors_not_welded() {
        let spec = VoxelSpec::default();
        let grid = Grid::new(vec![
            vec![vec![Some(spec.clone())]],
            vec![vec![None]],
            vec![vec![Some(spec)]],
        ])
        .unwrap();
        let robot = GridRobot::new(grid, constant(2 * EDGES), RobotOptions::default()).unwrap();
        let mut world = World::new(WorldConfig::default()).unwrap();
        world.add_agent(robot, &Vec3::new(0.0, 0.0, 2.0)).unwrap();
        assert_eq!(world.fixed_joint_count(), 0);
    }

    #[test]
    fn test_grid_is_centered() {
        let grid = filled(2, 1, 1, VoxelSpec::default());
        let robot = GridRobot::new(grid, constant(2 * EDGES), RobotOptions::default()).unwrap();
        assert!((robot.cell_offset([0, 0, 0]).x + 0.5).abs() < 1e-12);
        assert!((robot.cell_offset([1, 0, 0]).x - 0.5).abs() < 1e-12);
        assert!((robot.bottom_offset() - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_validation() {
        let spec = VoxelSpec {
            sensors: vec![SensorKind::Touch, SensorKind::Velocity { max_speed: 1.0 }],
            ..VoxelSpec::default()
        };
        let options = RobotOptions {
            communication: true,
            attachment: true,
        };
        assert_eq!(options.outputs_per_voxel(), 24);

        let robot = GridRobot::new(filled(1, 1, 1, spec.clone()), constant(24), options).unwrap();
        assert_eq!(robot.input_dim(), 4);

        assert!(matches!(
            GridRobot::new(filled(1, 1, 1, spec.clone()), constant(12), options),
            Err(SimError::DimensionMismatch { what: "controller output", .. })
        ));

        let mlp = crate::controller::MlpController::new(vec![3, 24], vec![0.0; 4 * 24]).unwrap();
        assert!(matches!(
            GridRobot::new(filled(1, 1, 1, spec), Box::new(mlp), options),
            Err(SimError::DimensionMismatch { what: "controller input", .. })
        ));
    }

    #[test]
    fn test_empty_grid_rejected() {
        let grid: Grid<VoxelSpec> = Grid::new(vec![vec![vec![None, None]]]).unwrap();
        assert!(matches!(
            GridRobot::new(grid, constant(0), RobotOptions::default()),
            Err(SimError::EmptyRobot)
        ));
    }

    #[test]
    fn test_ragged_grid_rejected() {
        let ragged: Vec<Vec<Vec<Option<u8>>>> = vec![vec![vec![Some(1)]], vec![vec![Some(1), None]]];
        assert!(Grid::new(ragged).is_err());
    }

    #[test]
    fn test_communication_emits_per_face() {
        let grid = filled(1, 1, 1, VoxelSpec::default());
        let options = RobotOptions {
            communication: true,
            attachment: false,
        };
        let robot = GridRobot::new(grid, constant(EDGES + SIDES), options).unwrap();
        let mut world = World::new(WorldConfig::default()).unwrap();
        world.add_agent(robot, &Vec3::new(0.0, 0.0, 2.0)).unwrap();

        let snapshot = world.tick().unwrap();
        assert_eq!(snapshot.actions.len(), SIDES);
        match &snapshot.actions[1] {
            Action::EmitSignal {
                channel, directions, ..
            } => {
                assert_eq!(*channel, 1);
                assert_eq!(directions.len(), 4);
                assert!(directions.iter().all(|d| d.x > 0.0));
                let spread: Vec3 = directions.iter().copied().sum();
                assert!(spread.y.abs() < 1e-3 && spread.z.abs() < 1e-3);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_description_from_json() {
        let json = r#"{
            "grid": [[[{ "sensors": [{ "kind": "touch" }] }]]],
            "controller": { "kind": "constant", "values": [0,0,0,0,0,0,0,0,0,0,0,0] }
        }"#;
        let description: RobotDescription = serde_json::from_str(json).unwrap();
        let robot = description.build().unwrap();
        assert_eq!(robot.input_dim(), 1);
        assert_eq!(robot.output_dim(), EDGES);
    }
}
