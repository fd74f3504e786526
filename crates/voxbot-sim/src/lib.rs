#![warn(missing_docs)]

//! Stepping engine for voxel-based soft robots on top of Rapier3d.
//!
//! A [`World`] owns sphere bodies, spring and fixed joints, agents and a
//! simulated clock. Voxels are 8 corner spheres braced by spring joints whose
//! stiffness and damping enter the solver as ERP/CFM pairs. Each
//! [`World::tick`] integrates, resolves contacts and one-tick signal rays,
//! lets every agent sense and act, then applies the queued [`Action`]s and
//! returns a [`Snapshot`].
//!
//! # Example
//!
//! ```ignore
//! use voxbot_sim::{ConstantController, Grid, GridRobot, Locomotion, RobotOptions, VoxelSpec};
//!
//! let grid = Grid::new(vec![vec![vec![Some(VoxelSpec::default())]]])?;
//! let controller = Box::new(ConstantController { values: vec![0.0; 12] });
//! let robot = GridRobot::new(grid, controller, RobotOptions::default())?;
//!
//! let outcome = Locomotion::new(10.0).run(robot)?;
//! println!("walked {:?} m", outcome.distance());
//! ```

mod action;
mod agent;
mod attach;
mod body;
mod colliders;
mod component;
mod config;
mod controller;
mod error;
mod joints;
mod outcome;
mod robot;
mod sensor;
mod signal;
mod snapshot;
mod task;
mod voxel;
mod world;

pub use action::Action;
pub use agent::{Agent, AgentId};
pub use attach::{greedy_matching, nearest_attachable};
pub use body::{Body, BodyId, SphereSpec};
pub use component::{Component, ComponentId, ComponentKind};
pub use config::{Terrain, WorldConfig};
pub use controller::{ConstantController, Controller, ControllerSpec, MlpController, PhaseSinController};
pub use error::{Result, SimError};
pub use joints::{BodyPair, ConstraintParams};
pub use outcome::{Aggregate, Metric, Outcome};
pub use robot::{Grid, GridRobot, RobotDescription, RobotOptions, VoxelSpec};
pub use sensor::{Readings, Sensor, SensorKind};
pub use signal::{SignalBits, SignalRay, DETECT_ALL, MAX_CHANNEL, SIDES};
pub use snapshot::{AgentSnapshot, ComponentSnapshot, JointEndpoints, Snapshot};
pub use task::Locomotion;
pub use voxel::{
    edge_pairs, face_vertices, joint_pairs, vertex_offset, JointOption, Voxel, VoxelParams, VoxelShape, CORNERS,
    EDGES,
};
pub use world::{SpringJoint, World};
