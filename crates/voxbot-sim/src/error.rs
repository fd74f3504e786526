//! Error types for the simulation engine.

use thiserror::Error;
use voxbot_math::MathError;

/// Errors that can occur while building or stepping a simulation.
#[derive(Error, Debug)]
pub enum SimError {
    /// Timestep is not a positive finite number.
    #[error("invalid timestep: {0}")]
    InvalidTimestep(f64),

    /// World configuration has no terrain generator.
    #[error("world configuration has no terrain")]
    MissingTerrain,

    /// Other invalid world configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sensor declared with an unusable range.
    #[error("invalid sensor: {0}")]
    InvalidSensor(String),

    /// Signal ray with no direction or an unencodable channel.
    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    /// Controller and robot disagree on a vector size.
    #[error("{what} dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which vector disagrees.
        what: &'static str,
        /// Size the robot wires.
        expected: usize,
        /// Size the controller declares or produces.
        actual: usize,
    },

    /// Robot grid has no voxels.
    #[error("robot grid contains no voxels")]
    EmptyRobot,

    /// Body id not registered in this world.
    #[error("unknown body")]
    UnknownBody,

    /// Component id not registered in this world.
    #[error("unknown component")]
    UnknownComponent,

    /// An operation needed at least one body.
    #[error("body group is empty")]
    EmptyGroup,

    /// Controller failed during a tick.
    #[error("controller failed: {0}")]
    Controller(String),

    /// Geometry error.
    #[error(transparent)]
    Math(#[from] MathError),
}

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
