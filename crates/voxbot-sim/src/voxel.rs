//! Voxel soft-body model.
//!
//! A voxel is 8 corner spheres addressed by a 3-bit vertex code (bit 0 = X,
//! bit 1 = Y, bit 2 = Z; a set bit is the high end of that axis) held together
//! by a configurable joint topology:
//!
//! - `Edges`: the 12 pairs whose codes differ in one bit. These are the
//!   actuated joints.
//! - `Sides`: both diagonals of each of the 6 faces (a central cross).
//! - `Internal`: the 4 main diagonals.
//!
//! Faces are indexed `-X, +X, -Y, +Y, -Z, +Z`.

use serde::{Deserialize, Serialize};
use voxbot_math::{weighted_centroid, BoundingBox, Vec3};

use crate::body::{BodyId, SphereSpec};
use crate::joints::ConstraintParams;
use crate::sensor::Sensor;
use crate::signal::{side_axis, side_is_positive, SIDES};

/// Number of corner bodies.
pub const CORNERS: usize = 8;

/// Number of edge joints, and of actuation inputs per voxel.
pub const EDGES: usize = 12;

/// Family of internal joints to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointOption {
    /// Main diagonals through the cube interior.
    Internal,
    /// Face diagonals.
    Sides,
    /// Edge-length joints.
    Edges,
}

/// Physical parameters of a voxel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelParams {
    /// Nominal edge length.
    pub side_length: f64,
    /// Total mass, split evenly across the corners.
    pub mass: f64,
    /// Corner friction coefficient.
    pub friction: f64,
    /// Spring constant of internal joints.
    pub spring_constant: f64,
    /// Damping constant of internal joints.
    pub damping_constant: f64,
    /// Corner sphere diameter relative to the side length.
    pub rigid_mass_length_ratio: f64,
    /// Face area ratio reached at actuation -1.
    pub min_area_ratio: f64,
    /// Face area ratio reached at actuation +1.
    pub max_area_ratio: f64,
    /// Joint families to build.
    pub joint_options: Vec<JointOption>,
    /// Weld every internal joint instead of using springs.
    pub rigid: bool,
}

impl Default for VoxelParams {
    fn default() -> Self {
        Self {
            side_length: 1.0,
            mass: 1.0,
            friction: 1.0,
            spring_constant: 200.0,
            damping_constant: 5.0,
            rigid_mass_length_ratio: 0.3,
            min_area_ratio: 0.5,
            max_area_ratio: 1.5,
            joint_options: vec![JointOption::Edges, JointOption::Sides, JointOption::Internal],
            rigid: false,
        }
    }
}

impl VoxelParams {
    /// Radius of each corner sphere.
    pub fn corner_radius(&self) -> f64 {
        self.side_length * self.rigid_mass_length_ratio / 2.0
    }

    /// Distance from the centroid to the outer surface of the corners, per axis.
    pub fn half_extent(&self) -> f64 {
        self.side_length / 2.0 + self.corner_radius()
    }

    /// Volume at rest, `side_length³`.
    pub fn rest_volume(&self) -> f64 {
        self.side_length.powi(3)
    }

    /// Spec of one corner body.
    pub fn corner_spec(&self) -> SphereSpec {
        SphereSpec {
            radius: self.corner_radius(),
            mass: self.mass / CORNERS as f64,
            friction: self.friction,
        }
    }

    /// Solver parameters of internal joints for timestep `dt`.
    pub fn constraint(&self, dt: f64) -> ConstraintParams {
        if self.rigid {
            ConstraintParams::RIGID
        } else {
            ConstraintParams::from_spring(self.spring_constant, self.damping_constant, dt)
        }
    }

    /// Edge rest length for an actuation value in `[-1, 1]`.
    ///
    /// The value maps linearly onto `[min_area_ratio, max_area_ratio]` with 0
    /// at the midpoint; the edge scales with the square root of the area.
    pub fn actuated_length(&self, input: f64) -> f64 {
        let x = if input.is_finite() { input.clamp(-1.0, 1.0) } else { 0.0 };
        let mid = (self.min_area_ratio + self.max_area_ratio) / 2.0;
        let half = (self.max_area_ratio - self.min_area_ratio) / 2.0;
        self.side_length * (mid + half * x).max(0.0).sqrt()
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        let positive = [
            ("side_length", self.side_length),
            ("mass", self.mass),
            ("rigid_mass_length_ratio", self.rigid_mass_length_ratio),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(crate::SimError::InvalidConfig(format!(
                    "voxel {name} must be positive, got {value}"
                )));
            }
        }
        if !self.rigid && !(self.spring_constant > 0.0 && self.damping_constant >= 0.0) {
            return Err(crate::SimError::InvalidConfig(
                "voxel springs need positive stiffness and non-negative damping".into(),
            ));
        }
        if !(self.min_area_ratio > 0.0 && self.min_area_ratio <= self.max_area_ratio) {
            return Err(crate::SimError::InvalidConfig(format!(
                "voxel area ratios must satisfy 0 < min <= max, got {}..{}",
                self.min_area_ratio, self.max_area_ratio
            )));
        }
        Ok(())
    }
}

/// Offset of vertex `code` from the voxel center, for edge length `side`.
pub fn vertex_offset(code: usize, side: f64) -> Vec3 {
    let h = side / 2.0;
    let sign = |bit: usize| if code & (1 << bit) != 0 { h } else { -h };
    Vec3::new(sign(0), sign(1), sign(2))
}

/// Vertex pairs whose codes differ in exactly `bits` bits, in code order.
fn pairs_with_distance(bits: u32) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for a in 0..CORNERS {
        for b in (a + 1)..CORNERS {
            if (a ^ b).count_ones() == bits {
                pairs.push((a, b));
            }
        }
    }
    pairs
}

/// The 12 edges, in a fixed order shared with actuation inputs.
pub fn edge_pairs() -> Vec<(usize, usize)> {
    pairs_with_distance(1)
}

/// Vertex pairs of `option`.
pub fn joint_pairs(option: JointOption) -> Vec<(usize, usize)> {
    match option {
        JointOption::Edges => pairs_with_distance(1),
        JointOption::Sides => pairs_with_distance(2),
        JointOption::Internal => pairs_with_distance(3),
    }
}

/// The 4 vertex codes of cube face `side`, or `None` past the last side.
pub fn face_vertices(side: usize) -> Option<[usize; 4]> {
    if side >= SIDES {
        return None;
    }
    let bit = 1 << side_axis(side);
    let want = if side_is_positive(side) { bit } else { 0 };
    let mut out = [0; 4];
    let mut n = 0;
    for code in 0..CORNERS {
        if code & bit == want {
            out[n] = code;
            n += 1;
        }
    }
    Some(out)
}

/// An assembled voxel.
#[derive(Debug, Clone)]
pub struct Voxel {
    params: VoxelParams,
    corners: [BodyId; CORNERS],
    sensors: Vec<Sensor>,
}

impl Voxel {
    pub(crate) fn new(params: VoxelParams, corners: [BodyId; CORNERS], sensors: Vec<Sensor>) -> Self {
        Self {
            params,
            corners,
            sensors,
        }
    }

    /// Physical parameters.
    pub fn params(&self) -> &VoxelParams {
        &self.params
    }

    /// Corner bodies indexed by vertex code.
    pub fn corners(&self) -> &[BodyId; CORNERS] {
        &self.corners
    }

    /// Corner body of vertex `code`, `0..8`.
    pub fn corner(&self, code: usize) -> Option<BodyId> {
        self.corners.get(code).copied()
    }

    /// Corner bodies of face `side`; empty for an unknown side.
    pub fn face_bodies(&self, side: usize) -> Vec<BodyId> {
        face_vertices(side)
            .map(|codes| codes.iter().map(|&c| self.corners[c]).collect())
            .unwrap_or_default()
    }

    /// Sensors in wiring order.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub(crate) fn sensors_mut(&mut self) -> &mut [Sensor] {
        &mut self.sensors
    }

    /// Total number of sensor values.
    pub fn sensor_dimension(&self) -> usize {
        self.sensors.iter().map(|s| s.kind().dimension()).sum()
    }

    /// Whether any sensor listens for signal rays.
    pub fn detects_signals(&self) -> bool {
        self.sensors.iter().any(|s| s.kind().detects_signals())
    }

    /// Rest lengths for the 12 edges given actuation inputs.
    pub fn edge_rest_lengths(&self, inputs: &[f64]) -> Vec<f64> {
        (0..EDGES)
            .map(|i| self.params.actuated_length(inputs.get(i).copied().unwrap_or(0.0)))
            .collect()
    }
}

/// Geometry of a voxel at one instant, from its corner positions.
#[derive(Debug, Clone, Copy)]
pub struct VoxelShape {
    /// Corner positions indexed by vertex code.
    pub corners: [Vec3; CORNERS],
    /// Corner radius.
    pub radius: f64,
}

impl VoxelShape {
    /// Centroid; corners carry equal mass.
    pub fn center(&self) -> Vec3 {
        weighted_centroid(self.corners.iter().map(|p| (1.0, *p))).unwrap_or_else(Vec3::zeros)
    }

    /// Corner positions of face `side`.
    pub fn face_corners(&self, side: usize) -> Option<[Vec3; 4]> {
        face_vertices(side).map(|codes| codes.map(|c| self.corners[c]))
    }

    /// Center of face `side`.
    pub fn face_center(&self, side: usize) -> Option<Vec3> {
        self.face_corners(side)
            .map(|corners| corners.into_iter().sum::<Vec3>() / 4.0)
    }

    /// Volume estimate: product of the mean edge length along each axis.
    pub fn volume(&self) -> f64 {
        let mut per_axis = [0.0; 3];
        for (a, b) in edge_pairs() {
            let axis = (a ^ b).trailing_zeros() as usize;
            per_axis[axis] += (self.corners[a] - self.corners[b]).norm() / 4.0;
        }
        per_axis.iter().product()
    }

    /// Face whose outward direction best matches `point - center`.
    pub fn nearest_side(&self, point: &Vec3) -> usize {
        let center = self.center();
        let rel = point - center;
        let mut best = 0;
        let mut best_dot = f64::NEG_INFINITY;
        for side in 0..SIDES {
            let outward = self
                .face_center(side)
                .and_then(|face| (face - center).try_normalize(f64::EPSILON))
                .unwrap_or_else(Vec3::zeros);
            let d = outward.dot(&rel);
            if d > best_dot {
                best_dot = d;
                best = side;
            }
        }
        best
    }

    /// Axis-aligned bounds including the corner spheres.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut min = self.corners[0];
        let mut max = self.corners[0];
        for p in &self.corners[1..] {
            min = min.inf(p);
            max = max.sup(p);
        }
        let r = Vec3::repeat(self.radius);
        BoundingBox { min: min - r, max: max + r }
    }
}
