#![warn(missing_docs)]

//! Math types for the voxbot simulator.
//!
//! Thin wrappers around nalgebra providing the vector and bounding-box
//! primitives shared by the body, voxel and world models.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// An orientation in 3D space.
pub type Rotation = UnitQuaternion<f64>;

/// Errors raised by geometric primitives.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    /// `BoundingBox::enclosing` was given no boxes.
    #[error("cannot enclose an empty set of bounding boxes")]
    EmptyEnclosure,

    /// A box was built with `min > max` on some axis.
    #[error("bounding box min {min:?} exceeds max {max:?}")]
    InvertedBox {
        /// Requested min corner.
        min: [f64; 3],
        /// Requested max corner.
        max: [f64; 3],
    },
}

/// Rotate `v` by Euler angles (roll about X, pitch about Y, yaw about Z), in radians.
pub fn rotate_euler(v: &Vec3, roll: f64, pitch: f64, yaw: f64) -> Vec3 {
    UnitQuaternion::from_euler_angles(roll, pitch, yaw) * v
}

/// Rotate `point` about `pivot` by Euler angles, in radians.
pub fn rotate_about(point: &Vec3, pivot: &Vec3, roll: f64, pitch: f64, yaw: f64) -> Vec3 {
    pivot + rotate_euler(&(point - pivot), roll, pitch, yaw)
}

/// Mass-weighted centroid of `(mass, position)` pairs.
///
/// Returns `None` when the total mass is not positive.
pub fn weighted_centroid<I>(items: I) -> Option<Vec3>
where
    I: IntoIterator<Item = (f64, Vec3)>,
{
    let mut total = 0.0;
    let mut sum = Vec3::zeros();
    for (mass, position) in items {
        total += mass;
        sum += position * mass;
    }
    (total > 0.0).then(|| sum / total)
}

/// An axis-aligned box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl BoundingBox {
    /// Create a box from its corners, rejecting inverted axes.
    pub fn new(min: Vec3, max: Vec3) -> Result<Self, MathError> {
        if min.x > max.x || min.y > max.y || min.z > max.z {
            return Err(MathError::InvertedBox {
                min: [min.x, min.y, min.z],
                max: [max.x, max.y, max.z],
            });
        }
        Ok(Self { min, max })
    }

    /// Cube of half-width `half` centered on `center`.
    pub fn around(center: &Vec3, half: f64) -> Self {
        let h = Vec3::repeat(half.abs());
        Self {
            min: center - h,
            max: center + h,
        }
    }

    /// Smallest box containing every box in `boxes`.
    pub fn enclosing<I>(boxes: I) -> Result<Self, MathError>
    where
        I: IntoIterator<Item = BoundingBox>,
    {
        boxes
            .into_iter()
            .reduce(|acc, b| Self {
                min: acc.min.inf(&b.min),
                max: acc.max.sup(&b.max),
            })
            .ok_or(MathError::EmptyEnclosure)
    }

    /// Center of the box.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) / 2.0
    }

    /// Extent along each axis.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Whether the two boxes share any volume or touch.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether `p` lies inside the box (boundary included).
    pub fn contains(&self, p: &Vec3) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// The box grown by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vec3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }
}
