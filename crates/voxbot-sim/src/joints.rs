//! Joint construction for the Rapier backend.
//!
//! Physical stiffness and damping enter the constraint solver only through
//! [`ConstraintParams`]. Soft parameters become a distance spring, rigid ones
//! a locked joint.

use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use rapier3d::dynamics::{GenericJoint, GenericJointBuilder, JointAxesMask, JointAxis, MotorModel};
use serde::{Deserialize, Serialize};

use crate::body::BodyId;

/// Error-reduction and constraint-force-mixing parameters of one joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintParams {
    /// Error reduction parameter, in `(0, 1]`.
    pub erp: f64,
    /// Constraint force mixing, `0` for a rigid joint.
    pub cfm: f64,
}

impl ConstraintParams {
    /// Stiff joint with no compliance.
    pub const RIGID: Self = Self { erp: 1.0, cfm: 0.0 };

    /// Derive solver parameters from a Hookean spring `k` and damper `c`.
    ///
    /// `ERP = dt·k / (dt·k + c)`, `CFM = 1 / (dt·k + c)`.
    pub fn from_spring(k: f64, c: f64, dt: f64) -> Self {
        let hk = dt * k;
        Self {
            erp: hk / (hk + c),
            cfm: 1.0 / (hk + c),
        }
    }

    /// Whether the joint has no compliance.
    pub fn is_rigid(&self) -> bool {
        self.cfm == 0.0
    }

    /// Recover `(stiffness, damping)` for a force-based motor.
    ///
    /// Returns `None` for rigid parameters.
    pub fn spring_coefficients(&self, dt: f64) -> Option<(f64, f64)> {
        if self.is_rigid() {
            return None;
        }
        Some((self.erp / (self.cfm * dt), (1.0 - self.erp) / self.cfm))
    }
}

/// Unordered pair of bodies; `(a, b)` and `(b, a)` compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyPair(BodyId, BodyId);

impl BodyPair {
    /// Normalize the pair order.
    pub fn new(a: BodyId, b: BodyId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// The two bodies, lowest id first.
    pub fn bodies(&self) -> (BodyId, BodyId) {
        (self.0, self.1)
    }

    /// Whether `body` is one of the endpoints.
    pub fn contains(&self, body: BodyId) -> bool {
        self.0 == body || self.1 == body
    }
}

/// Build a distance spring between two body centers.
///
/// All linear axes are coupled so the motor acts on the center distance.
pub fn create_spring_joint(rest_length: f64, params: ConstraintParams, dt: f64) -> GenericJoint {
    let (stiffness, damping) = params.spring_coefficients(dt).unwrap_or((0.0, 0.0));
    GenericJointBuilder::new(JointAxesMask::empty())
        .coupled_axes(JointAxesMask::LIN_AXES)
        .motor_position(
            JointAxis::LinX,
            rest_length as f32,
            stiffness as f32,
            damping as f32,
        )
        .motor_model(JointAxis::LinX, MotorModel::ForceBased)
        .contacts_enabled(false)
        .build()
}

/// Build a fixed joint welding two bodies in their current relative pose.
///
/// The shared anchor sits at the midpoint of the two centers, with both
/// joint frames aligned to the world axes at creation time.
pub fn create_fixed_joint(pose1: &Isometry3<f32>, pose2: &Isometry3<f32>) -> GenericJoint {
    let center = (pose1.translation.vector + pose2.translation.vector) / 2.0;
    let mid = Isometry3::from_parts(Translation3::from(center), UnitQuaternion::identity());
    GenericJointBuilder::new(JointAxesMask::LOCKED_FIXED_AXES)
        .local_frame1(pose1.inverse() * mid)
        .local_frame2(pose2.inverse() * mid)
        .contacts_enabled(false)
        .build()
}

/// Retarget the rest length of a spring built by [`create_spring_joint`].
pub fn set_spring_rest_length(
    joint: &mut GenericJoint,
    rest_length: f64,
    params: ConstraintParams,
    dt: f64,
) {
    if let Some((stiffness, damping)) = params.spring_coefficients(dt) {
        joint.set_motor_position(
            JointAxis::LinX,
            rest_length as f32,
            stiffness as f32,
            damping as f32,
        );
    }
}
