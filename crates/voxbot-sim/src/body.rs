//! Point-mass bodies.
//!
//! A [`SphereSpec`] is an unassembled body. Assembling it into a
//! [`World`](crate::World) creates the backend rigid body and yields a
//! [`Body`] addressed by a [`BodyId`].

use std::cell::Cell;

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use rapier3d::dynamics::{RigidBody, RigidBodyHandle, RigidBodySet};
use rapier3d::geometry::ColliderHandle;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use voxbot_math::{BoundingBox, Rotation, Vec3};

new_key_type! {
    /// Stable handle of a body inside one world.
    pub struct BodyId;
}

/// Parameters of a sphere body before it is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereSpec {
    /// Collision radius.
    pub radius: f64,
    /// Mass in kg.
    pub mass: f64,
    /// Coulomb friction coefficient.
    pub friction: f64,
}

/// A value cached for one simulated time.
#[derive(Debug)]
struct Timed<T: Copy>(Cell<Option<(f64, T)>>);

impl<T: Copy> Default for Timed<T> {
    fn default() -> Self {
        Self(Cell::new(None))
    }
}

impl<T: Copy> Timed<T> {
    fn get_or(&self, t: f64, compute: impl FnOnce() -> T) -> T {
        match self.0.get() {
            Some((cached_t, value)) if cached_t == t => value,
            _ => {
                let value = compute();
                self.0.set(Some((t, value)));
                value
            }
        }
    }

    fn clear(&self) {
        self.0.set(None);
    }
}

/// An assembled sphere body.
///
/// State queries are keyed by simulated time: asking for the same `t` twice
/// returns the cached value, asking for a different `t` recomputes it.
#[derive(Debug)]
pub struct Body {
    handle: RigidBodyHandle,
    collider: ColliderHandle,
    spec: SphereSpec,
    position: Timed<Vec3>,
    velocity: Timed<Vec3>,
    orientation: Timed<Rotation>,
    bounding_box: Timed<BoundingBox>,
}

impl Body {
    pub(crate) fn new(handle: RigidBodyHandle, collider: ColliderHandle, spec: SphereSpec) -> Self {
        Self {
            handle,
            collider,
            spec,
            position: Timed::default(),
            velocity: Timed::default(),
            orientation: Timed::default(),
            bounding_box: Timed::default(),
        }
    }

    /// Backend rigid body handle.
    pub fn handle(&self) -> RigidBodyHandle {
        self.handle
    }

    /// Backend collider handle.
    pub fn collider(&self) -> ColliderHandle {
        self.collider
    }

    /// Body mass.
    pub fn mass(&self) -> f64 {
        self.spec.mass
    }

    /// Collision radius.
    pub fn radius(&self) -> f64 {
        self.spec.radius
    }

    /// Center position at time `t`.
    pub fn position(&self, bodies: &RigidBodySet, t: f64) -> Vec3 {
        self.position.get_or(t, || self.current_position(bodies))
    }

    /// Linear velocity at time `t`.
    pub fn velocity(&self, bodies: &RigidBodySet, t: f64) -> Vec3 {
        self.velocity.get_or(t, || {
            rigid(bodies, self.handle)
                .map(|b| to_vec3(b.linvel()))
                .unwrap_or_else(Vec3::zeros)
        })
    }

    /// Orientation at time `t`.
    pub fn orientation(&self, bodies: &RigidBodySet, t: f64) -> Rotation {
        self.orientation.get_or(t, || {
            rigid(bodies, self.handle)
                .map(|b| b.rotation().cast::<f64>())
                .unwrap_or_else(UnitQuaternion::identity)
        })
    }

    /// Axis-aligned bounds at time `t`.
    pub fn bounding_box(&self, bodies: &RigidBodySet, t: f64) -> BoundingBox {
        self.bounding_box.get_or(t, || {
            BoundingBox::around(&self.position(bodies, t), self.spec.radius)
        })
    }

    /// Uncached center position, as the backend holds it right now.
    pub fn current_position(&self, bodies: &RigidBodySet) -> Vec3 {
        rigid(bodies, self.handle)
            .map(|b| to_vec3(b.translation()))
            .unwrap_or_else(Vec3::zeros)
    }

    /// Teleport the body by `offset`.
    pub fn translate(&self, bodies: &mut RigidBodySet, offset: &Vec3) {
        let target = self.current_position(bodies) + offset;
        self.place(bodies, &target, None);
    }

    /// Rotate the body about `pivot` by Euler angles (radians).
    pub fn rotate(&self, bodies: &mut RigidBodySet, pivot: &Vec3, roll: f64, pitch: f64, yaw: f64) {
        let target = voxbot_math::rotate_about(&self.current_position(bodies), pivot, roll, pitch, yaw);
        let turn = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
        self.place(bodies, &target, Some(turn));
    }

    fn place(&self, bodies: &mut RigidBodySet, target: &Vec3, turn: Option<Rotation>) {
        if let Some(body) = bodies.get_mut(self.handle) {
            let rotation = match turn {
                Some(turn) => turn.cast::<f32>() * body.rotation(),
                None => *body.rotation(),
            };
            let translation = Translation3::new(target.x as f32, target.y as f32, target.z as f32);
            body.set_position(Isometry3::from_parts(translation, rotation), true);
        }
        self.invalidate();
    }

    /// Drop every cached value.
    pub fn invalidate(&self) {
        self.position.clear();
        self.velocity.clear();
        self.orientation.clear();
        self.bounding_box.clear();
    }
}

fn rigid(bodies: &RigidBodySet, handle: RigidBodyHandle) -> Option<&RigidBody> {
    bodies.get(handle)
}

pub(crate) fn to_vec3(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(f64::from(v.x), f64::from(v.y), f64::from(v.z))
}

pub(crate) fn to_backend(v: &Vec3) -> Vector3<f32> {
    Vector3::new(v.x as f32, v.y as f32, v.z as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::dynamics::RigidBodyBuilder;
    use rapier3d::geometry::{ColliderBuilder, ColliderSet};

    fn sphere_at(z: f32) -> (RigidBodySet, Body) {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();
        let handle = bodies.insert(RigidBodyBuilder::dynamic().translation(Vector3::new(0.0, 0.0, z)));
        let collider = colliders.insert_with_parent(ColliderBuilder::ball(0.1), handle, &mut bodies);
        let spec = SphereSpec {
            radius: 0.1,
            mass: 1.0,
            friction: 1.0,
        };
        (bodies, Body::new(handle, collider, spec))
    }

    #[test]
    fn test_position_cached_per_time() {
        let (mut bodies, body) = sphere_at(1.0);
        assert!((body.position(&bodies, 0.0).z - 1.0).abs() < 1e-6);

        // Move the backend body behind the cache's back.
        bodies
            .get_mut(body.handle())
            .unwrap()
            .set_translation(Vector3::new(0.0, 0.0, 2.0), true);
        assert!((body.position(&bodies, 0.0).z - 1.0).abs() < 1e-6);
        assert!((body.position(&bodies, 0.1).z - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounding_box_around_center() {
        let (bodies, body) = sphere_at(1.0);
        let bb = body.bounding_box(&bodies, 0.0);
        assert!((bb.min.z - 0.9).abs() < 1e-6);
        assert!((bb.max.z - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_translate_invalidates_cache() {
        let (mut bodies, body) = sphere_at(1.0);
        let _ = body.position(&bodies, 0.0);
        body.translate(&mut bodies, &Vec3::new(1.0, 0.0, 0.0));
        let p = body.position(&bodies, 0.0);
        assert!((p.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotate_about_pivot() {
        let (mut bodies, body) = sphere_at(0.0);
        body.translate(&mut bodies, &Vec3::new(1.0, 0.0, 0.0));
        body.rotate(&mut bodies, &Vec3::zeros(), 0.0, 0.0, std::f64::consts::PI);
        let p = body.current_position(&bodies);
        assert!((p.x + 1.0).abs() < 1e-5);
        assert!(p.y.abs() < 1e-5);
    }
}
