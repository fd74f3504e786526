//! Collision shapes and contact filtering.

use std::collections::HashSet;

use nalgebra::Vector3;
use rapier3d::geometry::{Collider, ColliderBuilder, ColliderHandle, SharedShape, SolverFlags};
use rapier3d::pipeline::{ActiveHooks, PairFilterContext, PhysicsHooks};

use crate::body::SphereSpec;
use crate::config::Terrain;

/// Thickness of terrain slabs below their walkable surface.
const SLAB_THICKNESS: f32 = 1.0;

/// Build the collider of a sphere body.
///
/// The collider carries the body's whole mass and opts into contact filtering
/// so collision exceptions apply to it.
pub fn sphere_collider(spec: &SphereSpec) -> Collider {
    ColliderBuilder::ball(spec.radius as f32)
        .mass(spec.mass as f32)
        .friction(spec.friction as f32)
        .restitution(0.0)
        .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
        .build()
}

/// Generate the static terrain colliders.
pub fn terrain_colliders(terrain: &Terrain) -> Vec<Collider> {
    match *terrain {
        Terrain::Flat { half_size } => {
            let h = half_size as f32;
            vec![slab(h, h, SLAB_THICKNESS / 2.0, Vector3::new(0.0, 0.0, -SLAB_THICKNESS / 2.0))]
        }
        Terrain::Steps {
            step_length,
            step_height,
            count,
        } => {
            let length = step_length as f32;
            let rise = step_height as f32;
            let total = length * count.max(1) as f32;
            // Ground covers the approach; the last step extends as a plateau.
            let mut colliders = vec![slab(
                total * 2.0,
                total * 2.0,
                SLAB_THICKNESS / 2.0,
                Vector3::new(0.0, 0.0, -SLAB_THICKNESS / 2.0),
            )];
            for i in 0..count {
                let top = rise * (i + 1) as f32;
                let is_last = i + 1 == count;
                let span = if is_last { length + total } else { length };
                let x0 = length * i as f32;
                colliders.push(slab(
                    span / 2.0,
                    total * 2.0,
                    top / 2.0,
                    Vector3::new(x0 + span / 2.0, 0.0, top / 2.0),
                ));
            }
            colliders
        }
    }
}

fn slab(hx: f32, hy: f32, hz: f32, center: Vector3<f32>) -> Collider {
    ColliderBuilder::new(SharedShape::cuboid(hx, hy, hz.max(1e-3)))
        .translation(center)
        .friction(1.0)
        .restitution(0.0)
        .build()
}

/// Symmetric set of collider pairs that never produce contact constraints.
#[derive(Debug, Default)]
pub struct CollisionExclusions {
    pairs: HashSet<(ColliderHandle, ColliderHandle)>,
}

impl CollisionExclusions {
    /// Record that `a` and `b` must not collide.
    pub fn insert(&mut self, a: ColliderHandle, b: ColliderHandle) {
        self.pairs.insert((a, b));
        self.pairs.insert((b, a));
    }

    /// Whether the pair is excluded, in either order.
    pub fn contains(&self, a: ColliderHandle, b: ColliderHandle) -> bool {
        self.pairs.contains(&(a, b))
    }
}

impl PhysicsHooks for CollisionExclusions {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        if self.contains(context.collider1, context.collider2) {
            None
        } else {
            Some(SolverFlags::COMPUTE_IMPULSES)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapier3d::dynamics::{RigidBodyBuilder, RigidBodySet};
    use rapier3d::geometry::ColliderSet;

    #[test]
    fn test_sphere_collider_mass() {
        let spec = SphereSpec {
            radius: 0.2,
            mass: 0.125,
            friction: 0.8,
        };
        let collider = sphere_collider(&spec);
        assert!(collider.shape().as_ball().is_some());
        assert!((collider.mass() - 0.125).abs() < 1e-6);
        assert!(collider.active_hooks().contains(ActiveHooks::FILTER_CONTACT_PAIRS));
    }

    #[test]
    fn test_flat_terrain_top_at_zero() {
        let colliders = terrain_colliders(&Terrain::Flat { half_size: 10.0 });
        assert_eq!(colliders.len(), 1);
        let aabb = colliders[0].compute_aabb();
        assert!(aabb.maxs.z.abs() < 1e-6);
    }

    #[test]
    fn test_steps_terrain() {
        let colliders = terrain_colliders(&Terrain::Steps {
            step_length: 1.0,
            step_height: 0.1,
            count: 3,
        });
        assert_eq!(colliders.len(), 4);
        let top = colliders[3].compute_aabb();
        assert!((top.maxs.z - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_exclusions_symmetric() {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();
        let rb = bodies.insert(RigidBodyBuilder::dynamic());
        let a = colliders.insert_with_parent(ColliderBuilder::ball(0.1), rb, &mut bodies);
        let b = colliders.insert_with_parent(ColliderBuilder::ball(0.1), rb, &mut bodies);

        let mut exclusions = CollisionExclusions::default();
        exclusions.insert(a, b);
        assert!(exclusions.contains(b, a));
        assert!(exclusions.contains(a, b));
        assert!(!exclusions.contains(a, a));
    }
}
