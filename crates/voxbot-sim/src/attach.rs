//! Runtime attachment, detachment and attraction between components.

use tracing::debug;
use voxbot_math::{BoundingBox, Vec3};

use crate::body::BodyId;
use crate::component::ComponentId;
use crate::error::{Result, SimError};
use crate::joints::ConstraintParams;
use crate::world::World;

/// Greedy nearest-first matching between two body groups.
///
/// Repeatedly takes the globally closest remaining pair, stops once it is
/// farther than `max_distance`, and discards every other pair sharing a body
/// with it. Returns the taken pairs in the order they were taken; no body
/// appears twice.
pub fn greedy_matching(
    requester: &[(BodyId, Vec3)],
    target: &[(BodyId, Vec3)],
    max_distance: f64,
) -> Vec<(BodyId, BodyId, f64)> {
    let mut pairs = Vec::with_capacity(requester.len() * target.len());
    for (i, (_, pa)) in requester.iter().enumerate() {
        for (j, (_, pb)) in target.iter().enumerate() {
            pairs.push((i, j, (pa - pb).norm()));
        }
    }
    // Stable sort keeps enumeration order among equal distances.
    pairs.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut used_a = vec![false; requester.len()];
    let mut used_b = vec![false; target.len()];
    let mut taken = Vec::new();
    for (i, j, distance) in pairs {
        if distance > max_distance {
            break;
        }
        if used_a[i] || used_b[j] {
            continue;
        }
        used_a[i] = true;
        used_b[j] = true;
        taken.push((requester[i].0, target[j].0, distance));
    }
    taken
}

/// Nearest attachable component to `centroid`, with its centroid.
///
/// Candidates are attachable components other than the requester (and other
/// than any component of the requester's agent) whose bounds overlap a cube of
/// half-width `max_attach_distance` around `centroid`. The nearest one is
/// rejected if farther than `max_attract_distance`.
pub fn nearest_attachable(world: &World, requester: ComponentId, centroid: &Vec3) -> Option<(ComponentId, Vec3)> {
    let config = world.config();
    let cube = BoundingBox::around(centroid, config.max_attach_distance);
    let owner = world.agent_of(requester);

    let mut best: Option<(ComponentId, Vec3, f64)> = None;
    for (id, component) in world.components() {
        if id == requester || !component.is_attachable() {
            continue;
        }
        if owner.is_some() && component.owner() == owner {
            continue;
        }
        let Ok(bounds) = world.component_bounding_box(id) else {
            continue;
        };
        if !bounds.overlaps(&cube) {
            continue;
        }
        let Ok(center) = world.component_center(id) else {
            continue;
        };
        let distance = (center - centroid).norm();
        if best.map_or(true, |(_, _, d)| distance < d) {
            best = Some((id, center, distance));
        }
    }

    best.filter(|&(_, _, d)| d <= config.max_attract_distance)
        .map(|(id, center, _)| (id, center))
}

fn positions(world: &World, group: &[BodyId]) -> Result<Vec<(BodyId, Vec3)>> {
    group
        .iter()
        .map(|&b| world.body_position(b).map(|p| (b, p)).ok_or(SimError::UnknownBody))
        .collect()
}

fn group_centroid(world: &World, requester: ComponentId, group: &[BodyId]) -> Result<Vec3> {
    if group.is_empty() {
        return Err(SimError::EmptyGroup);
    }
    world.component(requester).ok_or(SimError::UnknownComponent)?;
    world.centroid(group).ok_or(SimError::UnknownBody)
}

/// Spring the bodies of `group` to the nearest attachable component.
///
/// Returns the number of joints created; zero when there is no target.
pub fn request_attachment(
    world: &mut World,
    requester: ComponentId,
    group: &[BodyId],
    spring_constant: f64,
    damping_constant: f64,
) -> Result<usize> {
    let centroid = group_centroid(world, requester, group)?;
    let Some((target, _)) = nearest_attachable(world, requester, &centroid) else {
        return Ok(0);
    };

    // Lightest candidate group wins; the first one on ties.
    let candidates = world
        .component(target)
        .map(|c| c.attach_groups())
        .unwrap_or_default();
    let mut chosen: Option<(Vec<BodyId>, f64)> = None;
    for candidate in candidates {
        let mass = world.group_mass(&candidate);
        if chosen.as_ref().map_or(true, |(_, m)| mass < *m) {
            chosen = Some((candidate, mass));
        }
    }
    let Some((target_group, _)) = chosen else {
        return Ok(0);
    };

    let config = world.config();
    let max_distance = config.max_attach_distance;
    let rest_length = config.attach_spring_rest_distance;
    let params = ConstraintParams::from_spring(spring_constant, damping_constant, world.dt());

    let matched = greedy_matching(&positions(world, group)?, &positions(world, &target_group)?, max_distance);
    let mut created = 0;
    for (a, b, _) in matched {
        if !world.spring_joints_between(a, b).is_empty() || !world.fixed_joints_between(a, b).is_empty() {
            continue;
        }
        world.add_spring_joint_with(a, b, rest_length, params)?;
        record(world, requester, a, b);
        record(world, target, b, a);
        created += 1;
    }

    debug!(created, "attachment");
    Ok(created)
}

fn record(world: &mut World, component: ComponentId, body: BodyId, partner: BodyId) {
    if let Some(c) = world.component_mut(component) {
        c.attachments.entry(body).or_default().push(partner);
    }
}

/// Release every attachment of the bodies in `group`.
///
/// Returns the number of joints destroyed.
pub fn request_detachment(world: &mut World, requester: ComponentId, group: &[BodyId]) -> Result<usize> {
    let mut removed = 0;
    for &body in group {
        let partners = world
            .component_mut(requester)
            .ok_or(SimError::UnknownComponent)?
            .attachments
            .remove(&body)
            .unwrap_or_default();
        for partner in partners {
            removed += world.remove_spring_joints(body, partner);
            let Some(other) = world.component_of(partner) else {
                continue;
            };
            if let Some(c) = world.component_mut(other) {
                if let Some(list) = c.attachments.get_mut(&partner) {
                    list.retain(|&b| b != body);
                    if list.is_empty() {
                        c.attachments.remove(&partner);
                    }
                }
            }
        }
    }
    if removed > 0 {
        debug!(removed, "detachment");
    }
    Ok(removed)
}

/// Push the bodies of `group` toward the nearest attachable component.
///
/// Returns whether a target was found.
pub fn request_attraction(world: &mut World, requester: ComponentId, group: &[BodyId]) -> Result<bool> {
    let centroid = group_centroid(world, requester, group)?;
    let Some((_, target)) = nearest_attachable(world, requester, &centroid) else {
        return Ok(false);
    };
    let magnitude = world.config().attract_force_module * world.dt();
    for (body, position) in positions(world, group)? {
        if let Some(direction) = (target - position).try_normalize(f64::EPSILON) {
            world.apply_impulse(body, &(direction * magnitude))?;
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::SphereSpec;
    use crate::config::WorldConfig;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<BodyId> {
        let mut map: SlotMap<BodyId, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_greedy_takes_closest_first() {
        let b = ids(4);
        let requester = [(b[0], Vec3::new(0.0, 0.0, 0.0)), (b[1], Vec3::new(1.0, 0.0, 0.0))];
        let target = [(b[2], Vec3::new(0.9, 0.0, 0.0)), (b[3], Vec3::new(0.0, 0.5, 0.0))];
        let matched = greedy_matching(&requester, &target, 2.0);
        assert_eq!(matched.len(), 2);
        assert_eq!((matched[0].0, matched[0].1), (b[1], b[2]));
        assert_eq!((matched[1].0, matched[1].1), (b[0], b[3]));
    }

    #[test]
    fn test_greedy_stops_past_max_distance() {
        let b = ids(4);
        let requester = [(b[0], Vec3::zeros()), (b[1], Vec3::new(5.0, 0.0, 0.0))];
        let target = [(b[2], Vec3::new(0.1, 0.0, 0.0)), (b[3], Vec3::new(0.2, 0.0, 0.0))];
        let matched = greedy_matching(&requester, &target, 1.0);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].1, b[2]);
    }

    #[test]
    fn test_greedy_never_reuses_a_body() {
        let b = ids(6);
        let requester = [
            (b[0], Vec3::zeros()),
            (b[1], Vec3::new(0.01, 0.0, 0.0)),
            (b[2], Vec3::new(0.02, 0.0, 0.0)),
        ];
        let target = [
            (b[3], Vec3::new(0.0, 0.1, 0.0)),
            (b[4], Vec3::new(0.0, 0.2, 0.0)),
            (b[5], Vec3::new(0.0, 0.3, 0.0)),
        ];
        let matched = greedy_matching(&requester, &target, 1.0);
        let mut seen: Vec<BodyId> = matched.iter().flat_map(|&(a, b, _)| [a, b]).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), matched.len() * 2);
    }

    fn ball() -> SphereSpec {
        SphereSpec {
            radius: 0.1,
            mass: 1.0,
            friction: 1.0,
        }
    }

    #[test]
    fn test_no_target_is_noop() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let lonely = world.add_passive_sphere(ball(), &Vec3::new(0.0, 0.0, 1.0), true);
        let group = world.component(lonely).unwrap().bodies();
        assert_eq!(request_attachment(&mut world, lonely, &group, 100.0, 1.0).unwrap(), 0);
        assert!(!request_attraction(&mut world, lonely, &group).unwrap());
        assert_eq!(request_detachment(&mut world, lonely, &group).unwrap(), 0);
    }

    #[test]
    fn test_non_attachable_ignored() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let a = world.add_passive_sphere(ball(), &Vec3::new(0.0, 0.0, 1.0), true);
        world.add_passive_sphere(ball(), &Vec3::new(0.3, 0.0, 1.0), false);
        let centroid = world.component_center(a).unwrap();
        assert!(nearest_attachable(&world, a, &centroid).is_none());
    }

    #[test]
    fn test_empty_group_rejected() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let a = world.add_passive_sphere(ball(), &Vec3::new(0.0, 0.0, 1.0), true);
        assert!(matches!(
            request_attachment(&mut world, a, &[], 100.0, 1.0),
            Err(SimError::EmptyGroup)
        ));
    }

    #[test]
    fn test_attach_then_detach_spheres() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let a = world.add_passive_sphere(ball(), &Vec3::new(0.0, 0.0, 1.0), true);
        let b = world.add_passive_sphere(ball(), &Vec3::new(0.4, 0.0, 1.0), true);
        let group_a = world.component(a).unwrap().bodies();
        let group_b = world.component(b).unwrap().bodies();

        assert_eq!(request_attachment(&mut world, a, &group_a, 100.0, 1.0).unwrap(), 1);
        assert_eq!(world.attached_bodies(group_a[0]), group_b);
        assert_eq!(world.attached_bodies(group_b[0]), group_a);
        let joint = world.spring_joints_between(group_a[0], group_b[0])[0];
        assert!((joint.rest_length() - world.config().attach_spring_rest_distance).abs() < 1e-12);

        // Already jointed: nothing new.
        assert_eq!(request_attachment(&mut world, a, &group_a, 100.0, 1.0).unwrap(), 0);

        assert_eq!(request_detachment(&mut world, a, &group_a).unwrap(), 1);
        assert!(world.attached_bodies(group_a[0]).is_empty());
        assert!(world.attached_bodies(group_b[0]).is_empty());
        assert_eq!(world.spring_joint_count(), 0);
    }

    #[test]
    fn test_attraction_pushes_toward_target() {
        let mut world = World::new(WorldConfig::default()).unwrap();
        let a = world.add_passive_sphere(ball(), &Vec3::new(0.0, 0.0, 1.0), true);
        world.add_passive_sphere(ball(), &Vec3::new(0.8, 0.0, 1.0), true);
        // Let the backend settle mass properties first.
        world.tick().unwrap();
        let group = world.component(a).unwrap().bodies();
        assert!(request_attraction(&mut world, a, &group).unwrap());
        let v = world.body_velocity(group[0]).unwrap();
        assert!(v.x > 0.0);
    }
}
