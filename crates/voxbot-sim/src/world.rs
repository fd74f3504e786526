//! Simulation world and the fixed-order tick loop, on top of Rapier3d.

use std::collections::{BTreeMap, HashMap};

use rapier3d::dynamics::{
    CCDSolver, ImpulseJointHandle, ImpulseJointSet, IntegrationParameters, IslandManager,
    MultibodyJointSet, RigidBodyBuilder, RigidBodySet,
};
use rapier3d::geometry::{BroadPhaseMultiSap, ColliderHandle, ColliderSet, NarrowPhase};
use rapier3d::pipeline::{PhysicsPipeline, QueryFilter, QueryPipeline};
use slotmap::{SecondaryMap, SlotMap};
use tracing::{debug, info};
use voxbot_math::{weighted_centroid, BoundingBox, Vec3};

use crate::action::Action;
use crate::agent::{Agent, AgentId};
use crate::body::{to_backend, Body, BodyId, SphereSpec};
use crate::colliders::{sphere_collider, terrain_colliders, CollisionExclusions};
use crate::component::{Component, ComponentId, ComponentKind};
use crate::config::WorldConfig;
use crate::error::{Result, SimError};
use crate::joints::{self, BodyPair, ConstraintParams};
use crate::sensor::{Readings, Sensor, SensorKind};
use crate::signal::{SignalBits, SignalRay, DETECT_ALL};
use crate::snapshot::{ComponentSnapshot, JointEndpoints, Snapshot};
use crate::voxel::{edge_pairs, joint_pairs, vertex_offset, JointOption, Voxel, VoxelParams, VoxelShape, CORNERS, EDGES};

/// One registered spring joint.
#[derive(Debug, Clone, Copy)]
pub struct SpringJoint {
    handle: ImpulseJointHandle,
    params: ConstraintParams,
    rest_length: f64,
}

impl SpringJoint {
    /// Backend joint handle.
    pub fn handle(&self) -> ImpulseJointHandle {
        self.handle
    }

    /// Solver parameters.
    pub fn params(&self) -> ConstraintParams {
        self.params
    }

    /// Current target distance.
    pub fn rest_length(&self) -> f64 {
        self.rest_length
    }
}

/// A self-contained simulation: bodies, joints, agents and simulated time.
///
/// Nothing is shared between two worlds. A world is stepped by [`tick`], which
/// runs, in order: integration, the contact pass, the signal pass, the time
/// advance, sensing and control for every agent, action execution, and the
/// snapshot.
///
/// [`tick`]: World::tick
pub struct World {
    config: WorldConfig,
    t: f64,

    // Rapier components
    pipeline: PhysicsPipeline,
    gravity: nalgebra::Vector3<f32>,
    integration_params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    rigid_bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    exclusions: CollisionExclusions,

    // Registries
    bodies: SlotMap<BodyId, Body>,
    components: SlotMap<ComponentId, Component>,
    body_component: SecondaryMap<BodyId, ComponentId>,
    collider_body: HashMap<ColliderHandle, BodyId>,
    detectors: SecondaryMap<BodyId, u64>,
    agents: BTreeMap<AgentId, Box<dyn Agent>>,
    next_agent: u32,
    passive: Vec<ComponentId>,
    spring_joints: BTreeMap<BodyPair, Vec<SpringJoint>>,
    fixed_joints: BTreeMap<BodyPair, Vec<ImpulseJointHandle>>,

    // Pulses emitted during the last action pass
    signal_pulses: Vec<Vec<SignalRay>>,
}

impl World {
    /// Create an empty world with the configured terrain.
    pub fn new(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        let terrain = config.terrain.ok_or(SimError::MissingTerrain)?;

        let mut integration_params = IntegrationParameters::default();
        integration_params.dt = config.dt as f32;

        let mut colliders = ColliderSet::new();
        for collider in terrain_colliders(&terrain) {
            colliders.insert(collider);
        }

        info!(dt = config.dt, ?terrain, "created world");

        Ok(Self {
            gravity: to_backend(&config.gravity),
            config,
            t: 0.0,
            pipeline: PhysicsPipeline::new(),
            integration_params,
            islands: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_bodies: RigidBodySet::new(),
            colliders,
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            exclusions: CollisionExclusions::default(),
            bodies: SlotMap::with_key(),
            components: SlotMap::with_key(),
            body_component: SecondaryMap::new(),
            collider_body: HashMap::new(),
            detectors: SecondaryMap::new(),
            agents: BTreeMap::new(),
            next_agent: 0,
            passive: Vec::new(),
            spring_joints: BTreeMap::new(),
            fixed_joints: BTreeMap::new(),
            signal_pulses: Vec::new(),
        })
    }

    /// Advance the simulation by one timestep.
    ///
    /// Errors raised by a controller or an action abort the tick and leave the
    /// world in an unspecified state; callers should drop it.
    pub fn tick(&mut self) -> Result<Snapshot> {
        self.step_physics();
        let contacts = self.contact_pass();
        let signals = self.signal_pass();
        self.t += self.config.dt;

        let actions = self.control_pass()?;
        for action in &actions {
            action.execute(self)?;
        }

        debug!(
            t = self.t,
            contacts,
            signals,
            actions = actions.len(),
            "tick"
        );
        Ok(self.snapshot(actions))
    }

    fn step_physics(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &self.exclusions,
            &(),
        );
    }

    /// Flag touch sensors of components that touched something else.
    fn contact_pass(&mut self) -> usize {
        let mut touched = Vec::new();
        let mut count = 0;
        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact || self.exclusions.contains(pair.collider1, pair.collider2) {
                continue;
            }
            count += 1;
            // Terrain colliders have no component.
            let a = self.collider_component(pair.collider1);
            let b = self.collider_component(pair.collider2);
            if a != b {
                touched.extend(a);
                touched.extend(b);
            }
        }
        for id in touched {
            if let Some(voxel) = self.components.get_mut(id).and_then(Component::as_voxel_mut) {
                voxel.sensors_mut().iter_mut().for_each(Sensor::touch);
            }
        }
        count
    }

    /// Resolve the pulses emitted last tick, then drop them.
    fn signal_pass(&mut self) -> usize {
        if self.signal_pulses.is_empty() {
            return 0;
        }
        self.query_pipeline.update(&self.colliders);
        let pulses = std::mem::take(&mut self.signal_pulses);
        let mut delivered = 0;
        for rays in &pulses {
            // A component hears a pulse once, at the nearest hit of any ray.
            let mut nearest: BTreeMap<ComponentId, (f64, Vec3, SignalBits)> = BTreeMap::new();
            for ray in rays {
                for (component, toi) in self.ray_hits(ray) {
                    let point = ray.origin + ray.direction * toi;
                    nearest
                        .entry(component)
                        .and_modify(|best| {
                            if toi < best.0 {
                                *best = (toi, point, ray.bits);
                            }
                        })
                        .or_insert((toi, point, ray.bits));
                }
            }
            for (component, (_, point, bits)) in nearest {
                self.deliver(component, &point, bits);
                delivered += 1;
            }
        }
        delivered
    }

    /// Nearest hit distance per struck detector component, excluding the emitter.
    fn ray_hits(&self, signal: &SignalRay) -> Vec<(ComponentId, f64)> {
        let ray = parry3d::query::Ray::new(
            nalgebra::Point3::from(to_backend(&signal.origin)),
            to_backend(&signal.direction),
        );
        let mut nearest: BTreeMap<ComponentId, f32> = BTreeMap::new();
        self.query_pipeline.intersections_with_ray(
            &self.rigid_bodies,
            &self.colliders,
            &ray,
            signal.range as f32,
            true,
            QueryFilter::default(),
            |handle, hit| {
                let listener = self.collider_body.get(&handle).and_then(|&body| {
                    let bits = self.detectors.get(body)?;
                    signal.bits.accepted_by(*bits).then_some(body)
                });
                let component = listener.and_then(|body| self.body_component.get(body).copied());
                if let Some(component) = component.filter(|&c| c != signal.emitter) {
                    let toi = hit.time_of_impact;
                    nearest
                        .entry(component)
                        .and_modify(|best| *best = best.min(toi))
                        .or_insert(toi);
                }
                true
            },
        );
        nearest.into_iter().map(|(c, toi)| (c, f64::from(toi))).collect()
    }

    fn deliver(&mut self, component: ComponentId, point: &Vec3, bits: SignalBits) {
        let side = match self.live_shape(component) {
            Some(shape) => shape.nearest_side(point),
            None => return,
        };
        if let Some(voxel) = self.components.get_mut(component).and_then(Component::as_voxel_mut) {
            for sensor in voxel.sensors_mut() {
                sensor.receive(side, bits.channel(), bits.value());
            }
        }
    }

    /// Let every agent sense and act, collecting their actions.
    fn control_pass(&mut self) -> Result<Vec<Action>> {
        let mut agents = std::mem::take(&mut self.agents);
        let mut actions = Vec::new();
        let mut outcome = Ok(());
        for agent in agents.values_mut() {
            match agent.act(self) {
                Ok(emitted) => actions.extend(emitted),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        agents.append(&mut self.agents);
        self.agents = agents;
        outcome.map(|()| actions)
    }

    fn snapshot(&self, actions: Vec<Action>) -> Snapshot {
        let agents = self
            .agents
            .iter()
            .map(|(&id, agent)| {
                let mut snapshot = agent.snapshot(self);
                snapshot.id = id;
                snapshot
            })
            .collect();
        let passive = self
            .passive
            .iter()
            .filter_map(|&c| ComponentSnapshot::capture(self, c))
            .collect();
        let spring_joints = self.joint_endpoints(self.spring_joints.iter().map(|(p, j)| (p, j.len())));
        let fixed_joints = self.joint_endpoints(self.fixed_joints.iter().map(|(p, j)| (p, j.len())));
        Snapshot {
            t: self.t,
            agents,
            passive,
            actions,
            spring_joints,
            fixed_joints,
        }
    }

    fn joint_endpoints<'a>(
        &self,
        pairs: impl Iterator<Item = (&'a BodyPair, usize)>,
    ) -> Vec<JointEndpoints> {
        let mut out = Vec::new();
        for (pair, count) in pairs {
            let (a, b) = pair.bodies();
            if let (Some(pa), Some(pb)) = (self.body_position(a), self.body_position(b)) {
                out.extend(std::iter::repeat((pa, pb)).take(count));
            }
        }
        out
    }

    // ---------------------------------------------------------------------
    // Bodies and components
    // ---------------------------------------------------------------------

    /// Create a sphere body at `position`. The body has no component yet.
    pub(crate) fn add_sphere_body(&mut self, spec: SphereSpec, position: &Vec3) -> BodyId {
        let rigid = RigidBodyBuilder::dynamic()
            .translation(to_backend(position))
            .build();
        let handle = self.rigid_bodies.insert(rigid);
        let collider = self
            .colliders
            .insert_with_parent(sphere_collider(&spec), handle, &mut self.rigid_bodies);
        let id = self.bodies.insert(Body::new(handle, collider, spec));
        self.collider_body.insert(collider, id);
        id
    }

    fn register(&mut self, component: Component) -> ComponentId {
        let bodies = component.bodies();
        let id = self.components.insert(component);
        for body in bodies {
            self.body_component.insert(body, id);
        }
        id
    }

    /// Create a free sphere component.
    pub fn add_sphere(&mut self, spec: SphereSpec, position: &Vec3, attachable: bool) -> ComponentId {
        let body = self.add_sphere_body(spec, position);
        self.register(Component::new(ComponentKind::Sphere(body), attachable))
    }

    /// Create a voxel centered on `center`, with its corners, internal joints
    /// and self-collision exceptions.
    pub fn add_voxel(
        &mut self,
        params: VoxelParams,
        center: &Vec3,
        sensors: &[SensorKind],
        attachable: bool,
    ) -> Result<ComponentId> {
        params.validate()?;
        let sensors = sensors
            .iter()
            .map(|&kind| Sensor::new(kind))
            .collect::<Result<Vec<_>>>()?;

        let spec = params.corner_spec();
        let mut corners = [BodyId::default(); CORNERS];
        for (code, slot) in corners.iter_mut().enumerate() {
            *slot = self.add_sphere_body(spec, &(center + vertex_offset(code, params.side_length)));
        }
        for a in 0..CORNERS {
            for b in (a + 1)..CORNERS {
                self.add_collision_exception(corners[a], corners[b])?;
            }
        }

        let constraint = params.constraint(self.config.dt);
        for option in [JointOption::Edges, JointOption::Sides, JointOption::Internal] {
            if !params.joint_options.contains(&option) {
                continue;
            }
            for (a, b) in joint_pairs(option) {
                let (a, b) = (corners[a], corners[b]);
                let rest = (self.current_position(a)? - self.current_position(b)?).norm();
                self.add_spring_joint_with(a, b, rest, constraint)?;
            }
        }

        let voxel = Voxel::new(params, corners, sensors);
        if voxel.detects_signals() {
            for &body in &corners {
                self.detectors.insert(body, DETECT_ALL);
            }
        }
        Ok(self.register(Component::new(ComponentKind::Voxel(voxel), attachable)))
    }

    /// Add a sphere that belongs to no agent.
    pub fn add_passive_sphere(&mut self, spec: SphereSpec, position: &Vec3, attachable: bool) -> ComponentId {
        let id = self.add_sphere(spec, position, attachable);
        self.passive.push(id);
        id
    }

    /// Add a voxel that belongs to no agent.
    pub fn add_passive_voxel(
        &mut self,
        params: VoxelParams,
        center: &Vec3,
        attachable: bool,
    ) -> Result<ComponentId> {
        let id = self.add_voxel(params, center, &[], attachable)?;
        self.passive.push(id);
        Ok(id)
    }

    /// Assemble `agent` at `position` and register it under a fresh id.
    pub fn add_agent<A: Agent + 'static>(&mut self, mut agent: A, position: &Vec3) -> Result<AgentId> {
        agent.assemble(self, *position)?;
        let id = AgentId(self.next_agent);
        for &c in agent.components() {
            let component = self.components.get_mut(c).ok_or(SimError::UnknownComponent)?;
            component.owner = Some(id);
        }
        self.next_agent += 1;
        info!(agent = id.0, components = agent.components().len(), "registered agent");
        self.agents.insert(id, Box::new(agent));
        Ok(id)
    }

    /// Move every body of a component by `offset`.
    pub fn translate_component(&mut self, id: ComponentId, offset: &Vec3) -> Result<()> {
        let component = self.components.get(id).ok_or(SimError::UnknownComponent)?;
        for body in component.bodies() {
            let body = self.bodies.get(body).ok_or(SimError::UnknownBody)?;
            body.translate(&mut self.rigid_bodies, offset);
        }
        Ok(())
    }

    /// Rotate a component about its centroid by Euler angles (radians).
    pub fn rotate_component(&mut self, id: ComponentId, roll: f64, pitch: f64, yaw: f64) -> Result<()> {
        let pivot = self.component_center(id)?;
        let component = self.components.get(id).ok_or(SimError::UnknownComponent)?;
        for body in component.bodies() {
            let body = self.bodies.get(body).ok_or(SimError::UnknownBody)?;
            body.rotate(&mut self.rigid_bodies, &pivot, roll, pitch, yaw);
        }
        Ok(())
    }

    /// Move every component of an agent by `offset`.
    pub fn translate_agent(&mut self, id: AgentId, offset: &Vec3) -> Result<()> {
        for c in self.agent_components(id) {
            self.translate_component(c, offset)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Joints
    // ---------------------------------------------------------------------

    /// Spring two bodies at their current distance.
    pub fn add_spring_joint(&mut self, a: BodyId, b: BodyId, k: f64, c: f64) -> Result<ImpulseJointHandle> {
        let rest = (self.current_position(a)? - self.current_position(b)?).norm();
        let params = ConstraintParams::from_spring(k, c, self.config.dt);
        self.add_spring_joint_with(a, b, rest, params)
    }

    /// Spring two bodies with an explicit rest length. Rigid parameters
    /// produce a fixed joint instead.
    pub fn add_spring_joint_with(
        &mut self,
        a: BodyId,
        b: BodyId,
        rest_length: f64,
        params: ConstraintParams,
    ) -> Result<ImpulseJointHandle> {
        if params.is_rigid() {
            return self.add_fixed_joint(a, b);
        }
        let (ha, hb) = (self.handle(a)?, self.handle(b)?);
        let joint = joints::create_spring_joint(rest_length, params, self.config.dt);
        let handle = self.impulse_joints.insert(ha, hb, joint, true);
        self.spring_joints.entry(BodyPair::new(a, b)).or_default().push(SpringJoint {
            handle,
            params,
            rest_length,
        });
        Ok(handle)
    }

    /// Weld two bodies in their current relative pose.
    pub fn add_fixed_joint(&mut self, a: BodyId, b: BodyId) -> Result<ImpulseJointHandle> {
        let (ha, hb) = (self.handle(a)?, self.handle(b)?);
        let pose = |h| self.rigid_bodies.get(h).map(|rb| *rb.position()).ok_or(SimError::UnknownBody);
        let joint = joints::create_fixed_joint(&pose(ha)?, &pose(hb)?);
        let handle = self.impulse_joints.insert(ha, hb, joint, true);
        self.fixed_joints.entry(BodyPair::new(a, b)).or_default().push(handle);
        Ok(handle)
    }

    /// Destroy every spring joint between `a` and `b`. Returns how many.
    pub fn remove_spring_joints(&mut self, a: BodyId, b: BodyId) -> usize {
        let removed = self.spring_joints.remove(&BodyPair::new(a, b)).unwrap_or_default();
        for joint in &removed {
            self.impulse_joints.remove(joint.handle, true);
        }
        removed.len()
    }

    /// Destroy every fixed joint between `a` and `b`. Returns how many.
    pub fn remove_fixed_joints(&mut self, a: BodyId, b: BodyId) -> usize {
        let removed = self.fixed_joints.remove(&BodyPair::new(a, b)).unwrap_or_default();
        for &handle in &removed {
            self.impulse_joints.remove(handle, true);
        }
        removed.len()
    }

    /// Retarget every spring between `a` and `b`. Returns how many.
    pub fn set_spring_rest_length(&mut self, a: BodyId, b: BodyId, rest_length: f64) -> usize {
        let dt = self.config.dt;
        let Some(records) = self.spring_joints.get_mut(&BodyPair::new(a, b)) else {
            return 0;
        };
        for record in records.iter_mut() {
            record.rest_length = rest_length;
            if let Some(joint) = self.impulse_joints.get_mut(record.handle, true) {
                joints::set_spring_rest_length(&mut joint.data, rest_length, record.params, dt);
            }
        }
        records.len()
    }

    /// Prevent two bodies from ever producing contacts with each other.
    pub fn add_collision_exception(&mut self, a: BodyId, b: BodyId) -> Result<()> {
        let ca = self.bodies.get(a).ok_or(SimError::UnknownBody)?.collider();
        let cb = self.bodies.get(b).ok_or(SimError::UnknownBody)?.collider();
        self.exclusions.insert(ca, cb);
        Ok(())
    }

    /// Queue a signal ray for delivery during the next tick.
    pub fn emit_signal(&mut self, ray: SignalRay) {
        self.signal_pulses.push(vec![ray]);
    }

    /// Queue rays that carry one signal. Each component hears the pulse at
    /// most once, on the side struck by the nearest of its rays.
    pub fn emit_signal_pulse(&mut self, rays: Vec<SignalRay>) {
        if !rays.is_empty() {
            self.signal_pulses.push(rays);
        }
    }

    /// Apply a linear impulse to a body.
    pub fn apply_impulse(&mut self, id: BodyId, impulse: &Vec3) -> Result<()> {
        let handle = self.handle(id)?;
        let body = self.rigid_bodies.get_mut(handle).ok_or(SimError::UnknownBody)?;
        body.apply_impulse(to_backend(impulse), true);
        if let Some(body) = self.bodies.get(id) {
            body.invalidate();
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Voxels
    // ---------------------------------------------------------------------

    /// Read and clear every sensor of a voxel, in wiring order.
    pub fn read_sensors(&mut self, id: ComponentId) -> Result<Vec<f64>> {
        let shape = self.voxel_shape(id)?;
        let voxel = self.voxel(id)?;
        let velocity = weighted_centroid(voxel.corners().iter().filter_map(|&b| {
            let body = self.bodies.get(b)?;
            Some((body.mass(), body.velocity(&self.rigid_bodies, self.t)))
        }))
        .unwrap_or_else(Vec3::zeros);
        let readings = Readings {
            volume_ratio: shape.volume() / voxel.params().rest_volume(),
            velocity,
        };

        let voxel = self
            .components
            .get_mut(id)
            .and_then(Component::as_voxel_mut)
            .ok_or(SimError::UnknownComponent)?;
        let mut out = Vec::with_capacity(voxel.sensor_dimension());
        for sensor in voxel.sensors_mut() {
            sensor.read_into(&readings, &mut out);
        }
        Ok(out)
    }

    /// Set the 12 edge rest lengths of a voxel from inputs in `[-1, 1]`.
    ///
    /// Rigid voxels ignore actuation.
    pub fn actuate(&mut self, id: ComponentId, inputs: &[f64]) -> Result<()> {
        if inputs.len() != EDGES {
            return Err(SimError::DimensionMismatch {
                what: "actuation",
                expected: EDGES,
                actual: inputs.len(),
            });
        }
        let voxel = self.voxel(id)?;
        if voxel.params().rigid {
            return Ok(());
        }
        let corners = *voxel.corners();
        let lengths = voxel.edge_rest_lengths(inputs);
        for ((a, b), rest) in edge_pairs().into_iter().zip(lengths) {
            self.set_spring_rest_length(corners[a], corners[b], rest);
        }
        Ok(())
    }

    /// Geometry of a voxel at the current time.
    pub fn voxel_shape(&self, id: ComponentId) -> Result<VoxelShape> {
        let voxel = self.voxel(id)?;
        Ok(self.shape_with(voxel, |body| body.position(&self.rigid_bodies, self.t)))
    }

    /// Current voxel volume.
    pub fn current_volume(&self, id: ComponentId) -> Result<f64> {
        self.voxel_shape(id).map(|shape| shape.volume())
    }

    /// Shape from the backend's live positions, bypassing the time cache.
    fn live_shape(&self, id: ComponentId) -> Option<VoxelShape> {
        let voxel = self.components.get(id)?.as_voxel()?;
        Some(self.shape_with(voxel, |body| body.current_position(&self.rigid_bodies)))
    }

    fn shape_with(&self, voxel: &Voxel, position: impl Fn(&Body) -> Vec3) -> VoxelShape {
        let mut corners = [Vec3::zeros(); CORNERS];
        for (slot, &id) in corners.iter_mut().zip(voxel.corners()) {
            if let Some(body) = self.bodies.get(id) {
                *slot = position(body);
            }
        }
        VoxelShape {
            corners,
            radius: voxel.params().corner_radius(),
        }
    }

    fn voxel(&self, id: ComponentId) -> Result<&Voxel> {
        self.components
            .get(id)
            .and_then(Component::as_voxel)
            .ok_or(SimError::UnknownComponent)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Simulated time.
    pub fn t(&self) -> f64 {
        self.t
    }

    /// Fixed timestep.
    pub fn dt(&self) -> f64 {
        self.config.dt
    }

    /// Configuration the world was built with.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// A registered body.
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id)
    }

    /// A registered component.
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id)
    }

    pub(crate) fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id)
    }

    /// Every component, in slot order.
    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &Component)> {
        self.components.iter()
    }

    /// A registered agent. `None` for every id while agents are acting, since
    /// the registry is lent out for the control pass.
    pub fn agent(&self, id: AgentId) -> Option<&dyn Agent> {
        self.agents.get(&id).map(|a| a.as_ref())
    }

    /// Registered agent ids, in registry order. Readable during the control pass.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        (0..self.next_agent).map(AgentId).collect()
    }

    /// Components owned by agent `id`.
    pub fn agent_components(&self, id: AgentId) -> Vec<ComponentId> {
        self.components
            .iter()
            .filter(|(_, c)| c.owner == Some(id))
            .map(|(c, _)| c)
            .collect()
    }

    /// Passive components, in insertion order.
    pub fn passive_components(&self) -> &[ComponentId] {
        &self.passive
    }

    /// Owning agent of a component.
    pub fn agent_of(&self, component: ComponentId) -> Option<AgentId> {
        self.components.get(component)?.owner
    }

    /// Owning component of a body.
    pub fn component_of(&self, body: BodyId) -> Option<ComponentId> {
        self.body_component.get(body).copied()
    }

    fn collider_component(&self, collider: ColliderHandle) -> Option<ComponentId> {
        let body = self.collider_body.get(&collider)?;
        self.component_of(*body)
    }

    /// Spring joints between two bodies, in either order.
    pub fn spring_joints_between(&self, a: BodyId, b: BodyId) -> &[SpringJoint] {
        self.spring_joints
            .get(&BodyPair::new(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Fixed joints between two bodies, in either order.
    pub fn fixed_joints_between(&self, a: BodyId, b: BodyId) -> &[ImpulseJointHandle] {
        self.fixed_joints
            .get(&BodyPair::new(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of spring joints.
    pub fn spring_joint_count(&self) -> usize {
        self.spring_joints.values().map(Vec::len).sum()
    }

    /// Total number of fixed joints.
    pub fn fixed_joint_count(&self) -> usize {
        self.fixed_joints.values().map(Vec::len).sum()
    }

    /// Bodies attached to `body` by attachment requests.
    pub fn attached_bodies(&self, body: BodyId) -> Vec<BodyId> {
        self.component_of(body)
            .and_then(|c| self.components.get(c))
            .map(|c| c.attached_to(body).to_vec())
            .unwrap_or_default()
    }

    /// Body position at the current time.
    pub fn body_position(&self, id: BodyId) -> Option<Vec3> {
        Some(self.bodies.get(id)?.position(&self.rigid_bodies, self.t))
    }

    /// Body velocity at the current time.
    pub fn body_velocity(&self, id: BodyId) -> Option<Vec3> {
        Some(self.bodies.get(id)?.velocity(&self.rigid_bodies, self.t))
    }

    fn current_position(&self, id: BodyId) -> Result<Vec3> {
        self.bodies
            .get(id)
            .map(|b| b.current_position(&self.rigid_bodies))
            .ok_or(SimError::UnknownBody)
    }

    fn handle(&self, id: BodyId) -> Result<rapier3d::dynamics::RigidBodyHandle> {
        self.bodies.get(id).map(Body::handle).ok_or(SimError::UnknownBody)
    }

    /// Mass-weighted centroid of a group of bodies.
    pub fn centroid(&self, group: &[BodyId]) -> Option<Vec3> {
        let mut items = Vec::with_capacity(group.len());
        for &id in group {
            let body = self.bodies.get(id)?;
            items.push((body.mass(), body.position(&self.rigid_bodies, self.t)));
        }
        weighted_centroid(items)
    }

    /// Total mass of a group of bodies; unknown bodies count as zero.
    pub fn group_mass(&self, group: &[BodyId]) -> f64 {
        group.iter().filter_map(|&b| self.bodies.get(b)).map(Body::mass).sum()
    }

    /// Mass-weighted centroid of a component.
    pub fn component_center(&self, id: ComponentId) -> Result<Vec3> {
        let component = self.components.get(id).ok_or(SimError::UnknownComponent)?;
        self.centroid(&component.bodies()).ok_or(SimError::EmptyGroup)
    }

    /// Axis-aligned bounds of a component, including body radii.
    pub fn component_bounding_box(&self, id: ComponentId) -> Result<BoundingBox> {
        let component = self.components.get(id).ok_or(SimError::UnknownComponent)?;
        let boxes = component
            .bodies()
            .into_iter()
            .filter_map(|b| self.bodies.get(b))
            .map(|b| b.bounding_box(&self.rigid_bodies, self.t))
            .collect::<Vec<_>>();
        Ok(BoundingBox::enclosing(boxes)?)
    }

    /// Axis-aligned bounds of every component of an agent.
    pub fn agent_bounding_box(&self, id: AgentId) -> Result<BoundingBox> {
        let boxes = self
            .agent_components(id)
            .into_iter()
            .map(|c| self.component_bounding_box(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(BoundingBox::enclosing(boxes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Terrain;
    use crate::signal::SIDES;

    fn ball() -> SphereSpec {
        SphereSpec {
            radius: 0.1,
            mass: 1.0,
            friction: 1.0,
        }
    }

    fn world() -> World {
        World::new(WorldConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_missing_terrain() {
        let config = WorldConfig {
            terrain: None,
            ..WorldConfig::default()
        };
        assert!(matches!(World::new(config), Err(SimError::MissingTerrain)));
    }

    #[test]
    fn test_tick_advances_time() {
        let mut world = world();
        let snapshot = world.tick().unwrap();
        assert!((snapshot.t - world.dt()).abs() < 1e-12);
        world.tick().unwrap();
        assert!((world.t() - 2.0 * world.dt()).abs() < 1e-12);
    }

    #[test]
    fn test_sphere_falls() {
        let mut world = world();
        let id = world.add_passive_sphere(ball(), &Vec3::new(0.0, 0.0, 2.0), false);
        for _ in 0..10 {
            world.tick().unwrap();
        }
        let z = world.component_center(id).unwrap().z;
        assert!(z < 2.0);
        let snapshot = world.tick().unwrap();
        assert_eq!(snapshot.passive.len(), 1);
    }

    #[test]
    fn test_spring_registry_unordered() {
        let mut world = world();
        let a = world.add_sphere(ball(), &Vec3::new(0.0, 0.0, 1.0), false);
        let b = world.add_sphere(ball(), &Vec3::new(1.0, 0.0, 1.0), false);
        let (ba, bb) = (world.component(a).unwrap().bodies()[0], world.component(b).unwrap().bodies()[0]);

        world.add_spring_joint(ba, bb, 100.0, 1.0).unwrap();
        world.add_spring_joint(bb, ba, 100.0, 1.0).unwrap();
        assert_eq!(world.spring_joints_between(ba, bb).len(), 2);
        assert!((world.spring_joints_between(bb, ba)[0].rest_length() - 1.0).abs() < 1e-6);

        assert_eq!(world.set_spring_rest_length(bb, ba, 0.5), 2);
        assert_eq!(world.remove_spring_joints(bb, ba), 2);
        assert_eq!(world.spring_joint_count(), 0);
        assert_eq!(world.remove_spring_joints(ba, bb), 0);
    }

    #[test]
    fn test_rigid_params_make_fixed_joint() {
        let mut world = world();
        let a = world.add_sphere_body(ball(), &Vec3::new(0.0, 0.0, 1.0));
        let b = world.add_sphere_body(ball(), &Vec3::new(0.5, 0.0, 1.0));
        world.add_spring_joint_with(a, b, 0.5, ConstraintParams::RIGID).unwrap();
        assert_eq!(world.fixed_joints_between(b, a).len(), 1);
        assert_eq!(world.spring_joint_count(), 0);
        assert_eq!(world.remove_fixed_joints(a, b), 1);
    }

    #[test]
    fn test_voxel_joint_counts() {
        let mut world = world();
        let id = world
            .add_voxel(VoxelParams::default(), &Vec3::new(0.0, 0.0, 1.0), &[], false)
            .unwrap();
        assert_eq!(world.spring_joint_count(), 28);
        assert_eq!(world.fixed_joint_count(), 0);

        let voxel = world.component(id).unwrap().as_voxel().unwrap().clone();
        for a in voxel.corners() {
            assert_eq!(world.component_of(*a), Some(id));
        }
        let center = world.component_center(id).unwrap();
        assert!((center - Vec3::new(0.0, 0.0, 1.0)).norm() < 1e-6);
    }

    #[test]
    fn test_rigid_voxel_uses_fixed_joints() {
        let mut world = world();
        let params = VoxelParams {
            rigid: true,
            joint_options: vec![JointOption::Edges],
            ..VoxelParams::default()
        };
        world.add_voxel(params, &Vec3::new(0.0, 0.0, 1.0), &[], false).unwrap();
        assert_eq!(world.fixed_joint_count(), 12);
        assert_eq!(world.spring_joint_count(), 0);
    }

    #[test]
    fn test_actuation_sets_edge_lengths() {
        let mut world = world();
        let id = world
            .add_voxel(VoxelParams::default(), &Vec3::new(0.0, 0.0, 1.0), &[], false)
            .unwrap();
        world.actuate(id, &[1.0; EDGES]).unwrap();
        let voxel = world.component(id).unwrap().as_voxel().unwrap();
        let (a, b) = edge_pairs()[0];
        let joint = world.spring_joints_between(voxel.corner(a).unwrap(), voxel.corner(b).unwrap())[0];
        assert!((joint.rest_length() - 1.5f64.sqrt()).abs() < 1e-12);
        assert!(voxel.corner(CORNERS).is_none());
        assert!(voxel.face_bodies(SIDES).is_empty());

        assert!(matches!(
            world.actuate(id, &[0.0; 3]),
            Err(SimError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_volume_sensor_at_rest() {
        let mut world = world();
        let id = world
            .add_voxel(
                VoxelParams::default(),
                &Vec3::new(0.0, 0.0, 1.0),
                &[SensorKind::Volume, SensorKind::Touch],
                false,
            )
            .unwrap();
        let values = world.read_sensors(id).unwrap();
        assert_eq!(values.len(), 2);
        assert!(values[0].abs() < 1e-6);
        assert_eq!(values[1], 0.0);
    }

    #[test]
    fn test_translate_and_rotate_component() {
        let mut world = world();
        let id = world
            .add_voxel(VoxelParams::default(), &Vec3::new(0.0, 0.0, 1.0), &[], false)
            .unwrap();
        world.translate_component(id, &Vec3::new(2.0, 0.0, 0.0)).unwrap();
        let center = world.component_center(id).unwrap();
        assert!((center.x - 2.0).abs() < 1e-5);

        world.rotate_component(id, 0.0, 0.0, std::f64::consts::FRAC_PI_4).unwrap();
        let after = world.component_center(id).unwrap();
        assert!((after - center).norm() < 1e-5);
        let bb = world.component_bounding_box(id).unwrap();
        assert!(bb.size().x > 1.3 + 0.3);
    }

    #[test]
    fn test_steps_terrain_world() {
        let config = WorldConfig {
            terrain: Some(Terrain::Steps {
                step_length: 1.0,
                step_height: 0.1,
                count: 2,
            }),
            ..WorldConfig::default()
        };
        let mut world = World::new(config).unwrap();
        world.tick().unwrap();
    }

    #[test]
    fn test_collision_exception_unknown_body() {
        let mut world = world();
        let a = world.add_sphere_body(ball(), &Vec3::zeros());
        assert!(matches!(
            world.add_collision_exception(a, BodyId::default()),
            Err(SimError::UnknownBody)
        ));
    }
}
