//! Immutable per-tick captures of world state.

use serde::{Deserialize, Serialize};
use voxbot_math::{weighted_centroid, BoundingBox, Vec3};

use crate::action::Action;
use crate::agent::AgentId;
use crate::component::ComponentId;
use crate::world::World;

/// State of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    /// Component id.
    pub id: ComponentId,
    /// Total mass.
    pub mass: f64,
    /// Mass-weighted centroid.
    pub centroid: Vec3,
    /// Axis-aligned bounds.
    pub bounding_box: BoundingBox,
    /// Body positions, in the component's body order (vertex code for voxels).
    pub corners: Vec<Vec3>,
}

impl ComponentSnapshot {
    /// Capture `id`; `None` if it is not registered.
    pub fn capture(world: &World, id: ComponentId) -> Option<Self> {
        let bodies = world.component(id)?.bodies();
        let mut mass = 0.0;
        let mut positions = Vec::with_capacity(bodies.len());
        for &b in &bodies {
            mass += world.body(b)?.mass();
            positions.push(world.body_position(b)?);
        }
        Some(Self {
            id,
            mass,
            centroid: world.centroid(&bodies)?,
            bounding_box: world.component_bounding_box(id).ok()?,
            corners: positions,
        })
    }
}

/// State of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Agent id.
    pub id: AgentId,
    /// Component states, in the agent's component order.
    pub components: Vec<ComponentSnapshot>,
}

impl AgentSnapshot {
    /// Capture the given components.
    pub fn capture(world: &World, components: &[ComponentId]) -> Self {
        let id = components
            .first()
            .and_then(|&c| world.agent_of(c))
            .unwrap_or_default();
        Self {
            id,
            components: components
                .iter()
                .filter_map(|&c| ComponentSnapshot::capture(world, c))
                .collect(),
        }
    }

    /// Mass-weighted centroid over all components.
    pub fn centroid(&self) -> Option<Vec3> {
        weighted_centroid(self.components.iter().map(|c| (c.mass, c.centroid)))
    }
}

/// Endpoints of one joint.
pub type JointEndpoints = (Vec3, Vec3);

/// World state after one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Simulated time.
    pub t: f64,
    /// Agents in registry order.
    pub agents: Vec<AgentSnapshot>,
    /// Passive components in insertion order.
    pub passive: Vec<ComponentSnapshot>,
    /// Actions executed this tick, in execution order.
    pub actions: Vec<Action>,
    /// Endpoints of every spring joint.
    pub spring_joints: Vec<JointEndpoints>,
    /// Endpoints of every fixed joint.
    pub fixed_joints: Vec<JointEndpoints>,
}

impl Snapshot {
    /// Snapshot of agent `id`.
    pub fn agent(&self, id: AgentId) -> Option<&AgentSnapshot> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Centroid of agent `id`.
    pub fn agent_centroid(&self, id: AgentId) -> Option<Vec3> {
        self.agent(id)?.centroid()
    }

    /// Centroid of the first registered agent.
    pub fn first_agent_centroid(&self) -> Option<Vec3> {
        self.agents.first()?.centroid()
    }
}
