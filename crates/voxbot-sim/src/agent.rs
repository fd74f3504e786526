//! The capability surface the world needs from an agent.

use serde::{Deserialize, Serialize};
use voxbot_math::Vec3;

use crate::action::Action;
use crate::component::ComponentId;
use crate::error::Result;
use crate::snapshot::AgentSnapshot;
use crate::world::World;

/// Registry id of an agent; ids grow in insertion order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u32);

/// Something that owns components and acts on the world once per tick.
pub trait Agent {
    /// Create the agent's components in `world`, centered on `position`.
    fn assemble(&mut self, world: &mut World, position: Vec3) -> Result<()>;

    /// Components created by [`assemble`](Agent::assemble).
    fn components(&self) -> &[ComponentId];

    /// Sense, run the controller and actuate. Returned actions are queued and
    /// applied only after every agent has acted. [`World::agent`] returns
    /// `None` during this call; [`World::agent_ids`] still lists every agent.
    fn act(&mut self, world: &mut World) -> Result<Vec<Action>>;

    /// Capture the agent's current state.
    fn snapshot(&self, world: &World) -> AgentSnapshot {
        AgentSnapshot::capture(world, self.components())
    }
}
