//! Deferred world mutations produced by agents.

use serde::{Deserialize, Serialize};
use voxbot_math::Vec3;

use crate::attach;
use crate::body::BodyId;
use crate::component::ComponentId;
use crate::error::Result;
use crate::signal::SignalRay;
use crate::world::World;

/// An instruction queued during the control step and executed after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Emit a one-tick signal pulse, fanned across `directions`. A struck
    /// component hears the pulse once, on the side hit by the nearest ray.
    EmitSignal {
        /// Emitting component; never hears its own signal.
        emitter: ComponentId,
        /// Origin shared by every ray.
        origin: Vec3,
        /// One ray per direction; empty emits nothing.
        directions: Vec<Vec3>,
        /// Channel index, `0..=63`.
        channel: u8,
        /// Transmitted value.
        value: f64,
    },
    /// Spring `group` to the nearest attachable component. Components owned by
    /// the requester's agent are never targets; a passive requester excludes
    /// only itself.
    RequestAttachment {
        /// Requesting component.
        requester: ComponentId,
        /// Bodies of the requester to attach.
        group: Vec<BodyId>,
        /// Spring stiffness.
        spring_constant: f64,
        /// Spring damping.
        damping_constant: f64,
    },
    /// Remove every attachment of the bodies in `group`.
    RequestDetachment {
        /// Requesting component.
        requester: ComponentId,
        /// Bodies to release.
        group: Vec<BodyId>,
    },
    /// Pull `group` toward the nearest attachable component.
    RequestAttraction {
        /// Requesting component.
        requester: ComponentId,
        /// Bodies to pull.
        group: Vec<BodyId>,
    },
}

impl Action {
    /// Apply the action. Finding nothing to attach to is not an error.
    pub fn execute(&self, world: &mut World) -> Result<()> {
        match self {
            Action::EmitSignal {
                emitter,
                origin,
                directions,
                channel,
                value,
            } => {
                let range = world.config().nfc_range;
                let rays = directions
                    .iter()
                    .map(|direction| SignalRay::new(*emitter, *origin, direction, range, *channel, *value))
                    .collect::<Result<Vec<_>>>()?;
                world.emit_signal_pulse(rays);
                Ok(())
            }
            Action::RequestAttachment {
                requester,
                group,
                spring_constant,
                damping_constant,
            } => attach::request_attachment(
                world,
                *requester,
                group,
                *spring_constant,
                *damping_constant,
            )
            .map(|_| ()),
            Action::RequestDetachment { requester, group } => {
                attach::request_detachment(world, *requester, group).map(|_| ())
            }
            Action::RequestAttraction { requester, group } => {
                attach::request_attraction(world, *requester, group).map(|_| ())
            }
        }
    }
}
