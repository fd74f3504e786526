//! Components: the units that own bodies.

use std::collections::BTreeMap;

use slotmap::new_key_type;

use crate::agent::AgentId;
use crate::body::BodyId;
use crate::signal::SIDES;
use crate::voxel::Voxel;

new_key_type! {
    /// Stable handle of a component inside one world.
    pub struct ComponentId;
}

/// What a component is made of.
#[derive(Debug, Clone)]
pub enum ComponentKind {
    /// A deformable voxel.
    Voxel(Voxel),
    /// A single free sphere.
    Sphere(BodyId),
}

/// A registered component with its ownership and attachment bookkeeping.
#[derive(Debug, Clone)]
pub struct Component {
    pub(crate) kind: ComponentKind,
    pub(crate) owner: Option<AgentId>,
    pub(crate) attachable: bool,
    pub(crate) attachments: BTreeMap<BodyId, Vec<BodyId>>,
}

impl Component {
    pub(crate) fn new(kind: ComponentKind, attachable: bool) -> Self {
        Self {
            kind,
            owner: None,
            attachable,
            attachments: BTreeMap::new(),
        }
    }

    /// Component kind.
    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    /// The voxel, if this component is one.
    pub fn as_voxel(&self) -> Option<&Voxel> {
        match &self.kind {
            ComponentKind::Voxel(v) => Some(v),
            ComponentKind::Sphere(_) => None,
        }
    }

    pub(crate) fn as_voxel_mut(&mut self) -> Option<&mut Voxel> {
        match &mut self.kind {
            ComponentKind::Voxel(v) => Some(v),
            ComponentKind::Sphere(_) => None,
        }
    }

    /// Owning agent; `None` for passive components.
    pub fn owner(&self) -> Option<AgentId> {
        self.owner
    }

    /// Whether attachment requests may target this component.
    pub fn is_attachable(&self) -> bool {
        self.attachable
    }

    /// Every body of the component.
    pub fn bodies(&self) -> Vec<BodyId> {
        match &self.kind {
            ComponentKind::Voxel(v) => v.corners().to_vec(),
            ComponentKind::Sphere(b) => vec![*b],
        }
    }

    /// Candidate body groups for attachment: voxel faces, or the lone sphere.
    pub fn attach_groups(&self) -> Vec<Vec<BodyId>> {
        match &self.kind {
            ComponentKind::Voxel(v) => (0..SIDES).map(|side| v.face_bodies(side)).collect(),
            ComponentKind::Sphere(b) => vec![vec![*b]],
        }
    }

    /// Bodies currently attached to `body` through this component's records.
    pub fn attached_to(&self, body: BodyId) -> &[BodyId] {
        self.attachments.get(&body).map(Vec::as_slice).unwrap_or(&[])
    }
}
