//! Effect - Side effects described as values
//!
//! An Effect describes one change to infrastructure. Effects are only data;
//! executing them is the job of an external executor.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Look up a resource this stack references but does not own
    Read(Resource),
    Create(Resource),
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
    },
    Delete(ResourceId),
}

impl Effect {
    /// Returns true if this Effect changes infrastructure
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Effect::Read(_))
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Read(r) | Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Delete(id) => id,
        }
    }

    /// The desired resource, if this Effect carries one
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Effect::Read(r) | Effect::Create(r) => Some(r),
            Effect::Update { to, .. } => Some(to),
            Effect::Delete(_) => None,
        }
    }

    /// Symbol used when printing plans
    pub fn symbol(&self) -> &'static str {
        match self {
            Effect::Read(_) => "<=",
            Effect::Create(_) => "+",
            Effect::Update { .. } => "~",
            Effect::Delete(_) => "-",
        }
    }
}
