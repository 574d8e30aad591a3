//! Topology - the resource graph of one deployment
//!
//! ## Module Structure
//!
//! - `network` - VPC with a single public subnet
//! - `cluster` - compute cluster hosting both services
//! - `security` - security groups, ingress rules and port ranges
//! - `volume` - attach-or-create resolution of the shared volume
//! - `service` - task and runtime service definitions
//! - `assembler` - builds everything in order and wires the volume grants

pub mod assembler;
pub mod cluster;
pub mod network;
pub mod security;
pub mod service;
pub mod volume;

pub use assembler::{Assembly, StackOutputs, Topology, assemble, assemble_with};
pub use volume::{
    IdentifierSource, RandomIdentifiers, RecordedIdentifiers, ResolvedVolume, VolumeHandle,
};

/// What happens to a resource when the stack is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPolicy {
    Destroy,
    Retain,
}

impl RemovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "destroy",
            RemovalPolicy::Retain => "retain",
        }
    }
}
