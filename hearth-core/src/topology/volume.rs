//! Shared volume resolution
//!
//! A deployment either attaches to a volume it was given by identifier or
//! creates a new one. Both paths yield the same [`VolumeHandle`].

use log::info;

use crate::effect::Effect;
use crate::resource::{Resource, Value};
use crate::topology::RemovalPolicy;
use crate::topology::network::NetworkBoundary;
use crate::topology::security::SecurityGroup;

pub const RESOURCE_TYPE: &str = "efs.file_system";
pub const MOUNT_TARGET_TYPE: &str = "efs.mount_target";
pub const RESOURCE_NAME: &str = "shared_volume";

/// Name the volume is registered under inside task definitions
pub const TASK_VOLUME_NAME: &str = "ValheimConfig";

/// Source of identifiers for volumes this stack creates
pub trait IdentifierSource {
    fn file_system_id(&self) -> String;
}

/// `fs-` followed by 17 hex characters taken from a v4 UUID
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdentifiers;

impl IdentifierSource for RandomIdentifiers {
    fn file_system_id(&self) -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        format!("fs-{}", &hex[..17])
    }
}

/// Reuses the identifier of a volume an earlier run created, and only
/// generates a fresh one when nothing was recorded
#[derive(Debug, Default, Clone)]
pub struct RecordedIdentifiers {
    recorded: Option<String>,
}

impl RecordedIdentifiers {
    pub fn new(recorded: Option<String>) -> Self {
        Self { recorded }
    }
}

impl IdentifierSource for RecordedIdentifiers {
    fn file_system_id(&self) -> String {
        match &self.recorded {
            Some(id) => id.clone(),
            None => RandomIdentifiers.file_system_id(),
        }
    }
}

/// What downstream consumers see of the volume, whichever path produced it
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeHandle {
    pub name: String,
    file_system_id: String,
}

impl VolumeHandle {
    fn new(file_system_id: impl Into<String>) -> Self {
        Self {
            name: RESOURCE_NAME.to_string(),
            file_system_id: file_system_id.into(),
        }
    }

    /// Stable identifier, usable as a durable output
    pub fn identifier(&self) -> &str {
        &self.file_system_id
    }

    /// What mounts of the volume point at. Always a reference to the
    /// volume resource so consumers are ordered after it on either path.
    pub fn mount_source(&self) -> Value {
        Value::reference(&self.name, "file_system_id")
    }

    pub fn task_volume_name(&self) -> &str {
        TASK_VOLUME_NAME
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MountTarget {
    pub name: String,
    pub subnet_id: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedVolume {
    /// A new volume owned by this stack
    Created {
        handle: VolumeHandle,
        vpc: String,
        subnet_ids: Value,
        security_group: Value,
    },
    /// An existing volume owned elsewhere, made reachable through a new
    /// mount target
    Referenced {
        handle: VolumeHandle,
        mount_target: MountTarget,
        security_group: Value,
    },
}

impl ResolvedVolume {
    pub fn handle(&self) -> &VolumeHandle {
        match self {
            ResolvedVolume::Created { handle, .. } | ResolvedVolume::Referenced { handle, .. } => {
                handle
            }
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, ResolvedVolume::Created { .. })
    }

    /// Effects for this volume: a create for a new volume, or a read of the
    /// referenced volume followed by its mount target
    pub fn effects(&self) -> Vec<Effect> {
        match self {
            ResolvedVolume::Created {
                handle,
                vpc,
                subnet_ids,
                security_group,
            } => vec![Effect::Create(
                Resource::new(RESOURCE_TYPE, &handle.name)
                    .with_attribute("file_system_id", Value::string(handle.identifier()))
                    .with_attribute("vpc_id", Value::reference(vpc, "vpc_id"))
                    .with_attribute("subnet_ids", subnet_ids.clone())
                    .with_attribute(
                        "security_group_ids",
                        Value::List(vec![security_group.clone()]),
                    )
                    .with_attribute("performance_mode", Value::string("generalPurpose"))
                    .with_attribute(
                        "removal_policy",
                        Value::string(RemovalPolicy::Retain.as_str()),
                    ),
            )],
            ResolvedVolume::Referenced {
                handle,
                mount_target,
                security_group,
            } => vec![
                Effect::Read(
                    Resource::new(RESOURCE_TYPE, &handle.name)
                        .with_attribute("file_system_id", Value::string(handle.identifier()))
                        .with_read_only(true),
                ),
                Effect::Create(
                    Resource::new(MOUNT_TARGET_TYPE, &mount_target.name)
                        .with_attribute("file_system_id", handle.mount_source())
                        .with_attribute("subnet_id", mount_target.subnet_id.clone())
                        .with_attribute(
                            "security_group_ids",
                            Value::List(vec![security_group.clone()]),
                        )
                        .with_attribute(
                            "removal_policy",
                            Value::string(RemovalPolicy::Destroy.as_str()),
                        ),
                ),
            ],
        }
    }
}

/// Attach to `existing_id` when given, otherwise create a new volume.
/// `group` is the access-control group guarding the volume on either path.
pub fn resolve(
    existing_id: Option<&str>,
    network: &NetworkBoundary,
    group: &SecurityGroup,
    ids: &dyn IdentifierSource,
) -> ResolvedVolume {
    match existing_id {
        Some(id) => {
            info!("Attaching to existing shared volume {}", id);
            let handle = VolumeHandle::new(id);
            ResolvedVolume::Referenced {
                mount_target: MountTarget {
                    name: format!("{}_mount_target", handle.name),
                    subnet_id: network.primary_subnet().subnet_id(),
                },
                handle,
                security_group: group.group_id(),
            }
        }
        None => {
            let handle = VolumeHandle::new(ids.file_system_id());
            info!("Creating new shared volume {}", handle.identifier());
            ResolvedVolume::Created {
                handle,
                vpc: network.vpc.clone(),
                subnet_ids: network.subnet_ids(),
                security_group: group.group_id(),
            }
        }
    }
}
