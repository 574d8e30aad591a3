//! Shared volume schema definitions

use super::with_common_attributes;
use crate::resource::Value;
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// File system identifier: `fs-` followed by hex digits
pub fn file_system_id() -> AttributeType {
    AttributeType::Custom {
        name: "FileSystemId".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value {
                let digits = s
                    .strip_prefix("fs-")
                    .ok_or_else(|| format!("'{}' does not start with 'fs-'", s))?;
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(format!("'{}' is not a file system identifier", s));
                }
                Ok(())
            } else {
                Err("Expected string".to_string())
            }
        },
    }
}

fn performance_mode() -> AttributeType {
    AttributeType::Enum(vec!["generalPurpose".to_string(), "maxIO".to_string()])
}

/// Returns the schema for a shared file system
pub fn file_system_schema() -> ResourceSchema {
    let ids = AttributeType::List(Box::new(AttributeType::String));
    with_common_attributes(
        ResourceSchema::new("efs.file_system")
            .with_description("A network file system shared by both services")
            .attribute(
                AttributeSchema::new("file_system_id", file_system_id())
                    .required()
                    .with_description("Identifier of the file system"),
            )
            .attribute(AttributeSchema::new("vpc_id", AttributeType::String).required())
            .attribute(AttributeSchema::new("subnet_ids", ids.clone()).required())
            .attribute(AttributeSchema::new("security_group_ids", ids).required())
            .attribute(
                AttributeSchema::new("performance_mode", performance_mode())
                    .with_description("Throughput/latency trade-off of the file system"),
            ),
    )
}

/// Returns the schema for a mount target
pub fn mount_target_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("efs.mount_target")
            .with_description("Network endpoint exposing a file system inside a subnet")
            .attribute(AttributeSchema::new("file_system_id", file_system_id()).required())
            .attribute(AttributeSchema::new("subnet_id", AttributeType::String).required())
            .attribute(
                AttributeSchema::new(
                    "security_group_ids",
                    AttributeType::List(Box::new(AttributeType::String)),
                )
                .required(),
            ),
    )
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![file_system_schema(), mount_target_schema()]
}
