//! Container orchestration schema definitions

use super::with_common_attributes;
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

fn launch_type() -> AttributeType {
    AttributeType::Enum(vec!["FARGATE".to_string(), "FARGATE_SPOT".to_string()])
}

fn string_list() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::String))
}

fn port_mapping() -> AttributeType {
    AttributeType::Struct {
        name: "PortMapping".to_string(),
        fields: vec![
            AttributeSchema::new("container_port", types::port_number()).required(),
            AttributeSchema::new("protocol", types::protocol()).required(),
        ],
    }
}

fn mount_point() -> AttributeType {
    AttributeType::Struct {
        name: "MountPoint".to_string(),
        fields: vec![
            AttributeSchema::new("container_path", types::non_empty_string()).required(),
            AttributeSchema::new("source_volume", types::non_empty_string()).required(),
            AttributeSchema::new("read_only", AttributeType::Bool),
        ],
    }
}

fn log_configuration() -> AttributeType {
    AttributeType::Struct {
        name: "LogConfiguration".to_string(),
        fields: vec![
            AttributeSchema::new("log_driver", AttributeType::Enum(vec!["awslogs".to_string()]))
                .required(),
            AttributeSchema::new("log_group", AttributeType::String).required(),
            AttributeSchema::new("stream_prefix", types::non_empty_string()).required(),
        ],
    }
}

/// A single container inside a task definition
fn container_definition() -> AttributeType {
    AttributeType::Struct {
        name: "ContainerDefinition".to_string(),
        fields: vec![
            AttributeSchema::new("name", types::non_empty_string()).required(),
            AttributeSchema::new("image", types::non_empty_string())
                .required()
                .with_description("Container image reference"),
            AttributeSchema::new("environment", AttributeType::Map(Box::new(AttributeType::String))),
            AttributeSchema::new("port_mappings", AttributeType::List(Box::new(port_mapping()))),
            AttributeSchema::new("mount_points", AttributeType::List(Box::new(mount_point()))),
            AttributeSchema::new("log_configuration", log_configuration()),
        ],
    }
}

fn task_volume() -> AttributeType {
    AttributeType::Struct {
        name: "TaskVolume".to_string(),
        fields: vec![
            AttributeSchema::new("name", types::non_empty_string()).required(),
            AttributeSchema::new("file_system_id", super::efs::file_system_id()).required(),
        ],
    }
}

pub fn cluster_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ecs.cluster")
            .with_description("A cluster hosting serverless container tasks")
            .attribute(AttributeSchema::new("vpc_id", AttributeType::String).required())
            .attribute(AttributeSchema::new(
                "capacity_providers",
                AttributeType::List(Box::new(launch_type())),
            )),
    )
}

/// Memory and CPU are required here even though the context treats them as
/// optional; a plan without them cannot be applied.
pub fn task_definition_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ecs.task_definition")
            .with_description("Sizing, volumes and containers of a task")
            .attribute(
                AttributeSchema::new("memory", types::positive_int())
                    .required()
                    .with_description("Memory limit in MiB"),
            )
            .attribute(
                AttributeSchema::new("cpu", types::positive_int())
                    .required()
                    .with_description("CPU units"),
            )
            .attribute(AttributeSchema::new(
                "network_mode",
                AttributeType::Enum(vec!["awsvpc".to_string()]),
            ))
            .attribute(AttributeSchema::new(
                "requires_compatibilities",
                AttributeType::List(Box::new(launch_type())),
            ))
            .attribute(AttributeSchema::new(
                "volumes",
                AttributeType::List(Box::new(task_volume())),
            ))
            .attribute(
                AttributeSchema::new(
                    "container_definitions",
                    AttributeType::List(Box::new(container_definition())),
                )
                .required(),
            ),
    )
}

pub fn service_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ecs.service")
            .with_description("Keeps a number of task copies running")
            .attribute(AttributeSchema::new("cluster", AttributeType::String).required())
            .attribute(AttributeSchema::new("task_definition", AttributeType::String).required())
            .attribute(AttributeSchema::new("launch_type", launch_type()))
            .attribute(
                AttributeSchema::new("desired_count", types::count())
                    .required()
                    .with_description("Number of running copies; zero keeps the service stopped"),
            )
            .attribute(AttributeSchema::new("assign_public_ip", AttributeType::Bool))
            .attribute(AttributeSchema::new("subnets", string_list()).required())
            .attribute(AttributeSchema::new("security_groups", string_list()).required()),
    )
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![cluster_schema(), task_definition_schema(), service_schema()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Value;
    use crate::schema::TypeError;
    use std::collections::HashMap;

    #[test]
    fn desired_count_may_be_zero() {
        let schema = service_schema();
        let mut attrs = HashMap::new();
        attrs.insert("region".to_string(), Value::string("eu-north-1"));
        attrs.insert("cluster".to_string(), Value::reference("cluster", "arn"));
        attrs.insert(
            "task_definition".to_string(),
            Value::reference("file_management_task", "arn"),
        );
        attrs.insert("desired_count".to_string(), Value::Int(0));
        attrs.insert("subnets".to_string(), Value::List(vec![]));
        attrs.insert("security_groups".to_string(), Value::List(vec![]));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("desired_count".to_string(), Value::Int(-1));
        assert!(schema.validate(&attrs).is_err());
    }

    #[test]
    fn container_without_image_is_rejected() {
        let mut container = HashMap::new();
        container.insert("name".to_string(), Value::string("server_container"));

        let err = container_definition()
            .validate(&Value::Map(container))
            .unwrap_err();
        assert!(matches!(err, TypeError::MapValueError { ref key, .. } if key == "image"));
    }
}
