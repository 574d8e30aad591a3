//! Service definitions - a task specification paired with a runtime service
//!
//! The game server and the file-management sidecar share one builder; what
//! differs between them is captured in a [`ServiceBlueprint`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;

use crate::error::{AssemblyError, AssemblyResult};
use crate::resource::{Resource, Value};
use crate::topology::RemovalPolicy;
use crate::topology::cluster::ComputeCluster;
use crate::topology::security::{PortRange, SecurityGroup};
use crate::topology::volume::VolumeHandle;

/// Memory and CPU of a task. Either may be absent; a missing value is
/// reported when resources are validated, not when they are built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSizing {
    pub memory_mib: Option<i64>,
    pub cpu: Option<i64>,
}

impl TaskSizing {
    pub fn new(memory_mib: i64, cpu: i64) -> Self {
        Self {
            memory_mib: Some(memory_mib),
            cpu: Some(cpu),
        }
    }
}

/// The fixed shape of a service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceBlueprint {
    pub name: &'static str,
    pub stream_prefix: &'static str,
    pub mount_path: &'static str,
    pub desired_count: u32,
    pub assign_public_ip: bool,
    /// Ports the container listens on
    pub port_mappings: Vec<PortRange>,
    /// Ports opened to any IPv4 source
    pub public_ingress: Vec<PortRange>,
}

impl ServiceBlueprint {
    /// Long-running game server, reachable by game clients over UDP
    pub fn primary() -> Self {
        Self {
            name: "server",
            stream_prefix: "Server",
            mount_path: "/config",
            desired_count: 1,
            assign_public_ip: true,
            port_mappings: vec![PortRange::udp(2456), PortRange::udp(2457)],
            public_ingress: vec![PortRange::udp_range(2456, 2457)],
        }
    }

    /// On-demand file-management sidecar, started by an operator
    pub fn auxiliary() -> Self {
        Self {
            name: "file_management",
            stream_prefix: "FileManagement",
            mount_path: "/valheim_data",
            desired_count: 0,
            assign_public_ip: true,
            port_mappings: vec![PortRange::tcp(2222)],
            public_ingress: vec![PortRange::tcp(2222)],
        }
    }

    /// Auxiliary sizing is fixed; only the primary is caller-sized
    pub const AUXILIARY_SIZING: TaskSizing = TaskSizing {
        memory_mib: Some(1024),
        cpu: Some(256),
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct MountPoint {
    pub container_path: String,
    pub source_volume: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogSink {
    pub name: String,
    pub stream_prefix: String,
    pub removal_policy: RemovalPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: String,
    pub environment: BTreeMap<String, String>,
    pub port_mappings: Vec<PortRange>,
    pub mount_points: Vec<MountPoint>,
    pub log_sink: LogSink,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub name: String,
    pub sizing: TaskSizing,
    /// (task volume name, mount source)
    pub volumes: Vec<(String, Value)>,
    pub container: ContainerDefinition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDefinition {
    pub name: String,
    pub cluster: String,
    pub subnet_ids: Value,
    pub task: TaskDefinition,
    pub security_group: SecurityGroup,
    pub desired_count: u32,
    pub assign_public_ip: bool,
}

impl ServiceDefinition {
    /// Build a service from its blueprint. Fails if the ports opened to the
    /// world differ from the ports the container exposes.
    pub fn build(
        blueprint: &ServiceBlueprint,
        cluster: &ComputeCluster,
        volume: &VolumeHandle,
        sizing: TaskSizing,
        image: impl Into<String>,
        environment: BTreeMap<String, String>,
    ) -> AssemblyResult<Self> {
        let name = blueprint.name;

        let mut security_group = SecurityGroup::new(
            format!("{}_security_group", name),
            format!("Network identity of the {} service", name),
            &cluster.vpc,
        );
        for ports in &blueprint.public_ingress {
            security_group.allow_from_any_ipv4(*ports);
        }

        let exposed: BTreeSet<_> = blueprint
            .port_mappings
            .iter()
            .flat_map(|p| p.ports())
            .collect();
        if security_group.public_ports() != exposed {
            return Err(AssemblyError::Topology(format!(
                "{} service opens {:?} but its container exposes {:?}",
                name,
                security_group.public_ports(),
                exposed
            )));
        }

        let container = ContainerDefinition {
            name: format!("{}_container", name),
            image: image.into(),
            environment,
            port_mappings: blueprint.port_mappings.clone(),
            mount_points: vec![MountPoint {
                container_path: blueprint.mount_path.to_string(),
                source_volume: volume.task_volume_name().to_string(),
                read_only: false,
            }],
            log_sink: LogSink {
                name: format!("{}_log_group", name),
                stream_prefix: blueprint.stream_prefix.to_string(),
                removal_policy: RemovalPolicy::Destroy,
            },
        };

        debug!("Built {} service definition", name);

        Ok(Self {
            name: format!("{}_service", name),
            cluster: cluster.name.clone(),
            subnet_ids: cluster.subnet_ids.clone(),
            task: TaskDefinition {
                name: format!("{}_task", name),
                sizing,
                volumes: vec![(volume.task_volume_name().to_string(), volume.mount_source())],
                container,
            },
            security_group,
            desired_count: blueprint.desired_count,
            assign_public_ip: blueprint.assign_public_ip,
        })
    }

    /// Resources in creation order: log group, task definition, security
    /// group, service
    pub fn resources(&self) -> Vec<Resource> {
        let container = &self.task.container;
        let log_sink = &container.log_sink;

        let log_group = Resource::new("logs.log_group", &log_sink.name).with_attribute(
            "removal_policy",
            Value::string(log_sink.removal_policy.as_str()),
        );

        let mut task = Resource::new("ecs.task_definition", &self.task.name)
            .with_attribute("network_mode", Value::string("awsvpc"))
            .with_attribute(
                "requires_compatibilities",
                Value::List(vec![Value::string(ComputeCluster::CAPACITY_PROVIDER)]),
            )
            .with_attribute(
                "volumes",
                Value::List(
                    self.task
                        .volumes
                        .iter()
                        .map(|(name, source)| {
                            Value::Map(HashMap::from([
                                ("name".to_string(), Value::string(name)),
                                ("file_system_id".to_string(), source.clone()),
                            ]))
                        })
                        .collect(),
                ),
            )
            .with_attribute(
                "container_definitions",
                Value::List(vec![container_value(container)]),
            )
            .with_attribute(
                "removal_policy",
                Value::string(RemovalPolicy::Destroy.as_str()),
            );
        if let Some(memory) = self.task.sizing.memory_mib {
            task = task.with_attribute("memory", Value::Int(memory));
        }
        if let Some(cpu) = self.task.sizing.cpu {
            task = task.with_attribute("cpu", Value::Int(cpu));
        }

        let service = Resource::new("ecs.service", &self.name)
            .with_attribute("cluster", Value::reference(&self.cluster, "arn"))
            .with_attribute("task_definition", Value::reference(&self.task.name, "arn"))
            .with_attribute("launch_type", Value::string(ComputeCluster::CAPACITY_PROVIDER))
            .with_attribute("desired_count", Value::Int(self.desired_count.into()))
            .with_attribute("assign_public_ip", Value::Bool(self.assign_public_ip))
            .with_attribute("subnets", self.subnet_ids.clone())
            .with_attribute(
                "security_groups",
                Value::List(vec![self.security_group.group_id()]),
            )
            .with_attribute(
                "removal_policy",
                Value::string(RemovalPolicy::Destroy.as_str()),
            );

        vec![log_group, task, self.security_group.resource(), service]
    }
}

fn container_value(container: &ContainerDefinition) -> Value {
    let environment = container
        .environment
        .iter()
        .map(|(k, v)| (k.clone(), Value::string(v)))
        .collect();

    let port_mappings = container
        .port_mappings
        .iter()
        .flat_map(|range| range.ports())
        .map(|(protocol, port)| {
            Value::Map(HashMap::from([
                ("container_port".to_string(), Value::Int(port.into())),
                ("protocol".to_string(), Value::string(protocol.as_str())),
            ]))
        })
        .collect();

    let mount_points = container
        .mount_points
        .iter()
        .map(|mount| {
            Value::Map(HashMap::from([
                (
                    "container_path".to_string(),
                    Value::string(&mount.container_path),
                ),
                (
                    "source_volume".to_string(),
                    Value::string(&mount.source_volume),
                ),
                ("read_only".to_string(), Value::Bool(mount.read_only)),
            ]))
        })
        .collect();

    let log_configuration = HashMap::from([
        ("log_driver".to_string(), Value::string("awslogs")),
        (
            "log_group".to_string(),
            Value::reference(&container.log_sink.name, "name"),
        ),
        (
            "stream_prefix".to_string(),
            Value::string(&container.log_sink.stream_prefix),
        ),
    ]);

    Value::Map(HashMap::from([
        ("name".to_string(), Value::string(&container.name)),
        ("image".to_string(), Value::string(&container.image)),
        ("environment".to_string(), Value::Map(environment)),
        ("port_mappings".to_string(), Value::List(port_mappings)),
        ("mount_points".to_string(), Value::List(mount_points)),
        ("log_configuration".to_string(), Value::Map(log_configuration)),
    ]))
}
