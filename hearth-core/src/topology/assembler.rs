//! Assembler - build the whole topology in dependency order
//!
//! Order: network boundary, cluster, access-control group, shared volume,
//! both services, the volume grants, and finally the outputs. Any error
//! aborts the assembly; there is no partial result.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::context::{DeploymentContext, keys};
use crate::effect::Effect;
use crate::environment::Environment;
use crate::error::AssemblyResult;
use crate::plan::Plan;
use crate::resource::Value;
use crate::topology::cluster::ComputeCluster;
use crate::topology::network::NetworkBoundary;
use crate::topology::security::{PortRange, SecurityGroup};
use crate::topology::service::{ServiceBlueprint, ServiceDefinition, TaskSizing};
use crate::topology::volume::{self, IdentifierSource, RandomIdentifiers, ResolvedVolume};

/// Transport port the shared volume is reached on
pub const NFS_PORT: u16 = 2049;

/// Name of the durable output carrying the volume identifier
pub const VOLUME_IDENTIFIER_OUTPUT: &str = "volume-identifier";

/// Values every successful assembly emits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutputs {
    pub volume_identifier: String,
}

impl StackOutputs {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            VOLUME_IDENTIFIER_OUTPUT.to_string(),
            self.volume_identifier.clone(),
        )])
    }
}

/// The typed resource graph of one deployment
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub environment: Environment,
    pub network: NetworkBoundary,
    pub cluster: ComputeCluster,
    /// Guards the shared volume. Its rules are exactly the grants issued
    /// to the services mounting the volume.
    pub access_group: SecurityGroup,
    pub volume: ResolvedVolume,
    pub primary: ServiceDefinition,
    pub auxiliary: ServiceDefinition,
}

impl Topology {
    pub fn services(&self) -> [&ServiceDefinition; 2] {
        [&self.primary, &self.auxiliary]
    }
}

#[derive(Debug, Clone)]
pub struct Assembly {
    pub topology: Topology,
    pub plan: Plan,
    pub outputs: StackOutputs,
}

/// Assemble a deployment, generating identifiers for anything created
pub fn assemble(
    context: &DeploymentContext,
    environment: &Environment,
) -> AssemblyResult<Assembly> {
    assemble_with(context, environment, &RandomIdentifiers)
}

pub fn assemble_with(
    context: &DeploymentContext,
    environment: &Environment,
    ids: &dyn IdentifierSource,
) -> AssemblyResult<Assembly> {
    // Every required input is checked before anything is built
    context.validate()?;
    let existing_volume = context.existing_volume_id()?;
    let primary_sizing = TaskSizing {
        memory_mib: context.get_int(keys::MEMORY_LIMIT)?,
        cpu: context.get_int(keys::CPU_LIMIT)?,
    };
    let primary_image = context.require_string(keys::PRIMARY_IMAGE)?;
    let primary_environment = context.get_string_map(keys::PRIMARY_ENVIRONMENT)?;
    let auxiliary_image = context.require_string(keys::AUXILIARY_IMAGE)?;
    let auxiliary_environment = context.get_string_map(keys::AUXILIARY_ENVIRONMENT)?;

    let mut plan = Plan::new();
    let mut emit = |effect: Effect| plan.add(with_region(effect, &environment.region));

    debug!("Building network boundary");
    let network = NetworkBoundary::build(environment);
    network.resources().into_iter().map(Effect::Create).for_each(&mut emit);

    debug!("Building compute cluster");
    let cluster = ComputeCluster::build(&network);
    emit(Effect::Create(cluster.resource()));

    debug!("Building access-control group");
    let mut access_group = SecurityGroup::new(
        "volume_security_group",
        "Access to the shared volume",
        &network.vpc,
    );
    emit(Effect::Create(access_group.resource()));

    let volume = volume::resolve(existing_volume.as_deref(), &network, &access_group, ids);
    volume.effects().into_iter().for_each(&mut emit);

    let primary = ServiceDefinition::build(
        &ServiceBlueprint::primary(),
        &cluster,
        volume.handle(),
        primary_sizing,
        primary_image,
        primary_environment,
    )?;
    primary.resources().into_iter().map(Effect::Create).for_each(&mut emit);

    let auxiliary = ServiceDefinition::build(
        &ServiceBlueprint::auxiliary(),
        &cluster,
        volume.handle(),
        ServiceBlueprint::AUXILIARY_SIZING,
        auxiliary_image,
        auxiliary_environment,
    )?;
    auxiliary.resources().into_iter().map(Effect::Create).for_each(&mut emit);

    // Grants reference each service's identity, so both must exist first
    for service in [&primary, &auxiliary] {
        debug!("Granting {} access to the shared volume", service.name);
        access_group.allow_from(&service.security_group, PortRange::tcp(NFS_PORT));
    }
    access_group
        .peer_rule_resources()
        .into_iter()
        .map(Effect::Create)
        .for_each(&mut emit);

    let outputs = StackOutputs {
        volume_identifier: volume.handle().identifier().to_string(),
    };
    info!(
        "Assembled {} effects; {} = {}",
        plan.effects().len(),
        VOLUME_IDENTIFIER_OUTPUT,
        outputs.volume_identifier
    );

    Ok(Assembly {
        topology: Topology {
            environment: environment.clone(),
            network,
            cluster,
            access_group,
            volume,
            primary,
            auxiliary,
        },
        plan,
        outputs,
    })
}

fn with_region(effect: Effect, region: &str) -> Effect {
    match effect {
        Effect::Create(r) => Effect::Create(r.with_attribute("region", Value::string(region))),
        Effect::Read(r) => Effect::Read(r.with_attribute("region", Value::string(region))),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AssemblyError, ConfigError};
    use crate::topology::security::{Peer, Protocol};
    use crate::topology::volume::{MOUNT_TARGET_TYPE, RESOURCE_TYPE};
    use std::collections::BTreeSet;

    struct Fixed(&'static str);

    impl IdentifierSource for Fixed {
        fn file_system_id(&self) -> String {
            self.0.to_string()
        }
    }

    fn environment() -> Environment {
        Environment::new("123456789012", "eu-north-1")
    }

    fn base_context() -> DeploymentContext {
        DeploymentContext::new()
            .with(keys::MEMORY_LIMIT, Value::Int(2048))
            .with(keys::CPU_LIMIT, Value::Int(1024))
            .with(keys::PRIMARY_IMAGE, Value::string("img/valheim"))
            .with(keys::AUXILIARY_IMAGE, Value::string("img/ssh"))
    }

    #[test]
    fn fresh_context_creates_one_volume() {
        let assembly = assemble(&base_context(), &environment()).unwrap();

        let volumes: Vec<_> = assembly
            .plan
            .effects()
            .iter()
            .filter(|e| e.resource_id().resource_type == RESOURCE_TYPE)
            .collect();
        assert_eq!(volumes.len(), 1);
        let Effect::Create(volume) = volumes[0] else {
            panic!("expected the volume to be created");
        };

        assert!(!assembly.outputs.volume_identifier.is_empty());
        assert_eq!(
            volume.attribute("file_system_id"),
            Some(&Value::string(&assembly.outputs.volume_identifier))
        );
        assert_eq!(assembly.plan.resources_of_type(MOUNT_TARGET_TYPE).count(), 0);
        assert_eq!(assembly.plan.resources_of_type("ecs.service").count(), 2);
    }

    #[test]
    fn existing_identifier_round_trips() {
        let context = base_context().with(keys::EXISTING_VOLUME_ID, Value::string("fs-123"));
        let assembly = assemble(&context, &environment()).unwrap();

        assert_eq!(assembly.outputs.volume_identifier, "fs-123");
        assert_eq!(
            assembly.outputs.to_map().get(VOLUME_IDENTIFIER_OUTPUT),
            Some(&"fs-123".to_string())
        );

        let creates_volume = assembly.plan.effects().iter().any(|e| {
            matches!(e, Effect::Create(r) if r.id.resource_type == RESOURCE_TYPE)
        });
        assert!(!creates_volume);
        assert_eq!(assembly.plan.resources_of_type(MOUNT_TARGET_TYPE).count(), 1);
        assert!(!assembly.topology.volume.is_created());
    }

    #[test]
    fn access_group_holds_exactly_one_grant_per_service() {
        let assembly = assemble(&base_context(), &environment()).unwrap();
        let topology = &assembly.topology;

        let rules = topology.access_group.ingress();
        assert_eq!(rules.len(), 2);
        for (rule, service) in rules.iter().zip(topology.services()) {
            assert_eq!(rule.ports, PortRange::tcp(NFS_PORT));
            assert_eq!(rule.peer, Peer::Group(service.security_group.name.clone()));
        }
        assert!(topology.access_group.public_ports().is_empty());

        let grants: Vec<_> = assembly
            .plan
            .resources_of_type(SecurityGroup::INGRESS_RESOURCE_TYPE)
            .collect();
        assert_eq!(grants.len(), 2);
        for grant in grants {
            assert_eq!(grant.attribute("group_id"), Some(&topology.access_group.group_id()));
            assert_eq!(grant.attribute("from_port"), Some(&Value::Int(2049)));
            assert_eq!(grant.attribute("to_port"), Some(&Value::Int(2049)));
            assert_eq!(grant.attribute("ip_protocol"), Some(&Value::string("tcp")));
        }
    }

    #[test]
    fn service_ingress_sets_are_exact() {
        let assembly = assemble(&base_context(), &environment()).unwrap();
        let topology = &assembly.topology;

        assert_eq!(
            topology.primary.security_group.public_ports(),
            BTreeSet::from([(Protocol::Udp, 2456), (Protocol::Udp, 2457)])
        );
        assert_eq!(
            topology.auxiliary.security_group.public_ports(),
            BTreeSet::from([(Protocol::Tcp, 2222)])
        );
        for service in topology.services() {
            assert!(
                service
                    .security_group
                    .ingress()
                    .iter()
                    .all(|rule| rule.peer == Peer::AnyIpv4)
            );
            // Outbound side of the volume grant
            assert_eq!(
                service.security_group.resource().attribute("allow_all_outbound"),
                Some(&Value::Bool(true))
            );
        }
    }

    #[test]
    fn auxiliary_starts_stopped_regardless_of_context() {
        let mut env = std::collections::HashMap::new();
        env.insert("DESIRED_COUNT".to_string(), Value::string("5"));
        let context = base_context()
            .with(keys::EXISTING_VOLUME_ID, Value::string("fs-123"))
            .with(keys::AUXILIARY_ENVIRONMENT, Value::Map(env));

        for context in [base_context(), context] {
            let assembly = assemble(&context, &environment()).unwrap();
            assert_eq!(assembly.topology.auxiliary.desired_count, 0);
            assert_eq!(assembly.topology.primary.desired_count, 1);
        }
    }

    #[test]
    fn missing_primary_image_fails_before_building() {
        let context = DeploymentContext::new()
            .with(keys::MEMORY_LIMIT, Value::Int(2048))
            .with(keys::CPU_LIMIT, Value::Int(1024))
            .with(keys::AUXILIARY_IMAGE, Value::string("img/ssh"));

        let err = assemble(&context, &environment()).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::Config(ConfigError::missing(keys::PRIMARY_IMAGE))
        );
    }

    #[test]
    fn plan_follows_dependency_order() {
        let assembly = assemble_with(&base_context(), &environment(), &Fixed("fs-1")).unwrap();
        let types: Vec<_> = assembly
            .plan
            .effects()
            .iter()
            .map(|e| e.resource_id().resource_type.as_str())
            .collect();

        let position = |t: &str| types.iter().position(|x| *x == t).unwrap();
        assert_eq!(types[0], "ec2.vpc");
        assert!(position("ec2.vpc") < position("ecs.cluster"));
        assert!(position("ecs.cluster") < position("ec2.security_group"));
        assert!(position("ec2.security_group") < position(RESOURCE_TYPE));
        assert!(position(RESOURCE_TYPE) < position("ecs.service"));
        assert_eq!(types[types.len() - 1], SecurityGroup::INGRESS_RESOURCE_TYPE);
        assert_eq!(types[types.len() - 2], SecurityGroup::INGRESS_RESOURCE_TYPE);
    }

    #[test]
    fn references_only_point_backwards() {
        let referenced = base_context().with(keys::EXISTING_VOLUME_ID, Value::string("fs-123"));

        for context in [base_context(), referenced] {
            let assembly = assemble_with(&context, &environment(), &Fixed("fs-1")).unwrap();

            let mut declared = BTreeSet::new();
            for resource in assembly.plan.resources() {
                for dep in resource.dependencies() {
                    assert!(
                        declared.contains(&dep),
                        "{} references {} before it is declared",
                        resource.id,
                        dep
                    );
                }
                declared.insert(resource.id.name.clone());
            }

            let tasks: Vec<_> = assembly.plan.resources_of_type("ecs.task_definition").collect();
            assert_eq!(tasks.len(), 2);
            for task in tasks {
                assert!(
                    task.dependencies().contains(&"shared_volume".to_string()),
                    "{} does not depend on the shared volume",
                    task.id
                );
            }
        }
    }

    #[test]
    fn every_resource_carries_the_region() {
        let assembly = assemble(&base_context(), &environment()).unwrap();
        assert!(
            assembly
                .plan
                .resources()
                .all(|r| r.attribute("region") == Some(&Value::string("eu-north-1")))
        );
    }

    #[test]
    fn assembly_is_deterministic_for_fixed_identifiers() {
        let a = assemble_with(&base_context(), &environment(), &Fixed("fs-1")).unwrap();
        let b = assemble_with(&base_context(), &environment(), &Fixed("fs-1")).unwrap();
        assert_eq!(a.plan.to_json(), b.plan.to_json());
        assert_eq!(a.topology, b.topology);
    }

    #[test]
    fn both_services_mount_the_same_volume() {
        let assembly = assemble_with(&base_context(), &environment(), &Fixed("fs-abc")).unwrap();
        for service in assembly.topology.services() {
            assert_eq!(
                service.task.volumes,
                vec![(
                    "ValheimConfig".to_string(),
                    Value::reference("shared_volume", "file_system_id")
                )]
            );
        }
        assert_eq!(assembly.outputs.volume_identifier, "fs-abc");
    }

    #[test]
    fn padded_volume_identifier_is_rejected_not_stripped() {
        let context = base_context().with(keys::EXISTING_VOLUME_ID, Value::string(" fs-123 "));
        let err = assemble(&context, &environment()).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::Config(ConfigError::Invalid { .. })
        ));

        let context = base_context().with(keys::EXISTING_VOLUME_ID, Value::string("fs-0aB1"));
        let assembly = assemble(&context, &environment()).unwrap();
        assert_eq!(assembly.outputs.volume_identifier, "fs-0aB1");
    }
}
