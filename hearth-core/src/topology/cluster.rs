//! Compute cluster hosting both services

use crate::resource::{Resource, Value};
use crate::topology::network::NetworkBoundary;

#[derive(Debug, Clone, PartialEq)]
pub struct ComputeCluster {
    pub name: String,
    /// VPC binding the cluster is associated with
    pub vpc: String,
    /// Subnets services are placed in
    pub subnet_ids: Value,
}

impl ComputeCluster {
    pub const CAPACITY_PROVIDER: &'static str = "FARGATE";

    pub fn build(network: &NetworkBoundary) -> Self {
        Self {
            name: "cluster".to_string(),
            vpc: network.vpc.clone(),
            subnet_ids: network.subnet_ids(),
        }
    }

    pub fn arn(&self) -> Value {
        Value::reference(&self.name, "arn")
    }

    pub fn resource(&self) -> Resource {
        Resource::new("ecs.cluster", &self.name)
            .with_attribute("vpc_id", Value::reference(&self.vpc, "vpc_id"))
            .with_attribute(
                "capacity_providers",
                Value::List(vec![Value::string(Self::CAPACITY_PROVIDER)]),
            )
    }
}
