//! Network boundary - an isolated address space with one public subnet
//!
//! The subnet lives in a single availability zone. There is no
//! high-availability guarantee.

use crate::environment::Environment;
use crate::resource::{Resource, Value};

pub const VPC_CIDR: &str = "10.0.0.0/16";
pub const PUBLIC_SUBNET_CIDR: &str = "10.0.0.0/24";

#[derive(Debug, Clone, PartialEq)]
pub struct PublicSubnet {
    pub name: String,
    pub cidr_block: String,
    pub availability_zone: String,
}

impl PublicSubnet {
    pub fn subnet_id(&self) -> Value {
        Value::reference(&self.name, "subnet_id")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkBoundary {
    pub vpc: String,
    pub cidr_block: String,
    pub public_subnets: Vec<PublicSubnet>,
}

impl NetworkBoundary {
    pub fn build(environment: &Environment) -> Self {
        Self {
            vpc: "vpc".to_string(),
            cidr_block: VPC_CIDR.to_string(),
            public_subnets: vec![PublicSubnet {
                name: "public_subnet".to_string(),
                cidr_block: PUBLIC_SUBNET_CIDR.to_string(),
                availability_zone: environment.availability_zone(),
            }],
        }
    }

    /// The subnet mount targets and services are placed in
    pub fn primary_subnet(&self) -> &PublicSubnet {
        &self.public_subnets[0]
    }

    pub fn subnet_ids(&self) -> Value {
        Value::List(self.public_subnets.iter().map(PublicSubnet::subnet_id).collect())
    }

    pub fn resources(&self) -> Vec<Resource> {
        let vpc_id = Value::reference(&self.vpc, "vpc_id");
        let mut resources = vec![
            Resource::new("ec2.vpc", &self.vpc)
                .with_attribute("cidr_block", Value::string(&self.cidr_block))
                .with_attribute("enable_dns_support", Value::Bool(true))
                .with_attribute("enable_dns_hostnames", Value::Bool(true)),
            Resource::new("ec2.internet_gateway", "internet_gateway"),
            Resource::new("ec2.vpc_gateway_attachment", "gateway_attachment")
                .with_attribute("vpc_id", vpc_id.clone())
                .with_attribute(
                    "internet_gateway_id",
                    Value::reference("internet_gateway", "internet_gateway_id"),
                ),
        ];

        for subnet in &self.public_subnets {
            let route_table = format!("{}_route_table", subnet.name);
            resources.push(
                Resource::new("ec2.subnet", &subnet.name)
                    .with_attribute("vpc_id", vpc_id.clone())
                    .with_attribute("cidr_block", Value::string(&subnet.cidr_block))
                    .with_attribute(
                        "availability_zone",
                        Value::string(&subnet.availability_zone),
                    )
                    .with_attribute("map_public_ip_on_launch", Value::Bool(true)),
            );
            resources.push(
                Resource::new("ec2.route_table", &route_table)
                    .with_attribute("vpc_id", vpc_id.clone()),
            );
            resources.push(
                Resource::new("ec2.subnet_route_table_association", format!("{}_association", route_table))
                    .with_attribute("subnet_id", subnet.subnet_id())
                    .with_attribute("route_table_id", Value::reference(&route_table, "route_table_id")),
            );
            resources.push(
                Resource::new("ec2.route", format!("{}_default_route", subnet.name))
                    .with_attribute("route_table_id", Value::reference(&route_table, "route_table_id"))
                    .with_attribute("destination_cidr_block", Value::string("0.0.0.0/0"))
                    .with_attribute(
                        "gateway_id",
                        Value::reference("internet_gateway", "internet_gateway_id"),
                    ),
            );
        }

        resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_public_subnet_in_one_zone() {
        let network = NetworkBoundary::build(&Environment::new("123456789012", "eu-north-1"));
        assert_eq!(network.public_subnets.len(), 1);
        assert_eq!(network.primary_subnet().availability_zone, "eu-north-1a");
    }

    #[test]
    fn public_subnet_routes_to_the_internet() {
        let network = NetworkBoundary::build(&Environment::new("123456789012", "eu-north-1"));
        let resources = network.resources();

        let route = resources
            .iter()
            .find(|r| r.id.resource_type == "ec2.route")
            .unwrap();
        assert_eq!(
            route.attribute("destination_cidr_block"),
            Some(&Value::string("0.0.0.0/0"))
        );

        let subnet = resources
            .iter()
            .find(|r| r.id.resource_type == "ec2.subnet")
            .unwrap();
        assert_eq!(
            subnet.attribute("map_public_ip_on_launch"),
            Some(&Value::Bool(true))
        );
    }
}
