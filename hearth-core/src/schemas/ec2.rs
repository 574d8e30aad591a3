//! EC2 resource schema definitions

use super::with_common_attributes;
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

fn reference(name: &str, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::String)
        .required()
        .with_description(description)
}

/// Returns the schema for VPC
pub fn vpc_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ec2.vpc")
            .with_description("An isolated virtual network")
            .attribute(
                AttributeSchema::new("cidr_block", types::cidr())
                    .required()
                    .with_description("The IPv4 CIDR block for the VPC"),
            )
            .attribute(
                AttributeSchema::new("enable_dns_support", AttributeType::Bool)
                    .with_description("Enable DNS resolution support"),
            )
            .attribute(
                AttributeSchema::new("enable_dns_hostnames", AttributeType::Bool)
                    .with_description("Enable DNS hostnames"),
            ),
    )
}

pub fn internet_gateway_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ec2.internet_gateway").with_description("An Internet Gateway"),
    )
}

pub fn vpc_gateway_attachment_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ec2.vpc_gateway_attachment")
            .with_description("Attaches an Internet Gateway to a VPC")
            .attribute(reference("vpc_id", "VPC to attach to"))
            .attribute(reference("internet_gateway_id", "Gateway to attach")),
    )
}

/// Returns the schema for Subnet
pub fn subnet_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ec2.subnet")
            .with_description("A VPC Subnet")
            .attribute(reference("vpc_id", "VPC to create the subnet in"))
            .attribute(
                AttributeSchema::new("cidr_block", types::cidr())
                    .required()
                    .with_description("The IPv4 CIDR block for the subnet"),
            )
            .attribute(
                AttributeSchema::new("availability_zone", types::non_empty_string())
                    .required()
                    .with_description("The availability zone for the subnet"),
            )
            .attribute(
                AttributeSchema::new("map_public_ip_on_launch", AttributeType::Bool)
                    .with_description("Give launched tasks a public address"),
            ),
    )
}

pub fn route_table_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ec2.route_table")
            .with_description("A VPC Route Table")
            .attribute(reference("vpc_id", "VPC for the Route Table")),
    )
}

pub fn subnet_route_table_association_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ec2.subnet_route_table_association")
            .with_description("Associates a Subnet with a Route Table")
            .attribute(reference("subnet_id", "Subnet to associate"))
            .attribute(reference("route_table_id", "Route Table to associate")),
    )
}

pub fn route_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ec2.route")
            .with_description("A single route in a Route Table")
            .attribute(reference("route_table_id", "Route Table holding the route"))
            .attribute(
                AttributeSchema::new("destination_cidr_block", types::cidr())
                    .required()
                    .with_description("Traffic matched by the route"),
            )
            .attribute(reference("gateway_id", "Gateway traffic is sent to")),
    )
}

/// Inbound rule carried inline by a security group
fn inline_ingress_rule() -> AttributeType {
    AttributeType::Struct {
        name: "IngressRule".to_string(),
        fields: vec![
            AttributeSchema::new("ip_protocol", types::protocol()).required(),
            AttributeSchema::new("from_port", types::port_number()).required(),
            AttributeSchema::new("to_port", types::port_number()).required(),
            AttributeSchema::new("cidr_ip", types::cidr()).required(),
            AttributeSchema::new("description", AttributeType::String),
        ],
    }
}

/// Returns the schema for Security Group
pub fn security_group_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ec2.security_group")
            .with_description("A VPC Security Group")
            .attribute(reference("vpc_id", "VPC for the Security Group"))
            .attribute(
                AttributeSchema::new("description", AttributeType::String)
                    .with_description("Description of the Security Group"),
            )
            .attribute(
                AttributeSchema::new("allow_all_outbound", AttributeType::Bool)
                    .with_description("Allow all outbound traffic"),
            )
            .attribute(
                AttributeSchema::new("ingress", AttributeType::List(Box::new(inline_ingress_rule())))
                    .with_description("Inbound rules open to any IPv4 address"),
            ),
    )
}

/// Returns the schema for an inbound rule whose source is another group
pub fn security_group_ingress_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("ec2.security_group_ingress")
            .with_description("An inbound rule admitting members of another Security Group")
            .attribute(reference("group_id", "Security Group the rule belongs to"))
            .attribute(reference("source_security_group_id", "Security Group admitted"))
            .attribute(
                AttributeSchema::new("ip_protocol", types::protocol())
                    .required()
                    .with_description("Protocol (tcp or udp)"),
            )
            .attribute(
                AttributeSchema::new("from_port", types::port_number())
                    .required()
                    .with_description("Start of port range"),
            )
            .attribute(
                AttributeSchema::new("to_port", types::port_number())
                    .required()
                    .with_description("End of port range"),
            )
            .attribute(AttributeSchema::new("description", AttributeType::String)),
    )
}

/// Returns all EC2-related schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        vpc_schema(),
        internet_gateway_schema(),
        vpc_gateway_attachment_schema(),
        subnet_schema(),
        route_table_schema(),
        subnet_route_table_association_schema(),
        route_schema(),
        security_group_schema(),
        security_group_ingress_schema(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Value;
    use std::collections::HashMap;

    #[test]
    fn valid_vpc() {
        let schema = vpc_schema();
        let mut attrs = HashMap::new();
        attrs.insert("region".to_string(), Value::string("eu-north-1"));
        attrs.insert("cidr_block".to_string(), Value::string("10.0.0.0/16"));
        attrs.insert("enable_dns_support".to_string(), Value::Bool(true));

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn vpc_missing_required() {
        let schema = vpc_schema();
        let attrs = HashMap::new();

        let errors = schema.validate(&attrs).unwrap_err();
        let names: Vec<_> = errors.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["cidr_block", "region"]);
    }

    #[test]
    fn ingress_rule_rejects_unknown_protocol() {
        let schema = security_group_ingress_schema();
        let mut attrs = HashMap::new();
        attrs.insert("region".to_string(), Value::string("eu-north-1"));
        attrs.insert("group_id".to_string(), Value::reference("a", "group_id"));
        attrs.insert(
            "source_security_group_id".to_string(),
            Value::reference("b", "group_id"),
        );
        attrs.insert("ip_protocol".to_string(), Value::string("tcp"));
        attrs.insert("from_port".to_string(), Value::Int(2049));
        attrs.insert("to_port".to_string(), Value::Int(2049));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("ip_protocol".to_string(), Value::string("icmp"));
        assert!(schema.validate(&attrs).is_err());
    }

    #[test]
    fn inline_rules_need_a_cidr() {
        let mut rule = HashMap::new();
        rule.insert("ip_protocol".to_string(), Value::string("udp"));
        rule.insert("from_port".to_string(), Value::Int(2456));
        rule.insert("to_port".to_string(), Value::Int(2457));

        let t = AttributeType::List(Box::new(inline_ingress_rule()));
        assert!(t.validate(&Value::List(vec![Value::Map(rule.clone())])).is_err());

        rule.insert("cidr_ip".to_string(), Value::string("0.0.0.0/0"));
        assert!(t.validate(&Value::List(vec![Value::Map(rule)])).is_ok());
    }
}
