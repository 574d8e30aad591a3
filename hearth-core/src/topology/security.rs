//! Security groups, ingress rules and port ranges

use std::collections::BTreeSet;
use std::fmt;

use crate::resource::{Resource, Value};

/// Transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive port range on one protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub protocol: Protocol,
    pub from: u16,
    pub to: u16,
}

impl PortRange {
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from: port,
            to: port,
        }
    }

    pub fn udp(port: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            from: port,
            to: port,
        }
    }

    pub fn udp_range(from: u16, to: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            from,
            to,
        }
    }

    /// Every (protocol, port) pair in the range
    pub fn ports(&self) -> impl Iterator<Item = (Protocol, u16)> + '_ {
        (self.from..=self.to).map(|p| (self.protocol, p))
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from == self.to {
            write!(f, "{} {}", self.protocol, self.from)
        } else {
            write!(f, "{} {}-{}", self.protocol, self.from, self.to)
        }
    }
}

/// Where inbound traffic may come from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Peer {
    AnyIpv4,
    /// Members of another security group, by binding name
    Group(String),
}

impl Peer {
    pub const ANY_IPV4_CIDR: &'static str = "0.0.0.0/0";
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::AnyIpv4 => f.write_str(Self::ANY_IPV4_CIDR),
            Peer::Group(name) => write!(f, "sg:{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub peer: Peer,
    pub ports: PortRange,
    pub description: String,
}

/// A named set of inbound rules; also the network identity of whatever it
/// is attached to
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroup {
    pub name: String,
    pub description: String,
    vpc: String,
    ingress: Vec<IngressRule>,
}

impl SecurityGroup {
    pub const RESOURCE_TYPE: &'static str = "ec2.security_group";
    pub const INGRESS_RESOURCE_TYPE: &'static str = "ec2.security_group_ingress";

    pub fn new(name: impl Into<String>, description: impl Into<String>, vpc: &str) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            vpc: vpc.to_string(),
            ingress: Vec::new(),
        }
    }

    pub fn allow_from_any_ipv4(&mut self, ports: PortRange) {
        self.ingress.push(IngressRule {
            peer: Peer::AnyIpv4,
            description: format!("from {}:{}", Peer::ANY_IPV4_CIDR, ports),
            ports,
        });
    }

    /// Allow members of `peer` in on `ports`
    pub fn allow_from(&mut self, peer: &SecurityGroup, ports: PortRange) {
        self.ingress.push(IngressRule {
            peer: Peer::Group(peer.name.clone()),
            description: format!("from {}:{}", peer.name, ports),
            ports,
        });
    }

    pub fn ingress(&self) -> &[IngressRule] {
        &self.ingress
    }

    /// Every (protocol, port) reachable from anywhere
    pub fn public_ports(&self) -> BTreeSet<(Protocol, u16)> {
        self.ingress
            .iter()
            .filter(|rule| rule.peer == Peer::AnyIpv4)
            .flat_map(|rule| rule.ports.ports())
            .collect()
    }

    pub fn group_id(&self) -> Value {
        Value::reference(&self.name, "group_id")
    }

    /// The group itself, carrying its any-source rules inline. Rules naming
    /// another group are separate resources, see [`Self::peer_rule_resources`].
    pub fn resource(&self) -> Resource {
        let inline = self
            .ingress
            .iter()
            .filter(|rule| rule.peer == Peer::AnyIpv4)
            .map(|rule| {
                let mut map = rule_attributes(rule);
                map.insert("cidr_ip".to_string(), Value::string(Peer::ANY_IPV4_CIDR));
                Value::Map(map)
            })
            .collect();

        Resource::new(Self::RESOURCE_TYPE, &self.name)
            .with_attribute("vpc_id", Value::reference(&self.vpc, "vpc_id"))
            .with_attribute("description", Value::string(&self.description))
            .with_attribute("allow_all_outbound", Value::Bool(true))
            .with_attribute("ingress", Value::List(inline))
    }

    pub fn peer_rule_resources(&self) -> Vec<Resource> {
        self.ingress
            .iter()
            .filter_map(|rule| match &rule.peer {
                Peer::Group(peer) => {
                    let mut resource = Resource::new(
                        Self::INGRESS_RESOURCE_TYPE,
                        format!("{}_from_{}", self.name, peer),
                    )
                    .with_attribute("group_id", self.group_id())
                    .with_attribute(
                        "source_security_group_id",
                        Value::reference(peer, "group_id"),
                    );
                    resource.attributes.extend(rule_attributes(rule));
                    Some(resource)
                }
                Peer::AnyIpv4 => None,
            })
            .collect()
    }
}

fn rule_attributes(rule: &IngressRule) -> std::collections::HashMap<String, Value> {
    let mut map = std::collections::HashMap::new();
    map.insert(
        "ip_protocol".to_string(),
        Value::string(rule.ports.protocol.as_str()),
    );
    map.insert("from_port".to_string(), Value::Int(rule.ports.from.into()));
    map.insert("to_port".to_string(), Value::Int(rule.ports.to.into()));
    map.insert("description".to_string(), Value::string(&rule.description));
    map
}
