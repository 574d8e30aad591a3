//! Schema - Define type schemas for resources and configuration
//!
//! Each rendered resource type has a schema, and the deployment context is
//! checked against one before assembly starts.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// List
    List(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Map with named, individually typed fields
    Struct {
        name: String,
        fields: Vec<AttributeSchema>,
    },
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            // ResourceRef values resolve to strings at apply time
            (AttributeType::String, Value::String(_) | Value::ResourceRef(_, _)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { base, validate, .. }, v) => {
                base.validate(v)?;
                if matches!(v, Value::ResourceRef(_, _)) {
                    return Ok(());
                }
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Struct { fields, .. }, Value::Map(map)) => {
                for field in fields {
                    match map.get(&field.name) {
                        Some(v) => field.attr_type.validate(v),
                        None if field.required => Err(TypeError::MissingRequired {
                            name: field.name.clone(),
                        }),
                        None => Ok(()),
                    }
                    .map_err(|e| TypeError::MapValueError {
                        key: field.name.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Struct { name, .. } => name.clone(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Validate resource attributes.
    ///
    /// Errors come back as `(attribute, error)` pairs sorted by attribute.
    pub fn validate(
        &self,
        attributes: &HashMap<String, Value>,
    ) -> Result<(), Vec<(String, TypeError)>> {
        let mut errors = Vec::new();

        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) {
                errors.push((name.clone(), TypeError::MissingRequired { name: name.clone() }));
            }
        }

        for (name, value) in attributes {
            if let Some(schema) = self.attributes.get(name)
                && let Err(e) = schema.attr_type.validate(value)
            {
                errors.push((name.clone(), e));
            }
            // Unknown attributes are allowed
        }

        if errors.is_empty() {
            Ok(())
        } else {
            errors.sort_by(|a, b| a.0.cmp(&b.0));
            Err(errors)
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if *n > 0 => Ok(()),
                Value::Int(_) => Err("Value must be positive".to_string()),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// Non-negative integer type (instance counts)
    pub fn count() -> AttributeType {
        AttributeType::Custom {
            name: "Count".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if *n >= 0 => Ok(()),
                Value::Int(_) => Err("Count must not be negative".to_string()),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// String that must not be empty
    pub fn non_empty_string() -> AttributeType {
        AttributeType::Custom {
            name: "NonEmptyString".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if !s.trim().is_empty() => Ok(()),
                Value::String(_) => Err("Value must not be empty".to_string()),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    /// Port number type
    pub fn port_number() -> AttributeType {
        AttributeType::Custom {
            name: "PortNumber".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match value {
                Value::Int(n) if (0..=65535).contains(n) => Ok(()),
                Value::Int(_) => Err("Port number must be between 0 and 65535".to_string()),
                _ => Err("Expected integer".to_string()),
            },
        }
    }

    /// Transport protocol used by ingress rules and port mappings
    pub fn protocol() -> AttributeType {
        AttributeType::Enum(vec!["tcp".to_string(), "udp".to_string()])
    }

    /// Removal policy attached to owned resources
    pub fn removal_policy() -> AttributeType {
        AttributeType::Enum(vec!["destroy".to_string(), "retain".to_string()])
    }

    /// CIDR block type (e.g., "10.0.0.0/16")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| {
                if let Value::String(s) = value {
                    validate_cidr(s)
                } else {
                    Err("Expected string".to_string())
                }
            },
        }
    }
}

/// Validate CIDR block format (e.g., "10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let Some((ip, prefix)) = cidr.split_once('/') else {
        return Err(format!("Invalid CIDR format '{}': expected IP/prefix", cidr));
    };

    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return Err(format!("Invalid IP address '{}': expected 4 octets", ip));
    }

    for octet in &octets {
        if octet.parse::<u8>().is_err() {
            return Err(format!(
                "Invalid octet '{}' in IP address: must be 0-255",
                octet
            ));
        }
    }

    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-32", p)),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            prefix
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::string("hello")).is_ok());
        assert!(t.validate(&Value::reference("vpc", "vpc_id")).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = types::protocol();
        assert!(t.validate(&Value::string("udp")).is_ok());
        assert!(t.validate(&Value::string("icmp")).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
        assert!(t.validate(&Value::string("1")).is_err());
    }

    #[test]
    fn custom_type_accepts_reference_matching_base() {
        assert!(types::non_empty_string().validate(&Value::reference("vpc", "vpc_id")).is_ok());
        assert!(types::port_number().validate(&Value::reference("vpc", "vpc_id")).is_err());
    }

    #[test]
    fn validate_port_number() {
        let t = types::port_number();
        assert!(t.validate(&Value::Int(2049)).is_ok());
        assert!(t.validate(&Value::Int(65536)).is_err());
    }

    #[test]
    fn map_errors_name_the_key() {
        let t = AttributeType::Map(Box::new(AttributeType::String));
        let mut map = HashMap::new();
        map.insert("WORLD".to_string(), Value::Int(1));
        let err = t.validate(&Value::Map(map)).unwrap_err();
        assert!(matches!(err, TypeError::MapValueError { ref key, .. } if key == "WORLD"));
    }

    #[test]
    fn struct_fields_are_typed_individually() {
        let t = AttributeType::Struct {
            name: "PortMapping".to_string(),
            fields: vec![
                AttributeSchema::new("container_port", types::port_number()).required(),
                AttributeSchema::new("protocol", types::protocol()),
            ],
        };

        let mut map = HashMap::new();
        map.insert("container_port".to_string(), Value::Int(2456));
        map.insert("protocol".to_string(), Value::string("udp"));
        assert!(t.validate(&Value::Map(map.clone())).is_ok());

        map.remove("container_port");
        let err = t.validate(&Value::Map(map)).unwrap_err();
        assert_eq!(
            err,
            TypeError::MapValueError {
                key: "container_port".to_string(),
                inner: Box::new(TypeError::MissingRequired {
                    name: "container_port".to_string()
                }),
            }
        );
        assert!(t.validate(&Value::string("2456/udp")).is_err());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("ecs.task_definition")
            .attribute(AttributeSchema::new("memory", types::positive_int()).required())
            .attribute(AttributeSchema::new("cpu", types::positive_int()).required());

        let mut attrs = HashMap::new();
        attrs.insert("cpu".to_string(), Value::Int(256));

        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "memory");
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();
        assert!(t.validate(&Value::string("10.0.0.0/16")).is_ok());
        assert!(t.validate(&Value::string("0.0.0.0/0")).is_ok());
        assert!(t.validate(&Value::string("10.0.0.0")).is_err());
        assert!(t.validate(&Value::string("10.0.0.0/33")).is_err());
        assert!(t.validate(&Value::string("10.0.0.256/16")).is_err());
        assert!(t.validate(&Value::Int(42)).is_err());
    }
}
