//! Schemas - one schema per rendered resource type
//!
//! Every resource the topology engine emits is checked against the schema
//! registered for its type. Reads of data sources only check the attributes
//! they carry, since the rest is owned elsewhere.

pub mod ec2;
pub mod ecs;
pub mod efs;
pub mod logs;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId};
use crate::schema::{AttributeSchema, ResourceSchema, TypeError, types};

/// A resource that failed validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("{0}: no schema registered for this resource type")]
    UnknownType(ResourceId),

    #[error("{id}.{attribute}: {error}")]
    Attribute {
        id: ResourceId,
        attribute: String,
        error: TypeError,
    },
}

/// Returns every registered schema
pub fn all_schemas() -> Vec<ResourceSchema> {
    let mut schemas = ec2::schemas();
    schemas.extend(ecs::schemas());
    schemas.extend(efs::schemas());
    schemas.extend(logs::schemas());
    schemas
}

pub fn schema_for(resource_type: &str) -> Option<ResourceSchema> {
    all_schemas()
        .into_iter()
        .find(|s| s.resource_type == resource_type)
}

/// Attributes every rendered resource shares
pub(crate) fn with_common_attributes(schema: ResourceSchema) -> ResourceSchema {
    schema
        .attribute(
            AttributeSchema::new("region", types::non_empty_string())
                .required()
                .with_description("Region the resource lives in"),
        )
        .attribute(
            AttributeSchema::new("removal_policy", types::removal_policy())
                .with_description("What happens to the resource when the stack is torn down"),
        )
}

/// Validate one resource. Data sources skip required-attribute checks.
pub fn validate_resource(resource: &Resource) -> Result<(), Vec<SchemaError>> {
    let schema = schema_for(&resource.id.resource_type)
        .ok_or_else(|| vec![SchemaError::UnknownType(resource.id.clone())])?;

    match schema.validate(&resource.attributes) {
        Ok(()) => Ok(()),
        Err(errors) => {
            let errors: Vec<_> = errors
                .into_iter()
                .filter(|(_, e)| {
                    !(resource.is_data_source() && matches!(e, TypeError::MissingRequired { .. }))
                })
                .map(|(attribute, error)| SchemaError::Attribute {
                    id: resource.id.clone(),
                    attribute,
                    error,
                })
                .collect();
            if errors.is_empty() { Ok(()) } else { Err(errors) }
        }
    }
}

/// Validate every resource a plan reads or writes, returning how many were
/// checked
pub fn validate_plan(plan: &Plan) -> Result<usize, Vec<SchemaError>> {
    let mut checked = 0;
    let mut errors = Vec::new();

    for effect in plan.effects() {
        let resource = match effect {
            Effect::Read(r) | Effect::Create(r) => r,
            Effect::Update { to, .. } => to,
            Effect::Delete(_) => continue,
        };
        checked += 1;
        if let Err(mut e) = validate_resource(resource) {
            errors.append(&mut e);
        }
    }

    if errors.is_empty() {
        Ok(checked)
    } else {
        Err(errors)
    }
}
