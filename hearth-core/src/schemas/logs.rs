//! Log sink schema definitions

use super::with_common_attributes;
use crate::schema::ResourceSchema;

pub fn log_group_schema() -> ResourceSchema {
    with_common_attributes(
        ResourceSchema::new("logs.log_group").with_description("A log group receiving container output"),
    )
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![log_group_schema()]
}
