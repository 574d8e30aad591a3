//! Plan - Collection of Effects
//!
//! A Plan is an ordered list of Effects to be executed.
//! No side effects occur until the Plan is applied.

use crate::effect::Effect;
use crate::resource::{Resource, ResourceId};

/// Plan containing Effects in dependency order
#[derive(Debug, Clone, Default)]
pub struct Plan {
    effects: Vec<Effect>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Number of mutating Effects
    pub fn mutation_count(&self) -> usize {
        self.effects.iter().filter(|e| e.is_mutating()).count()
    }

    /// Desired resources carried by the plan, in order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.effects.iter().filter_map(Effect::resource)
    }

    pub fn find(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources().find(|r| &r.id == id)
    }

    /// Desired resources of one type
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources()
            .filter(move |r| r.id.resource_type == resource_type)
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Read(_) => summary.read += 1,
                Effect::Create(_) => summary.create += 1,
                Effect::Update { .. } => summary.update += 1,
                Effect::Delete(_) => summary.delete += 1,
            }
        }
        summary
    }

    /// JSON rendering used by `hearth synth --json`
    pub fn to_json(&self) -> serde_json::Value {
        let effects = self
            .effects
            .iter()
            .map(|effect| {
                let mut entry = serde_json::Map::new();
                let action = match effect {
                    Effect::Read(_) => "read",
                    Effect::Create(_) => "create",
                    Effect::Update { .. } => "update",
                    Effect::Delete(_) => "delete",
                };
                entry.insert("action".to_string(), action.into());
                let id = effect.resource_id();
                entry.insert("type".to_string(), id.resource_type.clone().into());
                entry.insert("name".to_string(), id.name.clone().into());
                if let Some(resource) = effect.resource() {
                    let mut keys: Vec<_> = resource.attributes.keys().collect();
                    keys.sort();
                    let attrs = keys
                        .into_iter()
                        .map(|k| (k.clone(), resource.attributes[k].to_json()))
                        .collect();
                    entry.insert("attributes".to_string(), serde_json::Value::Object(attrs));
                }
                serde_json::Value::Object(entry)
            })
            .collect();
        serde_json::Value::Array(effects)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub read: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to update, {} to delete",
            self.create, self.update, self.delete
        )
    }
}
