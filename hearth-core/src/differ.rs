//! Differ - Compare a fresh plan with state recorded by a previous run

use std::collections::{HashMap, HashSet};

use log::warn;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with recorded state to compute a Diff
pub fn diff(desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and recorded state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
) -> Vec<String> {
    let mut changed: Vec<String> = desired
        .iter()
        .filter(|(key, desired_value)| current.get(*key) != Some(*desired_value))
        .map(|(key, _)| key.clone())
        .collect();

    changed.extend(
        current
            .keys()
            .filter(|key| !desired.contains_key(*key))
            .cloned(),
    );

    changed.sort();
    changed
}

/// Rewrite a freshly assembled plan against recorded state.
///
/// Reads pass through untouched. Recorded resources the plan no longer
/// mentions are deleted unless they are protected.
pub fn reconcile(plan: &Plan, current_states: &HashMap<ResourceId, State>) -> Plan {
    let mut reconciled = Plan::new();
    let mut seen: HashSet<&ResourceId> = HashSet::new();

    for effect in plan.effects() {
        seen.insert(effect.resource_id());
        match effect {
            Effect::Create(resource) => {
                let current = current_states
                    .get(&resource.id)
                    .cloned()
                    .unwrap_or_else(|| State::not_found(resource.id.clone()));

                match diff(resource, &current) {
                    Diff::Create(r) => reconciled.add(Effect::Create(r)),
                    Diff::Update { id, from, to, .. } => {
                        reconciled.add(Effect::Update { id, from, to })
                    }
                    Diff::NoChange(_) => {}
                }
            }
            other => reconciled.add(other.clone()),
        }
    }

    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|state| state.exists && !seen.contains(&state.id))
        .collect();
    orphans.sort_by(|a, b| a.id.cmp(&b.id));

    for state in orphans {
        if state.protected {
            warn!("{} is no longer planned but is protected; leaving it in place", state.id);
            continue;
        }
        reconciled.add(Effect::Delete(state.id.clone()));
    }

    reconciled
}
