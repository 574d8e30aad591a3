//! State file structures for persisting planned resources and outputs

use std::collections::{BTreeMap, HashMap};

use hearth_core::effect::Effect;
use hearth_core::plan::Plan;
use hearth_core::resource::{Resource, ResourceId, State, Value};
use hearth_core::topology::volume::{RESOURCE_NAME as VOLUME_NAME, RESOURCE_TYPE as VOLUME_TYPE};
use hearth_core::topology::{RecordedIdentifiers, StackOutputs};
use log::warn;
use serde::{Deserialize, Serialize};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage
    pub lineage: String,
    /// Version of hearth that last modified this state
    pub hearth_version: String,
    pub resources: Vec<ResourceState>,
    /// Named durable outputs of the last recorded assembly
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            hearth_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Increment serial and stamp the running version before a write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.hearth_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or replace a resource, keeping first-seen order
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove_resource(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }

    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }

    /// Identifier of the shared volume an earlier run created. Volumes that
    /// were only referenced are not ours to reuse.
    pub fn created_volume_id(&self) -> Option<&str> {
        self.find_resource(VOLUME_TYPE, VOLUME_NAME)
            .filter(|r| !r.read_only)
            .and_then(|r| r.attributes.get(FILE_SYSTEM_ID))
            .and_then(serde_json::Value::as_str)
    }

    /// Identifier source that keeps a created volume stable across runs
    pub fn identifiers(&self) -> RecordedIdentifiers {
        RecordedIdentifiers::new(self.created_volume_id().map(str::to_string))
    }

    /// Replace the recorded resources and outputs with those of a plan.
    ///
    /// Protected resources recorded earlier but absent from the plan are
    /// kept; everything else not in the plan is dropped. An owned protected
    /// resource whose planned replacement points at a different file system
    /// is kept too, renamed after the file system it tracks.
    pub fn record(&mut self, plan: &Plan, outputs: &StackOutputs) {
        let planned: Vec<ResourceState> = plan
            .effects()
            .iter()
            .filter_map(|effect| match effect {
                Effect::Read(r) | Effect::Create(r) => Some(ResourceState::from_resource(r)),
                Effect::Update { to, .. } => Some(ResourceState::from_resource(to)),
                Effect::Delete(_) => None,
            })
            .collect();

        let retained: Vec<ResourceState> = self
            .resources
            .drain(..)
            .filter(|old| old.protected)
            .filter_map(|old| {
                let replacement = planned
                    .iter()
                    .find(|r| r.resource_type == old.resource_type && r.name == old.name);
                match replacement {
                    None => Some(old),
                    Some(new) => displaced(old, new),
                }
            })
            .collect();

        self.resources = retained;
        for resource in planned {
            self.upsert_resource(resource);
        }
        self.outputs = outputs.to_map();
        self.increment_serial();
    }

    /// Recorded resources keyed by id, in the shape the differ consumes
    pub fn current_states(&self) -> HashMap<ResourceId, State> {
        self.resources
            .iter()
            .map(|r| {
                let state = r.to_state();
                (state.id.clone(), state)
            })
            .collect()
    }
}

const FILE_SYSTEM_ID: &str = "file_system_id";

/// An owned protected resource about to be overwritten by one tracking
/// another file system, renamed so it stays on record
fn displaced(old: ResourceState, new: &ResourceState) -> Option<ResourceState> {
    if old.read_only {
        return None;
    }
    let old_id = old.attributes.get(FILE_SYSTEM_ID)?.as_str()?;
    if new.attributes.get(FILE_SYSTEM_ID).and_then(serde_json::Value::as_str) == Some(old_id) {
        return None;
    }
    let name = format!("{}_{}", old.name, old_id);
    warn!(
        "{}.{} now tracks another file system; keeping {} on record as {}",
        old.resource_type,
        old.name,
        old_id,
        name
    );
    Some(ResourceState { name, ..old })
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "ecs.service", "efs.file_system")
    pub resource_type: String,
    pub name: String,
    /// Attributes as JSON; references are kept in `${binding.attribute}` form
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Referenced but not owned by this stack
    #[serde(default)]
    pub read_only: bool,
    /// Never deleted by reconciliation
    #[serde(default)]
    pub protected: bool,
}

impl ResourceState {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            attributes: BTreeMap::new(),
            read_only: false,
            protected: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    /// Data sources and resources retained on teardown are protected
    pub fn from_resource(resource: &Resource) -> Self {
        let retained = resource.attribute("removal_policy").and_then(Value::as_str) == Some("retain");
        Self {
            resource_type: resource.id.resource_type.clone(),
            name: resource.id.name.clone(),
            attributes: resource
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
            read_only: resource.read_only,
            protected: resource.is_data_source() || retained,
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    pub fn to_state(&self) -> State {
        let attributes = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect();
        State::existing(self.id(), attributes).with_protected(self.protected)
    }
}
