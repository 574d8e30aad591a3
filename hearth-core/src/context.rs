//! Deployment context - the named configuration values driving assembly
//!
//! The context is loaded once from a JSON file, layered with `key=value`
//! overrides, and never changes afterwards.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::debug;

use crate::error::ConfigError;
use crate::resource::Value;
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema, TypeError, types};

/// Context keys understood by the engine
pub mod keys {
    pub const EXISTING_VOLUME_ID: &str = "existing-volume-identifier";
    pub const MEMORY_LIMIT: &str = "memory-limit";
    pub const CPU_LIMIT: &str = "cpu-limit";
    pub const PRIMARY_IMAGE: &str = "primary-image-reference";
    pub const PRIMARY_ENVIRONMENT: &str = "primary-environment";
    pub const AUXILIARY_IMAGE: &str = "auxiliary-image-reference";
    pub const AUXILIARY_ENVIRONMENT: &str = "auxiliary-environment";
    pub const ACCOUNT_ID: &str = "account-id";
    pub const REGION: &str = "region";
}

/// Key names used by earlier CDK-based deployments, mapped to their
/// current names
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("fileSystemId", keys::EXISTING_VOLUME_ID),
    ("memoryLimit", keys::MEMORY_LIMIT),
    ("cpuLimit", keys::CPU_LIMIT),
    ("valheimServerDockerContainer", keys::PRIMARY_IMAGE),
    (
        "valheimServerDockerEnvironmentVariables",
        keys::PRIMARY_ENVIRONMENT,
    ),
    ("sshDockerContainer", keys::AUXILIARY_IMAGE),
    ("sshDockerEnvironmentVariables", keys::AUXILIARY_ENVIRONMENT),
    ("aws-account-id", keys::ACCOUNT_ID),
    ("aws-region", keys::REGION),
];

const INT_KEYS: &[&str] = &[keys::MEMORY_LIMIT, keys::CPU_LIMIT];
const MAP_KEYS: &[&str] = &[keys::PRIMARY_ENVIRONMENT, keys::AUXILIARY_ENVIRONMENT];

fn canonical_key(key: &str) -> Option<&'static str> {
    LEGACY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| *canonical)
}

/// Schema every context is checked against before assembly
pub fn context_schema() -> ResourceSchema {
    ResourceSchema::new("context")
        .attribute(
            AttributeSchema::new(keys::EXISTING_VOLUME_ID, AttributeType::String)
                .with_description("Identifier of a shared volume to attach instead of creating one"),
        )
        .attribute(
            AttributeSchema::new(keys::MEMORY_LIMIT, types::positive_int())
                .with_description("Memory limit of the primary task in MiB"),
        )
        .attribute(
            AttributeSchema::new(keys::CPU_LIMIT, types::positive_int())
                .with_description("CPU units of the primary task"),
        )
        .attribute(
            AttributeSchema::new(keys::PRIMARY_IMAGE, types::non_empty_string())
                .required()
                .with_description("Container image of the game server"),
        )
        .attribute(
            AttributeSchema::new(
                keys::PRIMARY_ENVIRONMENT,
                AttributeType::Map(Box::new(AttributeType::String)),
            )
            .with_description("Environment variables of the game server container"),
        )
        .attribute(
            AttributeSchema::new(keys::AUXILIARY_IMAGE, types::non_empty_string())
                .required()
                .with_description("Container image of the file-management sidecar"),
        )
        .attribute(
            AttributeSchema::new(
                keys::AUXILIARY_ENVIRONMENT,
                AttributeType::Map(Box::new(AttributeType::String)),
            )
            .with_description("Environment variables of the file-management container"),
        )
        .attribute(AttributeSchema::new(keys::ACCOUNT_ID, types::non_empty_string()))
        .attribute(AttributeSchema::new(keys::REGION, types::non_empty_string()))
}

/// Immutable bag of named configuration values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentContext {
    values: HashMap<String, Value>,
}

impl DeploymentContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mainly for programmatic construction
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.set(key, value);
        self
    }

    fn set(&mut self, key: &str, value: Value) {
        let key = canonical_key(key).unwrap_or(key);
        let value = normalize_value(key, value);
        self.values.insert(key.to_string(), value);
    }

    /// Build a context from a JSON document. Either a flat object or an
    /// object with a `"context"` member is accepted.
    pub fn from_json(json: &serde_json::Value, source: &str) -> Result<Self, ConfigError> {
        let object = match json.get("context") {
            Some(inner) => inner,
            None => json,
        };
        let object = object.as_object().ok_or_else(|| ConfigError::Parse {
            path: source.to_string(),
            message: "expected a JSON object".to_string(),
        })?;

        let mut context = Self::new();
        // Legacy names first so that current names win on conflict
        let (legacy, current): (Vec<_>, Vec<_>) = object
            .iter()
            .partition(|(key, _)| canonical_key(key).is_some());
        for (key, value) in legacy.into_iter().chain(current) {
            context.set(key, Value::from_json(value));
        }
        Ok(context)
    }

    /// Load a context file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let json: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let context = Self::from_json(&json, &path.display().to_string())?;
        debug!("Loaded {} context values from {}", context.len(), path.display());
        Ok(context)
    }

    /// Load a context file, treating a missing file as an empty context
    pub fn load_optional(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No context file at {}", path.display());
            return Ok(Self::new());
        }
        Self::load(path)
    }

    /// Layer `key=value` overrides on top of this context. Values that
    /// parse as JSON are taken as JSON, anything else as a string.
    pub fn with_overrides<S: AsRef<str>>(mut self, overrides: &[S]) -> Result<Self, ConfigError> {
        for entry in overrides {
            let entry = entry.as_ref();
            let (key, raw) = entry.split_once('=').ok_or_else(|| {
                ConfigError::invalid(entry, "override must have the form key=value")
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::invalid(entry, "override key is empty"));
            }
            let value = match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(json) => Value::from_json(&json),
                Err(_) => Value::string(raw),
            };
            self.set(key, value);
        }
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check every value against [`context_schema`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        match context_schema().validate(&self.values) {
            Ok(()) => Ok(()),
            Err(errors) => {
                let (key, error) = errors
                    .into_iter()
                    .next()
                    .ok_or_else(|| ConfigError::invalid("context", "validation failed"))?;
                Err(type_error_to_config(key, error))
            }
        }
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(ConfigError::InvalidType {
                key: key.to_string(),
                expected: "String".to_string(),
                got: other.type_name(),
            }),
        }
    }

    pub fn require_string(&self, key: &str) -> Result<String, ConfigError> {
        match self.get_string(key)? {
            Some(s) if !s.trim().is_empty() => Ok(s),
            Some(_) => Err(ConfigError::invalid(key, "value must not be empty")),
            None => Err(ConfigError::missing(key)),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::Int(n)) => Ok(Some(*n)),
            Some(other) => Err(ConfigError::InvalidType {
                key: key.to_string(),
                expected: "Int".to_string(),
                got: other.type_name(),
            }),
        }
    }

    /// A string-to-string map; absent keys yield an empty map
    pub fn get_string_map(&self, key: &str) -> Result<BTreeMap<String, String>, ConfigError> {
        match self.values.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Value::Map(map)) => map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => Ok((k.clone(), s.clone())),
                    other => Err(ConfigError::InvalidType {
                        key: format!("{}.{}", key, k),
                        expected: "String".to_string(),
                        got: other.type_name(),
                    }),
                })
                .collect(),
            Some(other) => Err(ConfigError::InvalidType {
                key: key.to_string(),
                expected: "Map".to_string(),
                got: other.type_name(),
            }),
        }
    }

    /// The shared volume to attach to, if any. An empty string counts as
    /// absent. Anything else is returned exactly as given, so surrounding
    /// whitespace is rejected rather than stripped.
    pub fn existing_volume_id(&self) -> Result<Option<String>, ConfigError> {
        match self.get_string(keys::EXISTING_VOLUME_ID)? {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) if s.trim() != s => Err(ConfigError::invalid(
                keys::EXISTING_VOLUME_ID,
                "identifier must not have surrounding whitespace",
            )),
            Some(s) => Ok(Some(s)),
        }
    }
}

/// Numeric strings become integers for integer keys, and scalar values
/// inside environment maps become strings
fn normalize_value(key: &str, value: Value) -> Value {
    match value {
        Value::String(s) if INT_KEYS.contains(&key) => match s.trim().parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::String(s),
        },
        Value::Map(map) if MAP_KEYS.contains(&key) => Value::Map(
            map.into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::Int(n) => Value::String(n.to_string()),
                        Value::Bool(b) => Value::String(b.to_string()),
                        other => other,
                    };
                    (k, v)
                })
                .collect(),
        ),
        other => other,
    }
}

fn type_error_to_config(key: String, error: TypeError) -> ConfigError {
    match error {
        TypeError::MissingRequired { name } => ConfigError::Missing { key: name },
        TypeError::TypeMismatch { expected, got } => ConfigError::InvalidType { key, expected, got },
        TypeError::MapValueError { key: entry, inner } => match *inner {
            TypeError::TypeMismatch { expected, got } => ConfigError::InvalidType {
                key: format!("{}.{}", key, entry),
                expected,
                got,
            },
            other => ConfigError::invalid(format!("{}.{}", key, entry), other.to_string()),
        },
        TypeError::ValidationFailed { message } => ConfigError::Invalid { key, message },
        other => ConfigError::invalid(key, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_context() -> DeploymentContext {
        DeploymentContext::new()
            .with(keys::MEMORY_LIMIT, Value::Int(2048))
            .with(keys::CPU_LIMIT, Value::Int(1024))
            .with(keys::PRIMARY_IMAGE, Value::string("img/valheim"))
            .with(keys::AUXILIARY_IMAGE, Value::string("img/ssh"))
    }

    #[test]
    fn flat_and_nested_json_are_accepted() {
        let flat = serde_json::json!({ "memory-limit": 2048 });
        let nested = serde_json::json!({ "context": { "memory-limit": 2048 } });

        let a = DeploymentContext::from_json(&flat, "flat").unwrap();
        let b = DeploymentContext::from_json(&nested, "nested").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get_int(keys::MEMORY_LIMIT).unwrap(), Some(2048));
    }

    #[test]
    fn non_object_json_is_a_parse_error() {
        let json = serde_json::json!([1, 2, 3]);
        let err = DeploymentContext::from_json(&json, "ctx.json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn legacy_keys_are_normalised_and_current_keys_win() {
        let json = serde_json::json!({
            "fileSystemId": "fs-legacy",
            "existing-volume-identifier": "fs-current",
            "valheimServerDockerContainer": "img/valheim",
        });
        let context = DeploymentContext::from_json(&json, "ctx").unwrap();

        assert_eq!(context.existing_volume_id().unwrap(), Some("fs-current".to_string()));
        assert_eq!(
            context.require_string(keys::PRIMARY_IMAGE).unwrap(),
            "img/valheim"
        );
        assert!(!context.contains("fileSystemId"));
    }

    #[test]
    fn overrides_parse_json_or_fall_back_to_strings() {
        let context = DeploymentContext::new()
            .with_overrides(&[
                "memory-limit=4096",
                "primary-image-reference=img/valheim:latest",
                r#"primary-environment={"SERVER_NAME":"hearth","SERVER_PUBLIC":1}"#,
            ])
            .unwrap();

        assert_eq!(context.get_int(keys::MEMORY_LIMIT).unwrap(), Some(4096));
        assert_eq!(
            context.require_string(keys::PRIMARY_IMAGE).unwrap(),
            "img/valheim:latest"
        );
        let env = context.get_string_map(keys::PRIMARY_ENVIRONMENT).unwrap();
        assert_eq!(env.get("SERVER_NAME").map(String::as_str), Some("hearth"));
        assert_eq!(env.get("SERVER_PUBLIC").map(String::as_str), Some("1"));
    }

    #[test]
    fn malformed_override_is_rejected() {
        let err = DeploymentContext::new()
            .with_overrides(&["memory-limit"])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn numeric_strings_become_integers() {
        let context = DeploymentContext::new().with(keys::CPU_LIMIT, Value::string("512"));
        assert_eq!(context.get_int(keys::CPU_LIMIT).unwrap(), Some(512));
    }

    #[test]
    fn empty_volume_identifier_counts_as_absent() {
        let context = valid_context().with(keys::EXISTING_VOLUME_ID, Value::string(""));
        assert_eq!(context.existing_volume_id().unwrap(), None);
    }

    #[test]
    fn volume_identifier_is_returned_verbatim() {
        let context = valid_context().with(keys::EXISTING_VOLUME_ID, Value::string("fs-0aB1"));
        assert_eq!(context.existing_volume_id().unwrap(), Some("fs-0aB1".to_string()));

        for padded in [" fs-123 ", "fs-123\n", "   "] {
            let context = valid_context().with(keys::EXISTING_VOLUME_ID, Value::string(padded));
            let err = context.existing_volume_id().unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid { key, .. } if key == keys::EXISTING_VOLUME_ID),
                "{:?} was accepted as {:?}",
                padded,
                err
            );
        }
    }

    #[test]
    fn valid_context_passes_validation() {
        assert!(valid_context().validate().is_ok());
    }

    #[test]
    fn missing_sizing_is_not_a_local_error() {
        let context = DeploymentContext::new()
            .with(keys::PRIMARY_IMAGE, Value::string("img/valheim"))
            .with(keys::AUXILIARY_IMAGE, Value::string("img/ssh"));
        assert!(context.validate().is_ok());
    }

    #[test]
    fn missing_image_fails_validation() {
        let context = DeploymentContext::new()
            .with(keys::AUXILIARY_IMAGE, Value::string("img/ssh"));
        assert_eq!(
            context.validate().unwrap_err(),
            ConfigError::missing(keys::PRIMARY_IMAGE)
        );
    }

    #[test]
    fn malformed_sizing_fails_validation() {
        let context = valid_context().with(keys::MEMORY_LIMIT, Value::string("lots"));
        assert!(matches!(
            context.validate().unwrap_err(),
            ConfigError::InvalidType { ref key, .. } if key == keys::MEMORY_LIMIT
        ));

        let context = valid_context().with(keys::CPU_LIMIT, Value::Int(0));
        assert!(matches!(
            context.validate().unwrap_err(),
            ConfigError::Invalid { ref key, .. } if key == keys::CPU_LIMIT
        ));
    }

    #[test]
    fn nested_environment_values_fail_validation() {
        let mut env = HashMap::new();
        env.insert("PORTS".to_string(), Value::List(vec![Value::Int(1)]));
        let context = valid_context().with(keys::AUXILIARY_ENVIRONMENT, Value::Map(env));

        assert_eq!(
            context.validate().unwrap_err(),
            ConfigError::InvalidType {
                key: "auxiliary-environment.PORTS".to_string(),
                expected: "String".to_string(),
                got: "List".to_string(),
            }
        );
    }

    #[test]
    fn load_reads_file_and_optional_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hearth.json");

        assert!(DeploymentContext::load(&path).is_err());
        assert!(DeploymentContext::load_optional(&path).unwrap().is_empty());

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"context": {{"cpuLimit": "1024"}}}}"#).unwrap();

        let context = DeploymentContext::load(&path).unwrap();
        assert_eq!(context.get_int(keys::CPU_LIMIT).unwrap(), Some(1024));
    }
}
