//! Error types for context loading and assembly

use thiserror::Error;

/// A required input is missing or malformed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Required context key '{key}' is missing")]
    Missing { key: String },

    #[error("Context key '{key}' has the wrong type: expected {expected}, got {got}")]
    InvalidType {
        key: String,
        expected: String,
        got: String,
    },

    #[error("Context key '{key}' is invalid: {message}")]
    Invalid { key: String, message: String },

    /// Account or region could not be resolved
    #[error("{0} not found")]
    NotFound(String),

    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

impl ConfigError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing { key: key.into() }
    }

    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Errors that abort an assembly. No partial plan survives one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Topology error: {0}")]
    Topology(String),
}

pub type AssemblyResult<T> = Result<T, AssemblyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::missing("primary-image-reference");
        assert_eq!(
            error.to_string(),
            "Required context key 'primary-image-reference' is missing"
        );
        assert_eq!(
            ConfigError::NotFound("account id".to_string()).to_string(),
            "account id not found"
        );
    }

    #[test]
    fn assembly_error_wraps_config_error() {
        let error: AssemblyError = ConfigError::missing("cpu-limit").into();
        assert!(matches!(error, AssemblyError::Config(ConfigError::Missing { .. })));
        assert!(error.to_string().starts_with("Configuration error: "));
    }
}
