//! Environment - the account and region a stack is planned for
//!
//! Both values are opaque to the engine. They are resolved once, outside
//! the assembler, and passed in explicitly.

use log::debug;

use crate::context::{DeploymentContext, keys};
use crate::error::ConfigError;

/// Process variable consulted when the context carries no account id
pub const ACCOUNT_VAR: &str = "HEARTH_DEFAULT_ACCOUNT";
/// Process variable consulted when the context carries no region
pub const REGION_VAR: &str = "HEARTH_DEFAULT_REGION";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    /// Resolve from the context first, then from `lookup` (usually
    /// `std::env::var`).
    pub fn resolve<F>(context: &DeploymentContext, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account = resolve_one(context, keys::ACCOUNT_ID, ACCOUNT_VAR, "account id", &lookup)?;
        let region = resolve_one(context, keys::REGION, REGION_VAR, "region", &lookup)?;
        debug!("Resolved environment {}/{}", account, region);
        Ok(Self { account, region })
    }

    /// Resolve using the process environment
    pub fn from_process(context: &DeploymentContext) -> Result<Self, ConfigError> {
        Self::resolve(context, |name| std::env::var(name).ok())
    }

    /// The single availability zone the network boundary is confined to
    pub fn availability_zone(&self) -> String {
        format!("{}a", self.region)
    }
}

fn resolve_one<F>(
    context: &DeploymentContext,
    key: &str,
    var: &str,
    what: &str,
    lookup: &F,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = context.get_string(key)?.filter(|s| !s.trim().is_empty()) {
        return Ok(value);
    }
    lookup(var)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ConfigError::NotFound(what.to_string()))
}
