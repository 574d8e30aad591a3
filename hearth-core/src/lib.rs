//! Hearth Core
//!
//! Topology engine for a game server and its file-management sidecar. The
//! engine turns a deployment context into a plan of resources; nothing is
//! applied here.

pub mod context;
pub mod differ;
pub mod effect;
pub mod environment;
pub mod error;
pub mod plan;
pub mod resource;
pub mod schema;
pub mod schemas;
pub mod topology;

pub use context::DeploymentContext;
pub use environment::Environment;
pub use error::{AssemblyError, ConfigError};
pub use topology::{Assembly, StackOutputs, assemble};
