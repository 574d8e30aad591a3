//! Hearth State
//!
//! Persists what the last `record` run planned: every resource with its
//! attributes, and the stack outputs later runs read back (the shared volume
//! identifier in particular, so a redeploy can attach to the same volume).
//!
//! # Example
//!
//! ```ignore
//! use hearth_state::{BackendConfig, StateFile, create_backend};
//!
//! let backend = create_backend(&BackendConfig::local("hearth.state.json")).await?;
//!
//! let lock = backend.acquire_lock("record").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! state.record(&assembly.plan, &assembly.outputs);
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
