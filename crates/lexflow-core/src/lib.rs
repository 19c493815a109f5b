//! Shared foundation for the lexflow orchestration workspace.
//!
//! Holds the workspace-wide error type and the coordinator configuration.
//! Everything else lives in the subsystem crates (`lexflow-orchestrator`,
//! `lexflow-bus`, `lexflow-memory`).

/// Coordinator configuration, loadable from TOML.
pub mod config;
/// Workspace-wide error type and result alias.
pub mod error;

pub use config::CoordinatorConfig;
pub use error::{LexflowError, LexflowResult};
