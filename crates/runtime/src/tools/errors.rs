use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while dispatching a tool call.
///
/// These are recoverable: the agent records them as the tool's result and lets
/// the model decide what to do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("malformed arguments: {0}")]
    MalformedArguments(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("cancelled before completion")]
    Cancelled,
    #[error("execution failed: {0}")]
    Execution(String),
}

impl ToolError {
    /// Wrap an executable's own failure.
    pub fn execution(err: impl std::fmt::Display) -> Self {
        Self::Execution(err.to_string())
    }
}

/// Errors raised while building a registry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("tool already registered: {0}")]
    Duplicate(String),
}
