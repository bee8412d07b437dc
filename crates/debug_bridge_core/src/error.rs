use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebugError {
    #[error("No active debug session")]
    NoActiveSession,

    #[error("A debug session is already active: {0}")]
    SessionAlreadyActive(String),

    #[error("Unknown step type: {0}")]
    UnknownStepType(String),

    #[error("Debug configuration not found: {0}")]
    ConfigurationNotFound(String),

    #[error("No debug configurations found")]
    NoConfigurations,

    #[error("No breakpoint found at {path}:{line}")]
    BreakpointNotFound { path: String, line: u32 },

    #[error("Line numbers are 1-based, got {0}")]
    InvalidLine(u32),

    #[error("'{0}' is not supported by the debug adapter")]
    Unsupported(String),

    #[error("Debug adapter error: {0}")]
    Adapter(String),

    #[error("Debug call timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

impl DebugError {
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::Adapter(message.into())
    }

    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported(capability.into())
    }

    /// True for failures caused by a capability the adapter does not implement.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}
