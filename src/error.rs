//! Error types for the roster agent.

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Task registry errors surfaced synchronously to callers of
/// [`TaskManager`](crate::tasks::TaskManager).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task {name} is already running")]
    AlreadyRunning { name: String },

    #[error("Task {name} is not running")]
    NotRunning { name: String },
}

/// Errors talking to the coordinating roster API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection to roster API failed: {0}")]
    Connection(String),

    #[error("Resource not found: {path}")]
    NotFound { path: String },

    #[error("Roster API returned {status} for {path}")]
    Status { status: u16, path: String },

    #[error("Invalid response from roster API: {0}")]
    InvalidResponse(String),
}

/// Execution context errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("No execution flow is active on the current task")]
    OutsideFlow,
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
