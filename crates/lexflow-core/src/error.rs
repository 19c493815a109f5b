use thiserror::Error;

/// Convenience alias used by every fallible lexflow operation.
pub type LexflowResult<T> = Result<T, LexflowError>;

/// Error type shared across all lexflow crates.
#[derive(Error, Debug)]
pub enum LexflowError {
    /// Task submission or execution failed.
    #[error("Task error: {0}")]
    Task(String),

    /// Workflow definition or execution failed.
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Communication bus failure (unknown recipient, handler error).
    #[error("Bus error: {0}")]
    Bus(String),

    /// Memory store failure.
    #[error("Memory error: {0}")]
    Memory(String),

    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
