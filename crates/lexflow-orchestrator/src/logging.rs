use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

/// Full context of one agent execution, handed to the log hook.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    /// Agent (task kind or step agent name) that executed.
    pub agent: String,
    /// Whether the execution succeeded.
    pub success: bool,
    /// When execution began.
    pub started_at: DateTime<Utc>,
    /// When execution reached its terminal outcome.
    pub finished_at: DateTime<Utc>,
    /// The payload the handler received.
    pub input: serde_json::Value,
    /// The handler's result, on success.
    pub output: Option<serde_json::Value>,
    /// The failure message, on error.
    pub error: Option<String>,
    /// Caller context: task id and priority for dispatched tasks, workflow
    /// and step ids for workflow steps. Opaque to the hook.
    pub metadata: serde_json::Value,
}

impl ExecutionRecord {
    /// Wall-clock duration of the execution in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Hook called unconditionally after every execution, success or failure.
///
/// The hook is infallible by signature, so it can never mask the task
/// outcome it is reporting on.
pub trait ExecutionLogger: Send + Sync {
    /// Record one finished execution.
    fn log_execution(&self, record: &ExecutionRecord);
}

/// Default logger that emits structured `tracing` events.
pub struct TracingLogger;

impl ExecutionLogger for TracingLogger {
    fn log_execution(&self, record: &ExecutionRecord) {
        if record.success {
            info!(
                agent = %record.agent,
                duration_ms = record.duration_ms(),
                "Execution completed"
            );
        } else {
            error!(
                agent = %record.agent,
                duration_ms = record.duration_ms(),
                error = record.error.as_deref().unwrap_or("unknown"),
                "Execution failed"
            );
        }
    }
}
