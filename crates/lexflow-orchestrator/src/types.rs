use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Priority class of a task. Ordered: urgent > high > medium > low.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Lowest priority, dispatched last.
    Low,
    /// Normal priority.
    Medium,
    /// Above-normal priority.
    High,
    /// Highest priority, dispatched first.
    Urgent,
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Urgent => write!(f, "urgent"),
        }
    }
}

/// Status of a task in the dispatch lifecycle.
///
/// `Completed` and `Failed` are terminal and never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, waiting for a worker.
    Pending,
    /// Picked up by a worker.
    InProgress,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
}

impl TaskStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// One unit of orchestrated work.
///
/// `result` and `error` are mutually exclusive and set only at the
/// terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, generated at submission.
    pub id: Uuid,
    /// Tag naming the registered handler that executes this task.
    pub kind: String,
    /// Priority class.
    pub priority: TaskPriority,
    /// Opaque caller identifier.
    pub owner: String,
    /// Opaque handler input. The coordinator never inspects it.
    pub payload: serde_json::Value,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Success value, present only when `status == Completed`.
    pub result: Option<serde_json::Value>,
    /// Failure message, present only when `status == Failed`.
    pub error: Option<String>,
    /// When the task was submitted.
    pub created_at: DateTime<Utc>,
    /// When the task reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task ready for submission.
    pub fn new(
        kind: impl Into<String>,
        priority: TaskPriority,
        owner: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            priority,
            owner: owner.into(),
            payload,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Operational snapshot of the dispatcher, for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Number of tasks waiting in the pending queue.
    pub pending: usize,
    /// Number of tasks currently executing.
    pub in_flight: usize,
    /// Pending counts broken down by task kind.
    pub by_kind: HashMap<String, usize>,
    /// Pending counts broken down by priority class.
    pub by_priority: HashMap<TaskPriority, usize>,
}
