//! Task and workflow orchestration for lexflow.
//!
//! The crate centers on the [`Coordinator`], a dependency-injected facade
//! that wires together:
//!
//! - [`Dispatcher`]: a priority queue drained by a fixed worker pool
//! - [`WorkflowEngine`]: ordered multi-step workflows with per-step retry
//! - [`BatchExecutor`]: bounded fan-out for one finite batch
//! - [`HandlerRegistry`]: the typed kind-to-handler mapping, fixed at build
//! - [`MetricsRegistry`]: per-agent counters and moving averages
//!
//! The bus and memory store live in their own crates and are exposed
//! through the coordinator.

/// The coordinator facade and its builder.
pub mod coordinator;
/// Priority queue drained by a fixed worker pool.
pub mod dispatcher;
/// Bounded fan-out for finite batches.
pub mod executor;
/// The execution log hook and its `tracing` default.
pub mod logging;
/// Per-agent execution statistics.
pub mod metrics;
/// The priority-ordered pending queue.
pub mod queue;
/// The typed kind-to-handler registry.
pub mod registry;
/// Task model and queue snapshots.
pub mod types;
/// Ordered workflows with dependency checks and retry.
pub mod workflow;

pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use dispatcher::Dispatcher;
pub use executor::{BatchExecutor, BatchJob};
pub use logging::{ExecutionLogger, ExecutionRecord, TracingLogger};
pub use metrics::{AgentStats, MetricsRegistry};
pub use queue::PendingQueue;
pub use registry::{AgentHandler, FnHandler, HandlerRegistry};
pub use types::{QueueStatus, Task, TaskPriority, TaskStatus};
pub use workflow::{Step, StepSpec, StepStatus, Workflow, WorkflowEngine, WorkflowStatus};
