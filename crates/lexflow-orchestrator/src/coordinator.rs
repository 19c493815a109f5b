use crate::dispatcher::Dispatcher;
use crate::executor::{BatchExecutor, BatchJob};
use crate::logging::{ExecutionLogger, TracingLogger};
use crate::metrics::{AgentStats, MetricsRegistry};
use crate::registry::{AgentHandler, HandlerRegistry};
use crate::types::{QueueStatus, Task, TaskPriority};
use crate::workflow::{StepSpec, Workflow, WorkflowEngine};
use lexflow_bus::CommunicationBus;
use lexflow_core::{CoordinatorConfig, LexflowResult};
use lexflow_memory::MemoryStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

/// Assembles the registry, dispatcher, workflow engine, bus, memory store,
/// and metrics into one configured facade.
///
/// Handlers must all be registered before [`build`](Self::build): the
/// handler set is fixed for the coordinator's lifetime, which is what lets
/// submission reject unknown kinds up front.
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    registry: HandlerRegistry,
    logger: Arc<dyn ExecutionLogger>,
}

impl CoordinatorBuilder {
    /// Start a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: CoordinatorConfig::default(),
            registry: HandlerRegistry::new(),
            logger: Arc::new(TracingLogger),
        }
    }

    /// Replace the default configuration.
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default `tracing`-backed execution log hook.
    pub fn with_logger(mut self, logger: Arc<dyn ExecutionLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Register an agent handler under a kind.
    pub fn register(mut self, kind: impl Into<String>, handler: Arc<dyn AgentHandler>) -> Self {
        self.registry.register(kind, handler);
        self
    }

    /// Register an async closure as an agent handler.
    pub fn register_fn<F, Fut>(mut self, kind: impl Into<String>, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = LexflowResult<serde_json::Value>> + Send + 'static,
    {
        self.registry.register_fn(kind, handler);
        self
    }

    /// Assemble the coordinator and start its worker pool and sweeper.
    pub fn build(self) -> Coordinator {
        let registry = Arc::new(self.registry);
        let metrics = Arc::new(MetricsRegistry::new());

        let mut dispatcher = Dispatcher::new(
            registry.clone(),
            self.logger.clone(),
            metrics.clone(),
            self.config.max_concurrent_tasks,
        );
        dispatcher.start();

        let workflows = WorkflowEngine::new(
            registry.clone(),
            self.logger.clone(),
            metrics.clone(),
            Duration::from_millis(self.config.retry_base_ms),
        );

        let memory = Arc::new(MemoryStore::new(
            self.config.default_ttl_secs,
            self.config.pack_values,
        ));
        let sweeper = MemoryStore::spawn_sweeper(
            memory.clone(),
            Duration::from_secs(self.config.sweep_interval_secs),
        );

        info!(
            max_concurrent = self.config.max_concurrent_tasks,
            agents = registry.handler_count(),
            "Coordinator started"
        );

        Coordinator {
            config: self.config,
            registry,
            dispatcher,
            workflows,
            bus: Arc::new(CommunicationBus::new()),
            memory,
            metrics,
            sweeper,
        }
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Single entry point over all orchestration subsystems.
///
/// Each instance owns its own state; two coordinators in one process are
/// fully independent.
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: Arc<HandlerRegistry>,
    dispatcher: Dispatcher,
    workflows: WorkflowEngine,
    bus: Arc<CommunicationBus>,
    memory: Arc<MemoryStore>,
    metrics: Arc<MetricsRegistry>,
    sweeper: JoinHandle<()>,
}

impl Coordinator {
    /// Start building a coordinator.
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    /// Submit a task for background execution, returning its id.
    pub async fn submit(
        &self,
        kind: impl Into<String>,
        priority: TaskPriority,
        owner: impl Into<String>,
        payload: serde_json::Value,
    ) -> LexflowResult<Uuid> {
        self.dispatcher.submit(kind, priority, owner, payload).await
    }

    /// Snapshot of a submitted task.
    pub async fn task_status(&self, task_id: Uuid) -> Option<Task> {
        self.dispatcher.status(task_id).await
    }

    /// Pending and in-flight queue counts.
    pub async fn queue_status(&self) -> QueueStatus {
        self.dispatcher.queue_status().await
    }

    /// Register a workflow, returning its id.
    pub async fn create_workflow(
        &self,
        name: impl Into<String>,
        steps: Vec<StepSpec>,
    ) -> LexflowResult<Uuid> {
        self.workflows.create_workflow(name, steps).await
    }

    /// Execute a pending workflow to completion, returning step results in
    /// order.
    pub async fn execute_workflow(
        &self,
        workflow_id: Uuid,
    ) -> LexflowResult<Vec<serde_json::Value>> {
        self.workflows.execute_workflow(workflow_id).await
    }

    /// Snapshot of a workflow.
    pub async fn get_workflow(&self, workflow_id: Uuid) -> Option<Workflow> {
        self.workflows.get_workflow(workflow_id).await
    }

    /// Run a finite batch with its own concurrency limit, independent of
    /// the dispatcher's worker pool.
    pub async fn run_batch(
        &self,
        jobs: Vec<BatchJob>,
        limit: usize,
    ) -> Vec<LexflowResult<serde_json::Value>> {
        BatchExecutor::new(self.registry.clone(), limit).run(jobs).await
    }

    /// The inter-agent message bus.
    pub fn bus(&self) -> &Arc<CommunicationBus> {
        &self.bus
    }

    /// The shared TTL memory store.
    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// Per-agent execution stats for one agent.
    pub async fn agent_stats(&self, agent: &str) -> Option<AgentStats> {
        self.metrics.get(agent).await
    }

    /// Per-agent execution stats for every agent seen so far.
    pub async fn metrics_snapshot(&self) -> HashMap<String, AgentStats> {
        self.metrics.snapshot().await
    }

    /// The configuration this coordinator was built with.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Stop the sweeper and the worker pool. In-flight tasks run to
    /// completion; queued tasks are dropped with the coordinator.
    pub async fn shutdown(self) {
        self.sweeper.abort();
        self.dispatcher.shutdown().await;
        info!("Coordinator stopped");
    }
}
