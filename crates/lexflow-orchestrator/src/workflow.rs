use crate::logging::{ExecutionLogger, ExecutionRecord};
use crate::metrics::MetricsRegistry;
use crate::registry::HandlerRegistry;
use chrono::{DateTime, Utc};
use lexflow_core::{LexflowError, LexflowResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Status of a workflow as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created but not yet executed.
    Pending,
    /// Currently executing.
    Running,
    /// Every step succeeded.
    Completed,
    /// A step exhausted its retries or a dependency was unmet.
    Failed,
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet attempted (also the state between retry attempts).
    Pending,
    /// An attempt is executing.
    Running,
    /// Succeeded.
    Completed,
    /// Exhausted its retries.
    Failed,
}

/// Caller-supplied definition of one workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step identifier, unique within the workflow. Dependency references
    /// and context keys use this id.
    pub id: String,
    /// Registered handler that executes the step.
    pub agent: String,
    /// Action tag passed through to the handler inside the payload.
    pub action: String,
    /// Step-specific input.
    pub input: serde_json::Value,
    /// Ids of earlier steps whose results must exist before this step runs.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Number of retries after the first failed attempt.
    #[serde(default)]
    pub max_retries: u32,
}

impl StepSpec {
    /// Create a step with no dependencies and no retries.
    pub fn new(id: impl Into<String>, agent: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent: agent.into(),
            action: action.into(),
            input: serde_json::Value::Null,
            dependencies: Vec::new(),
            max_retries: 0,
        }
    }

    /// Set the step input.
    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    /// Declare dependencies on earlier step ids.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Allow up to `max_retries` re-attempts after a failure.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// One stage of a workflow, with its execution state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step identifier, unique within the workflow.
    pub id: String,
    /// Registered handler that executes the step.
    pub agent: String,
    /// Action tag passed through to the handler.
    pub action: String,
    /// Step-specific input.
    pub input: serde_json::Value,
    /// Ids of steps that must complete first.
    pub dependencies: Vec<String>,
    /// Retry budget after the first failed attempt.
    pub max_retries: u32,
    /// Retries consumed so far.
    pub retry_count: u32,
    /// Current step status.
    pub status: StepStatus,
    /// Handler result, once completed.
    pub result: Option<serde_json::Value>,
    /// Final failure message, once failed.
    pub error: Option<String>,
    /// When the first attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the step reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<StepSpec> for Step {
    fn from(spec: StepSpec) -> Self {
        Self {
            id: spec.id,
            agent: spec.agent,
            action: spec.action,
            input: spec.input,
            dependencies: spec.dependencies,
            max_retries: spec.max_retries,
            retry_count: 0,
            status: StepStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// An ordered sequence of steps with shared context and halt-on-failure
/// semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier, generated at creation.
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    /// Steps in declared execution order.
    pub steps: Vec<Step>,
    /// Index of the step currently (or last) being processed.
    pub current_step: usize,
    /// Overall status.
    pub status: WorkflowStatus,
    /// Results of completed steps, keyed by step id. Handlers receive a
    /// snapshot of this map alongside their step input.
    pub context: HashMap<String, serde_json::Value>,
    /// When the workflow was created.
    pub created_at: DateTime<Utc>,
    /// When the workflow reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Executes workflows strictly in declared step order with per-step retry.
///
/// Traversal is the literal step sequence, not a topological sort:
/// dependencies are verified, never used to reorder.
pub struct WorkflowEngine {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    registry: Arc<HandlerRegistry>,
    logger: Arc<dyn ExecutionLogger>,
    metrics: Arc<MetricsRegistry>,
    retry_base: Duration,
}

impl WorkflowEngine {
    /// Create an engine over the given registry.
    pub fn new(
        registry: Arc<HandlerRegistry>,
        logger: Arc<dyn ExecutionLogger>,
        metrics: Arc<MetricsRegistry>,
        retry_base: Duration,
    ) -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            registry,
            logger,
            metrics,
            retry_base,
        }
    }

    /// Register a new workflow, returning its id.
    ///
    /// Step ids must be unique and every step's agent must name a
    /// registered handler; both are checked here so a malformed definition
    /// fails before anything runs.
    pub async fn create_workflow(
        &self,
        name: impl Into<String>,
        steps: Vec<StepSpec>,
    ) -> LexflowResult<Uuid> {
        let name = name.into();
        let mut seen = HashSet::new();
        for spec in &steps {
            if !seen.insert(spec.id.clone()) {
                return Err(LexflowError::Workflow(format!(
                    "duplicate step id '{}' in workflow '{name}'",
                    spec.id
                )));
            }
            if !self.registry.contains(&spec.agent) {
                return Err(LexflowError::Workflow(format!(
                    "step '{}' references unregistered agent '{}'",
                    spec.id, spec.agent
                )));
            }
        }

        let workflow = Workflow {
            id: Uuid::new_v4(),
            name,
            steps: steps.into_iter().map(Step::from).collect(),
            current_step: 0,
            status: WorkflowStatus::Pending,
            context: HashMap::new(),
            created_at: Utc::now(),
            completed_at: None,
        };
        let workflow_id = workflow.id;

        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow_id, workflow);
        Ok(workflow_id)
    }

    /// Snapshot of a workflow in its current state.
    pub async fn get_workflow(&self, workflow_id: Uuid) -> Option<Workflow> {
        let workflows = self.workflows.read().await;
        workflows.get(&workflow_id).cloned()
    }

    /// Execute a pending workflow, returning step results in order.
    ///
    /// Steps run strictly in list order. Each step first passes the
    /// dependency gate (every declared dependency `Completed` with a
    /// result), then runs with retry: `max_retries = n` means `n + 1`
    /// attempts, with exponential backoff between them. The first
    /// unrecoverable failure halts the workflow, leaving `current_step` on
    /// the failed (or blocked) step for diagnostics.
    pub async fn execute_workflow(
        &self,
        workflow_id: Uuid,
    ) -> LexflowResult<Vec<serde_json::Value>> {
        let (name, step_count) = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows.get_mut(&workflow_id).ok_or_else(|| {
                LexflowError::Workflow(format!("unknown workflow {workflow_id}"))
            })?;
            if workflow.status != WorkflowStatus::Pending {
                return Err(LexflowError::Workflow(format!(
                    "workflow '{}' has already been executed",
                    workflow.name
                )));
            }
            workflow.status = WorkflowStatus::Running;
            (workflow.name.clone(), workflow.steps.len())
        };

        info!(workflow_id = %workflow_id, name = %name, steps = step_count, "Workflow started");

        let mut results = Vec::with_capacity(step_count);
        for index in 0..step_count {
            let step_result = self.run_step(workflow_id, index).await;
            match step_result {
                Ok(value) => results.push(value),
                Err(e) => {
                    {
                        let mut workflows = self.workflows.write().await;
                        if let Some(workflow) = workflows.get_mut(&workflow_id) {
                            workflow.status = WorkflowStatus::Failed;
                            workflow.completed_at = Some(Utc::now());
                        }
                    }
                    error!(workflow_id = %workflow_id, name = %name, error = %e, "Workflow failed");
                    return Err(e);
                }
            }
        }

        {
            let mut workflows = self.workflows.write().await;
            if let Some(workflow) = workflows.get_mut(&workflow_id) {
                workflow.status = WorkflowStatus::Completed;
                workflow.completed_at = Some(Utc::now());
            }
        }
        info!(workflow_id = %workflow_id, name = %name, "Workflow completed");
        Ok(results)
    }

    /// Run one step to a terminal state, including its retry loop.
    async fn run_step(
        &self,
        workflow_id: Uuid,
        index: usize,
    ) -> LexflowResult<serde_json::Value> {
        // Dependency gate and attempt setup under one short lock.
        let (step_id, agent, payload, max_retries) = {
            let mut workflows = self.workflows.write().await;
            let workflow = workflows.get_mut(&workflow_id).ok_or_else(|| {
                LexflowError::Workflow(format!("unknown workflow {workflow_id}"))
            })?;
            workflow.current_step = index;

            if let Some(message) = Self::check_dependencies(&workflow.steps, index) {
                // Malformed definition: the step never starts and is not
                // retried. `current_step` stays on the blocked step.
                return Err(LexflowError::Workflow(message));
            }

            let (step_id, agent, payload) = {
                let step = &workflow.steps[index];
                (
                    step.id.clone(),
                    step.agent.clone(),
                    serde_json::json!({
                        "action": step.action,
                        "input": step.input,
                        "context": workflow.context,
                    }),
                )
            };
            let max_retries = workflow.steps[index].max_retries;

            let step = &mut workflow.steps[index];
            step.status = StepStatus::Running;
            step.started_at = Some(Utc::now());
            (step_id, agent, payload, max_retries)
        };

        let handler = self.registry.get(&agent).ok_or_else(|| {
            LexflowError::Workflow(format!("no handler registered for agent '{agent}'"))
        })?;

        // Explicit retry loop: max_retries = n means n + 1 attempts.
        let mut attempt: u32 = 0;
        loop {
            let started_at = Utc::now();
            let start = std::time::Instant::now();
            let outcome = handler.execute(payload.clone()).await;
            let finished_at = Utc::now();
            let elapsed_ms = start.elapsed().as_millis() as u64;

            self.metrics.record(&agent, outcome.is_ok(), elapsed_ms).await;
            self.logger.log_execution(&ExecutionRecord {
                agent: agent.clone(),
                success: outcome.is_ok(),
                started_at,
                finished_at,
                input: payload.clone(),
                output: outcome.as_ref().ok().cloned(),
                error: outcome.as_ref().err().map(ToString::to_string),
                metadata: serde_json::json!({
                    "workflow_id": workflow_id,
                    "step": step_id,
                    "attempt": attempt,
                }),
            });

            match outcome {
                Ok(value) => {
                    let mut workflows = self.workflows.write().await;
                    if let Some(workflow) = workflows.get_mut(&workflow_id) {
                        let step = &mut workflow.steps[index];
                        step.status = StepStatus::Completed;
                        step.result = Some(value.clone());
                        step.finished_at = Some(finished_at);
                        workflow.context.insert(step_id.clone(), value.clone());
                    }
                    info!(workflow_id = %workflow_id, step = %step_id, "Step completed");
                    return Ok(value);
                }
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    {
                        let mut workflows = self.workflows.write().await;
                        if let Some(workflow) = workflows.get_mut(&workflow_id) {
                            let step = &mut workflow.steps[index];
                            step.retry_count = attempt;
                            step.status = StepStatus::Pending;
                        }
                    }
                    warn!(
                        workflow_id = %workflow_id,
                        step = %step_id,
                        attempt,
                        max_retries,
                        error = %e,
                        "Step failed, retrying"
                    );
                    tokio::time::sleep(self.retry_base * 2u32.saturating_pow(attempt - 1)).await;
                    let mut workflows = self.workflows.write().await;
                    if let Some(workflow) = workflows.get_mut(&workflow_id) {
                        workflow.steps[index].status = StepStatus::Running;
                    }
                }
                Err(e) => {
                    let message = format!(
                        "step '{step_id}' failed after {} attempts: {e}",
                        attempt + 1
                    );
                    let mut workflows = self.workflows.write().await;
                    if let Some(workflow) = workflows.get_mut(&workflow_id) {
                        let step = &mut workflow.steps[index];
                        step.status = StepStatus::Failed;
                        step.error = Some(e.to_string());
                        step.finished_at = Some(finished_at);
                    }
                    return Err(LexflowError::Workflow(message));
                }
            }
        }
    }

    /// Verify the dependency gate for a step. Returns an error message if
    /// any declared dependency is unknown or not completed with a result.
    fn check_dependencies(steps: &[Step], index: usize) -> Option<String> {
        let step = &steps[index];
        for dep_id in &step.dependencies {
            let Some(dep) = steps.iter().find(|s| &s.id == dep_id) else {
                return Some(format!(
                    "step '{}' depends on unknown step '{dep_id}'",
                    step.id
                ));
            };
            if dep.status != StepStatus::Completed || dep.result.is_none() {
                return Some(format!(
                    "step '{}' depends on '{dep_id}', which has not completed",
                    step.id
                ));
            }
        }
        None
    }
}
