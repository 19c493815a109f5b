use crate::logging::{ExecutionLogger, ExecutionRecord};
use crate::metrics::MetricsRegistry;
use crate::queue::PendingQueue;
use crate::registry::HandlerRegistry;
use crate::types::{QueueStatus, Task, TaskPriority, TaskStatus};
use chrono::Utc;
use lexflow_core::{LexflowError, LexflowResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// State shared between the submission surface and the workers.
struct DispatcherInner {
    queue: Mutex<PendingQueue>,
    /// All tasks ever submitted, including terminal ones, for `status`.
    tasks: RwLock<HashMap<Uuid, Task>>,
    in_flight: AtomicUsize,
    work_available: Notify,
    registry: Arc<HandlerRegistry>,
    logger: Arc<dyn ExecutionLogger>,
    metrics: Arc<MetricsRegistry>,
}

/// Pulls tasks from the priority queue and executes them on a fixed pool
/// of workers, making the concurrency cap structural: at most
/// `max_concurrent` tasks are ever in flight.
///
/// One failing task never affects the workers or other in-flight tasks;
/// its failure is recorded on the task itself and surfaced through the
/// log hook and metrics.
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
    max_concurrent: usize,
    workers: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Dispatcher {
    /// Create a dispatcher with `max_concurrent` workers. Workers do not
    /// run until [`start`](Self::start) is called, so tasks submitted
    /// before then queue up in priority order.
    pub fn new(
        registry: Arc<HandlerRegistry>,
        logger: Arc<dyn ExecutionLogger>,
        metrics: Arc<MetricsRegistry>,
        max_concurrent: usize,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(DispatcherInner {
                queue: Mutex::new(PendingQueue::new()),
                tasks: RwLock::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                work_available: Notify::new(),
                registry,
                logger,
                metrics,
            }),
            max_concurrent,
            workers: Vec::new(),
            shutdown_tx,
        }
    }

    /// Spawn the worker pool. Calling more than once is a no-op.
    pub fn start(&mut self) {
        if !self.workers.is_empty() {
            return;
        }
        for worker_id in 0..self.max_concurrent {
            let inner = self.inner.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            self.workers
                .push(tokio::spawn(Self::worker_loop(worker_id, inner, shutdown_rx)));
        }
        info!(workers = self.max_concurrent, "Dispatcher started");
    }

    async fn worker_loop(
        worker_id: usize,
        inner: Arc<DispatcherInner>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            let next = {
                let mut queue = inner.queue.lock().await;
                queue.pop()
            };
            match next {
                Some(task) => {
                    // The worker absorbs the error here; it is already
                    // recorded on the task and reported to the hook.
                    let _ = Self::run_task(&inner, task).await;
                }
                None => {
                    tokio::select! {
                        _ = inner.work_available.notified() => {}
                        _ = shutdown_rx.changed() => {}
                    }
                }
            }
        }
        tracing::debug!(worker_id, "Dispatcher worker stopped");
    }

    /// Execute one task to its terminal state.
    ///
    /// Status, result/error, metrics, and the log hook are all updated
    /// whether the handler succeeds or fails; the error is then returned
    /// so an immediate caller still observes it.
    async fn run_task(
        inner: &DispatcherInner,
        mut task: Task,
    ) -> LexflowResult<serde_json::Value> {
        let task_id = task.id;
        let kind = task.kind.clone();
        let payload = task.payload.clone();

        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        task.status = TaskStatus::InProgress;
        {
            let mut tasks = inner.tasks.write().await;
            tasks.insert(task_id, task);
        }

        info!(task_id = %task_id, kind = %kind, "Task started");
        let started_at = Utc::now();
        let start = Instant::now();

        let result = match inner.registry.get(&kind) {
            Some(handler) => handler.execute(payload.clone()).await,
            None => Err(LexflowError::Task(format!(
                "no handler registered for kind '{kind}'"
            ))),
        };

        let finished_at = Utc::now();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        {
            let mut tasks = inner.tasks.write().await;
            if let Some(stored) = tasks.get_mut(&task_id) {
                stored.completed_at = Some(finished_at);
                match &result {
                    Ok(value) => {
                        stored.status = TaskStatus::Completed;
                        stored.result = Some(value.clone());
                    }
                    Err(e) => {
                        stored.status = TaskStatus::Failed;
                        stored.error = Some(e.to_string());
                    }
                }
            }
        }
        inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        inner.metrics.record(&kind, result.is_ok(), elapsed_ms).await;
        inner.logger.log_execution(&ExecutionRecord {
            agent: kind.clone(),
            success: result.is_ok(),
            started_at,
            finished_at,
            input: payload,
            output: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(ToString::to_string),
            metadata: serde_json::json!({ "task_id": task_id, "kind": kind }),
        });

        match &result {
            Ok(_) => info!(task_id = %task_id, kind = %kind, elapsed_ms, "Task completed"),
            Err(e) => error!(task_id = %task_id, kind = %kind, error = %e, "Task failed"),
        }

        result
    }

    /// Submit a task for execution, returning its id.
    ///
    /// The kind must name a registered handler; the registry is fixed at
    /// startup, so an unknown kind fails here rather than mid-dispatch.
    pub async fn submit(
        &self,
        kind: impl Into<String>,
        priority: TaskPriority,
        owner: impl Into<String>,
        payload: serde_json::Value,
    ) -> LexflowResult<Uuid> {
        let kind = kind.into();
        if !self.inner.registry.contains(&kind) {
            return Err(LexflowError::Task(format!(
                "no handler registered for kind '{kind}'"
            )));
        }

        let task = Task::new(kind, priority, owner, payload);
        let task_id = task.id;
        {
            let mut tasks = self.inner.tasks.write().await;
            tasks.insert(task_id, task.clone());
        }
        {
            let mut queue = self.inner.queue.lock().await;
            queue.push(task);
        }
        self.inner.work_available.notify_one();
        Ok(task_id)
    }

    /// Snapshot of a submitted task, in whatever state it is now.
    pub async fn status(&self, task_id: Uuid) -> Option<Task> {
        let tasks = self.inner.tasks.read().await;
        tasks.get(&task_id).cloned()
    }

    /// Pending and in-flight counts for operational visibility.
    pub async fn queue_status(&self) -> QueueStatus {
        let queue = self.inner.queue.lock().await;
        QueueStatus {
            pending: queue.len(),
            in_flight: self.inner.in_flight.load(Ordering::SeqCst),
            by_kind: queue.counts_by_kind(),
            by_priority: queue.counts_by_priority(),
        }
    }

    /// Stop the workers and wait for them to exit. In-flight tasks run to
    /// completion; queued tasks stay pending.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
        info!("Dispatcher stopped");
    }
}
