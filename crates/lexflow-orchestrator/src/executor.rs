use crate::registry::HandlerRegistry;
use futures_util::future::join_all;
use lexflow_core::{LexflowError, LexflowResult};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// One job in a caller-supplied batch.
#[derive(Debug, Clone)]
pub struct BatchJob {
    /// Handler kind that executes this job.
    pub kind: String,
    /// Opaque handler input.
    pub payload: serde_json::Value,
}

impl BatchJob {
    /// Create a batch job.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Fan-out helper for one finite batch.
///
/// Unlike the dispatcher, which serves a continuously-arriving shared
/// stream, this executor runs a single caller-supplied batch and returns
/// when every member is terminal. A counting semaphore gates starts, so at
/// most `limit` jobs run at any instant; when a slot frees, the next job
/// acquires it immediately.
pub struct BatchExecutor {
    registry: Arc<HandlerRegistry>,
    limit: usize,
}

impl BatchExecutor {
    /// Create an executor over the given registry with a concurrency limit.
    pub fn new(registry: Arc<HandlerRegistry>, limit: usize) -> Self {
        Self {
            registry,
            limit: limit.max(1),
        }
    }

    /// Run all jobs, returning one outcome per job in input order.
    ///
    /// The batch never short-circuits: an individual failure is captured
    /// in its slot and every other job still runs.
    pub async fn run(&self, jobs: Vec<BatchJob>) -> Vec<LexflowResult<serde_json::Value>> {
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let futures = jobs.into_iter().map(|job| {
            let semaphore = semaphore.clone();
            let registry = self.registry.clone();
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| LexflowError::Task("batch executor closed".to_string()))?;
                let handler = registry.get(&job.kind).ok_or_else(|| {
                    LexflowError::Task(format!("no handler registered for kind '{}'", job.kind))
                })?;
                handler.execute(job.payload).await
            }
        });
        join_all(futures).await
    }
}
