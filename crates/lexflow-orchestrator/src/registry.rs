use async_trait::async_trait;
use lexflow_core::LexflowResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Agent-execution boundary supplied by the host application.
///
/// One handler per task kind / workflow agent name. The coordinator never
/// inspects the payload or result.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Execute one unit of work.
    async fn execute(&self, payload: serde_json::Value) -> LexflowResult<serde_json::Value>;
}

/// Adapter so plain async closures can serve as handlers.
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    /// Wrap an async function as an [`AgentHandler`].
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> AgentHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = LexflowResult<serde_json::Value>> + Send,
{
    async fn execute(&self, payload: serde_json::Value) -> LexflowResult<serde_json::Value> {
        (self.0)(payload).await
    }
}

/// Mapping from task kind to its handler, resolved once at startup.
///
/// The registry is immutable after the coordinator is built, so unknown
/// kinds can be rejected at submission instead of mid-dispatch.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn AgentHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under a kind tag, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn AgentHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Register an async closure under a kind tag.
    pub fn register_fn<F, Fut>(&mut self, kind: impl Into<String>, f: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LexflowResult<serde_json::Value>> + Send + 'static,
    {
        self.register(kind, Arc::new(FnHandler::new(f)));
    }

    /// Look up the handler for a kind.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Whether a handler is registered for this kind.
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// All registered kind tags.
    pub fn kinds(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("echo", |payload| async move { Ok(payload) });

        let handler = registry.get("echo").unwrap();
        let result = handler.execute(serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(result["x"], 1);
    }

    #[test]
    fn test_lookup_and_counts() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("intake_assessment", |_| async { Ok(serde_json::Value::Null) });
        registry.register_fn("document_draft", |_| async { Ok(serde_json::Value::Null) });

        assert!(registry.contains("intake_assessment"));
        assert!(!registry.contains("unknown"));
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.handler_count(), 2);

        let mut kinds = registry.kinds();
        kinds.sort_unstable();
        assert_eq!(kinds, vec!["document_draft", "intake_assessment"]);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("k", |_| async { Ok(serde_json::json!(1)) });
        registry.register_fn("k", |_| async { Ok(serde_json::json!(2)) });
        assert_eq!(registry.handler_count(), 1);
    }
}
