use crate::message::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lexflow_core::{LexflowError, LexflowResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Handler invoked when a message of a registered kind arrives in a mailbox.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one delivered message.
    async fn handle(&self, message: Message) -> LexflowResult<()>;
}

/// Mailbox state for one registered agent.
struct Mailbox {
    messages: Vec<Message>,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    /// Whether this agent receives broadcasts. Registration opts in.
    subscribed: bool,
    last_activity: DateTime<Utc>,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            handlers: HashMap::new(),
            subscribed: true,
            last_activity: Utc::now(),
        }
    }
}

/// Push-based local pub/sub between agents.
///
/// Each registered agent owns a mailbox with explicit opt-in handlers.
/// Delivery is "append to the mailbox, then invoke the matching handler if
/// one is registered" — there is no durability or at-least-once guarantee.
pub struct CommunicationBus {
    mailboxes: RwLock<HashMap<String, Mailbox>>,
}

impl CommunicationBus {
    /// Create an empty bus with no registered agents.
    pub fn new() -> Self {
        Self {
            mailboxes: RwLock::new(HashMap::new()),
        }
    }

    /// Register an agent, creating its mailbox. Registered agents are
    /// broadcast subscribers until they [`unsubscribe`](Self::unsubscribe).
    /// Re-registering an existing agent is a no-op.
    pub async fn register(&self, agent: impl Into<String>) {
        let mut mailboxes = self.mailboxes.write().await;
        mailboxes.entry(agent.into()).or_insert_with(Mailbox::new);
    }

    /// Opt an agent out of broadcasts. Direct sends still reach it.
    /// Returns false if the agent is not registered.
    pub async fn unsubscribe(&self, agent: &str) -> bool {
        let mut mailboxes = self.mailboxes.write().await;
        if let Some(mailbox) = mailboxes.get_mut(agent) {
            mailbox.subscribed = false;
            true
        } else {
            false
        }
    }

    /// Register a handler for a message kind on an agent's mailbox.
    pub async fn on_message(
        &self,
        agent: &str,
        kind: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> LexflowResult<()> {
        let mut mailboxes = self.mailboxes.write().await;
        let mailbox = mailboxes
            .get_mut(agent)
            .ok_or_else(|| LexflowError::Bus(format!("agent '{agent}' is not registered")))?;
        mailbox.handlers.insert(kind.into(), handler);
        Ok(())
    }

    /// Send a message to one agent.
    ///
    /// The message is appended to the recipient mailbox and, if a handler is
    /// registered for its kind, that handler is awaited before `send`
    /// returns. A handler error surfaces to the sender, but the message has
    /// already been delivered to the mailbox. With no handler registered the
    /// message simply stays queued.
    pub async fn send(
        &self,
        from: &str,
        to: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> LexflowResult<Uuid> {
        let message = Message::new(from, to, kind, payload);
        let message_id = message.id;

        // Deliver under the lock, then invoke the handler outside it so a
        // handler can itself use the bus without deadlocking.
        let handler = {
            let mut mailboxes = self.mailboxes.write().await;
            let mailbox = mailboxes
                .get_mut(to)
                .ok_or_else(|| LexflowError::Bus(format!("unknown recipient '{to}'")))?;
            mailbox.last_activity = Utc::now();
            mailbox.messages.push(message.clone());
            mailbox.handlers.get(kind).cloned()
        };

        if let Some(handler) = handler {
            handler.handle(message).await.map_err(|e| {
                LexflowError::Bus(format!("handler for '{kind}' on '{to}' failed: {e}"))
            })?;
        }

        Ok(message_id)
    }

    /// Broadcast a message to every subscribed agent except the sender.
    ///
    /// Fan-out never aborts: each recipient gets its own outcome, and
    /// failures are reported per recipient.
    pub async fn broadcast(
        &self,
        from: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> Vec<(String, LexflowResult<Uuid>)> {
        let recipients: Vec<String> = {
            let mailboxes = self.mailboxes.read().await;
            mailboxes
                .iter()
                .filter(|(name, mailbox)| mailbox.subscribed && name.as_str() != from)
                .map(|(name, _)| name.clone())
                .collect()
        };

        let mut outcomes = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let result = self.send(from, &recipient, kind, payload.clone()).await;
            if let Err(e) = &result {
                tracing::warn!(from = %from, to = %recipient, kind = %kind, error = %e, "Broadcast delivery failed");
            }
            outcomes.push((recipient, result));
        }
        outcomes
    }

    /// Snapshot of an agent's queued messages, oldest first.
    pub async fn inbox(&self, agent: &str) -> Vec<Message> {
        let mailboxes = self.mailboxes.read().await;
        mailboxes
            .get(agent)
            .map(|m| m.messages.clone())
            .unwrap_or_default()
    }

    /// Timestamp of the last delivery to an agent's mailbox.
    pub async fn last_activity(&self, agent: &str) -> Option<DateTime<Utc>> {
        let mailboxes = self.mailboxes.read().await;
        mailboxes.get(agent).map(|m| m.last_activity)
    }

    /// Names of all registered agents.
    pub async fn agent_names(&self) -> Vec<String> {
        let mailboxes = self.mailboxes.read().await;
        mailboxes.keys().cloned().collect()
    }

    /// Number of registered agents.
    pub async fn agent_count(&self) -> usize {
        let mailboxes = self.mailboxes.read().await;
        mailboxes.len()
    }
}

impl Default for CommunicationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Handler that counts invocations, optionally failing every call.
    struct CountingHandler {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _message: Message) -> LexflowResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(LexflowError::Bus("handler rejected message".into()))
            } else {
                Ok(())
            }
        }
    }

    fn counting(calls: &Arc<AtomicUsize>) -> Arc<dyn MessageHandler> {
        Arc::new(CountingHandler {
            calls: calls.clone(),
            fail: false,
        })
    }

    #[tokio::test]
    async fn test_send_queues_message() {
        let bus = CommunicationBus::new();
        bus.register("intake").await;
        bus.register("research").await;

        bus.send("intake", "research", "case_ready", serde_json::json!({"case": 1}))
            .await
            .unwrap();

        let inbox = bus.inbox("research").await;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].from, "intake");
        assert_eq!(inbox[0].kind, "case_ready");
    }

    #[tokio::test]
    async fn test_send_unknown_recipient() {
        let bus = CommunicationBus::new();
        bus.register("intake").await;
        let result = bus
            .send("intake", "nobody", "ping", serde_json::Value::Null)
            .await;
        assert!(matches!(result, Err(LexflowError::Bus(_))));
    }

    #[tokio::test]
    async fn test_handler_invoked_on_send() {
        let bus = CommunicationBus::new();
        bus.register("drafting").await;
        let calls = Arc::new(AtomicUsize::new(0));
        bus.on_message("drafting", "draft_request", counting(&calls))
            .await
            .unwrap();

        bus.send("intake", "drafting", "draft_request", serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_handler_leaves_message_queued() {
        let bus = CommunicationBus::new();
        bus.register("drafting").await;
        let calls = Arc::new(AtomicUsize::new(0));
        bus.on_message("drafting", "draft_request", counting(&calls))
            .await
            .unwrap();

        // Different kind: no handler fires, message still lands.
        bus.send("intake", "drafting", "status_update", serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.inbox("drafting").await.len(), 1);
    }

    #[tokio::test]
    async fn test_handler_error_surfaces_but_message_delivered() {
        let bus = CommunicationBus::new();
        bus.register("review").await;
        let calls = Arc::new(AtomicUsize::new(0));
        bus.on_message(
            "review",
            "review_request",
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail: true,
            }),
        )
        .await
        .unwrap();

        let result = bus
            .send("intake", "review", "review_request", serde_json::Value::Null)
            .await;
        assert!(result.is_err());
        assert_eq!(bus.inbox("review").await.len(), 1);
    }

    #[tokio::test]
    async fn test_on_message_requires_registration() {
        let bus = CommunicationBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let result = bus.on_message("ghost", "ping", counting(&calls)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone_but_sender() {
        let bus = CommunicationBus::new();
        let mut counters = Vec::new();
        for agent in ["intake", "research", "drafting", "review", "billing"] {
            bus.register(agent).await;
            let calls = Arc::new(AtomicUsize::new(0));
            bus.on_message(agent, "announcement", counting(&calls))
                .await
                .unwrap();
            counters.push((agent, calls));
        }

        let outcomes = bus
            .broadcast("intake", "announcement", serde_json::json!({"note": "hi"}))
            .await;
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|(_, r)| r.is_ok()));

        for (agent, calls) in &counters {
            let expected = usize::from(*agent != "intake");
            assert_eq!(calls.load(Ordering::SeqCst), expected, "agent {agent}");
        }
    }

    #[tokio::test]
    async fn test_broadcast_partial_failure() {
        let bus = CommunicationBus::new();
        bus.register("a").await;
        bus.register("b").await;
        bus.register("c").await;
        let calls = Arc::new(AtomicUsize::new(0));
        bus.on_message(
            "b",
            "notice",
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail: true,
            }),
        )
        .await
        .unwrap();

        let outcomes = bus.broadcast("a", "notice", serde_json::Value::Null).await;
        assert_eq!(outcomes.len(), 2);
        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(failed, vec!["b"]);
        // The failing recipient still got the message in its mailbox.
        assert_eq!(bus.inbox("b").await.len(), 1);
        assert_eq!(bus.inbox("c").await.len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_skips_broadcast() {
        let bus = CommunicationBus::new();
        bus.register("a").await;
        bus.register("b").await;
        bus.register("c").await;
        assert!(bus.unsubscribe("c").await);

        let outcomes = bus.broadcast("a", "notice", serde_json::Value::Null).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, "b");

        // Direct send still reaches an unsubscribed agent.
        bus.send("a", "c", "notice", serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(bus.inbox("c").await.len(), 1);
    }

    #[tokio::test]
    async fn test_last_activity_updated() {
        let bus = CommunicationBus::new();
        bus.register("a").await;
        bus.register("b").await;
        let before = bus.last_activity("b").await.unwrap();
        bus.send("a", "b", "ping", serde_json::Value::Null)
            .await
            .unwrap();
        let after = bus.last_activity("b").await.unwrap();
        assert!(after >= before);
    }

    #[tokio::test]
    async fn test_agent_count_and_names() {
        let bus = CommunicationBus::new();
        assert_eq!(bus.agent_count().await, 0);
        bus.register("intake").await;
        bus.register("intake").await; // no-op
        bus.register("review").await;
        assert_eq!(bus.agent_count().await, 2);
        let names = bus.agent_names().await;
        assert!(names.contains(&"intake".to_string()));
        assert!(names.contains(&"review".to_string()));
    }
}
