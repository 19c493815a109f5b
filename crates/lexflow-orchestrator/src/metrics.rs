use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Running statistics for one agent.
///
/// Both the average duration and the success ratio are maintained as
/// incremental means, so no per-execution history is retained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStats {
    /// Total executions observed.
    pub executions: u64,
    /// Running mean of execution duration in milliseconds.
    pub avg_duration_ms: f64,
    /// Running ratio of successful executions, in `[0, 1]`.
    pub success_rate: f64,
}

/// Per-agent counters and moving averages, updated on every terminal
/// transition. Read-only for dashboards; never consulted by scheduling.
pub struct MetricsRegistry {
    stats: RwLock<HashMap<String, AgentStats>>,
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            stats: RwLock::new(HashMap::new()),
        }
    }

    /// Record one finished execution for an agent.
    pub async fn record(&self, agent: &str, success: bool, elapsed_ms: u64) {
        let mut stats = self.stats.write().await;
        let entry = stats.entry(agent.to_string()).or_default();
        entry.executions += 1;
        let n = entry.executions as f64;
        entry.avg_duration_ms += (elapsed_ms as f64 - entry.avg_duration_ms) / n;
        let outcome = if success { 1.0 } else { 0.0 };
        entry.success_rate += (outcome - entry.success_rate) / n;
    }

    /// Stats for one agent, if it has executed at least once.
    pub async fn get(&self, agent: &str) -> Option<AgentStats> {
        let stats = self.stats.read().await;
        stats.get(agent).cloned()
    }

    /// Snapshot of all agents' stats.
    pub async fn snapshot(&self) -> HashMap<String, AgentStats> {
        let stats = self.stats.read().await;
        stats.clone()
    }

    /// Serialize the current stats as JSON (for dashboards).
    pub async fn to_json(&self) -> serde_json::Value {
        let stats = self.snapshot().await;
        serde_json::json!({ "agents": stats })
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
