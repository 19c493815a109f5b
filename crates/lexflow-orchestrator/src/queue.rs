use crate::types::{Task, TaskPriority};
use std::collections::{HashMap, VecDeque};

/// Ordered pending-work list.
///
/// Tasks are kept in strict priority order across classes and FIFO order
/// within a class: a new task is inserted immediately before the first
/// queued task of strictly lower priority, or appended if none exists.
#[derive(Default)]
pub struct PendingQueue {
    items: VecDeque<Task>,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Insert a task at its priority position.
    pub fn push(&mut self, task: Task) {
        let position = self
            .items
            .iter()
            .position(|queued| queued.priority < task.priority);
        match position {
            Some(index) => self.items.insert(index, task),
            None => self.items.push_back(task),
        }
    }

    /// Remove and return the head of the queue.
    pub fn pop(&mut self) -> Option<Task> {
        self.items.pop_front()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pending counts per task kind.
    pub fn counts_by_kind(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for task in &self.items {
            *counts.entry(task.kind.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Pending counts per priority class.
    pub fn counts_by_priority(&self) -> HashMap<TaskPriority, usize> {
        let mut counts = HashMap::new();
        for task in &self.items {
            *counts.entry(task.priority).or_insert(0) += 1;
        }
        counts
    }
}
