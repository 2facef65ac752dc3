//! Run event system: observers follow an agent run without coupling to it.
//!
//! Events are published at iteration boundaries and after every tool call.
//! Subscribers (loggers, UIs, tests) receive all events and filter for what
//! they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All events emitted by an agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A run was started
    RunStarted {
        agent: String,
        prompt_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The request for one iteration was resolved
    IterationStarted {
        iteration: u32,
        allowed_tools: Vec<String>,
        tool_choice: String,
        can_stop: bool,
        timestamp: DateTime<Utc>,
    },

    /// A tool or ability was executed
    ToolExecuted {
        iteration: u32,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The model repeated itself and was re-instructed
    CycleDetected {
        iteration: u32,
        tool_name: String,
        timestamp: DateTime<Utc>,
    },

    /// The run produced a final answer
    RunCompleted {
        iterations: u32,
        steps: usize,
        timestamp: DateTime<Utc>,
    },

    /// The run failed with a fatal error
    RunFailed {
        iteration: u32,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for run events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: AgentEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AgentEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
