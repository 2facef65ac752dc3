//! Unconstrained memory: keeps every message, in order.

use async_trait::async_trait;
use std::sync::Arc;
use stepwise_core::error::MemoryError;
use stepwise_core::memory::{Memory, MessagePredicate};
use stepwise_core::message::Message;
use tokio::sync::RwLock;

/// An in-memory log that stores messages in a Vec.
/// Used for run-scoped memory and as the default agent memory.
pub struct UnconstrainedMemory {
    messages: Arc<RwLock<Vec<Message>>>,
}

impl UnconstrainedMemory {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create a memory pre-filled with `messages`.
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Arc::new(RwLock::new(messages)),
        }
    }
}

impl Default for UnconstrainedMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Memory for UnconstrainedMemory {
    fn name(&self) -> &str {
        "unconstrained"
    }

    async fn messages(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    async fn add(&self, message: Message) -> Result<(), MemoryError> {
        self.messages.write().await.push(message);
        Ok(())
    }

    async fn add_many(&self, messages: Vec<Message>) -> Result<(), MemoryError> {
        self.messages.write().await.extend(messages);
        Ok(())
    }

    async fn delete_where(&self, predicate: MessagePredicate<'_>) -> Result<usize, MemoryError> {
        let mut messages = self.messages.write().await;
        let len_before = messages.len();
        messages.retain(|m| !predicate(m));
        Ok(len_before - messages.len())
    }

    async fn reset(&self) -> Result<(), MemoryError> {
        self.messages.write().await.clear();
        Ok(())
    }

    async fn fork(&self) -> Result<Arc<dyn Memory>, MemoryError> {
        Ok(Arc::new(Self::with_messages(self.messages().await)))
    }

    async fn len(&self) -> usize {
        self.messages.read().await.len()
    }
}
