//! Sliding memory: keeps only the newest `capacity` messages.
//!
//! System messages are never evicted; when the window is full the oldest
//! non-system message goes first.

use async_trait::async_trait;
use std::sync::Arc;
use stepwise_core::error::MemoryError;
use stepwise_core::memory::{Memory, MessagePredicate};
use stepwise_core::message::{Message, Role};
use tokio::sync::RwLock;
use tracing::debug;

pub struct SlidingMemory {
    capacity: usize,
    messages: Arc<RwLock<Vec<Message>>>,
}

impl SlidingMemory {
    /// Create a sliding memory holding at most `capacity` messages.
    /// A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            messages: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict(capacity: usize, messages: &mut Vec<Message>) {
        while messages.len() > capacity {
            let Some(idx) = messages.iter().position(|m| m.role != Role::System) else {
                // Only system messages left; nothing evictable.
                break;
            };
            let evicted = messages.remove(idx);
            debug!(message_id = %evicted.id, capacity, "Sliding memory evicted message");
        }
    }
}

#[async_trait]
impl Memory for SlidingMemory {
    fn name(&self) -> &str {
        "sliding"
    }

    async fn messages(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    async fn add(&self, message: Message) -> Result<(), MemoryError> {
        let mut messages = self.messages.write().await;
        messages.push(message);
        Self::evict(self.capacity, &mut messages);
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
        let copy = Self::new(self.capacity);
        *copy.messages.write().await = self.messages().await;
        Ok(Arc::new(copy))
    }
}
