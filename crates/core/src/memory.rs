//! Memory trait: an ordered, append-oriented message log.
//!
//! Agents keep a persistent memory across runs; every run works on its own
//! scoped copy. Implementations must preserve insertion order and support
//! forking into a fully independent copy.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::MemoryError;
use crate::message::Message;

/// Predicate used by [`Memory::delete_where`].
pub type MessagePredicate<'a> = &'a (dyn Fn(&Message) -> bool + Send + Sync);

/// The core Memory trait.
///
/// Implementations: unconstrained (unbounded), sliding window.
#[async_trait]
pub trait Memory: Send + Sync {
    /// The memory kind (e.g., "unconstrained", "sliding").
    fn name(&self) -> &str;

    /// Snapshot of all messages, oldest first.
    async fn messages(&self) -> Vec<Message>;

    /// Append one message.
    async fn add(&self, message: Message) -> std::result::Result<(), MemoryError>;

    /// Append several messages, preserving their order.
    async fn add_many(&self, messages: Vec<Message>) -> std::result::Result<(), MemoryError> {
        for message in messages {
            self.add(message).await?;
        }
        Ok(())
    }

    /// Delete every message matching `predicate`. Returns how many were removed.
    async fn delete_where(
        &self,
        predicate: MessagePredicate<'_>,
    ) -> std::result::Result<usize, MemoryError>;

    /// Delete the messages with the given ids.
    async fn delete_many(&self, ids: &[String]) -> std::result::Result<usize, MemoryError> {
        self.delete_where(&|m: &Message| ids.contains(&m.id)).await
    }

    /// Remove everything.
    async fn reset(&self) -> std::result::Result<(), MemoryError>;

    /// Independent copy: later writes to either side are not shared.
    async fn fork(&self) -> std::result::Result<Arc<dyn Memory>, MemoryError>;

    /// Number of stored messages.
    async fn len(&self) -> usize {
        self.messages().await.len()
    }

    /// Whether the memory holds no messages.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
