//! # stepwise core
//!
//! Domain types, boundary traits, and error definitions for the stepwise
//! tool-calling agent runtime. This crate has **no runtime logic** of its
//! own: it defines the contracts the agent loop is written against.
//!
//! ## Boundaries
//!
//! - [`Provider`]: the LLM call (messages + tool definitions + tool choice in,
//!   one assistant message out)
//! - [`Tool`]: an externally defined capability with a JSON Schema input
//! - [`Memory`]: an ordered message log that can be forked
//!
//! Implementations live in their respective crates, so tests can swap in
//! scripted providers and in-memory stores.

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, Error, MemoryError, ProviderError, Result, ToolError};
pub use event::{AgentEvent, EventBus};
pub use memory::Memory;
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, ToolDefinition, Usage};
pub use tool::{Tool, ToolOutput, validate_arguments};
