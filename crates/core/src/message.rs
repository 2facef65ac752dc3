//! Message domain types.
//!
//! These are the value objects that flow through a run:
//! the task arrives as a user message, the provider answers with an
//! assistant message (text and/or tool calls), and every executed call is
//! answered with a tool message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata key marking placeholder messages inserted for empty responses.
pub const TEMP_MESSAGE_KEY: &str = "temp_message";

/// Metadata key carrying the tool name on tool result messages.
pub const TOOL_NAME_KEY: &str = "tool_name";

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create an assistant message carrying tool calls and no text.
    pub fn tool_calls(calls: Vec<MessageToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, String::new());
        msg.tool_calls = calls;
        msg
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg.metadata.insert(
            TOOL_NAME_KEY.into(),
            serde_json::Value::String(tool_name.into()),
        );
        msg
    }

    /// Create the placeholder assistant message used when a provider
    /// returned nothing at all, so the transcript never ends empty.
    pub fn placeholder() -> Self {
        let mut msg = Self::assistant("\n");
        msg.metadata
            .insert(TEMP_MESSAGE_KEY.into(), serde_json::Value::Bool(true));
        msg
    }

    /// Whether this message is a placeholder (see [`Message::placeholder`]).
    pub fn is_temporary(&self) -> bool {
        self.metadata
            .get(TEMP_MESSAGE_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether the message carries no text and no tool calls.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.tool_calls.is_empty()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,

    /// Call type tag, as reported by the provider
    #[serde(default = "default_call_kind")]
    pub kind: String,
}

fn default_call_kind() -> String {
    "function".into()
}

impl MessageToolCall {
    /// Create a `function` tool call with a fresh id.
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("call_{}", &id[..8]),
            name: name.into(),
            arguments: arguments.into(),
            kind: default_call_kind(),
        }
    }

    /// Two calls are the same when name, arguments and type tag all match.
    /// The id is ignored.
    pub fn is_same_call(&self, other: &Self) -> bool {
        self.name == other.name && self.arguments == other.arguments && self.kind == other.kind
    }
}
