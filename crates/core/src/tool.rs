//! Tool trait — the abstraction over externally defined capabilities.
//!
//! A tool has a unique name, a description shown to the model, a JSON
//! Schema for its input, and an async `run`. The agent runtime wraps tools
//! into abilities; tools themselves know nothing about run policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The output of a tool or ability handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The text shown to the model
    pub text: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    /// A plain-text output.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    /// A structured output; the text is the pretty-printed JSON.
    pub fn json(data: serde_json::Value) -> Self {
        Self {
            text: serde_json::to_string_pretty(&data).unwrap_or_default(),
            data: Some(data),
        }
    }

    /// The text fed back to the model as the tool result.
    pub fn text_content(&self) -> &str {
        &self.text
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "web_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with already validated input.
    async fn run(&self, input: serde_json::Value) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.input_schema(),
        }
    }
}

/// Validate `args` against a JSON Schema.
///
/// An invalid schema is reported as invalid arguments too.
pub fn validate_arguments(
    schema: &serde_json::Value,
    args: &serde_json::Value,
) -> std::result::Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid input schema: {e}")))?;
    if validator.is_valid(args) {
        return Ok(());
    }
    let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
    Err(ToolError::InvalidArguments(errors.join("; ")))
}
