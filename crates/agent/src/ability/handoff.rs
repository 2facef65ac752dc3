//! Delegates a sub-task to another agent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use stepwise_core::error::ToolError;
use stepwise_core::tool::ToolOutput;
use tracing::info;

use super::{Ability, AbilityContext, AbilityState};
use crate::agent::ToolCallingAgent;
use crate::state::{RunInput, RunState};

#[derive(Debug, Deserialize)]
struct HandoffInput {
    prompt: String,
}

/// Runs a fork of the target agent, seeded with the caller's conversation
/// (minus its first message), and returns the target's answer.
pub struct HandoffAbility {
    target: Arc<ToolCallingAgent>,
    name: String,
    description: String,
}

impl HandoffAbility {
    pub fn new(target: Arc<ToolCallingAgent>) -> Self {
        let name = target.name().to_string();
        let description = target.description().to_string();
        Self {
            target,
            name,
            description,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Ability for HandoffAbility {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Clearly defined task for the agent to work on based on its abilities."
                }
            },
            "required": ["prompt"]
        })
    }

    fn check(&self, _state: &RunState) -> AbilityState {
        AbilityState::allowed()
    }

    async fn handle(&self, input: Value, ctx: &AbilityContext) -> Result<ToolOutput, ToolError> {
        let input: HandoffInput =
            serde_json::from_value(input).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason,
        };

        let delegate = self.target.fork().await.map_err(|e| failed(e.to_string()))?;
        let history = ctx.messages.iter().skip(1).cloned().collect();
        delegate
            .memory()
            .add_many(history)
            .await
            .map_err(|e| failed(e.to_string()))?;

        info!(target_agent = %self.name, iteration = ctx.iteration, "Handing off task");
        let output = delegate
            .run(RunInput::new(input.prompt).with_cancellation(ctx.cancel.child_token()))
            .await
            .map_err(|e| failed(e.to_string()))?;

        Ok(ToolOutput::text(output.result.content))
    }
}
