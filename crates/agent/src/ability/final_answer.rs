//! The final-answer ability. Calling it is the only way a run terminates
//! successfully.

use async_trait::async_trait;
use serde_json::{Value, json};
use stepwise_core::error::ToolError;
use stepwise_core::message::Message;
use stepwise_core::tool::ToolOutput;
use tracing::debug;

use super::{Ability, AbilityContext, AbilityState};
use crate::state::{ExpectedOutput, ResultSlot, RunState};

pub const FINAL_ANSWER_NAME: &str = "final_answer";

/// Built once per run around that run's [`ResultSlot`].
pub struct FinalAnswerAbility {
    slot: ResultSlot,
    expected: ExpectedOutput,
}

impl FinalAnswerAbility {
    pub fn new(slot: ResultSlot, expected: ExpectedOutput) -> Self {
        Self { slot, expected }
    }

    /// Whether the caller supplied the answer schema.
    pub fn custom_schema(&self) -> bool {
        self.expected.schema().is_some()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.expected.instructions()
    }
}

#[async_trait]
impl Ability for FinalAnswerAbility {
    fn name(&self) -> &str {
        FINAL_ANSWER_NAME
    }

    fn description(&self) -> &str {
        "Sends the final answer to the user"
    }

    fn input_schema(&self) -> Value {
        if let Some(schema) = self.expected.schema() {
            return schema.clone();
        }

        let mut response = json!({ "type": "string" });
        if let Some(instructions) = self.instructions() {
            response["description"] = Value::String(instructions.to_string());
        }
        json!({
            "type": "object",
            "properties": { "response": response },
            "required": ["response"]
        })
    }

    fn check(&self, _state: &RunState) -> AbilityState {
        AbilityState::allowed()
    }

    async fn handle(&self, input: Value, ctx: &AbilityContext) -> Result<ToolOutput, ToolError> {
        let content = if self.custom_schema() {
            serde_json::to_string(&input).map_err(|e| ToolError::InvalidArguments(e.to_string()))?
        } else {
            input
                .get("response")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ToolError::InvalidArguments("'response' must be a string".into()))?
        };

        self.slot
            .set(Message::assistant(content))
            .map_err(|_| ToolError::ExecutionFailed {
                tool_name: FINAL_ANSWER_NAME.into(),
                reason: "a final answer has already been sent".into(),
            })?;

        debug!(iteration = ctx.iteration, "Final answer recorded");
        Ok(ToolOutput::text("Message has been sent"))
    }
}
