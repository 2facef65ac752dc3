//! Scratchpad ability: lets the model think out loud between tool calls.

use async_trait::async_trait;
use serde_json::{Value, json};
use stepwise_core::error::ToolError;
use stepwise_core::tool::ToolOutput;

use super::{Ability, AbilityContext, AbilityState};
use crate::state::RunState;

pub const REASONING_NAME: &str = "Reasoning";

pub struct ReasoningAbility {
    force: bool,
}

impl ReasoningAbility {
    /// With `force`, the model must reason first and after every tool call.
    pub fn new(force: bool) -> Self {
        Self { force }
    }
}

#[async_trait]
impl Ability for ReasoningAbility {
    fn name(&self) -> &str {
        REASONING_NAME
    }

    fn description(&self) -> &str {
        "Use this tool when you want to think through a problem, clarify your assumptions, or break down complex steps before acting or responding. This is your internal \"scratchpad\", a place to reason out loud in natural language."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "thoughts": {
                    "type": "string",
                    "description": "Describe what you just saw and which tool will you use in the next step."
                },
                "next_step": {
                    "type": "string",
                    "description": "Describe what will happen next."
                }
            },
            "required": ["thoughts", "next_step"]
        })
    }

    fn check(&self, state: &RunState) -> AbilityState {
        match state.last_step() {
            Some(last) if last.used(REASONING_NAME) && last.is_success() => {
                AbilityState::allowed().with_prevent_stop(true)
            }
            last => AbilityState {
                forced: self.force,
                prevent_stop: self.force && last.is_none(),
                ..AbilityState::allowed()
            },
        }
    }

    async fn handle(&self, _input: Value, _ctx: &AbilityContext) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text(
            "The observation seems reasonable. Remember that progress is made one step at a time. Stay determined and keep moving forward.",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Step;
    use std::sync::Arc;
    use stepwise_memory::UnconstrainedMemory;

    fn state_with(last_tool: Option<&str>, ok: bool) -> RunState {
        let mut state = RunState::new(Arc::new(UnconstrainedMemory::new()));
        if let Some(tool) = last_tool {
            state.steps.push(Step {
                iteration: 1,
                tool: Some(tool.into()),
                input: Value::Null,
                output: ToolOutput::default(),
                ability: None,
                error: (!ok).then(|| ToolError::InvalidArguments("bad".into())),
            });
        }
        state
    }

    #[test]
    fn forced_on_first_step_blocks_stop() {
        let status = ReasoningAbility::new(true).check(&state_with(None, true));
        assert!(status.forced);
        assert!(status.prevent_stop);
    }

    #[test]
    fn forced_after_tool_allows_stop() {
        let status = ReasoningAbility::new(true).check(&state_with(Some("search"), true));
        assert!(status.forced);
        assert!(!status.prevent_stop);
    }

    #[test]
    fn after_reasoning_it_reflects_once_more() {
        let status = ReasoningAbility::new(true).check(&state_with(Some(REASONING_NAME), true));
        assert!(status.allowed);
        assert!(!status.forced);
        assert!(status.prevent_stop);
    }

    #[test]
    fn failed_reasoning_does_not_count() {
        let status = ReasoningAbility::new(false).check(&state_with(Some(REASONING_NAME), false));
        assert!(!status.forced);
        assert!(!status.prevent_stop);
    }
}
