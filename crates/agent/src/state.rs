//! Run-scoped state: iteration counter, step history, result slot, memory.

use std::sync::{Arc, OnceLock};

use serde_json::Value;
use stepwise_core::error::ToolError;
use stepwise_core::memory::Memory;
use stepwise_core::message::Message;
use stepwise_core::tool::ToolOutput;
use tokio_util::sync::CancellationToken;

/// Write-once handle to the final answer of one run.
///
/// Only the final-answer ability can fill it; everything else reads.
#[derive(Debug, Clone, Default)]
pub struct ResultSlot(Arc<OnceLock<Message>>);

impl ResultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the message back when the slot was already filled.
    pub(crate) fn set(&self, message: Message) -> Result<(), Message> {
        self.0.set(message)
    }

    pub fn get(&self) -> Option<&Message> {
        self.0.get()
    }

    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }
}

/// One executed tool or ability call.
#[derive(Debug, Clone)]
pub struct Step {
    pub iteration: u32,
    /// Resolved tool name; `None` when the model asked for an unknown tool
    pub tool: Option<String>,
    pub input: Value,
    pub output: ToolOutput,
    /// Set when the call went through an ability rather than a plain tool
    pub ability: Option<String>,
    pub error: Option<ToolError>,
}

impl Step {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn used(&self, name: &str) -> bool {
        self.tool.as_deref() == Some(name)
    }
}

/// State owned by a single run of the loop.
pub struct RunState {
    pub iteration: u32,
    pub steps: Vec<Step>,
    pub result: ResultSlot,
    pub memory: Arc<dyn Memory>,
}

impl RunState {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        Self {
            iteration: 0,
            steps: Vec::new(),
            result: ResultSlot::new(),
            memory,
        }
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// How many times `name` has been invoked, optionally counting only
    /// successful invocations.
    pub fn invocations_of(&self, name: &str, only_success: bool) -> usize {
        self.steps
            .iter()
            .filter(|s| s.used(name) && (!only_success || s.is_success()))
            .count()
    }

    pub fn has_invoked(&self, name: &str, only_success: bool) -> bool {
        self.invocations_of(name, only_success) > 0
    }
}

impl std::fmt::Debug for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunState")
            .field("iteration", &self.iteration)
            .field("steps", &self.steps.len())
            .field("has_result", &self.result.is_set())
            .field("memory", &self.memory.name())
            .finish()
    }
}

/// What the caller wants the final answer to look like.
#[derive(Debug, Clone, Default)]
pub enum ExpectedOutput {
    #[default]
    None,
    /// Free-form criteria shown to the model
    Instructions(String),
    /// JSON Schema the final answer must satisfy
    Schema(Value),
}

impl ExpectedOutput {
    pub fn instructions(&self) -> Option<&str> {
        match self {
            Self::Instructions(text) => Some(text),
            _ => None,
        }
    }

    pub fn schema(&self) -> Option<&Value> {
        match self {
            Self::Schema(schema) => Some(schema),
            _ => None,
        }
    }
}

/// Input of [`ToolCallingAgent::run`](crate::ToolCallingAgent::run).
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    /// Task for this run; `None` continues from the agent memory only
    pub prompt: Option<String>,
    pub context: Option<String>,
    pub expected_output: ExpectedOutput,
    pub cancel: Option<CancellationToken>,
}

impl RunInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_expected_output(mut self, expected: ExpectedOutput) -> Self {
        self.expected_output = expected;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Result of a successful run.
#[derive(Debug)]
pub struct RunOutput {
    pub result: Message,
    pub state: RunState,
}

impl RunOutput {
    pub fn text(&self) -> &str {
        &self.result.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_memory::UnconstrainedMemory;

    fn step(tool: &str, ok: bool) -> Step {
        Step {
            iteration: 1,
            tool: Some(tool.into()),
            input: Value::Null,
            output: ToolOutput::text("out"),
            ability: None,
            error: (!ok).then(|| ToolError::ExecutionFailed {
                tool_name: tool.into(),
                reason: "boom".into(),
            }),
        }
    }

    #[test]
    fn result_slot_is_write_once() {
        let slot = ResultSlot::new();
        assert!(!slot.is_set());
        assert!(slot.set(Message::assistant("first")).is_ok());
        assert!(slot.set(Message::assistant("second")).is_err());
        assert_eq!(slot.get().unwrap().content, "first");
    }

    #[test]
    fn clones_share_the_slot() {
        let slot = ResultSlot::new();
        let handle = slot.clone();
        handle.set(Message::assistant("done")).unwrap();
        assert!(slot.is_set());
    }

    #[test]
    fn invocation_counting_respects_success_filter() {
        let mut state = RunState::new(Arc::new(UnconstrainedMemory::new()));
        state.steps.push(step("search", false));
        state.steps.push(step("search", true));
        state.steps.push(step("other", true));

        assert_eq!(state.invocations_of("search", true), 1);
        assert_eq!(state.invocations_of("search", false), 2);
        assert!(!state.has_invoked("missing", false));
        assert_eq!(state.last_step().unwrap().tool.as_deref(), Some("other"));
    }

    #[test]
    fn run_input_builder() {
        let input = RunInput::new("task")
            .with_context("ctx")
            .with_expected_output(ExpectedOutput::Instructions("short".into()));
        assert_eq!(input.prompt.as_deref(), Some("task"));
        assert_eq!(input.expected_output.instructions(), Some("short"));
        assert!(input.expected_output.schema().is_none());
    }
}
