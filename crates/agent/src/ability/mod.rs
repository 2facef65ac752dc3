//! Abilities: policy-gated capabilities the model can call like tools.
//!
//! Every ability advertises a name, description and input schema, and
//! decides per iteration (via [`Ability::check`]) whether it may, must or
//! must not be used. Plain tools are adapted into always-allowed abilities
//! so the run loop executes everything through one interface.

pub mod dynamic;
pub mod final_answer;
pub mod handoff;
pub mod reasoning;
pub mod tool_ability;
pub mod tool_adapter;

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use stepwise_core::error::{Result, ToolError};
use stepwise_core::message::Message;
use stepwise_core::provider::ToolDefinition;
use stepwise_core::tool::ToolOutput;
use tokio_util::sync::CancellationToken;

use crate::state::RunState;

pub use dynamic::DynamicAbility;
pub use final_answer::{FINAL_ANSWER_NAME, FinalAnswerAbility};
pub use handoff::HandoffAbility;
pub use reasoning::{REASONING_NAME, ReasoningAbility};
pub use tool_ability::ToolAbility;
pub use tool_adapter::ToolAdapter;

pub const DEFAULT_PRIORITY: i32 = 10;

/// Per-iteration decision of an ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbilityState {
    /// May be selected
    pub allowed: bool,
    /// Must be selected this iteration
    pub forced: bool,
    /// Selectable but left out of the catalogue shown to the model
    pub hidden: bool,
    /// The final answer is withheld this iteration
    pub prevent_stop: bool,
}

impl AbilityState {
    pub const fn allowed() -> Self {
        Self {
            allowed: true,
            forced: false,
            hidden: false,
            prevent_stop: false,
        }
    }

    pub const fn disallowed() -> Self {
        Self {
            allowed: false,
            ..Self::allowed()
        }
    }

    pub const fn forced() -> Self {
        Self {
            forced: true,
            ..Self::allowed()
        }
    }

    pub const fn with_prevent_stop(mut self, prevent_stop: bool) -> Self {
        self.prevent_stop = prevent_stop;
        self
    }

    pub const fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

impl Default for AbilityState {
    fn default() -> Self {
        Self::allowed()
    }
}

impl From<bool> for AbilityState {
    fn from(allowed: bool) -> Self {
        if allowed {
            Self::allowed()
        } else {
            Self::disallowed()
        }
    }
}

/// What a handler gets to see about the run that invoked it.
#[derive(Debug, Clone)]
pub struct AbilityContext {
    pub iteration: u32,
    pub call_id: String,
    /// Snapshot of the run memory taken before the call was executed
    pub messages: Vec<Message>,
    pub cancel: CancellationToken,
}

/// The capability interface shared by every ability variant.
#[async_trait]
pub trait Ability: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the handler input.
    fn input_schema(&self) -> Value;

    /// Tie-break when several abilities are forced at once; higher wins.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Decide how the ability may be used at this point of the run.
    /// Must not have side effects.
    fn check(&self, state: &RunState) -> AbilityState;

    /// Run the ability with input already validated against
    /// [`Ability::input_schema`].
    async fn handle(&self, input: Value, ctx: &AbilityContext) -> std::result::Result<ToolOutput, ToolError>;

    /// Check that every name this ability refers to exists.
    fn verify(&self, _known: &HashSet<&str>) -> Result<()> {
        Ok(())
    }

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.input_schema(),
        }
    }
}

impl std::fmt::Debug for dyn Ability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ability")
            .field("name", &self.name())
            .field("priority", &self.priority())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_shorthand() {
        assert_eq!(AbilityState::from(true), AbilityState::allowed());
        assert!(!AbilityState::from(false).allowed);
    }

    #[test]
    fn forced_implies_allowed() {
        let state = AbilityState::forced();
        assert!(state.allowed && state.forced);
        assert!(!state.prevent_stop);
    }

    #[test]
    fn builders_compose() {
        let state = AbilityState::allowed().with_hidden(true).with_prevent_stop(true);
        assert!(state.hidden && state.prevent_stop && state.allowed);
    }
}
