//! The tool-calling agent runtime.
//!
//! An agent runs an iterative loop:
//!
//! 1. **Resolve** which tools and abilities the model may use this step
//! 2. **Ask** the provider, sending only those tools and a tool-choice directive
//! 3. **Execute** the returned tool calls concurrently and record each as a step
//! 4. **Guard** against repeated calls and charge failures to a retry budget
//!
//! The loop ends when the final-answer ability stores a result, or fails on
//! the iteration cap, an exhausted retry budget, or cancellation.

pub mod ability;
pub mod agent;
pub mod catalog;
pub mod cycle;
pub mod extract;
pub mod policy;
pub mod prompts;
pub mod registry;
pub mod retry;
pub mod state;

#[cfg(test)]
mod test_helpers;

pub use ability::{
    Ability, AbilityContext, AbilityState, DynamicAbility, FINAL_ANSWER_NAME, FinalAnswerAbility,
    HandoffAbility, REASONING_NAME, ReasoningAbility, ToolAbility, ToolAdapter,
};
pub use agent::ToolCallingAgent;
pub use catalog::AbilityCatalog;
pub use cycle::{OccurrencesCounter, ToolCallChecker};
pub use extract::{PairMatch, find_first_pair, parse_broken_json};
pub use policy::{Request, prepare_request};
pub use prompts::PromptTemplates;
pub use registry::AbilitiesRegistry;
pub use retry::RetryCounter;
pub use state::{ExpectedOutput, ResultSlot, RunInput, RunOutput, RunState, Step};
