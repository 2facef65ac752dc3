//! A tool gated by ordering and frequency rules.
//!
//! The rules come from a [`ToolPolicy`]: which tools must (or must not)
//! have run before, how often the tool may run, when it is forced, and
//! whether the run may finish without it.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use stepwise_config::ToolPolicy;
use stepwise_core::error::{Error, Result, ToolError};
use stepwise_core::tool::{Tool, ToolOutput};

use super::{Ability, AbilityContext, AbilityState, DEFAULT_PRIORITY};
use crate::state::RunState;

pub struct ToolAbility {
    tool: Arc<dyn Tool>,
    policy: ToolPolicy,
}

impl ToolAbility {
    /// Fails when `only_before` and `only_after` share a name.
    pub fn new(tool: Arc<dyn Tool>, policy: ToolPolicy) -> Result<Self> {
        policy
            .validate(tool.name())
            .map_err(|e| Error::config(e.to_string()))?;
        Ok(Self { tool, policy })
    }

    pub fn policy(&self) -> &ToolPolicy {
        &self.policy
    }

    fn forced_now(&self, state: &RunState) -> bool {
        self.policy.force_at_step == Some(state.steps.len())
    }

    /// Not allowed. When the step counter says this tool must be forced
    /// right now the state is contradictory; it is reported as forced so
    /// the resolver can reject it.
    fn deny(&self, state: &RunState) -> AbilityState {
        AbilityState {
            forced: self.forced_now(state),
            ..AbilityState::disallowed()
        }
    }
}

#[async_trait]
impl Ability for ToolAbility {
    fn name(&self) -> &str {
        self.tool.name()
    }

    fn description(&self) -> &str {
        self.tool.description()
    }

    fn input_schema(&self) -> Value {
        self.tool.input_schema()
    }

    fn priority(&self) -> i32 {
        self.policy.priority.unwrap_or(DEFAULT_PRIORITY)
    }

    fn check(&self, state: &RunState) -> AbilityState {
        let policy = &self.policy;
        let only_success = policy.only_success_invocations;
        let invocations = state.invocations_of(self.name(), only_success);

        if policy.max_invocations.is_some_and(|max| invocations >= max) {
            return self.deny(state);
        }

        if policy
            .only_before
            .iter()
            .any(|name| state.has_invoked(name, only_success))
        {
            return self.deny(state);
        }

        if !policy
            .only_after
            .iter()
            .all(|name| state.has_invoked(name, only_success))
        {
            return self.deny(state);
        }

        let last = state.last_step();
        if !policy.can_be_used_in_row && last.is_some_and(|step| step.used(self.name())) {
            return self.deny(state);
        }

        let forced = last.is_some_and(|step| {
            step.tool
                .as_deref()
                .is_some_and(|tool| policy.force_after.iter().any(|name| name == tool))
        }) || self.forced_now(state);

        AbilityState {
            forced,
            prevent_stop: (policy.required && invocations == 0) || forced,
            ..AbilityState::allowed()
        }
    }

    async fn handle(&self, input: Value, _ctx: &AbilityContext) -> std::result::Result<ToolOutput, ToolError> {
        self.tool.run(input).await
    }

    fn verify(&self, known: &HashSet<&str>) -> Result<()> {
        let policy = &self.policy;
        let referenced = policy
            .only_before
            .iter()
            .chain(&policy.only_after)
            .chain(&policy.force_after);

        for name in referenced {
            if !known.contains(name.as_str()) {
                return Err(Error::config(format!(
                    "Ability '{}' refers to '{name}', which is neither a tool nor an ability",
                    self.name()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Step;
    use stepwise_memory::UnconstrainedMemory;
    use stepwise_tools::WebSearchTool;

    fn ability(policy: ToolPolicy) -> ToolAbility {
        ToolAbility::new(Arc::new(WebSearchTool::new()), policy).unwrap()
    }

    fn state(tools: &[(&str, bool)]) -> RunState {
        let mut state = RunState::new(Arc::new(UnconstrainedMemory::new()));
        for (i, (tool, ok)) in tools.iter().enumerate() {
            state.steps.push(Step {
                iteration: i as u32 + 1,
                tool: Some((*tool).into()),
                input: Value::Null,
                output: ToolOutput::default(),
                ability: None,
                error: (!ok).then(|| ToolError::InvalidArguments("bad".into())),
            });
        }
        state
    }

    #[test]
    fn overlapping_order_rejected() {
        let result = ToolAbility::new(
            Arc::new(WebSearchTool::new()),
            ToolPolicy {
                only_before: vec!["a".into()],
                only_after: vec!["a".into()],
                ..ToolPolicy::default()
            },
        );
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn invocation_cap() {
        let search = ability(ToolPolicy {
            max_invocations: Some(1),
            ..ToolPolicy::default()
        });
        assert!(search.check(&state(&[])).allowed);
        assert!(!search.check(&state(&[("web_search", true)])).allowed);
    }

    #[test]
    fn failed_invocations_only_count_when_configured() {
        let lenient = ability(ToolPolicy {
            max_invocations: Some(1),
            ..ToolPolicy::default()
        });
        let strict = ability(ToolPolicy {
            max_invocations: Some(1),
            only_success_invocations: false,
            ..ToolPolicy::default()
        });
        let failed = state(&[("web_search", false)]);
        assert!(lenient.check(&failed).allowed);
        assert!(!strict.check(&failed).allowed);
    }

    #[test]
    fn only_after_unlocks() {
        let search = ability(ToolPolicy {
            only_after: vec!["lookup".into()],
            ..ToolPolicy::default()
        });
        assert!(!search.check(&state(&[])).allowed);
        assert!(search.check(&state(&[("lookup", true)])).allowed);
        assert!(search.check(&state(&[("lookup", true), ("other", true)])).allowed);
    }

    #[test]
    fn only_before_closes() {
        let search = ability(ToolPolicy {
            only_before: vec!["lookup".into()],
            ..ToolPolicy::default()
        });
        assert!(search.check(&state(&[])).allowed);
        assert!(!search.check(&state(&[("lookup", true)])).allowed);
    }

    #[test]
    fn required_prevents_stop_until_used() {
        let search = ability(ToolPolicy {
            required: true,
            ..ToolPolicy::default()
        });
        assert!(search.check(&state(&[])).prevent_stop);
        assert!(!search.check(&state(&[("web_search", true)])).prevent_stop);
    }

    #[test]
    fn force_after_and_force_at_step() {
        let search = ability(ToolPolicy {
            force_after: vec!["lookup".into()],
            ..ToolPolicy::default()
        });
        let status = search.check(&state(&[("lookup", true)]));
        assert!(status.forced && status.prevent_stop);
        assert!(!search.check(&state(&[("lookup", true), ("x", true)])).forced);

        let first = ability(ToolPolicy {
            force_at_step: Some(0),
            ..ToolPolicy::default()
        });
        assert!(first.check(&state(&[])).forced);
        assert!(!first.check(&state(&[("x", true)])).forced);
    }

    #[test]
    fn forced_while_denied_is_reported() {
        let search = ability(ToolPolicy {
            only_after: vec!["lookup".into()],
            force_at_step: Some(0),
            ..ToolPolicy::default()
        });
        let status = search.check(&state(&[]));
        assert!(!status.allowed);
        assert!(status.forced);
    }

    #[test]
    fn not_in_row() {
        let search = ability(ToolPolicy {
            can_be_used_in_row: false,
            ..ToolPolicy::default()
        });
        assert!(!search.check(&state(&[("web_search", true)])).allowed);
        assert!(search.check(&state(&[("web_search", true), ("x", true)])).allowed);
    }

    #[test]
    fn verify_reports_unknown_names() {
        let search = ability(ToolPolicy {
            force_after: vec!["ghost".into()],
            ..ToolPolicy::default()
        });
        let known: HashSet<&str> = ["web_search", "final_answer"].into_iter().collect();
        let err = search.verify(&known).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn priority_from_policy() {
        let search = ability(ToolPolicy {
            priority: Some(99),
            ..ToolPolicy::default()
        });
        assert_eq!(search.priority(), 99);
        assert_eq!(ability(ToolPolicy::default()).priority(), DEFAULT_PRIORITY);
    }
}
