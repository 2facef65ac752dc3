//! Abilities assembled from closures.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use stepwise_core::error::ToolError;
use stepwise_core::tool::ToolOutput;

use super::{Ability, AbilityContext, AbilityState, DEFAULT_PRIORITY};
use crate::state::RunState;

pub type CheckFn = dyn Fn(&RunState) -> AbilityState + Send + Sync;
pub type HandlerFn =
    dyn Fn(Value) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync;

/// An ability with a user-supplied handler and check.
///
/// Without a check it is always allowed; without a handler it returns an
/// empty output.
pub struct DynamicAbility {
    name: String,
    description: String,
    input_schema: Value,
    priority: i32,
    check: Option<Arc<CheckFn>>,
    handler: Option<Arc<HandlerFn>>,
}

impl DynamicAbility {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            priority: DEFAULT_PRIORITY,
            check: None,
            handler: None,
        }
    }

    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&RunState) -> AbilityState + Send + Sync + 'static,
    {
        self.check = Some(Arc::new(check));
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl Ability for DynamicAbility {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn check(&self, state: &RunState) -> AbilityState {
        self.check
            .as_ref()
            .map_or_else(AbilityState::allowed, |check| check(state))
    }

    async fn handle(&self, input: Value, _ctx: &AbilityContext) -> Result<ToolOutput, ToolError> {
        match &self.handler {
            Some(handler) => handler(input).await,
            None => Ok(ToolOutput::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;
    use stepwise_memory::UnconstrainedMemory;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> AbilityContext {
        AbilityContext {
            iteration: 1,
            call_id: "call_x".into(),
            messages: vec![],
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn defaults_are_permissive() {
        let ability = DynamicAbility::new("noop", "does nothing", json!({"type": "object"}));
        let state = RunState::new(Arc::new(UnconstrainedMemory::new()));
        assert_eq!(ability.check(&state), AbilityState::allowed());
        assert_eq!(ability.priority(), DEFAULT_PRIORITY);

        let out = ability.handle(json!({}), &ctx()).await.unwrap();
        assert!(out.text_content().is_empty());
    }

    #[tokio::test]
    async fn closures_are_used() {
        let ability = DynamicAbility::new("upper", "uppercases", json!({"type": "object"}))
            .with_check(|state| AbilityState::from(state.iteration < 3))
            .with_handler(|input| {
                async move {
                    let text = input["text"].as_str().unwrap_or_default().to_uppercase();
                    Ok(ToolOutput::text(text))
                }
                .boxed()
            })
            .with_priority(50);

        let mut state = RunState::new(Arc::new(UnconstrainedMemory::new()));
        state.iteration = 5;
        assert!(!ability.check(&state).allowed);
        assert_eq!(ability.priority(), 50);

        let out = ability.handle(json!({"text": "hi"}), &ctx()).await.unwrap();
        assert_eq!(out.text_content(), "HI");
    }
}
