//! Presents a plain [`Tool`] as an always-allowed ability.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolOutput};

use super::{Ability, AbilityContext, AbilityState};
use crate::state::RunState;

pub struct ToolAdapter {
    tool: Arc<dyn Tool>,
}

impl ToolAdapter {
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self { tool }
    }

    pub fn tool(&self) -> &Arc<dyn Tool> {
        &self.tool
    }
}

#[async_trait]
impl Ability for ToolAdapter {
    fn name(&self) -> &str {
        self.tool.name()
    }

    fn description(&self) -> &str {
        self.tool.description()
    }

    fn input_schema(&self) -> Value {
        self.tool.input_schema()
    }

    fn check(&self, _state: &RunState) -> AbilityState {
        AbilityState::allowed()
    }

    async fn handle(&self, input: Value, _ctx: &AbilityContext) -> Result<ToolOutput, ToolError> {
        self.tool.run(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepwise_memory::UnconstrainedMemory;
    use stepwise_tools::WeatherLookupTool;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn mirrors_the_tool() {
        let adapter = ToolAdapter::new(Arc::new(WeatherLookupTool));
        assert_eq!(adapter.name(), "weather_lookup");
        assert_eq!(adapter.to_definition().parameters["required"][0], "location");

        let state = RunState::new(Arc::new(UnconstrainedMemory::new()));
        assert_eq!(adapter.check(&state), AbilityState::allowed());

        let ctx = AbilityContext {
            iteration: 1,
            call_id: "call_w".into(),
            messages: vec![],
            cancel: CancellationToken::new(),
        };
        let out = adapter.handle(json!({"location": "Rome"}), &ctx).await.unwrap();
        assert!(out.text_content().contains("Rome"));
    }
}
