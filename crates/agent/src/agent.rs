//! The tool-calling agent and its run loop.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::{Value, json};
use stepwise_config::{AppConfig, ToolCallCheckerConfig};
use stepwise_core::error::{AgentError, Error, Result, ToolError};
use stepwise_core::event::{AgentEvent, EventBus};
use stepwise_core::memory::Memory;
use stepwise_core::message::{Message, MessageToolCall};
use stepwise_core::provider::{Provider, ProviderRequest};
use stepwise_core::tool::{Tool, ToolOutput, validate_arguments};
use stepwise_memory::UnconstrainedMemory;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::ability::{Ability, AbilityContext, FinalAnswerAbility, ToolAbility};
use crate::catalog::AbilityCatalog;
use crate::cycle::ToolCallChecker;
use crate::extract::{find_first_pair, parse_broken_json};
use crate::policy::{Request, prepare_request};
use crate::prompts::{
    CycleDetectionPromptInput, DEFAULT_ROLE, PromptTemplates, SystemPromptInput, TaskPromptInput,
    ToolErrorPromptInput, ToolTemplateDefinition,
};
use crate::registry::AbilitiesRegistry;
use crate::retry::RetryCounter;
use crate::state::{RunInput, RunOutput, RunState, Step};

/// An agent that drives a model through tool calls until it produces a
/// final answer.
pub struct ToolCallingAgent {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    model: String,
    temperature: f32,
    max_tokens: Option<u32>,

    /// Persistent conversation memory
    memory: Arc<dyn Memory>,

    tools: Vec<Arc<dyn Tool>>,
    abilities: Vec<Arc<dyn Ability>>,
    templates: PromptTemplates,

    name: String,
    description: String,
    role: Option<String>,
    instructions: Option<String>,

    /// Iteration cap per run; 0 disables it
    max_iterations: u32,

    /// Tool failures tolerated per run
    total_max_retries: u32,

    save_intermediate_steps: bool,
    final_answer_as_tool: bool,
    tool_call_checker: ToolCallCheckerConfig,

    /// Event bus for run events
    event_bus: Arc<EventBus>,
}

/// Outcome of one tool call within an iteration.
struct Invocation {
    call: MessageToolCall,
    tool: Option<String>,
    input: Value,
    outcome: std::result::Result<ToolOutput, ToolError>,
    duration_ms: u64,
}

impl ToolCallingAgent {
    /// Create an agent with default settings and no tools.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        let defaults = AppConfig::default();
        Self {
            provider,
            model: model.into(),
            temperature: defaults.model.temperature,
            max_tokens: None,
            memory: Arc::new(UnconstrainedMemory::new()),
            tools: Vec::new(),
            abilities: Vec::new(),
            templates: PromptTemplates::default(),
            name: String::new(),
            description: String::new(),
            role: None,
            instructions: None,
            max_iterations: defaults.agent.max_iterations,
            total_max_retries: defaults.agent.total_max_retries,
            save_intermediate_steps: defaults.agent.save_intermediate_steps,
            final_answer_as_tool: defaults.agent.final_answer_as_tool,
            tool_call_checker: defaults.tool_call_checker,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Build an agent from configuration.
    ///
    /// Tools with a `[tool_policies.<name>]` entry are registered as
    /// gated abilities; abilities listed under `agent.abilities` are
    /// resolved through `catalog`.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        config: &AppConfig,
        tools: Vec<Arc<dyn Tool>>,
        catalog: &AbilityCatalog,
    ) -> Result<Self> {
        config.validate().map_err(|e| Error::config(e.to_string()))?;

        for name in config.tool_policies.keys() {
            if !tools.iter().any(|tool| tool.name() == name) {
                return Err(Error::config(format!(
                    "Tool policy refers to unknown tool '{name}'"
                )));
            }
        }

        let mut plain_tools = Vec::new();
        let mut abilities: Vec<Arc<dyn Ability>> = Vec::new();
        for tool in tools {
            match config.tool_policies.get(tool.name()) {
                Some(policy) => abilities.push(Arc::new(ToolAbility::new(tool, policy.clone())?)),
                None => plain_tools.push(tool),
            }
        }
        abilities.extend(catalog.resolve(&config.agent.abilities)?);

        let settings = &config.agent;
        let mut agent = Self::new(provider, config.model.name.clone())
            .with_temperature(config.model.temperature)
            .with_tools(plain_tools)
            .with_abilities(abilities)
            .with_templates(PromptTemplates::new(&config.prompts)?)
            .with_name(settings.name.clone())
            .with_description(settings.description.clone())
            .with_max_iterations(settings.max_iterations)
            .with_total_max_retries(settings.total_max_retries)
            .with_save_intermediate_steps(settings.save_intermediate_steps)
            .with_final_answer_as_tool(settings.final_answer_as_tool)
            .with_tool_call_checker(config.tool_call_checker);
        agent.max_tokens = config.model.max_tokens;
        agent.role = settings.role.clone();
        agent.instructions = settings.instructions.clone();
        Ok(agent)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_abilities(mut self, abilities: Vec<Arc<dyn Ability>>) -> Self {
        self.abilities = abilities;
        self
    }

    pub fn with_ability(mut self, ability: Arc<dyn Ability>) -> Self {
        self.abilities.push(ability);
        self
    }

    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_total_max_retries(mut self, max: u32) -> Self {
        self.total_max_retries = max;
        self
    }

    pub fn with_save_intermediate_steps(mut self, enabled: bool) -> Self {
        self.save_intermediate_steps = enabled;
        self
    }

    pub fn with_final_answer_as_tool(mut self, enabled: bool) -> Self {
        self.final_answer_as_tool = enabled;
        self
    }

    pub fn with_tool_call_checker(mut self, config: ToolCallCheckerConfig) -> Self {
        self.tool_call_checker = config;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured description, falling back to the instructions.
    pub fn description(&self) -> &str {
        if self.description.is_empty() {
            self.instructions.as_deref().unwrap_or_default()
        } else {
            &self.description
        }
    }

    pub fn memory(&self) -> &Arc<dyn Memory> {
        &self.memory
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// A copy of this agent sharing its configuration but owning an
    /// independent copy of its memory.
    pub async fn fork(&self) -> Result<Self> {
        Ok(Self {
            provider: Arc::clone(&self.provider),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            memory: self.memory.fork().await?,
            tools: self.tools.clone(),
            abilities: self.abilities.clone(),
            templates: self.templates.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            role: self.role.clone(),
            instructions: self.instructions.clone(),
            max_iterations: self.max_iterations,
            total_max_retries: self.total_max_retries,
            save_intermediate_steps: self.save_intermediate_steps,
            final_answer_as_tool: self.final_answer_as_tool,
            tool_call_checker: self.tool_call_checker,
            event_bus: Arc::clone(&self.event_bus),
        })
    }

    /// Run the agent until the final-answer ability produces a result.
    ///
    /// Fails on configuration errors, provider errors, an exhausted retry
    /// budget, the iteration cap, or cancellation.
    pub async fn run(&self, input: RunInput) -> Result<RunOutput> {
        let run_id = Uuid::new_v4();
        let span = info_span!("agent_run", %run_id, agent = %self.name);

        async move {
            let memory: Arc<dyn Memory> =
                Arc::new(UnconstrainedMemory::with_messages(self.memory.messages().await));
            let mut state = RunState::new(memory);

            match self.drive(&mut state, input).await {
                Ok(result) => Ok(RunOutput { result, state }),
                Err(e) => {
                    warn!(iteration = state.iteration, error = %e, "Agent run failed");
                    self.event_bus.publish(AgentEvent::RunFailed {
                        iteration: state.iteration,
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, state: &mut RunState, input: RunInput) -> Result<Message> {
        let cancel = input.cancel.clone().unwrap_or_default();

        let user_message = match &input.prompt {
            Some(prompt) => {
                let task = self.templates.render_task(&TaskPromptInput {
                    prompt: prompt.clone(),
                    context: input.context.clone(),
                    expected_output: input.expected_output.instructions().map(str::to_string),
                })?;
                let message = Message::user(task);
                state.memory.add(message.clone()).await?;
                Some(message)
            }
            None => None,
        };

        info!(
            prompt_len = input.prompt.as_deref().map_or(0, str::len),
            tools = self.tools.len(),
            abilities = self.abilities.len(),
            "Agent run started"
        );
        self.event_bus.publish(AgentEvent::RunStarted {
            agent: self.name.clone(),
            prompt_preview: input
                .prompt
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(80)
                .collect(),
            timestamp: Utc::now(),
        });

        let final_answer = Arc::new(FinalAnswerAbility::new(
            state.result.clone(),
            input.expected_output.clone(),
        ));
        let mut registry = AbilitiesRegistry::new(&self.tools, &self.abilities, Arc::clone(&final_answer))?;
        let mut checker = ToolCallChecker::new(self.tool_call_checker);
        let mut retries = RetryCounter::new(self.total_max_retries.max(1));
        let mut force_tool_call = self.final_answer_as_tool;

        while !state.result.is_set() {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled {
                    iteration: state.iteration,
                }
                .into());
            }

            state.iteration += 1;
            if self.max_iterations > 0 && state.iteration > self.max_iterations {
                return Err(AgentError::MaxIterations {
                    iterations: self.max_iterations,
                    last_tool: last_tool(state),
                }
                .into());
            }

            let request = prepare_request(&registry, state, force_tool_call)?;
            debug!(
                iteration = state.iteration,
                allowed_tools = ?request.allowed_names(),
                tool_choice = %request.tool_choice,
                can_stop = request.can_stop,
                "Iteration started"
            );
            self.event_bus.publish(AgentEvent::IterationStarted {
                iteration: state.iteration,
                allowed_tools: request.allowed_names(),
                tool_choice: request.tool_choice.to_string(),
                can_stop: request.can_stop,
                timestamp: Utc::now(),
            });

            let mut messages = vec![self.system_message(&request)?];
            messages.extend(state.memory.messages().await);
            let provider_request = ProviderRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: request.definitions(),
                tool_choice: request.tool_choice.clone(),
                stream: false,
            };

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(AgentError::Cancelled { iteration: state.iteration }.into());
                }
                response = self.provider.complete(provider_request) => response?,
            };

            let response_message = response.message;
            let has_text = !response_message.content.trim().is_empty();
            let mut tool_calls = response_message.tool_calls.clone();
            let mut added_ids = Vec::new();
            if !response_message.is_empty() {
                added_ids.push(response_message.id.clone());
                state.memory.add(response_message.clone()).await?;
            }

            if tool_calls.is_empty() && has_text && request.can_stop {
                state.memory.delete_many(&added_ids).await?;
                added_ids.clear();

                let Some(payload) =
                    free_text_payload(&response_message.content, final_answer.custom_schema())
                else {
                    warn!(
                        iteration = state.iteration,
                        "Free-text reply does not fit the answer schema, forcing the final-answer tool"
                    );
                    registry.update(&[], &[])?;
                    force_tool_call = true;
                    state.memory.delete_where(&|m: &Message| m.is_temporary()).await?;
                    continue;
                };

                let call = MessageToolCall::new(final_answer.name(), serde_json::to_string(&payload)?);
                let synthesized = Message::tool_calls(vec![call.clone()]);
                added_ids.push(synthesized.id.clone());
                state.memory.add(synthesized).await?;
                tool_calls.push(call);
            }

            let mut cycle_found = false;
            for call in &tool_calls {
                checker.register(call);
                if !checker.cycle_found() {
                    continue;
                }

                warn!(
                    iteration = state.iteration,
                    tool = %call.name,
                    "Repeated tool call detected, re-instructing the model"
                );
                self.event_bus.publish(AgentEvent::CycleDetected {
                    iteration: state.iteration,
                    tool_name: call.name.clone(),
                    timestamp: Utc::now(),
                });

                state.memory.delete_many(&added_ids).await?;
                let nudge = self.templates.render_cycle_detection(&CycleDetectionPromptInput {
                    tool_name: call.name.clone(),
                    tool_args: call.arguments.clone(),
                    final_answer_tool: final_answer.name().to_string(),
                })?;
                state.memory.add(Message::user(nudge)).await?;
                checker.reset();
                cycle_found = true;
                break;
            }

            if !cycle_found && !tool_calls.is_empty() {
                let snapshot = state.memory.messages().await;
                let invocations = self
                    .execute_tools(&request, &tool_calls, state.iteration, snapshot, &cancel)
                    .await?;

                for invocation in invocations {
                    self.record(state, &request, invocation, &mut retries).await?;
                }
            }

            if tool_calls.is_empty() && !has_text {
                state.memory.add(Message::placeholder()).await?;
            } else {
                state.memory.delete_where(&|m: &Message| m.is_temporary()).await?;
            }
        }

        let result = state
            .result
            .get()
            .cloned()
            .ok_or_else(|| Error::Internal("run finished without a final answer".into()))?;

        if self.save_intermediate_steps {
            self.memory.reset().await?;
            self.memory.add_many(state.memory.messages().await).await?;
        } else {
            if let Some(message) = user_message {
                self.memory.add(message).await?;
            }
            let messages = state.memory.messages().await;
            let newest = messages[messages.len().saturating_sub(2)..].to_vec();
            self.memory.add_many(newest).await?;
        }

        info!(
            iterations = state.iteration,
            steps = state.steps.len(),
            "Agent run completed"
        );
        self.event_bus.publish(AgentEvent::RunCompleted {
            iterations: state.iteration,
            steps: state.steps.len(),
            timestamp: Utc::now(),
        });
        Ok(result)
    }

    fn system_message(&self, request: &Request) -> Result<Message> {
        let final_answer = &request.final_answer;
        let catalogue = |tools: &[Arc<dyn Ability>]| -> Vec<ToolTemplateDefinition> {
            tools
                .iter()
                .map(|tool| {
                    ToolTemplateDefinition::from_ability(tool.as_ref(), !request.is_hidden(tool.name()))
                })
                .collect()
        };

        let input = SystemPromptInput {
            role: self.role.clone().unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            instructions: self.instructions.clone(),
            final_answer_tool: final_answer.name().to_string(),
            final_answer_schema: final_answer
                .custom_schema()
                .then(|| serde_json::to_string_pretty(&final_answer.input_schema()))
                .transpose()?,
            final_answer_instructions: final_answer.instructions().map(str::to_string),
            tools: catalogue(&request.regular_tools),
            abilities: catalogue(&request.abilities_tools),
            current_date: Utc::now().format("%Y-%m-%d").to_string(),
        };
        Ok(Message::system(self.templates.render_system(&input)?))
    }

    /// Execute every call concurrently. Results come back in the order
    /// they resolve; a failing call does not cancel its siblings.
    async fn execute_tools(
        &self,
        request: &Request,
        calls: &[MessageToolCall],
        iteration: u32,
        messages: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Invocation>> {
        let mut pending: FuturesUnordered<_> = calls
            .iter()
            .map(|call| {
                let ability = request.find_allowed(&call.name).cloned();
                let ctx = AbilityContext {
                    iteration,
                    call_id: call.id.clone(),
                    messages: messages.clone(),
                    cancel: cancel.child_token(),
                };
                invoke(ability, call.clone(), ctx)
            })
            .collect();

        let mut done = Vec::with_capacity(calls.len());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(AgentError::Cancelled { iteration }.into());
                }
                next = pending.next() => match next {
                    Some(invocation) => done.push(invocation),
                    None => break,
                },
            }
        }
        Ok(done)
    }

    /// Turn an invocation into a step and a tool-result message, charging
    /// the retry budget on failure.
    async fn record(
        &self,
        state: &mut RunState,
        request: &Request,
        invocation: Invocation,
        retries: &mut RetryCounter,
    ) -> Result<()> {
        let Invocation {
            call,
            tool,
            input,
            outcome,
            duration_ms,
        } = invocation;

        let (output, error) = match outcome {
            Ok(output) => (output, None),
            Err(error) => {
                let explanation = self.templates.render_tool_error(&ToolErrorPromptInput {
                    reason: error.to_string(),
                })?;
                (ToolOutput::text(explanation), Some(error))
            }
        };

        debug!(
            iteration = state.iteration,
            tool = %call.name,
            success = error.is_none(),
            duration_ms,
            "Tool call finished"
        );
        self.event_bus.publish(AgentEvent::ToolExecuted {
            iteration: state.iteration,
            tool_name: call.name.clone(),
            success: error.is_none(),
            duration_ms,
            timestamp: Utc::now(),
        });

        state
            .memory
            .add(Message::tool_result(&call.id, &call.name, output.text_content()))
            .await?;

        let ability = tool
            .as_deref()
            .filter(|name| request.ability_by_tool.contains_key(*name))
            .map(str::to_string);
        state.steps.push(Step {
            iteration: state.iteration,
            tool,
            input,
            output,
            ability,
            error: error.clone(),
        });

        if let Some(error) = error {
            retries.consume(&error, state.iteration, Some(call.name.as_str()))?;
        }
        Ok(())
    }
}

async fn invoke(ability: Option<Arc<dyn Ability>>, call: MessageToolCall, ctx: AbilityContext) -> Invocation {
    let started = Instant::now();
    let parsed = parse_arguments(&call.arguments);
    let input = parsed.clone().unwrap_or(Value::Null);

    let outcome = match (&ability, parsed) {
        (None, _) => Err(ToolError::NotFound(call.name.clone())),
        (Some(_), Err(error)) => Err(error),
        (Some(ability), Ok(input)) => match validate_arguments(&ability.input_schema(), &input) {
            Ok(()) => ability.handle(input, &ctx).await,
            Err(error) => Err(error),
        },
    };

    Invocation {
        tool: ability.map(|a| a.name().to_string()),
        call,
        input,
        outcome,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

/// Empty arguments mean "no arguments".
fn parse_arguments(raw: &str) -> std::result::Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))
}

fn last_tool(state: &RunState) -> Option<String> {
    state.last_step().and_then(|step| step.tool.clone())
}

/// Turn a plain-text reply into final-answer input.
///
/// The first balanced `{...}` in the text is used when it parses to a
/// non-empty object (for the default schema it must carry a string
/// `response`); otherwise the default schema wraps the whole text and a
/// custom schema gets nothing.
fn free_text_payload(text: &str, custom_schema: bool) -> Option<Value> {
    let extracted = find_first_pair(text, ("{", "}"))
        .and_then(|pair| parse_broken_json(pair.outer))
        .filter(|value| value.as_object().is_some_and(|object| !object.is_empty()));

    if custom_schema {
        return extracted;
    }
    match extracted {
        Some(value) if value.get("response").is_some_and(Value::is_string) => Some(value),
        _ => Some(json!({ "response": text })),
    }
}
