//! Per-iteration request resolution.
//!
//! Every iteration asks each ability how it may be used and turns the
//! answers into the tool list sent to the model, the tool-choice
//! directive, and whether the run may stop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use stepwise_core::error::{Error, Result};
use stepwise_core::provider::{ToolChoice, ToolDefinition};

use crate::ability::{Ability, FinalAnswerAbility};
use crate::registry::AbilitiesRegistry;
use crate::state::RunState;

/// The resolved request for one iteration. Never persisted.
pub struct Request {
    pub allowed_tools: Vec<Arc<dyn Ability>>,
    pub regular_tools: Vec<Arc<dyn Ability>>,
    pub abilities_tools: Vec<Arc<dyn Ability>>,
    pub ability_by_tool: HashMap<String, Arc<dyn Ability>>,
    pub tool_choice: ToolChoice,
    pub final_answer: Arc<FinalAnswerAbility>,
    pub hidden_tools: Vec<String>,
    pub can_stop: bool,
}

impl Request {
    pub fn allowed_names(&self) -> Vec<String> {
        self.allowed_tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn find_allowed(&self, name: &str) -> Option<&Arc<dyn Ability>> {
        self.allowed_tools.iter().find(|t| t.name() == name)
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden_tools.iter().any(|hidden| hidden == name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.allowed_tools.iter().map(|t| t.to_definition()).collect()
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("allowed_tools", &self.allowed_names())
            .field("tool_choice", &self.tool_choice)
            .field("hidden_tools", &self.hidden_tools)
            .field("can_stop", &self.can_stop)
            .finish()
    }
}

/// Resolve which tools the model may use this iteration.
///
/// `force_tool_call` demands a tool call even when nothing is forced.
pub fn prepare_request(
    registry: &AbilitiesRegistry,
    state: &RunState,
    force_tool_call: bool,
) -> Result<Request> {
    let regular_tools = registry.tools().to_vec();
    let mut allowed_tools = regular_tools.clone();
    let mut abilities_tools = Vec::new();
    let mut ability_by_tool = HashMap::new();
    let mut hidden_tools = Vec::new();
    let mut forced_names: HashSet<String> = HashSet::new();
    let mut forced: Option<Arc<dyn Ability>> = None;
    let mut prevent_stop = false;

    for ability in registry.abilities() {
        let status = ability.check(state);
        let name = ability.name().to_string();

        if status.forced && !status.allowed {
            return Err(Error::config(format!(
                "Ability '{name}' must be used at step {} but its preconditions are not met",
                state.steps.len()
            )));
        }

        if status.forced {
            // Only candidates forced earlier in this pass survive.
            allowed_tools.retain(|tool| forced_names.contains(tool.name()));
            forced_names.insert(name.clone());
        }

        if status.hidden {
            hidden_tools.push(name.clone());
        }

        abilities_tools.push(Arc::clone(ability));
        ability_by_tool.insert(name, Arc::clone(ability));
        prevent_stop |= status.prevent_stop;

        if !status.allowed {
            continue;
        }

        allowed_tools.push(Arc::clone(ability));
        if status.forced && forced.as_ref().is_none_or(|f| ability.priority() > f.priority()) {
            forced = Some(Arc::clone(ability));
        }
    }

    if prevent_stop {
        let final_name = registry.final_answer().name();
        allowed_tools.retain(|tool| tool.name() != final_name);
    }

    if allowed_tools.is_empty() {
        return Err(Error::config(
            "No tool can be used in this step: every ability disallowed itself and the final answer is withheld",
        ));
    }

    if allowed_tools.len() == 1 {
        forced = Some(Arc::clone(&allowed_tools[0]));
    }

    let mut seen = HashSet::new();
    for tool in &allowed_tools {
        if !seen.insert(tool.name()) {
            return Err(Error::config(format!("Duplicate tool name '{}'", tool.name())));
        }
    }

    let forced = forced.filter(|f| seen.contains(f.name()));
    let tool_choice = match forced {
        Some(tool) => ToolChoice::Tool(tool.name().to_string()),
        None if force_tool_call || prevent_stop => ToolChoice::Required,
        None => ToolChoice::Auto,
    };

    Ok(Request {
        allowed_tools,
        regular_tools,
        abilities_tools,
        ability_by_tool,
        tool_choice,
        final_answer: Arc::clone(registry.final_answer()),
        hidden_tools,
        can_stop: !prevent_stop,
    })
}
