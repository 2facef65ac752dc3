//! Prompt templates rendered with minijinja.

use minijinja::Environment;
use serde::Serialize;
use stepwise_config::PromptOverrides;
use stepwise_core::error::{Error, Result};

use crate::ability::Ability;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const TOOL_ERROR_TEMPLATE: &str = include_str!("prompts/tool_error.md");
const CYCLE_DETECTION_TEMPLATE: &str = include_str!("prompts/cycle_detection.md");

pub const DEFAULT_ROLE: &str = "a helpful AI assistant";

/// One entry of the tool catalogue in the system prompt.
#[derive(Debug, Clone, Serialize)]
pub struct ToolTemplateDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: String,
    pub enabled: bool,
}

impl ToolTemplateDefinition {
    pub fn from_ability(ability: &dyn Ability, enabled: bool) -> Self {
        Self {
            name: ability.name().to_string(),
            description: ability.description().to_string(),
            input_schema: serde_json::to_string_pretty(&ability.input_schema()).unwrap_or_default(),
            enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemPromptInput {
    pub role: String,
    pub instructions: Option<String>,
    pub final_answer_tool: String,
    pub final_answer_schema: Option<String>,
    pub final_answer_instructions: Option<String>,
    pub tools: Vec<ToolTemplateDefinition>,
    pub abilities: Vec<ToolTemplateDefinition>,
    pub current_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskPromptInput {
    pub prompt: String,
    pub context: Option<String>,
    pub expected_output: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolErrorPromptInput {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleDetectionPromptInput {
    pub tool_name: String,
    pub tool_args: String,
    pub final_answer_tool: String,
}

/// The four templates an agent renders, with any configured overrides.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    env: Environment<'static>,
    system: String,
    task: String,
    tool_error: String,
    cycle_detection: String,
}

impl PromptTemplates {
    /// Built-in templates, replaced where `overrides` provides a source.
    /// Every template is compiled up front so syntax errors surface here.
    pub fn new(overrides: &PromptOverrides) -> Result<Self> {
        let pick = |custom: &Option<String>, builtin: &str| {
            custom.clone().unwrap_or_else(|| builtin.to_string())
        };
        let templates = Self {
            system: pick(&overrides.system, SYSTEM_TEMPLATE),
            task: pick(&overrides.task, TASK_TEMPLATE),
            tool_error: pick(&overrides.tool_error, TOOL_ERROR_TEMPLATE),
            cycle_detection: pick(&overrides.cycle_detection, CYCLE_DETECTION_TEMPLATE),
            env: environment(),
        };

        for (name, source) in templates.sources() {
            templates
                .env
                .template_from_str(source)
                .map_err(|e| Error::config(format!("Invalid {name} template: {e}")))?;
        }
        Ok(templates)
    }

    fn sources(&self) -> [(&'static str, &str); 4] {
        [
            ("system", self.system.as_str()),
            ("task", self.task.as_str()),
            ("tool_error", self.tool_error.as_str()),
            ("cycle_detection", self.cycle_detection.as_str()),
        ]
    }

    fn render<S: Serialize>(&self, name: &str, source: &str, input: &S) -> Result<String> {
        self.env
            .render_str(source, input)
            .map(|text| text.trim().to_string())
            .map_err(|e| Error::config(format!("Failed to render {name} template: {e}")))
    }

    pub fn render_system(&self, input: &SystemPromptInput) -> Result<String> {
        self.render("system", &self.system, input)
    }

    pub fn render_task(&self, input: &TaskPromptInput) -> Result<String> {
        self.render("task", &self.task, input)
    }

    pub fn render_tool_error(&self, input: &ToolErrorPromptInput) -> Result<String> {
        self.render("tool_error", &self.tool_error, input)
    }

    pub fn render_cycle_detection(&self, input: &CycleDetectionPromptInput) -> Result<String> {
        self.render("cycle_detection", &self.cycle_detection, input)
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            env: environment(),
            system: SYSTEM_TEMPLATE.to_string(),
            task: TASK_TEMPLATE.to_string(),
            tool_error: TOOL_ERROR_TEMPLATE.to_string(),
            cycle_detection: CYCLE_DETECTION_TEMPLATE.to_string(),
        }
    }
}
