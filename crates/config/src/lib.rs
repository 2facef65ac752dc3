//! Configuration loading, validation, and management for stepwise.
//!
//! Loads configuration from `~/.stepwise/config.toml` with environment
//! variable overrides. Validates all settings before an agent is built.

pub mod logging;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub use logging::{LoggingConfig, init_tracing};

/// The root configuration structure.
///
/// Maps directly to `~/.stepwise/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model settings passed with every LLM request
    #[serde(default)]
    pub model: ModelConfig,

    /// Run loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Repetition detection
    #[serde(default)]
    pub tool_call_checker: ToolCallCheckerConfig,

    /// Ordering / frequency policies keyed by tool name
    #[serde(default)]
    pub tool_policies: BTreeMap<String, ToolPolicy>,

    /// Prompt template overrides
    #[serde(default)]
    pub prompts: PromptOverrides,

    /// Tracing output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_model() -> String {
    "llama3.1".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Role the system prompt asks the model to assume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Extra instructions for the system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Iteration cap per run; 0 disables the cap
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Tool failures tolerated per run before it is aborted
    #[serde(default = "default_total_max_retries")]
    pub total_max_retries: u32,

    /// Replace the agent memory with the full run transcript after a run,
    /// instead of appending only the newest exchange
    #[serde(default = "default_true")]
    pub save_intermediate_steps: bool,

    /// Always require a tool call (the final answer is a tool too)
    #[serde(default = "default_true")]
    pub final_answer_as_tool: bool,

    /// Abilities resolved by name through the ability catalogue
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abilities: Vec<String>,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_total_max_retries() -> u32 {
    20
}
fn default_true() -> bool {
    true
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            role: None,
            instructions: None,
            max_iterations: default_max_iterations(),
            total_max_retries: default_total_max_retries(),
            save_intermediate_steps: true,
            final_answer_as_tool: true,
            abilities: Vec::new(),
        }
    }
}

/// Thresholds for detecting a model that keeps issuing the same tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallCheckerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Identical calls tolerated in a row
    #[serde(default = "default_max_strike_length")]
    pub max_strike_length: usize,

    /// Identical calls tolerated within the window
    #[serde(default = "default_max_total_occurrences")]
    pub max_total_occurrences: usize,

    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_max_strike_length() -> usize {
    2
}
fn default_max_total_occurrences() -> usize {
    5
}
fn default_window_size() -> usize {
    10
}

impl Default for ToolCallCheckerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_strike_length: default_max_strike_length(),
            max_total_occurrences: default_max_total_occurrences(),
            window_size: default_window_size(),
        }
    }
}

impl ToolCallCheckerConfig {
    /// A checker that never flags anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// When and how often a tool may be used during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPolicy {
    /// Not allowed once any of these has been invoked
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub only_before: Vec<String>,

    /// Not allowed until all of these have been invoked
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub only_after: Vec<String>,

    /// Forced right after any of these
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub force_after: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_invocations: Option<usize>,

    /// Must be invoked at least once before the run may finish
    #[serde(default)]
    pub required: bool,

    /// Forced when exactly this many steps have been taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_at_step: Option<usize>,

    /// Count only successful invocations for ordering and caps
    #[serde(default = "default_true")]
    pub only_success_invocations: bool,

    #[serde(default = "default_true")]
    pub can_be_used_in_row: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            only_before: Vec::new(),
            only_after: Vec::new(),
            force_after: Vec::new(),
            max_invocations: None,
            required: false,
            force_at_step: None,
            only_success_invocations: true,
            can_be_used_in_row: true,
            priority: None,
        }
    }
}

impl ToolPolicy {
    /// `only_before` and `only_after` must be disjoint.
    pub fn validate(&self, tool: &str) -> Result<(), ConfigError> {
        let before: HashSet<&str> = self.only_before.iter().map(String::as_str).collect();
        let mut overlap: Vec<&str> = self
            .only_after
            .iter()
            .map(String::as_str)
            .filter(|name| before.contains(name))
            .collect();
        if overlap.is_empty() {
            return Ok(());
        }
        overlap.sort_unstable();
        overlap.dedup();
        Err(ConfigError::ValidationError(format!(
            "tool policy for '{tool}': {} listed in both only_before and only_after",
            overlap.join(", ")
        )))
    }
}

/// Replacement sources for the four prompt templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_detection: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default location, applying env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&path)?;

        if let Ok(model) = std::env::var("STEPWISE_MODEL") {
            config.model.name = model;
        }

        if let Ok(raw) = std::env::var("STEPWISE_MAX_ITERATIONS") {
            config.agent.max_iterations = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "STEPWISE_MAX_ITERATIONS must be a non-negative integer, got '{raw}'"
                ))
            })?;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let checker = &self.tool_call_checker;
        if checker.max_strike_length == 0
            || checker.max_total_occurrences == 0
            || checker.window_size == 0
        {
            return Err(ConfigError::ValidationError(
                "tool_call_checker thresholds must be at least 1".into(),
            ));
        }

        for (tool, policy) in &self.tool_policies {
            policy.validate(tool)?;
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
