//! Error types for the stepwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all stepwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Agent run errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures reported by [`crate::provider::Provider`] implementations.
///
/// The runtime treats every variant as fatal for the run; the variants
/// exist so backends can report transport and quota problems distinctly.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Recoverable tool failures.
///
/// These never abort a run by themselves: the loop records them on the
/// step, explains them to the model, and charges the retry budget.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool '{0}' does not exist")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    /// Name of the tool the error is about, when known.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::NotFound(name) => Some(name),
            Self::ExecutionFailed { tool_name, .. } => Some(tool_name),
            Self::InvalidArguments(_) => None,
        }
    }
}

/// Fatal run failures. `Clone` so a sticky failure can be re-raised.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Agent was not able to resolve the task in {iterations} iterations (last tool: {})", .last_tool.as_deref().unwrap_or("none"))]
    MaxIterations {
        iterations: u32,
        last_tool: Option<String>,
    },

    #[error("Maximal amount of global retries ({max_retries}) has been reached at iteration {iteration} (last tool: {})", .last_tool.as_deref().unwrap_or("none"))]
    RetriesExhausted {
        max_retries: u32,
        iteration: u32,
        last_tool: Option<String>,
        #[source]
        cause: ToolError,
    },

    #[error("Agent run was cancelled at iteration {iteration}")]
    Cancelled { iteration: u32 },
}
