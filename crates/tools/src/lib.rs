//! Built-in tools for stepwise agents.
//!
//! Both tools are deterministic stubs: they answer from canned data so the
//! run loop can be exercised end-to-end without network access.

pub mod weather_lookup;
pub mod web_search;

use std::sync::Arc;
use stepwise_core::tool::Tool;

pub use weather_lookup::WeatherLookupTool;
pub use web_search::WebSearchTool;

/// Every built-in tool, ready to hand to an agent.
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(WebSearchTool::new()), Arc::new(WeatherLookupTool)]
}
