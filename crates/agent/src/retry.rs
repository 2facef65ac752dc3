//! Run-wide budget for tool failures.

use stepwise_core::error::{AgentError, ToolError};
use tracing::warn;

/// Shared failure budget. Once exhausted it stays exhausted: every later
/// use returns the same terminal error.
#[derive(Debug, Clone)]
pub struct RetryCounter {
    max_retries: u32,
    remaining: i64,
    exhausted: Option<AgentError>,
}

impl RetryCounter {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            remaining: i64::from(max_retries),
            exhausted: None,
        }
    }

    pub fn remaining(&self) -> u32 {
        u32::try_from(self.remaining.max(0)).unwrap_or(u32::MAX)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.is_some()
    }

    /// Charge one failure against the budget.
    pub fn consume(
        &mut self,
        error: &ToolError,
        iteration: u32,
        last_tool: Option<&str>,
    ) -> Result<(), AgentError> {
        if let Some(terminal) = &self.exhausted {
            return Err(terminal.clone());
        }

        self.remaining -= 1;
        if self.remaining >= 0 {
            return Ok(());
        }

        warn!(
            max_retries = self.max_retries,
            iteration,
            error = %error,
            "Retry budget exhausted"
        );
        let terminal = AgentError::RetriesExhausted {
            max_retries: self.max_retries,
            iteration,
            last_tool: last_tool.map(str::to_string),
            cause: error.clone(),
        };
        self.exhausted = Some(terminal.clone());
        Err(terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(reason: &str) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: reason.into(),
        }
    }

    #[test]
    fn budget_allows_max_retries() {
        let mut counter = RetryCounter::new(2);
        assert!(counter.consume(&failure("1"), 1, None).is_ok());
        assert!(counter.consume(&failure("2"), 2, None).is_ok());
        assert_eq!(counter.remaining(), 0);

        let err = counter.consume(&failure("3"), 3, Some("web_search")).unwrap_err();
        assert!(matches!(err, AgentError::RetriesExhausted { iteration: 3, .. }));
        assert!(counter.is_exhausted());
    }

    #[test]
    fn exhaustion_is_sticky() {
        let mut counter = RetryCounter::new(0);
        let first = counter.consume(&failure("original"), 1, Some("web_search")).unwrap_err();
        let second = counter
            .consume(&ToolError::InvalidArguments("other".into()), 5, None)
            .unwrap_err();

        assert_eq!(first.to_string(), second.to_string());
        match second {
            AgentError::RetriesExhausted { cause, iteration, .. } => {
                assert_eq!(iteration, 1);
                assert!(cause.to_string().contains("original"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
