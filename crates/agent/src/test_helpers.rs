//! Shared test helpers for agent tests.

use std::sync::Mutex;

use serde_json::json;
use stepwise_core::error::ProviderError;
use stepwise_core::message::{Message, MessageToolCall};
use stepwise_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

/// A mock provider that replays scripted replies and records every request.
///
/// Running past the script is reported as a provider error.
pub struct ScriptedProvider {
    replies: Mutex<Vec<Message>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(ProviderError::ApiError {
                status_code: 500,
                message: format!("no scripted reply for call #{call}"),
            });
        }

        Ok(ProviderResponse {
            message: replies.remove(0),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        })
    }
}

/// A plain text reply.
pub fn text_reply(text: &str) -> Message {
    Message::assistant(text)
}

/// A reply calling the final-answer tool.
pub fn final_answer_call(text: &str) -> Message {
    Message::tool_calls(vec![MessageToolCall::new(
        "final_answer",
        json!({ "response": text }).to_string(),
    )])
}
