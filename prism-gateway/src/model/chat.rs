//! Text-chat adapter for the router's OpenAI-compatible completion endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, AdapterError, Capability, ChatInvocation, ModelAdapter};
use crate::history::ChatMessage;

/// Chat-completion adapter. Sends the formatted history unchanged and
/// extracts the first candidate's content as the reply.
pub struct TextChatAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl TextChatAdapter {
    /// Create a new adapter against the given router base URL.
    pub fn new(token: Option<&str>, base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(token),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ModelAdapter for TextChatAdapter {
    fn name(&self) -> &str {
        "chat-completion"
    }

    fn capability(&self) -> Capability {
        Capability::Chat
    }

    async fn send_chat(&self, invocation: ChatInvocation) -> Result<String, AdapterError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = ChatCompletionRequest {
            model: &invocation.model,
            messages: &invocation.messages,
            max_tokens: invocation.max_tokens,
            temperature: invocation.temperature,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AdapterError::unavailable(&invocation.model, format!("request failed: {}", e), None)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::unavailable(
                &invocation.model,
                format!("API error: {}", body),
                Some(status.as_u16()),
            ));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            AdapterError::response(&invocation.model, format!("failed to parse response: {}", e))
        })?;

        extract_reply(&invocation.model, completion)
    }
}

/// Pull the first candidate's content out of a completion response.
/// An empty candidate list is a backend contract violation, not an empty reply.
pub(super) fn extract_reply(
    model: &str,
    completion: ChatCompletionResponse,
) -> Result<String, AdapterError> {
    completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| AdapterError::response(model, "response contained no choices"))
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatCompletionResponse {
    pub(super) choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Choice {
    pub(super) message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(super) struct ResponseMessage {
    pub(super) content: String,
}
