//! Vision-chat adapter: chat completions with an optional image attached
//! to the latest user turn as an OpenAI-style content-part list.

use async_trait::async_trait;
use serde::Serialize;

use super::chat::{extract_reply, ChatCompletionResponse};
use super::{http_client, AdapterError, Capability, ChatInvocation, ModelAdapter};
use crate::history::ChatMessage;
use crate::store::Role;

/// Chat-completion adapter for vision-capable models. Without an image it
/// behaves exactly like [`super::TextChatAdapter`].
pub struct VisionChatAdapter {
    client: reqwest::Client,
    base_url: String,
    /// Router provider segment (e.g. "hyperbolic"). None uses default routing.
    provider: Option<String>,
}

impl VisionChatAdapter {
    /// Create a new adapter against the given router base URL.
    pub fn new(token: Option<&str>, base_url: impl Into<String>, provider: Option<&str>) -> Self {
        Self {
            client: http_client(token),
            base_url: base_url.into(),
            provider: provider.map(String::from),
        }
    }

    fn endpoint(&self) -> String {
        match &self.provider {
            Some(provider) => format!("{}/{}/v1/chat/completions", self.base_url, provider),
            None => format!("{}/v1/chat/completions", self.base_url),
        }
    }
}

#[async_trait]
impl ModelAdapter for VisionChatAdapter {
    fn name(&self) -> &str {
        "vision-chat"
    }

    fn capability(&self) -> Capability {
        Capability::VisionChat
    }

    async fn send_chat(&self, invocation: ChatInvocation) -> Result<String, AdapterError> {
        let url = self.endpoint();

        let request = VisionCompletionRequest {
            model: &invocation.model,
            messages: build_messages(invocation.messages, invocation.image),
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

/// Convert the generic history into vision wire messages, attaching the
/// image (if any) to the latest user turn.
fn build_messages(messages: Vec<ChatMessage>, image: Option<String>) -> Vec<VisionMessage> {
    let mut wire: Vec<VisionMessage> = messages
        .into_iter()
        .map(|m| VisionMessage {
            role: m.role,
            content: VisionContent::Text(m.content),
        })
        .collect();

    if let Some(url) = image {
        if let Some(turn) = wire.iter_mut().rev().find(|m| m.role == Role::User) {
            let text = match &turn.content {
                VisionContent::Text(text) => text.clone(),
                VisionContent::Parts(_) => String::new(),
            };
            turn.content = VisionContent::Parts(vec![
                ContentPart::Text { text },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url },
                },
            ]);
        }
    }

    wire
}

#[derive(Debug, Serialize)]
struct VisionCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<VisionMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct VisionMessage {
    role: Role,
    content: VisionContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum VisionContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}
