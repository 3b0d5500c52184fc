//! Multi-model adapter abstraction over the Hugging Face Inference router.
//!
//! Each backend request/response shape is encoded as one adapter
//! implementing the same capability set; new backends are added by
//! registering another adapter, not by branching at call sites.

mod chat;
mod image;
mod vision;

pub use chat::TextChatAdapter;
pub use image::ImageGenerationAdapter;
pub use vision::VisionChatAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::history::ChatMessage;

/// What a registered model can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Text-only conversation.
    Chat,
    /// Conversation with an optional image on the latest user turn.
    VisionChat,
    /// Prompt in, binary image out. No conversation state.
    ImageGeneration,
}

/// A chat invocation: the formatted history plus the model's fixed options.
#[derive(Debug, Clone)]
pub struct ChatInvocation {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Data-URI image to attach to the latest user turn (vision models only).
    pub image: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

/// Binary artifact produced by an image-generation backend.
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// Error from a model backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// The call could not be completed: transport failure, timeout, or a
    /// non-success status from the inference provider.
    #[error("[{model}] backend unavailable: {message}")]
    Unavailable {
        model: String,
        message: String,
        status_code: Option<u16>,
    },

    /// The call succeeded but the payload violated the expected shape.
    #[error("[{model}] unexpected backend response: {message}")]
    Response { model: String, message: String },
}

impl AdapterError {
    pub fn unavailable(
        model: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Unavailable {
            model: model.into(),
            message: message.into(),
            status_code,
        }
    }

    pub fn response(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Response {
            model: model.into(),
            message: message.into(),
        }
    }
}

/// Unified interface over heterogeneous inference backends.
///
/// Adapters implement the capability their backend shape supports; the
/// unimplemented half of the set reports a contract violation so a
/// misregistered model fails loudly instead of silently.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// The capability this adapter provides.
    fn capability(&self) -> Capability;

    /// Send a formatted history and return the extracted reply text.
    async fn send_chat(&self, invocation: ChatInvocation) -> Result<String, AdapterError> {
        Err(AdapterError::response(
            invocation.model,
            format!("{} does not handle chat requests", self.name()),
        ))
    }

    /// Turn a raw prompt into a binary image artifact.
    async fn generate_image(&self, model: &str, prompt: &str) -> Result<ImageArtifact, AdapterError> {
        let _ = prompt;
        Err(AdapterError::response(
            model,
            format!("{} does not generate images", self.name()),
        ))
    }
}

/// Fixed invocation settings for one registered model.
#[derive(Debug, Clone)]
pub struct ModelProfile {
    /// Selector the HTTP layer and dispatcher address the model by.
    pub selector: String,
    /// Backend model identifier.
    pub model: String,
    /// System prompt prepended at history-formatting time. Unused by
    /// image-generation models.
    pub system_prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

/// A model profile bound to the adapter that serves it.
pub struct RegisteredModel {
    pub profile: ModelProfile,
    pub adapter: Arc<dyn ModelAdapter>,
}

/// Registry of models addressable by selector.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, RegisteredModel>,
}

impl ModelRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model under its profile's selector.
    pub fn register(&mut self, profile: ModelProfile, adapter: Arc<dyn ModelAdapter>) {
        self.models
            .insert(profile.selector.clone(), RegisteredModel { profile, adapter });
    }

    /// Look up a model by selector.
    pub fn get(&self, selector: &str) -> Option<&RegisteredModel> {
        self.models.get(selector)
    }

    /// Whether a selector is registered.
    pub fn contains(&self, selector: &str) -> bool {
        self.models.contains_key(selector)
    }

    /// All registered selectors.
    pub fn selectors(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }
}

/// Build the default model registry over the configured inference router.
pub fn create_registry(config: &prism_common::Config) -> ModelRegistry {
    let token = config.hf_token();
    let base_url = &config.gateway.inference_url;

    let chat = Arc::new(TextChatAdapter::new(token, base_url));
    let vision = Arc::new(VisionChatAdapter::new(token, base_url, Some("hyperbolic")));
    let image = Arc::new(ImageGenerationAdapter::new(token, base_url));

    let mut registry = ModelRegistry::new();
    registry.register(
        ModelProfile {
            selector: "chat".into(),
            model: "meta-llama/Llama-3.1-8B-Instruct".into(),
            system_prompt: "You are a helpful assistant.".into(),
            max_tokens: Some(500),
            temperature: None,
        },
        chat.clone(),
    );
    registry.register(
        ModelProfile {
            selector: "qwen".into(),
            model: "Qwen/Qwen2.5-VL-7B-Instruct".into(),
            system_prompt: "You are a helpful assistant.".into(),
            max_tokens: None,
            temperature: None,
        },
        vision,
    );
    registry.register(
        ModelProfile {
            selector: "gemma".into(),
            model: "google/gemma-2-9b-it".into(),
            system_prompt: "You are a helpful AI assistant.".into(),
            max_tokens: Some(1000),
            temperature: Some(0.7),
        },
        chat,
    );
    registry.register(
        ModelProfile {
            selector: "image".into(),
            model: "stabilityai/stable-diffusion-xl-base-1.0".into(),
            system_prompt: String::new(),
            max_tokens: None,
            temperature: None,
        },
        image,
    );
    registry
}

/// Build the outbound HTTP client the adapters share the shape of.
pub(crate) fn http_client(token: Option<&str>) -> reqwest::Client {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(token) = token {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            headers.insert(AUTHORIZATION, value);
        }
    }

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
