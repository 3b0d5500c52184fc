//! Image-generation adapter: a raw prompt in, binary image bytes out.
//!
//! This path carries no conversation: there is no history to format and
//! nothing is ever recorded for it.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use super::{http_client, AdapterError, Capability, ImageArtifact, ModelAdapter};

/// Text-to-image adapter against the router's model inference endpoint.
pub struct ImageGenerationAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl ImageGenerationAdapter {
    /// Create a new adapter against the given router base URL.
    pub fn new(token: Option<&str>, base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(token),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ModelAdapter for ImageGenerationAdapter {
    fn name(&self) -> &str {
        "text-to-image"
    }

    fn capability(&self) -> Capability {
        Capability::ImageGeneration
    }

    async fn generate_image(&self, model: &str, prompt: &str) -> Result<ImageArtifact, AdapterError> {
        let url = format!("{}/hf-inference/models/{}", self.base_url, model);

        let response = self
            .client
            .post(&url)
            .json(&TextToImageRequest { inputs: prompt })
            .send()
            .await
            .map_err(|e| AdapterError::unavailable(model, format!("request failed: {}", e), None))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::unavailable(
                model,
                format!("API error: {}", body),
                Some(status.as_u16()),
            ));
        }

        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();

        if media_type.starts_with("application/json") {
            return Err(AdapterError::response(
                model,
                "expected image bytes, got a JSON body",
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AdapterError::unavailable(model, format!("body read failed: {}", e), None))?;

        if bytes.is_empty() {
            return Err(AdapterError::response(model, "empty image payload"));
        }

        Ok(ImageArtifact {
            bytes: bytes.to_vec(),
            media_type,
        })
    }
}

#[derive(Debug, Serialize)]
struct TextToImageRequest<'a> {
    inputs: &'a str,
}
