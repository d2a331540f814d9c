//! OpenAI-compatible `/v1/images/generations` provider.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use super::{ImageProvider, ImageRequest, ProviderError, ProviderErrorKind, ProviderSettings};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-image-1";
pub const DEFAULT_SIZE: &str = "1024x1536";

pub struct OpenAiImageProvider {
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    size: String,
    quality: Option<String>,
    http: reqwest::Client,
}

impl OpenAiImageProvider {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            size: DEFAULT_SIZE.to_string(),
            quality: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_settings(name: &str, settings: &ProviderSettings) -> Self {
        let mut provider = Self::new(name, settings.api_key.clone().unwrap_or_default());
        if let Some(base_url) = settings.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
            provider.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(model) = settings.model.as_deref().filter(|m| !m.trim().is_empty()) {
            provider.model = model.to_string();
        }
        if let Some(size) = settings.extra_str("size") {
            provider.size = size.to_string();
        }
        provider.quality = settings.extra_str("quality").map(str::to_string);
        provider
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches("/v1");
        format!("{}/v1/images/generations", base)
    }

    fn build_body(&self, request: &ImageRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "n": 1,
            "size": self.size,
            "response_format": "b64_json",
        });
        if let Some(quality) = &self.quality {
            body["quality"] = json!(quality);
        }
        body
    }
}

pub(crate) fn extract_image(payload: &Value) -> Result<Vec<u8>, ProviderError> {
    let encoded = payload
        .pointer("/data/0/b64_json")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::InvalidResponse,
                "response contained no b64_json image",
            )
        })?;
    BASE64.decode(encoded.as_bytes()).map_err(|e| {
        ProviderError::new(
            ProviderErrorKind::InvalidResponse,
            format!("image data is not valid base64: {}", e),
        )
    })
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<Vec<u8>, ProviderError> {
        if !request.reference_images.is_empty() {
            debug!(
                provider = %self.name,
                references = request.reference_images.len(),
                "Generations endpoint takes no reference images, sending prompt only"
            );
        }

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.build_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let payload: Value = response.json().await?;
        extract_image(&payload)
    }
}
