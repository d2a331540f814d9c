//! Google Generative Language (`generateContent`) image provider.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use super::{ImageProvider, ImageRequest, ProviderError, ProviderErrorKind, ProviderSettings};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

const BLOCKING_FINISH_REASONS: [&str; 5] = [
    "SAFETY",
    "PROHIBITED_CONTENT",
    "IMAGE_SAFETY",
    "BLOCKLIST",
    "RECITATION",
];

pub struct GeminiProvider {
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    aspect_ratio: Option<String>,
    http: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            aspect_ratio: None,
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
        provider.aspect_ratio = settings.extra_str("aspect_ratio").map(str::to_string);
        provider
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        format!("{}/v1beta/{}:generateContent", self.base_url, model_path)
    }

    fn build_body(&self, request: &ImageRequest) -> Value {
        let mut parts: Vec<Value> = request
            .reference_images
            .iter()
            .map(|bytes| {
                json!({
                    "inlineData": {
                        "mimeType": sniff_mime(bytes),
                        "data": BASE64.encode(bytes),
                    }
                })
            })
            .collect();
        parts.push(json!({ "text": request.prompt }));

        let mut generation_config = json!({ "responseModalities": ["IMAGE"] });
        if let Some(ratio) = &self.aspect_ratio {
            generation_config["imageConfig"] = json!({ "aspectRatio": ratio });
        }

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
        })
    }
}

/// First inline image of a `generateContent` response.
pub(crate) fn extract_image(payload: &Value) -> Result<Vec<u8>, ProviderError> {
    if let Some(reason) = payload
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(ProviderError::new(
            ProviderErrorKind::ContentPolicy,
            format!("prompt blocked: {}", reason),
        ));
    }

    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for candidate in candidates {
        let parts = candidate
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            let data = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(|inline| inline.get("data"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            return BASE64.decode(data.as_bytes()).map_err(|e| {
                ProviderError::new(
                    ProviderErrorKind::InvalidResponse,
                    format!("image data is not valid base64: {}", e),
                )
            });
        }
    }

    let finish_reason = candidates
        .iter()
        .filter_map(|c| c.get("finishReason").and_then(Value::as_str))
        .next();
    match finish_reason {
        Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason) => Err(ProviderError::new(
            ProviderErrorKind::ContentPolicy,
            format!("generation stopped: {}", reason),
        )),
        _ => Err(ProviderError::new(
            ProviderErrorKind::InvalidResponse,
            "response contained no image",
        )),
    }
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP") {
        "image/webp"
    } else {
        "image/png"
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<Vec<u8>, ProviderError> {
        let endpoint = self.endpoint();
        debug!(
            provider = %self.name,
            model = %self.model,
            references = request.reference_images.len(),
            "Calling generateContent"
        );

        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
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
