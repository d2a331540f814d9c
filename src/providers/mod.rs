//! Provider gateway for generative image backends.
//!
//! Every backend implements [`ImageProvider`]: one prompt plus optional
//! reference images in, raw image bytes or a typed [`ProviderError`] out.
//! Providers never retry on their own; a failed call is final for that
//! attempt and the orchestrator records it against the page.

mod config;
mod configured;
mod gemini;
mod openai;

pub use config::{
    mask_api_key, MaskedProviderSettings, MaskedProviders, ProviderConfigStore,
    ProviderConfigUpdate, ProviderKind, ProviderSettings, ProvidersDocument,
    DEFAULT_ACTIVE_PROVIDER,
};
pub use configured::{build_provider, ConfiguredProvider};
pub use gemini::GeminiProvider;
pub use openai::OpenAiImageProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single image generation request.
#[derive(Debug, Clone, Default)]
pub struct ImageRequest {
    /// Fully assembled prompt text.
    pub prompt: String,
    /// Reference images in priority order (raw encoded bytes).
    pub reference_images: Vec<Vec<u8>>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_images: Vec::new(),
        }
    }

    pub fn with_references(mut self, references: Vec<Vec<u8>>) -> Self {
        self.reference_images = references;
        self
    }
}

/// Category of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Quota exhausted or too many requests.
    RateLimited,
    /// API key rejected.
    InvalidCredentials,
    /// Prompt or output rejected by the provider's safety filters.
    ContentPolicy,
    /// Connection could not be established or was reset.
    Transport,
    /// The call did not finish in time.
    Timeout,
    /// The provider answered but the body held no usable image.
    InvalidResponse,
    /// Anything else.
    Other,
}

impl ProviderErrorKind {
    /// Stable reason code exposed to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::InvalidCredentials => "invalid_credentials",
            ProviderErrorKind::ContentPolicy => "content_policy",
            ProviderErrorKind::Transport => "transport",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::InvalidResponse => "invalid_response",
            ProviderErrorKind::Other => "provider_error",
        }
    }

    /// Whether retrying the same page later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderErrorKind::InvalidCredentials)
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A failed generation attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn reason(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Classify a non-success HTTP answer from a provider.
    pub fn from_status(status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(300).collect();
        let message = format!("HTTP {}: {}", status, snippet.trim());
        let kind = match status {
            401 | 403 => ProviderErrorKind::InvalidCredentials,
            429 => ProviderErrorKind::RateLimited,
            400 if looks_like_policy_rejection(body) => ProviderErrorKind::ContentPolicy,
            408 | 504 => ProviderErrorKind::Timeout,
            _ => ProviderErrorKind::Other,
        };
        Self::new(kind, message)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_connect() || err.is_request() {
            ProviderErrorKind::Transport
        } else if err.is_decode() {
            ProviderErrorKind::InvalidResponse
        } else {
            ProviderErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

fn looks_like_policy_rejection(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["safety", "policy", "blocked", "prohibited"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Uniform call interface to an image generation backend.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_image(&self, request: &ImageRequest) -> Result<Vec<u8>, ProviderError>;
}
