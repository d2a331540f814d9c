//! Provider that follows the active entry of the providers file.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    GeminiProvider, ImageProvider, ImageRequest, OpenAiImageProvider, ProviderConfigStore,
    ProviderError, ProviderErrorKind, ProviderKind, ProviderSettings,
};
use crate::Error;

/// Build a concrete client for one provider entry.
pub fn build_provider(name: &str, settings: &ProviderSettings) -> Arc<dyn ImageProvider> {
    match settings.kind {
        ProviderKind::GoogleGenai => Arc::new(GeminiProvider::from_settings(name, settings)),
        ProviderKind::ImageApi => Arc::new(OpenAiImageProvider::from_settings(name, settings)),
    }
}

/// Resolves the active provider lazily and keeps the built client until
/// [`ConfiguredProvider::reset`] is called.
pub struct ConfiguredProvider {
    config: Arc<ProviderConfigStore>,
    current: RwLock<Option<Arc<dyn ImageProvider>>>,
}

impl ConfiguredProvider {
    pub fn new(config: Arc<ProviderConfigStore>) -> Self {
        Self {
            config,
            current: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Arc<ProviderConfigStore> {
        &self.config
    }

    /// Forget the built client; the next call resolves the config again.
    pub fn reset(&self) {
        debug!("Dropping cached image provider");
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn resolve(&self) -> Result<Arc<dyn ImageProvider>, ProviderError> {
        if let Some(provider) = self
            .current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            return Ok(Arc::clone(provider));
        }

        let (name, settings) = self.config.provider_settings(None).map_err(config_error)?;
        info!(provider = %name, kind = ?settings.kind, "Using image provider");
        let provider = build_provider(&name, &settings);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&provider));
        Ok(provider)
    }
}

fn config_error(err: Error) -> ProviderError {
    let kind = match err {
        Error::MissingApiKey(_) => ProviderErrorKind::InvalidCredentials,
        _ => ProviderErrorKind::Other,
    };
    ProviderError::new(kind, err.to_string())
}

#[async_trait]
impl ImageProvider for ConfiguredProvider {
    fn name(&self) -> &str {
        "configured"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<Vec<u8>, ProviderError> {
        let provider = self.resolve()?;
        provider.generate_image(request).await
    }
}
