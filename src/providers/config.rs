//! YAML-backed image provider configuration with an explicit reload.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

pub const DEFAULT_ACTIVE_PROVIDER: &str = "google_genai";

/// Wire protocol spoken by a provider entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    GoogleGenai,
    /// OpenAI-compatible `/v1/images/generations` endpoint.
    ImageApi,
}

/// One entry of the `providers` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(rename = "type", default)]
    pub kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Provider-specific keys kept as-is (size, quality, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ProviderSettings {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

/// The whole providers file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvidersDocument {
    #[serde(default = "default_active_provider")]
    pub active_provider: String,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Default for ProvidersDocument {
    fn default() -> Self {
        Self {
            active_provider: default_active_provider(),
            providers: BTreeMap::new(),
        }
    }
}

fn default_active_provider() -> String {
    DEFAULT_ACTIVE_PROVIDER.to_string()
}

/// Partial update submitted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfigUpdate {
    pub active_provider: Option<String>,
    pub providers: Option<BTreeMap<String, ProviderSettings>>,
}

/// Provider entry as shown to clients: key blanked, masked form alongside.
#[derive(Debug, Clone, Serialize)]
pub struct MaskedProviderSettings {
    #[serde(flatten)]
    pub settings: ProviderSettings,
    pub api_key_masked: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaskedProviders {
    pub active_provider: String,
    pub providers: BTreeMap<String, MaskedProviderSettings>,
}

/// Mask all but the first and last four characters of a key.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 8), tail)
}

/// Owns the providers file and a lazily populated parsed copy.
#[derive(Debug)]
pub struct ProviderConfigStore {
    path: PathBuf,
    cache: RwLock<Option<Arc<ProvidersDocument>>>,
}

impl ProviderConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed document, read from disk on first use.
    pub fn document(&self) -> Result<Arc<ProvidersDocument>> {
        if let Some(doc) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            return Ok(Arc::clone(doc));
        }

        let doc = Arc::new(self.read_from_disk()?);
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&doc));
        Ok(doc)
    }

    /// Drop the cached document so the next read hits the file again.
    pub fn reload(&self) {
        debug!(path = %self.path.display(), "Provider config cache cleared");
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn active_provider(&self) -> Result<String> {
        Ok(self.document()?.active_provider.clone())
    }

    /// Settings for `name`, or for the active provider when `None`.
    pub fn provider_settings(&self, name: Option<&str>) -> Result<(String, ProviderSettings)> {
        let doc = self.document()?;
        let name = name.unwrap_or(&doc.active_provider).to_string();
        let settings = doc
            .providers
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::ProviderNotConfigured {
                name: name.clone(),
                available: doc
                    .providers
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;
        if !settings.has_api_key() {
            return Err(Error::MissingApiKey(name));
        }
        Ok((name, settings))
    }

    /// Apply a client update, keeping stored keys the client left blank.
    pub fn update(&self, update: ProviderConfigUpdate) -> Result<()> {
        let mut doc = self.read_from_disk()?;

        if let Some(active) = update.active_provider {
            doc.active_provider = active;
        }
        if let Some(mut incoming) = update.providers {
            for (name, settings) in incoming.iter_mut() {
                settings.extra.remove("api_key_masked");
                settings.extra.remove("api_key_env");
                if !settings.has_api_key() {
                    settings.api_key = doc
                        .providers
                        .get(name)
                        .filter(|existing| existing.has_api_key())
                        .and_then(|existing| existing.api_key.clone());
                }
            }
            doc.providers = incoming;
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| Error::persistence(parent, e))?;
            }
        }
        let yaml = serde_yaml::to_string(&doc)?;
        fs::write(&self.path, yaml).map_err(|e| Error::persistence(&self.path, e))?;
        debug!(
            path = %self.path.display(),
            active = %doc.active_provider,
            providers = doc.providers.len(),
            "Provider config saved"
        );
        self.reload();
        Ok(())
    }

    pub fn masked(&self) -> Result<MaskedProviders> {
        let doc = self.document()?;
        let providers = doc
            .providers
            .iter()
            .map(|(name, settings)| {
                let api_key_masked = settings
                    .api_key
                    .as_deref()
                    .map(mask_api_key)
                    .unwrap_or_default();
                let mut settings = settings.clone();
                settings.api_key = Some(String::new());
                (
                    name.clone(),
                    MaskedProviderSettings {
                        settings,
                        api_key_masked,
                    },
                )
            })
            .collect();
        Ok(MaskedProviders {
            active_provider: doc.active_provider.clone(),
            providers,
        })
    }

    fn read_from_disk(&self) -> Result<ProvidersDocument> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Provider config not found, using defaults");
            return Ok(ProvidersDocument::default());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| Error::persistence(&self.path, e))?;
        if raw.trim().is_empty() {
            return Ok(ProvidersDocument::default());
        }
        Ok(serde_yaml::from_str(&raw)?)
    }
}
