//! Request bodies accepted by the HTTP routes.

use serde::Deserialize;

use crate::core::{Page, PageKind};
use crate::providers::ProviderConfigUpdate;
use crate::util::decode_base64_images;
use crate::Result;

fn default_true() -> bool {
    true
}

/// A page as sent by clients; the optional reference image is base64.
#[derive(Debug, Clone, Deserialize)]
pub struct PageInput {
    pub index: usize,
    #[serde(rename = "type", default)]
    pub kind: PageKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub reference_image: Option<String>,
}

impl PageInput {
    pub fn into_page(self) -> Result<Page> {
        let mut page = Page::new(self.index, self.kind, self.content);
        if let Some(encoded) = self.reference_image.filter(|s| !s.is_empty()) {
            let mut decoded = decode_base64_images(&[encoded])?;
            page.reference_image = decoded.pop();
        }
        Ok(page)
    }
}

pub fn into_pages(inputs: Vec<PageInput>) -> Result<Vec<Page>> {
    inputs.into_iter().map(PageInput::into_page).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub pages: Vec<PageInput>,
    #[serde(default)]
    pub full_outline: String,
    #[serde(default)]
    pub user_images: Vec<String>,
    #[serde(default)]
    pub user_topic: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryBody {
    pub task_id: String,
    pub page: PageInput,
    #[serde(default = "default_true")]
    pub use_reference: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryFailedBody {
    pub task_id: String,
    #[serde(default)]
    pub pages: Vec<PageInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegenerateBody {
    pub task_id: String,
    pub page: PageInput,
    #[serde(default = "default_true")]
    pub use_reference: bool,
    #[serde(default)]
    pub full_outline: Option<String>,
    #[serde(default)]
    pub user_topic: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageQuery {
    #[serde(default = "default_true")]
    pub thumbnail: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanQuery {
    #[serde(default)]
    pub pages: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigBody {
    #[serde(default)]
    pub image_generation: Option<ProviderConfigUpdate>,
}
