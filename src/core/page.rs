//! Page data model.
//!
//! Pages are supplied by the caller per invocation. Only their outcomes are
//! tracked; the pages themselves are never persisted.

use serde::{Deserialize, Serialize};

/// Role of a page within the outline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    /// Title page; generated first and reused as the style reference.
    Cover,
    #[default]
    Content,
    /// Closing page.
    Summary,
}

impl PageKind {
    /// Short directive prepended to the prompt for this kind of page.
    pub fn directive(&self) -> &'static str {
        match self {
            PageKind::Cover => {
                "Design the cover page: a bold title composition that sets the visual style for every later page."
            }
            PageKind::Content => {
                "Design a content page that illustrates the text below, keeping the established visual style."
            }
            PageKind::Summary => {
                "Design the closing summary page that wraps up the series in the established visual style."
            }
        }
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageKind::Cover => write!(f, "cover"),
            PageKind::Content => write!(f, "content"),
            PageKind::Summary => write!(f, "summary"),
        }
    }
}

/// One unit of generation work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based page index; also names the stored file.
    pub index: usize,
    #[serde(rename = "type", default)]
    pub kind: PageKind,
    /// Page description text from the outline.
    pub content: String,
    /// Page-specific reference image, raw bytes.
    #[serde(skip)]
    pub reference_image: Option<Vec<u8>>,
}

impl Page {
    pub fn new(index: usize, kind: PageKind, content: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            content: content.into(),
            reference_image: None,
        }
    }

    pub fn content(index: usize, content: impl Into<String>) -> Self {
        Self::new(index, PageKind::Content, content)
    }

    pub fn cover(index: usize, content: impl Into<String>) -> Self {
        Self::new(index, PageKind::Cover, content)
    }

    pub fn with_reference_image(mut self, bytes: Vec<u8>) -> Self {
        self.reference_image = Some(bytes);
        self
    }

    pub fn is_cover(&self) -> bool {
        self.kind == PageKind::Cover
    }
}
