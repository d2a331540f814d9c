//! Task state data model.
//!
//! A task records the outcome of every page it has attempted. A page index
//! lives in exactly one of `generated` or `failed`; the mutators here are
//! the only way to change either map and they keep that property.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Stored image for a successfully generated page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

impl ImageDescriptor {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            created_at: Utc::now(),
        }
    }
}

/// Inputs captured at `generate` time and reused by later retries.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub full_outline: String,
    pub user_topic: Option<String>,
    pub user_images: Vec<Vec<u8>>,
}

/// Per-task outcome record.
#[derive(Debug, Clone, Default)]
pub struct TaskState {
    generated: BTreeMap<usize, ImageDescriptor>,
    failed: BTreeMap<usize, String>,
    cover_image: Option<Arc<Vec<u8>>>,
    context: GenerationContext,
}

impl TaskState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generated(&self) -> &BTreeMap<usize, ImageDescriptor> {
        &self.generated
    }

    pub fn failed(&self) -> &BTreeMap<usize, String> {
        &self.failed
    }

    pub fn is_generated(&self, index: usize) -> bool {
        self.generated.contains_key(&index)
    }

    pub fn is_failed(&self, index: usize) -> bool {
        self.failed.contains_key(&index)
    }

    /// Record a success, clearing any failure for the same page.
    pub fn record_generated(&mut self, index: usize, descriptor: ImageDescriptor) {
        self.failed.remove(&index);
        self.generated.insert(index, descriptor);
    }

    /// Record a failure, clearing any success for the same page.
    pub fn record_failed(&mut self, index: usize, reason: impl Into<String>) {
        self.generated.remove(&index);
        self.failed.insert(index, reason.into());
    }

    pub fn cover_image(&self) -> Option<Arc<Vec<u8>>> {
        self.cover_image.clone()
    }

    pub fn has_cover(&self) -> bool {
        self.cover_image.is_some()
    }

    pub fn set_cover_image(&mut self, bytes: Vec<u8>) {
        self.cover_image = Some(Arc::new(bytes));
    }

    pub fn context(&self) -> &GenerationContext {
        &self.context
    }

    pub fn set_context(&mut self, context: GenerationContext) {
        self.context = context;
    }

    /// Index of the lowest generated page other than `exclude`.
    pub fn first_generated_sibling(&self, exclude: usize) -> Option<(usize, &ImageDescriptor)> {
        self.generated
            .iter()
            .find(|(index, _)| **index != exclude)
            .map(|(index, descriptor)| (*index, descriptor))
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            generated: self.generated.clone(),
            failed: self.failed.clone(),
            has_cover: self.has_cover(),
        }
    }
}

/// Serializable view of a task, without the cover bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub generated: BTreeMap<usize, ImageDescriptor>,
    pub failed: BTreeMap<usize, String>,
    pub has_cover: bool,
}
