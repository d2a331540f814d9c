//! A single page attempt: call the provider, persist, commit state.
//!
//! Workers commit their own outcome to the task store before reporting
//! back, so the store reflects every finished provider call even when
//! nobody is listening for the event.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::events::{image_url, GenerationEvent, PageCompleteEvent, PageFailedEvent, PageStatus};
use super::prompt::build_request;
use crate::core::{GenerationContext, ImageDescriptor, Page};
use crate::providers::{ImageProvider, ProviderError, ProviderErrorKind};
use crate::state::TaskStore;
use crate::storage::ImageStore;
use crate::Result;

/// What happens to an existing image when an attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure, replacing any earlier outcome.
    Record,
    /// Leave a previously generated page untouched.
    KeepGenerated,
}

/// Outcome of one page attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Generated { index: usize, filename: String },
    Failed { index: usize, error: ProviderError },
}

impl PageOutcome {
    pub fn index(&self) -> usize {
        match self {
            PageOutcome::Generated { index, .. } | PageOutcome::Failed { index, .. } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PageOutcome::Generated { .. })
    }

    pub fn to_event(&self, task_id: &str) -> GenerationEvent {
        match self {
            PageOutcome::Generated { index, filename } => {
                GenerationEvent::PageComplete(PageCompleteEvent {
                    index: *index,
                    status: PageStatus::Done,
                    filename: filename.clone(),
                    image_url: image_url(task_id, filename),
                })
            }
            PageOutcome::Failed { index, error } => GenerationEvent::PageFailed(PageFailedEvent {
                index: *index,
                status: PageStatus::Error,
                reason: error.reason().to_string(),
                message: error.message.clone(),
                retryable: error.is_retryable(),
            }),
        }
    }
}

/// Everything a page attempt needs. Cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct PageWorker {
    pub(crate) task_id: Arc<str>,
    pub(crate) store: TaskStore,
    pub(crate) images: ImageStore,
    pub(crate) provider: Arc<dyn ImageProvider>,
    pub(crate) context: Arc<GenerationContext>,
    pub(crate) style_reference: Option<Arc<Vec<u8>>>,
    pub(crate) timeout: Duration,
    pub(crate) failure_policy: FailurePolicy,
}

impl PageWorker {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Run one attempt for `page`.
    ///
    /// Provider failures are recorded and returned as `PageOutcome::Failed`.
    /// Only persistence problems surface as `Err`.
    pub async fn attempt(&self, page: &Page) -> Result<PageOutcome> {
        let task_id: &str = &self.task_id;
        let request = build_request(page, &self.context, self.style_reference.as_ref());
        debug!(
            task_id,
            page = page.index,
            kind = %page.kind,
            references = request.reference_images.len(),
            "Attempting page"
        );

        let generated = match tokio::time::timeout(self.timeout, self.provider.generate_image(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::new(
                ProviderErrorKind::Timeout,
                format!("no response within {}s", self.timeout.as_secs()),
            )),
        };

        let bytes = match generated {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(task_id, page = page.index, reason = error.reason(), message = %error.message, "Page failed");
                self.record_failure(page.index, error.to_string()).await;
                return Ok(PageOutcome::Failed {
                    index: page.index,
                    error,
                });
            }
        };

        let stored = match self.images.save(task_id, page.index, &bytes).await {
            Ok(stored) => stored,
            Err(e) => {
                self.record_failure(page.index, e.to_string()).await;
                return Err(e);
            }
        };

        if page.is_cover() {
            self.store.set_cover_image(task_id, bytes).await;
        }
        self.store
            .mark_generated(task_id, page.index, ImageDescriptor::new(stored.filename.clone()))
            .await;
        debug!(task_id, page = page.index, filename = %stored.filename, "Page generated");

        Ok(PageOutcome::Generated {
            index: page.index,
            filename: stored.filename,
        })
    }

    async fn record_failure(&self, index: usize, reason: String) {
        match self.failure_policy {
            FailurePolicy::Record => self.store.mark_failed(&self.task_id, index, reason).await,
            FailurePolicy::KeepGenerated => {
                if !self
                    .store
                    .mark_failed_unless_generated(&self.task_id, index, reason)
                    .await
                {
                    debug!(task_id = %self.task_id, page = index, "Keeping previous image after failed attempt");
                }
            }
        }
    }
}
