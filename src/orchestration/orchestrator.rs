//! Public entry points for page generation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::events::EventStream;
use super::scheduler::BatchScheduler;
use super::worker::{FailurePolicy, PageOutcome, PageWorker};
use crate::config::{AppConfig, DEFAULT_MAX_CONCURRENT, DEFAULT_PROVIDER_TIMEOUT_SECS};
use crate::core::{GenerationContext, Page, TaskSnapshot};
use crate::providers::ImageProvider;
use crate::state::TaskStore;
use crate::storage::ImageStore;
use crate::{Error, Result};

pub const DEFAULT_EVENT_BUFFER: usize = 8;

/// Tuning knobs for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Page attempts allowed in flight per batch.
    pub max_concurrent: usize,
    /// Upper bound on a single provider call.
    pub provider_timeout: Duration,
    /// Events buffered ahead of a slow consumer.
    pub event_buffer: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.effective_max_concurrent(),
            provider_timeout: config.provider_timeout(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Input of a full generation batch.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub task_id: String,
    pub pages: Vec<Page>,
    pub full_outline: String,
    pub user_images: Vec<Vec<u8>>,
    pub user_topic: Option<String>,
}

/// Drives page generation for any number of tasks.
///
/// Cloning is cheap; clones share the same task store, image store and
/// provider.
#[derive(Clone)]
pub struct Orchestrator {
    store: TaskStore,
    images: ImageStore,
    provider: Arc<dyn ImageProvider>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        store: TaskStore,
        images: ImageStore,
        provider: Arc<dyn ImageProvider>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            images,
            provider,
            settings,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Generate every page of `request`, streaming events as pages finish.
    ///
    /// The stored generation context (outline, topic, user images) is
    /// replaced so later retries reuse it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an empty task id, no pages or
    /// duplicate page indices. Nothing is attempted in that case.
    pub async fn generate(&self, request: GenerateRequest) -> Result<EventStream> {
        validate_task_id(&self.images, &request.task_id)?;
        validate_pages(&request.pages)?;

        let task_id = request.task_id;
        self.store.get_or_create(&task_id).await;
        let context = GenerationContext {
            full_outline: request.full_outline,
            user_topic: request.user_topic,
            user_images: request.user_images,
        };
        self.store.set_context(&task_id, context.clone()).await;

        let cover = self
            .store
            .read(&task_id)
            .await
            .and_then(|state| state.cover_image());
        info!(task_id = %task_id, pages = request.pages.len(), "Starting generation");
        let worker = self.worker(&task_id, Arc::new(context), cover, FailurePolicy::Record);
        Ok(self.spawn_batch(worker, request.pages))
    }

    /// Attempt the given pages again using the stored generation context.
    ///
    /// Pages that are currently generated are attempted as well and are
    /// overwritten on success.
    pub async fn retry_failed(&self, task_id: &str, pages: Vec<Page>) -> Result<EventStream> {
        validate_task_id(&self.images, task_id)?;
        validate_pages(&pages)?;

        self.store.get_or_create(task_id).await;
        let state = self.store.read(task_id).await.unwrap_or_default();
        let context = Arc::new(state.context().clone());
        info!(
            task_id,
            pages = pages.len(),
            previously_failed = pages.iter().filter(|p| state.is_failed(p.index)).count(),
            "Retrying pages"
        );
        let worker = self.worker(task_id, context, state.cover_image(), FailurePolicy::Record);
        Ok(self.spawn_batch(worker, pages))
    }

    /// Attempt one page that is not currently generated.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the page already has an image; use
    /// [`Orchestrator::regenerate`] to replace it. Provider failures are
    /// reported as `PageOutcome::Failed`, persistence failures as `Err`.
    pub async fn retry_single(&self, task_id: &str, page: Page, use_reference: bool) -> Result<PageOutcome> {
        validate_task_id(&self.images, task_id)?;
        self.store.get_or_create(task_id).await;
        let state = self.store.read(task_id).await.unwrap_or_default();
        if state.is_generated(page.index) {
            return Err(Error::Validation(format!(
                "page {} is already generated; regenerate it instead",
                page.index
            )));
        }

        let context = Arc::new(state.context().clone());
        let reference = self.style_reference(task_id, page.index, use_reference).await;
        // The page may be generated by a concurrent batch after the check above.
        let worker = self.worker(task_id, context, reference, FailurePolicy::KeepGenerated);
        info!(task_id, page = page.index, use_reference, "Retrying single page");
        worker.attempt(&page).await
    }

    /// Generate one page again, replacing its image on success.
    ///
    /// Non-empty `full_outline` and `user_topic` override the stored
    /// context for this attempt only. On failure a previously generated
    /// image is kept.
    pub async fn regenerate(
        &self,
        task_id: &str,
        page: Page,
        use_reference: bool,
        full_outline: Option<String>,
        user_topic: Option<String>,
    ) -> Result<PageOutcome> {
        validate_task_id(&self.images, task_id)?;
        self.store.get_or_create(task_id).await;
        let state = self.store.read(task_id).await.unwrap_or_default();

        let mut context = state.context().clone();
        if let Some(outline) = full_outline.filter(|o| !o.trim().is_empty()) {
            context.full_outline = outline;
        }
        if let Some(topic) = user_topic.filter(|t| !t.trim().is_empty()) {
            context.user_topic = Some(topic);
        }

        let reference = self.style_reference(task_id, page.index, use_reference).await;
        let worker = self.worker(task_id, Arc::new(context), reference, FailurePolicy::KeepGenerated);
        info!(task_id, page = page.index, use_reference, "Regenerating page");
        worker.attempt(&page).await
    }

    /// Current outcome of every page, or `None` if the task is unknown.
    pub async fn get_task_state(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.store.snapshot(task_id).await
    }

    /// Cover image, else the lowest generated sibling read from disk.
    async fn style_reference(&self, task_id: &str, index: usize, use_reference: bool) -> Option<Arc<Vec<u8>>> {
        if !use_reference {
            return None;
        }
        let state = self.store.read(task_id).await?;
        if let Some(cover) = state.cover_image() {
            return Some(cover);
        }
        let (sibling, descriptor) = state.first_generated_sibling(index)?;
        match self.images.load(task_id, &descriptor.filename, false).await {
            Ok(bytes) => Some(Arc::new(bytes)),
            Err(e) => {
                warn!(task_id, page = sibling, error = %e, "Reference image unavailable");
                None
            }
        }
    }

    fn worker(
        &self,
        task_id: &str,
        context: Arc<GenerationContext>,
        style_reference: Option<Arc<Vec<u8>>>,
        failure_policy: FailurePolicy,
    ) -> PageWorker {
        PageWorker {
            task_id: Arc::from(task_id),
            store: self.store.clone(),
            images: self.images.clone(),
            provider: Arc::clone(&self.provider),
            context,
            style_reference,
            timeout: self.settings.provider_timeout,
            failure_policy,
        }
    }

    fn spawn_batch(&self, worker: PageWorker, pages: Vec<Page>) -> EventStream {
        let (tx, rx) = mpsc::channel(self.settings.event_buffer.max(1));
        let cancel = CancellationToken::new();
        let scheduler = BatchScheduler::new(
            worker,
            pages,
            self.settings.max_concurrent,
            tx,
            cancel.clone(),
        );
        tokio::spawn(scheduler.run());
        EventStream::new(rx, cancel.drop_guard())
    }
}

fn validate_task_id(images: &ImageStore, task_id: &str) -> Result<()> {
    if task_id.trim().is_empty() {
        return Err(Error::Validation("task_id must not be empty".to_string()));
    }
    images.task_dir(task_id).map(|_| ())
}

fn validate_pages(pages: &[Page]) -> Result<()> {
    if pages.is_empty() {
        return Err(Error::Validation("pages must not be empty".to_string()));
    }
    let mut seen = HashSet::with_capacity(pages.len());
    for page in pages {
        if !seen.insert(page.index) {
            return Err(Error::Validation(format!(
                "page index {} appears more than once",
                page.index
            )));
        }
    }
    Ok(())
}
