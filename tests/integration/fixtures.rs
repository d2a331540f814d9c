//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A scripted image provider with per-page outcome queues
//! - Orchestrators over temporary history roots
//! - Event stream inspection

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use pageforge::core::Page;
use pageforge::orchestration::{
    DoneEvent, GenerationEvent, Orchestrator, OrchestratorSettings,
};
use pageforge::providers::{ImageProvider, ImageRequest, ProviderError, ProviderErrorKind};
use pageforge::state::TaskStore;
use pageforge::storage::ImageStore;

/// Text placed in a page's content so the provider can tell pages apart.
pub fn marker(index: usize) -> String {
    format!("<<p{}>>", index)
}

/// A content page carrying its marker.
pub fn page(index: usize) -> Page {
    Page::content(index, marker(index))
}

pub fn pages(indices: &[usize]) -> Vec<Page> {
    indices.iter().copied().map(page).collect()
}

/// Bytes the scripted provider returns for a page unless told otherwise.
pub fn default_image(index: usize) -> Vec<u8> {
    format!("image-{}", index).into_bytes()
}

pub fn rate_limited() -> ProviderError {
    ProviderError::new(ProviderErrorKind::RateLimited, "Quota exceeded")
}

/// A small valid PNG, for tests that need decodable images.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode png");
    out.into_inner()
}

type Outcome = Result<Vec<u8>, ProviderError>;

/// Mock provider answering by the `<<pN>>` marker found in the prompt.
///
/// Each page has a queue of scripted outcomes. Once a page's queue is
/// empty it succeeds with [`default_image`].
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<usize, VecDeque<Outcome>>>,
    delays: Mutex<HashMap<usize, Duration>>,
    requests: Mutex<Vec<ImageRequest>>,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue an outcome for the next call naming `index`.
    pub fn push(&self, index: usize, outcome: Outcome) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(index)
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn fail(&self, index: usize, error: ProviderError) -> &Self {
        self.push(index, Err(error))
    }

    pub fn succeed_with(&self, index: usize, bytes: Vec<u8>) -> &Self {
        self.push(index, Ok(bytes))
    }

    /// Make every call for `index` take `delay`.
    pub fn delay(&self, index: usize, delay: Duration) -> &Self {
        self.delays.lock().unwrap().insert(index, delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ImageRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The last request made for `index`.
    pub fn request_for(&self, index: usize) -> Option<ImageRequest> {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| parse_marker(&r.prompt) == Some(index))
    }
}

fn parse_marker(prompt: &str) -> Option<usize> {
    let start = prompt.find("<<p")? + 3;
    let end = start + prompt[start..].find(">>")?;
    prompt[start..end].parse().ok()
}

#[async_trait]
impl ImageProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let Some(index) = parse_marker(&request.prompt) else {
            return Err(ProviderError::new(ProviderErrorKind::Other, "no page marker"));
        };

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(&index).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&index)
            .and_then(VecDeque::pop_front);

        self.active.fetch_sub(1, Ordering::SeqCst);
        scripted.unwrap_or_else(|| Ok(default_image(index)))
    }
}

/// An orchestrator over a temporary history root.
pub struct Harness {
    pub dir: TempDir,
    pub provider: Arc<ScriptedProvider>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(provider: Arc<ScriptedProvider>) -> Self {
        Self::with_settings(provider, OrchestratorSettings::default())
    }

    pub fn with_settings(provider: Arc<ScriptedProvider>, settings: OrchestratorSettings) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let orchestrator = Orchestrator::new(
            TaskStore::new(),
            ImageStore::new(dir.path()),
            provider.clone(),
            settings,
        );
        Self {
            dir,
            provider,
            orchestrator,
        }
    }

    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.dir.path().join(task_id)
    }

    /// A second orchestrator over the same history root with empty state,
    /// as after a restart.
    pub fn restarted(&self) -> Orchestrator {
        Orchestrator::new(
            TaskStore::new(),
            ImageStore::new(self.dir.path()),
            self.provider.clone(),
            OrchestratorSettings::default(),
        )
    }
}

pub fn done(events: &[GenerationEvent]) -> Option<&DoneEvent> {
    events.iter().find_map(|e| match e {
        GenerationEvent::Done(done) => Some(done),
        _ => None,
    })
}

pub fn terminal_count(events: &[GenerationEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

pub fn completed_indices(events: &[GenerationEvent]) -> Vec<usize> {
    let mut indices: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            GenerationEvent::PageComplete(c) => Some(c.index),
            _ => None,
        })
        .collect();
    indices.sort_unstable();
    indices
}

pub fn failed_indices(events: &[GenerationEvent]) -> Vec<usize> {
    let mut indices: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            GenerationEvent::PageFailed(f) => Some(f.index),
            _ => None,
        })
        .collect();
    indices.sort_unstable();
    indices
}
