//! Events emitted while a batch runs, and the stream that carries them.
//!
//! Events arrive in completion order. A batch ends with exactly one
//! terminal event: `done` on normal completion or `error` when it was
//! aborted. Nothing follows the terminal event.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

/// Per-page status reported in event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Generating,
    Done,
    Error,
}

/// Which part of the batch a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Cover pages, attempted one at a time before everything else.
    Cover,
    Pages,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub index: usize,
    pub status: PageStatus,
    /// 1-based launch position within the batch.
    pub current: usize,
    pub total: usize,
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageCompleteEvent {
    pub index: usize,
    pub status: PageStatus,
    pub filename: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailedEvent {
    pub index: usize,
    pub status: PageStatus,
    /// Stable reason code, e.g. `rate_limited`.
    pub reason: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoneEvent {
    pub task_id: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub total: usize,
    pub failed_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEvent {
    pub message: String,
}

/// One unit of progress information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Progress(ProgressEvent),
    PageComplete(PageCompleteEvent),
    PageFailed(PageFailedEvent),
    Done(DoneEvent),
    Error(ErrorEvent),
}

impl GenerationEvent {
    /// Wire name of the event type.
    pub fn name(&self) -> &'static str {
        match self {
            GenerationEvent::Progress(_) => "progress",
            GenerationEvent::PageComplete(_) => "page_complete",
            GenerationEvent::PageFailed(_) => "page_failed",
            GenerationEvent::Done(_) => "done",
            GenerationEvent::Error(_) => "error",
        }
    }

    /// JSON payload of the event.
    pub fn data(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            GenerationEvent::Progress(e) => serde_json::to_value(e),
            GenerationEvent::PageComplete(e) => serde_json::to_value(e),
            GenerationEvent::PageFailed(e) => serde_json::to_value(e),
            GenerationEvent::Done(e) => serde_json::to_value(e),
            GenerationEvent::Error(e) => serde_json::to_value(e),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationEvent::Done(_) | GenerationEvent::Error(_))
    }

    /// Page index the event refers to, if any.
    pub fn page_index(&self) -> Option<usize> {
        match self {
            GenerationEvent::Progress(e) => Some(e.index),
            GenerationEvent::PageComplete(e) => Some(e.index),
            GenerationEvent::PageFailed(e) => Some(e.index),
            GenerationEvent::Done(_) | GenerationEvent::Error(_) => None,
        }
    }
}

/// Path under which the HTTP layer serves a stored image.
pub fn image_url(task_id: &str, filename: &str) -> String {
    format!("/api/images/{}/{}", task_id, filename)
}

/// Lazily produced events of one batch.
///
/// Dropping the stream tells the batch to stop launching new pages; pages
/// already in flight still finish and are recorded.
pub struct EventStream {
    rx: mpsc::Receiver<GenerationEvent>,
    _cancel: DropGuard,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::Receiver<GenerationEvent>, cancel: DropGuard) -> Self {
        Self {
            rx,
            _cancel: cancel,
        }
    }

    /// Wait for the next event; `None` once the batch has finished.
    pub async fn next_event(&mut self) -> Option<GenerationEvent> {
        self.rx.recv().await
    }

    /// Drain every remaining event.
    pub async fn collect_all(mut self) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = GenerationEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}
