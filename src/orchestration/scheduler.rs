//! Batch scheduler driving a set of page attempts.
//!
//! Cover pages run first, one at a time, so that their image can serve as
//! the style reference for the rest. Remaining pages are dispatched to the
//! [`PagePool`] up to its capacity and reported as they finish.

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{DoneEvent, ErrorEvent, GenerationEvent, PageStatus, Phase, ProgressEvent};
use super::pool::PagePool;
use super::worker::{PageOutcome, PageWorker};
use crate::core::Page;
use crate::error::{Error, Result};

/// Running totals for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub failed_indices: Vec<usize>,
}

/// Drives one batch from first launch to its terminal event.
pub struct BatchScheduler {
    worker: PageWorker,
    pool: PagePool,
    covers: VecDeque<Page>,
    pending: VecDeque<Page>,
    total: usize,
    launched: usize,
    summary: BatchSummary,
    event_tx: mpsc::Sender<GenerationEvent>,
    cancel: CancellationToken,
    /// Set once the consumer went away; events are no longer sent.
    disconnected: bool,
}

impl BatchScheduler {
    /// Create a scheduler for `pages`.
    ///
    /// # Arguments
    ///
    /// * `worker` - Attempt context shared by every page of the batch
    /// * `pages` - Pages to attempt; covers are split out and run first
    /// * `max_concurrent` - Pool size for non-cover pages
    /// * `event_tx` - Channel feeding the batch's event stream
    /// * `cancel` - Stops new launches when cancelled
    pub fn new(
        worker: PageWorker,
        pages: Vec<Page>,
        max_concurrent: usize,
        event_tx: mpsc::Sender<GenerationEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let total = pages.len();
        let (covers, pending): (VecDeque<Page>, VecDeque<Page>) =
            pages.into_iter().partition(Page::is_cover);
        Self {
            worker,
            pool: PagePool::new(max_concurrent),
            covers,
            pending,
            total,
            launched: 0,
            summary: BatchSummary::default(),
            event_tx,
            cancel,
            disconnected: false,
        }
    }

    fn stopped(&self) -> bool {
        self.disconnected || self.cancel.is_cancelled()
    }

    /// Send an event unless the consumer is gone. A failed send marks the
    /// batch as disconnected and cancels further launches.
    async fn emit(&mut self, event: GenerationEvent) {
        if self.disconnected {
            return;
        }
        if self.event_tx.send(event).await.is_err() {
            debug!(task_id = self.worker.task_id(), "Event consumer disconnected");
            self.disconnected = true;
            self.cancel.cancel();
        }
    }

    /// Announce the next launch. `launched` only counts once the attempt
    /// actually starts.
    async fn emit_progress(&mut self, index: usize, phase: Phase) {
        let event = GenerationEvent::Progress(ProgressEvent {
            index,
            status: PageStatus::Generating,
            current: self.launched + 1,
            total: self.total,
            phase,
        });
        self.emit(event).await;
    }

    /// Attempt every cover page sequentially.
    ///
    /// A successful cover becomes the style reference for later pages.
    pub async fn run_covers(&mut self) -> Result<()> {
        while let Some(page) = self.covers.pop_front() {
            if self.stopped() {
                self.covers.clear();
                break;
            }
            self.emit_progress(page.index, Phase::Cover).await;
            if self.stopped() {
                self.covers.clear();
                break;
            }
            self.launched += 1;
            let outcome = self.worker.attempt(&page).await?;
            if outcome.is_success() {
                let cover = self
                    .worker
                    .store
                    .read(self.worker.task_id())
                    .await
                    .and_then(|state| state.cover_image());
                self.worker.style_reference = cover;
            }
            self.record(outcome).await;
        }
        Ok(())
    }

    /// Dispatch pending pages to the pool up to its capacity.
    ///
    /// Returns the number of pages dispatched.
    pub async fn dispatch_ready_pages(&mut self) -> Result<usize> {
        let mut dispatched = 0;
        while self.pool.has_capacity() && !self.stopped() {
            let Some(page) = self.pending.pop_front() else {
                break;
            };
            self.emit_progress(page.index, Phase::Pages).await;
            if self.stopped() {
                self.pending.push_front(page);
                break;
            }
            self.pool.spawn(self.worker.clone(), page)?;
            self.launched += 1;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Handle a finished page attempt.
    pub async fn handle_completion(&mut self, outcome: PageOutcome) {
        self.record(outcome).await;
    }

    /// Handle an attempt that could not complete at all.
    ///
    /// Stops new launches and waits for in-flight pages so that their
    /// outcomes are still reported before the terminal error.
    pub async fn handle_failure(&mut self, err: Error) {
        error!(task_id = self.worker.task_id(), error = %err, "Aborting batch");
        self.cancel.cancel();
        self.pending.clear();
        while let Some(result) = self.pool.join_next().await {
            match result {
                Ok(outcome) => self.record(outcome).await,
                Err(other) => warn!(task_id = self.worker.task_id(), error = %other, "Attempt failed during abort"),
            }
        }
        let message = err.to_string();
        self.emit(GenerationEvent::Error(ErrorEvent { message })).await;
    }

    async fn record(&mut self, outcome: PageOutcome) {
        if outcome.is_success() {
            self.summary.success_count += 1;
        } else {
            self.summary.failure_count += 1;
            self.summary.failed_indices.push(outcome.index());
        }
        let event = outcome.to_event(self.worker.task_id());
        self.emit(event).await;
    }

    /// Run the batch until every page is accounted for.
    ///
    /// Emits `done` last on normal completion, or `error` last when an
    /// attempt hit a fatal problem. If the consumer disconnects, no further
    /// pages launch but in-flight attempts still complete and commit.
    pub async fn run(mut self) -> BatchSummary {
        let task_id = self.worker.task_id().to_string();
        info!(task_id = %task_id, pages = self.total, max_concurrent = self.pool.max_concurrent(), "Batch started");

        if let Err(err) = self.run_covers().await {
            self.handle_failure(err).await;
            return self.summary;
        }

        loop {
            if let Err(err) = self.dispatch_ready_pages().await {
                self.handle_failure(err).await;
                return self.summary;
            }
            if self.pool.is_empty() {
                break;
            }

            let watch_consumer = !self.stopped();
            let joined = tokio::select! {
                joined = self.pool.join_next() => joined,
                _ = self.event_tx.closed(), if watch_consumer => {
                    debug!(task_id = %task_id, "Event consumer closed, no new pages will launch");
                    self.disconnected = true;
                    self.cancel.cancel();
                    continue;
                }
                _ = self.cancel.cancelled(), if watch_consumer => {
                    debug!(task_id = %task_id, "Batch cancelled, no new pages will launch");
                    continue;
                }
            };

            match joined {
                Some(Ok(outcome)) => self.handle_completion(outcome).await,
                Some(Err(err)) => {
                    self.handle_failure(err).await;
                    return self.summary;
                }
                None => break,
            }
        }

        self.summary.failed_indices.sort_unstable();
        let stopped_early = !self.pending.is_empty() || self.stopped();
        info!(
            task_id = %task_id,
            success = self.summary.success_count,
            failed = self.summary.failure_count,
            stopped_early,
            "Batch finished"
        );

        if !self.stopped() {
            let done = GenerationEvent::Done(DoneEvent {
                task_id,
                success_count: self.summary.success_count,
                failure_count: self.summary.failure_count,
                total: self.total,
                failed_indices: self.summary.failed_indices.clone(),
            });
            self.emit(done).await;
        }
        self.summary
    }
}
