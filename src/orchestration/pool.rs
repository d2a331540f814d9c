//! Bounded pool of in-flight page attempts.
//!
//! The `PagePool` enforces the `max_concurrent` limit and hands finished
//! attempts back in completion order.

use tokio::task::JoinSet;

use super::worker::{PageOutcome, PageWorker};
use crate::core::Page;
use crate::error::{Error, Result};

/// Manages concurrently running page attempts.
///
/// # Example
///
/// ```ignore
/// let mut pool = PagePool::new(3);
/// while pool.has_capacity() {
///     pool.spawn(worker.clone(), next_page)?;
/// }
/// while let Some(result) = pool.join_next().await {
///     // handle the outcome
/// }
/// ```
pub struct PagePool {
    tasks: JoinSet<Result<PageOutcome>>,
    max_concurrent: usize,
}

impl PagePool {
    /// Create a pool that runs at most `max_concurrent` attempts at once.
    /// A limit of zero is treated as one.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of attempts currently in flight.
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.active_count() < self.max_concurrent
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start an attempt for `page`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the pool is at capacity.
    pub fn spawn(&mut self, worker: PageWorker, page: Page) -> Result<()> {
        if !self.has_capacity() {
            return Err(Error::Validation(format!(
                "page pool is full ({} in flight)",
                self.max_concurrent
            )));
        }
        self.tasks.spawn(async move { worker.attempt(&page).await });
        Ok(())
    }

    /// Wait for the next attempt to finish. `None` when nothing is in flight.
    pub async fn join_next(&mut self) -> Option<Result<PageOutcome>> {
        let joined = self.tasks.join_next().await?;
        Some(joined.unwrap_or_else(|e| Err(Error::TaskJoin(e.to_string()))))
    }
}

impl Drop for PagePool {
    fn drop(&mut self) {
        // Attempts commit their own state; let them run to completion.
        self.tasks.detach_all();
    }
}
