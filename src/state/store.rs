//! TaskStore - process-wide map from task identifier to task state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::core::{GenerationContext, ImageDescriptor, TaskSnapshot, TaskState};

/// In-memory store of task states.
///
/// Cloning is cheap and shares the underlying map. Every mutation of a
/// page entry happens under the write lock, so readers never observe a
/// page that is half moved between `generated` and `failed`.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Arc<RwLock<HashMap<String, TaskState>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a state exists for `task_id`. Returns `true` when created.
    pub async fn get_or_create(&self, task_id: &str) -> bool {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(task_id) {
            return false;
        }
        debug!(task_id, "Creating task state");
        tasks.insert(task_id.to_string(), TaskState::new());
        true
    }

    /// Clone of the current state, or `None` if the task is unknown.
    pub async fn read(&self, task_id: &str) -> Option<TaskState> {
        self.tasks.read().await.get(task_id).cloned()
    }

    pub async fn snapshot(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tasks.read().await.get(task_id).map(TaskState::snapshot)
    }

    pub async fn contains(&self, task_id: &str) -> bool {
        self.tasks.read().await.contains_key(task_id)
    }

    pub async fn mark_generated(&self, task_id: &str, index: usize, descriptor: ImageDescriptor) {
        self.update(task_id, |state| state.record_generated(index, descriptor))
            .await;
    }

    pub async fn mark_failed(&self, task_id: &str, index: usize, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(task_id, |state| state.record_failed(index, reason))
            .await;
    }

    /// Record a failure only if the page has no stored image.
    /// Returns `true` when the failure was recorded.
    pub async fn mark_failed_unless_generated(
        &self,
        task_id: &str,
        index: usize,
        reason: impl Into<String>,
    ) -> bool {
        let mut tasks = self.tasks.write().await;
        let state = tasks.entry(task_id.to_string()).or_default();
        if state.is_generated(index) {
            return false;
        }
        state.record_failed(index, reason);
        true
    }

    pub async fn set_cover_image(&self, task_id: &str, bytes: Vec<u8>) {
        self.update(task_id, |state| state.set_cover_image(bytes))
            .await;
    }

    pub async fn set_context(&self, task_id: &str, context: GenerationContext) {
        self.update(task_id, |state| state.set_context(context))
            .await;
    }

    /// Install a rebuilt state unless the task is already known.
    /// Returns `true` when the state was installed.
    pub async fn install_if_absent(&self, task_id: &str, state: TaskState) -> bool {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(task_id) {
            return false;
        }
        tasks.insert(task_id.to_string(), state);
        true
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    async fn update<F>(&self, task_id: &str, f: F)
    where
        F: FnOnce(&mut TaskState),
    {
        let mut tasks = self.tasks.write().await;
        let state = tasks.entry(task_id.to_string()).or_default();
        f(state);
    }
}
