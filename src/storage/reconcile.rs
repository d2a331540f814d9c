//! Rebuild task state from the history directory after a restart.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{list_task_files, ImageStore};
use crate::core::{ImageDescriptor, TaskState};
use crate::state::TaskStore;
use crate::{Error, Result};

/// Outcome of scanning one task directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub task_id: String,
    /// Page indices with an image on disk, ascending.
    pub generated: Vec<usize>,
    /// Page indices with no image on disk, ascending.
    pub missing: Vec<usize>,
    /// Whether the rebuilt state was installed into the store.
    pub installed: bool,
}

/// Scan `<root>/<task_id>` and install the rebuilt state if the task is
/// not already known in memory.
///
/// `expected_pages` extends gap detection up to that many pages; without
/// it only gaps below the highest stored index are reported.
pub async fn scan_task(
    images: &ImageStore,
    store: &TaskStore,
    task_id: &str,
    expected_pages: Option<usize>,
) -> Result<ScanReport> {
    if !images.task_exists(task_id).await? {
        return Err(Error::TaskNotFound(task_id.to_string()));
    }
    let dir = images.task_dir(task_id)?;

    let mut state = TaskState::new();
    for file in list_task_files(&dir).await? {
        let Some(index) = file.index else {
            debug!(task_id, file = %file.name, "Ignoring unindexed file");
            continue;
        };
        if state.is_generated(index) {
            continue;
        }
        let path = dir.join(&file.name);
        let created_at = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(e) => {
                warn!(task_id, file = %file.name, error = %e, "No mtime, using now");
                Utc::now()
            }
        };
        state.record_generated(
            index,
            ImageDescriptor {
                filename: file.name,
                created_at,
            },
        );
    }

    let generated: Vec<usize> = state.generated().keys().copied().collect();
    let missing = find_missing(&generated, expected_pages);
    let installed = store.install_if_absent(task_id, state).await;

    info!(
        task_id,
        generated = generated.len(),
        missing = missing.len(),
        installed,
        "Scanned task"
    );
    Ok(ScanReport {
        task_id: task_id.to_string(),
        generated,
        missing,
        installed,
    })
}

/// Scan every task directory under the history root.
pub async fn scan_all(images: &ImageStore, store: &TaskStore) -> Result<Vec<ScanReport>> {
    let root = images.root();
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::persistence(root, e)),
    };

    let mut task_ids = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::persistence(root, e))?
    {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_dir && !name.starts_with('.') {
            task_ids.push(name);
        }
    }
    task_ids.sort();

    let mut reports = Vec::with_capacity(task_ids.len());
    for task_id in task_ids {
        reports.push(scan_task(images, store, &task_id, None).await?);
    }
    Ok(reports)
}

fn find_missing(generated: &[usize], expected_pages: Option<usize>) -> Vec<usize> {
    let present: BTreeSet<usize> = generated.iter().copied().collect();
    let upper = match (expected_pages, present.iter().next_back()) {
        (Some(expected), _) => expected,
        (None, Some(max)) => max + 1,
        (None, None) => 0,
    };
    (0..upper).filter(|i| !present.contains(i)).collect()
}
