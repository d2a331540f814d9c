//! On-disk image storage, archive export and restart reconciliation.

pub mod archive;
pub mod images;
pub mod reconcile;

pub use archive::{archive_file_name, build_archive};
pub use images::{ImageStore, StoredImage};
pub use reconcile::{scan_all, scan_task, ScanReport};

use std::path::Path;

use crate::{Error, Result};

pub(crate) const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A non-thumbnail image file found in a task directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TaskFile {
    pub name: String,
    pub extension: String,
    /// Page index parsed from the file stem, if numeric.
    pub index: Option<usize>,
}

/// Page index encoded in a stored filename (`3.png` → `3`).
pub fn parse_page_index(filename: &str) -> Option<usize> {
    filename.split('.').next()?.parse().ok()
}

/// List image files of a task directory, sorted by page index, with
/// unindexed files last in name order.
pub(crate) async fn list_task_files(dir: &Path) -> Result<Vec<TaskFile>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::persistence(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::persistence(dir, e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if ImageStore::is_thumbnail(&name) || name.starts_with('.') {
            continue;
        }
        let extension = match name.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => continue,
        };
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            continue;
        }
        let index = parse_page_index(&name);
        files.push(TaskFile {
            name,
            extension,
            index,
        });
    }

    files.sort_by(|a, b| match (a.index, b.index) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
    Ok(files)
}
