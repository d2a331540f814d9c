//! ZIP export of a task's page images.

use std::io::{Cursor, Write};

use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{list_task_files, ImageStore};
use crate::util::blocking;
use crate::{Error, Result};

/// Build a ZIP of every page image of `task_id`, named `page_<n+1>.<ext>`.
///
/// Thumbnails are skipped. Files whose stem is not a page index keep their
/// original name.
pub async fn build_archive(images: &ImageStore, task_id: &str) -> Result<Vec<u8>> {
    if !images.task_exists(task_id).await? {
        return Err(Error::TaskNotFound(task_id.to_string()));
    }
    let dir = images.task_dir(task_id)?;
    let files = list_task_files(&dir).await?;

    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let path = dir.join(&file.name);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::persistence(&path, e))?;
        let archive_name = match file.index {
            Some(index) => format!("page_{}.{}", index + 1, file.extension),
            None => file.name,
        };
        entries.push((archive_name, bytes));
    }

    let count = entries.len();
    let archive = blocking(move || write_zip(entries)).await?;
    info!(task_id, files = count, bytes = archive.len(), "Built archive");
    Ok(archive)
}

fn write_zip(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in entries {
        writer.start_file(name, options)?;
        writer.write_all(&bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Download name for an archive derived from a record title.
pub fn archive_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "images.zip".to_string()
    } else {
        format!("{}.zip", trimmed)
    }
}
