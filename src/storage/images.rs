//! Per-task image files and their thumbnails.
//!
//! Layout: `<root>/<task_id>/<index>.png` plus `thumb_<index>.png` next to
//! it. Page order is recoverable from the filename alone.

use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};

use image::ImageFormat;
use tracing::{debug, warn};

use crate::util::blocking;
use crate::{Error, Result};

pub const THUMBNAIL_PREFIX: &str = "thumb_";
pub const THUMBNAIL_MAX_EDGE: u32 = 512;

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub filename: String,
    pub path: PathBuf,
    /// Whether a thumbnail was written alongside the image.
    pub has_thumbnail: bool,
}

/// Filesystem-backed image store rooted at the history directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn page_filename(index: usize) -> String {
        format!("{}.png", index)
    }

    pub fn thumbnail_name(filename: &str) -> String {
        format!("{}{}", THUMBNAIL_PREFIX, filename)
    }

    pub fn is_thumbnail(filename: &str) -> bool {
        filename.starts_with(THUMBNAIL_PREFIX)
    }

    /// Directory for `task_id`, rejecting identifiers that escape the root.
    pub fn task_dir(&self, task_id: &str) -> Result<PathBuf> {
        validate_component("task_id", task_id)?;
        Ok(self.root.join(task_id))
    }

    /// Write the page image and its thumbnail, replacing earlier versions.
    pub async fn save(&self, task_id: &str, index: usize, bytes: &[u8]) -> Result<StoredImage> {
        let dir = self.task_dir(task_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::persistence(&dir, e))?;

        let filename = Self::page_filename(index);
        let path = dir.join(&filename);
        write_atomic(&path, bytes).await?;

        let thumb_path = dir.join(Self::thumbnail_name(&filename));
        let source = bytes.to_vec();
        let has_thumbnail = match blocking(move || render_thumbnail(&source)).await {
            Ok(thumb) => {
                write_atomic(&thumb_path, &thumb).await?;
                true
            }
            Err(e) => {
                warn!(task_id, page = index, error = %e, "Skipping thumbnail for undecodable image");
                remove_if_exists(&thumb_path).await?;
                false
            }
        };

        debug!(task_id, page = index, path = %path.display(), has_thumbnail, "Saved image");
        Ok(StoredImage {
            filename,
            path,
            has_thumbnail,
        })
    }

    /// Read an image, preferring its thumbnail when asked and available.
    pub async fn load(&self, task_id: &str, filename: &str, want_thumbnail: bool) -> Result<Vec<u8>> {
        validate_component("filename", filename)?;
        let dir = self.task_dir(task_id)?;

        if want_thumbnail && !Self::is_thumbnail(filename) {
            let thumb_path = dir.join(Self::thumbnail_name(filename));
            if let Some(bytes) = read_optional(&thumb_path).await? {
                return Ok(bytes);
            }
        }

        read_optional(&dir.join(filename))
            .await?
            .ok_or_else(|| Error::ImageNotFound {
                task_id: task_id.to_string(),
                filename: filename.to_string(),
            })
    }

    /// Full-resolution bytes for a page.
    pub async fn load_page(&self, task_id: &str, index: usize) -> Result<Vec<u8>> {
        self.load(task_id, &Self::page_filename(index), false).await
    }

    pub async fn task_exists(&self, task_id: &str) -> Result<bool> {
        let dir = self.task_dir(task_id)?;
        Ok(tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }
}

fn validate_component(field: &str, value: &str) -> Result<()> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0'])
        || value.starts_with('.');
    if invalid {
        return Err(Error::Validation(format!("invalid {}: {:?}", field, value)));
    }
    Ok(())
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // Unique per writer: concurrent saves of one page must not share a temp file.
    let tmp = path.with_file_name(format!(
        ".{}.{}.tmp",
        file_name,
        uuid::Uuid::new_v4().simple()
    ));
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        discard_temp(&tmp).await;
        return Err(Error::persistence(&tmp, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        discard_temp(&tmp).await;
        return Err(Error::persistence(path, e));
    }
    Ok(())
}

async fn discard_temp(tmp: &Path) {
    if let Err(e) = remove_if_exists(tmp).await {
        warn!(path = %tmp.display(), error = %e, "Failed to remove temp file");
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::persistence(path, e)),
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::persistence(path, e)),
    }
}

fn render_thumbnail(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)?;
    let thumb = decoded.thumbnail(THUMBNAIL_MAX_EDGE, THUMBNAIL_MAX_EDGE);
    let mut out = Cursor::new(Vec::new());
    thumb.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, shade, shade]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
