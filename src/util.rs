//! Shared utility functions.

use std::time::Duration;

use tokio::task::spawn_blocking;
use tokio::time::timeout;

use crate::{Error, Result};

/// Run CPU-bound or blocking IO work (image decoding, zip writing) off the
/// async worker threads.
pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

pub async fn blocking_with_timeout<F, T>(duration: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match timeout(duration, spawn_blocking(f)).await {
        Ok(Ok(inner)) => inner,
        Ok(Err(join_err)) => Err(Error::TaskJoin(join_err.to_string())),
        Err(_) => Err(Error::Timeout(duration)),
    }
}

/// Strip an optional `data:<mime>;base64,` prefix from an encoded image.
pub fn strip_data_url(encoded: &str) -> &str {
    if encoded.starts_with("data:") {
        if let Some((_, payload)) = encoded.split_once(',') {
            return payload;
        }
    }
    encoded
}

/// Decode a list of base64 images, accepting data URLs.
pub fn decode_base64_images(encoded: &[String]) -> Result<Vec<Vec<u8>>> {
    use base64::Engine;

    encoded
        .iter()
        .enumerate()
        .map(|(i, item)| {
            base64::engine::general_purpose::STANDARD
                .decode(strip_data_url(item).trim())
                .map_err(|e| Error::Validation(format!("reference image {} is not valid base64: {}", i, e)))
        })
        .collect()
}

/// Short random task identifier of the form `task_<8 hex>`.
pub fn new_task_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("task_{}", &id[..8])
}
