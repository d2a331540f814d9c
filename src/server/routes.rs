use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::dto::{
    into_pages, ConfigBody, DownloadQuery, GenerateBody, ImageQuery, RegenerateBody,
    RetryBody, RetryFailedBody, ScanQuery,
};
use super::error::ApiResult;
use super::AppState;
use crate::orchestration::{image_url, EventStream, GenerateRequest, PageOutcome};
use crate::sse;
use crate::storage::{archive_file_name, build_archive, scan_all, scan_task};
use crate::util::{blocking, blocking_with_timeout, decode_base64_images, new_task_id};
use crate::Error;

const CONFIG_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/retry", post(retry))
        .route("/api/retry-failed", post(retry_failed))
        .route("/api/regenerate", post(regenerate))
        .route("/api/task/{task_id}", get(task_state))
        .route("/api/images/{task_id}/{filename}", get(image))
        .route("/api/tasks/scan-all", post(scan_everything))
        .route("/api/tasks/{task_id}/download", get(download))
        .route("/api/tasks/{task_id}/scan", post(scan))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/health", get(health))
        .with_state(state)
}

fn sse_response(events: EventStream) -> Response {
    let body = Body::from_stream(sse::frame_stream(events));
    (
        [
            (header::CONTENT_TYPE, sse::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}

fn outcome_response(task_id: &str, outcome: PageOutcome) -> Response {
    match outcome {
        PageOutcome::Generated { index, filename } => Json(json!({
            "success": true,
            "index": index,
            "image_url": image_url(task_id, &filename),
        }))
        .into_response(),
        PageOutcome::Failed { index, error } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "index": index,
                "error": error.to_string(),
                "reason": error.reason(),
                "retryable": error.is_retryable(),
            })),
        )
            .into_response(),
    }
}

fn image_content_type(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        _ => "application/octet-stream",
    }
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> ApiResult<Response> {
    let task_id = body
        .task_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(new_task_id);
    let request = GenerateRequest {
        task_id,
        pages: into_pages(body.pages)?,
        full_outline: body.full_outline,
        user_images: decode_base64_images(&body.user_images)?,
        user_topic: body.user_topic,
    };
    let events = state.orchestrator.generate(request).await?;
    Ok(sse_response(events))
}

async fn retry(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RetryBody>,
) -> ApiResult<Response> {
    let page = body.page.into_page()?;
    let outcome = state
        .orchestrator
        .retry_single(&body.task_id, page, body.use_reference)
        .await?;
    Ok(outcome_response(&body.task_id, outcome))
}

async fn retry_failed(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RetryFailedBody>,
) -> ApiResult<Response> {
    let pages = into_pages(body.pages)?;
    let events = state.orchestrator.retry_failed(&body.task_id, pages).await?;
    Ok(sse_response(events))
}

async fn regenerate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegenerateBody>,
) -> ApiResult<Response> {
    let page = body.page.into_page()?;
    let outcome = state
        .orchestrator
        .regenerate(
            &body.task_id,
            page,
            body.use_reference,
            body.full_outline,
            body.user_topic,
        )
        .await?;
    Ok(outcome_response(&body.task_id, outcome))
}

async fn task_state(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let snapshot = state
        .orchestrator
        .get_task_state(&task_id)
        .await
        .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;
    Ok(Json(json!({ "success": true, "task_id": task_id, "state": snapshot })))
}

async fn image(
    State(state): State<Arc<AppState>>,
    Path((task_id, filename)): Path<(String, String)>,
    Query(query): Query<ImageQuery>,
) -> ApiResult<Response> {
    let bytes = state
        .orchestrator
        .images()
        .load(&task_id, &filename, query.thumbnail)
        .await?;
    Ok(([(header::CONTENT_TYPE, image_content_type(&filename))], bytes).into_response())
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let archive = build_archive(state.orchestrator.images(), &task_id).await?;
    let name = archive_file_name(query.title.as_deref().unwrap_or_default());
    info!(task_id = %task_id, bytes = archive.len(), file = %name, "Exporting archive");
    let disposition = format!("attachment; filename=\"{}\"", name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive,
    )
        .into_response())
}

async fn scan(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Query(query): Query<ScanQuery>,
) -> ApiResult<Json<Value>> {
    let report = scan_task(
        state.orchestrator.images(),
        state.orchestrator.store(),
        &task_id,
        query.pages,
    )
    .await?;
    Ok(Json(json!({ "success": true, "report": report })))
}

async fn scan_everything(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let reports = scan_all(state.orchestrator.images(), state.orchestrator.store()).await?;
    Ok(Json(json!({ "success": true, "reports": reports })))
}

async fn get_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let providers = Arc::clone(&state.providers);
    let masked = blocking(move || providers.masked()).await?;
    Ok(Json(json!({ "success": true, "config": { "image_generation": masked } })))
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConfigBody>,
) -> ApiResult<Json<Value>> {
    let Some(update) = body.image_generation else {
        return Err(Error::Validation("image_generation is required".to_string()).into());
    };
    let providers = Arc::clone(&state.providers);
    blocking_with_timeout(CONFIG_WRITE_TIMEOUT, move || providers.update(update)).await?;
    match &state.configured {
        Some(configured) => configured.reset(),
        None => warn!("Provider config updated but the active provider is fixed"),
    }
    info!("Provider configuration updated");
    Ok(Json(json!({ "success": true })))
}

async fn health() -> Json<Value> {
    Json(json!({ "success": true, "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}
