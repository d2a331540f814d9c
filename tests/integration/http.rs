//! HTTP route tests against a loopback listener.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use pageforge::providers::ProviderConfigStore;
use pageforge::server::{router, AppState};
use pageforge::sse::parse_frames;

use crate::fixtures::{default_image, marker, rate_limited, Harness, ScriptedProvider};

/// A running server plus the directory holding its providers file.
struct TestServer {
    base: String,
    _config_dir: TempDir,
}

impl TestServer {
    async fn start(harness: &Harness) -> Self {
        let config_dir = TempDir::new().expect("Failed to create temp directory");
        let providers = Arc::new(ProviderConfigStore::new(
            config_dir.path().join("image_providers.yaml"),
        ));
        let state = Arc::new(AppState::new(harness.orchestrator.clone(), providers));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        Self {
            base: format!("http://{}", addr),
            _config_dir: config_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

fn page_json(index: usize) -> Value {
    json!({ "index": index, "type": "content", "content": marker(index) })
}

async fn generate_over_http(client: &reqwest::Client, server: &TestServer, task_id: &str, indices: &[usize]) -> String {
    let pages: Vec<Value> = indices.iter().copied().map(page_json).collect();
    client
        .post(server.url("/api/generate"))
        .json(&json!({ "task_id": task_id, "pages": pages, "full_outline": "outline" }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
}

/// Test: Generate over SSE
/// Given a request without a task id
/// When it is posted to /api/generate
/// Then an event stream with the SSE headers ends in done for a fresh task id
#[tokio::test]
async fn test_generate_streams_events() {
    let harness = Harness::new(ScriptedProvider::new());
    let server = TestServer::start(&harness).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/api/generate"))
        .json(&json!({ "pages": [page_json(0), page_json(1)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");

    let frames = parse_frames(&response.text().await.unwrap());
    let (name, data) = frames.last().unwrap();
    assert_eq!(name, "done");
    assert_eq!(data["success_count"], 2);
    let task_id = data["task_id"].as_str().unwrap();
    assert!(task_id.starts_with("task_"));

    let image_url = frames
        .iter()
        .find(|(name, _)| name == "page_complete")
        .map(|(_, data)| data["image_url"].as_str().unwrap().to_string())
        .unwrap();
    assert!(image_url.starts_with(&format!("/api/images/{}/", task_id)));
}

/// Test: Validation status
/// Given an empty page list
/// When it is posted to /api/generate
/// Then the response is 400 with an error envelope
#[tokio::test]
async fn test_generate_rejects_empty_pages() {
    let harness = Harness::new(ScriptedProvider::new());
    let server = TestServer::start(&harness).await;

    let response = reqwest::Client::new()
        .post(server.url("/api/generate"))
        .json(&json!({ "task_id": "t1", "pages": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("pages"));
}

/// Test: Task state
/// Given one generated task
/// When known and unknown tasks are queried
/// Then the known one returns its state and the unknown one 404
#[tokio::test]
async fn test_task_state_route() {
    let harness = Harness::new(ScriptedProvider::new());
    let server = TestServer::start(&harness).await;
    let client = reqwest::Client::new();
    generate_over_http(&client, &server, "t1", &[0]).await;

    let body: Value = client
        .get(server.url("/api/task/t1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["state"]["generated"]["0"]["filename"], "0.png");

    let missing = client.get(server.url("/api/task/nope")).send().await.unwrap();
    assert_eq!(missing.status(), 404);
}

/// Test: Image route
/// Given page 0 on disk
/// When it and a missing page are requested
/// Then the bytes are served as PNG and the missing one is 404
#[tokio::test]
async fn test_image_route() {
    let harness = Harness::new(ScriptedProvider::new());
    let server = TestServer::start(&harness).await;
    let client = reqwest::Client::new();
    generate_over_http(&client, &server, "t1", &[0]).await;

    let response = client
        .get(server.url("/api/images/t1/0.png?thumbnail=false"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.bytes().await.unwrap().to_vec(), default_image(0));

    let missing = client
        .get(server.url("/api/images/t1/7.png"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["success"], false);
}

/// Test: Retry route
/// Given page 1 failed and keeps failing once more
/// When /api/retry is posted twice
/// Then the first answer is 500 with the reason and the second succeeds
#[tokio::test]
async fn test_retry_route() {
    let provider = ScriptedProvider::new();
    provider.fail(1, rate_limited()).fail(1, rate_limited());
    let harness = Harness::new(provider);
    let server = TestServer::start(&harness).await;
    let client = reqwest::Client::new();
    generate_over_http(&client, &server, "t1", &[0, 1]).await;

    let body = json!({ "task_id": "t1", "page": page_json(1) });
    let first = client.post(server.url("/api/retry")).json(&body).send().await.unwrap();
    assert_eq!(first.status(), 500);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["success"], false);
    assert_eq!(first["reason"], "rate_limited");
    assert_eq!(first["retryable"], true);

    let second = client.post(server.url("/api/retry")).json(&body).send().await.unwrap();
    assert_eq!(second.status(), 200);
    let second: Value = second.json().await.unwrap();
    assert_eq!(second["image_url"], "/api/images/t1/1.png");
}

/// Test: Regenerate route
/// Given a generated page
/// When /api/regenerate is posted
/// Then the page is replaced and reported
#[tokio::test]
async fn test_regenerate_route() {
    let provider = ScriptedProvider::new();
    let harness = Harness::new(provider.clone());
    let server = TestServer::start(&harness).await;
    let client = reqwest::Client::new();
    generate_over_http(&client, &server, "t1", &[0]).await;
    provider.succeed_with(0, b"fresh".to_vec());

    let response = client
        .post(server.url("/api/regenerate"))
        .json(&json!({ "task_id": "t1", "page": page_json(0), "use_reference": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        harness.orchestrator.images().load_page("t1", 0).await.unwrap(),
        b"fresh".to_vec()
    );
}

/// Test: Archive download
/// Given a generated task
/// When it is downloaded with a title
/// Then a ZIP attachment named after the title is returned
#[tokio::test]
async fn test_download_route() {
    let harness = Harness::new(ScriptedProvider::new());
    let server = TestServer::start(&harness).await;
    let client = reqwest::Client::new();
    generate_over_http(&client, &server, "t1", &[0, 1]).await;

    let response = client
        .get(server.url("/api/tasks/t1/download"))
        .query(&[("title", "Spring Trip!")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"Spring Trip.zip\""
    );
    let bytes = response.bytes().await.unwrap();
    let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 2);

    let missing = client
        .get(server.url("/api/tasks/nope/download"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

/// Test: Scan route
/// Given a task directory with pages 0 and 2
/// When it is scanned expecting three pages
/// Then page 1 is reported missing
#[tokio::test]
async fn test_scan_route() {
    let harness = Harness::new(ScriptedProvider::new());
    let server = TestServer::start(&harness).await;
    let client = reqwest::Client::new();
    generate_over_http(&client, &server, "t1", &[0, 2]).await;

    let body: Value = client
        .post(server.url("/api/tasks/t1/scan?pages=3"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["report"]["generated"], json!([0, 2]));
    assert_eq!(body["report"]["missing"], json!([1]));
    assert_eq!(body["report"]["installed"], false);
}

/// Test: Provider configuration
/// Given a config update with an API key
/// When the configuration is read back
/// Then the key is masked and a blank key on update keeps the stored one
#[tokio::test]
async fn test_config_routes_mask_keys() {
    let harness = Harness::new(ScriptedProvider::new());
    let server = TestServer::start(&harness).await;
    let client = reqwest::Client::new();

    let update = json!({
        "image_generation": {
            "active_provider": "studio",
            "providers": {
                "studio": { "type": "image_api", "api_key": "sk-1234567890", "model": "img-1" }
            }
        }
    });
    let response = client.post(server.url("/api/config")).json(&update).send().await.unwrap();
    assert_eq!(response.status(), 200);

    let blank_key = json!({
        "image_generation": {
            "providers": { "studio": { "type": "image_api", "api_key": "", "model": "img-2" } }
        }
    });
    client.post(server.url("/api/config")).json(&blank_key).send().await.unwrap();

    let text = client
        .get(server.url("/api/config"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(!text.contains("sk-1234567890"));
    let body: Value = serde_json::from_str(&text).unwrap();
    let studio = &body["config"]["image_generation"]["providers"]["studio"];
    assert_eq!(body["config"]["image_generation"]["active_provider"], "studio");
    assert_eq!(studio["api_key_masked"], "sk-1*****7890");
    assert_eq!(studio["model"], "img-2");
}

/// Test: Health
#[tokio::test]
async fn test_health_route() {
    let harness = Harness::new(ScriptedProvider::new());
    let server = TestServer::start(&harness).await;
    let body: Value = reqwest::get(server.url("/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "ok");
}
