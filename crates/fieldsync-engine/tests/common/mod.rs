/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities, fixtures, and mock helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for fieldsync-engine tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fieldsync_api::{FieldValues, StaticTokenProvider, SyncClient};
use fieldsync_engine::{
    LogNotifier, ManagerHandle, NewAttachment, NewTask, Task, TaskManager, TaskStore, TimingConfig,
};
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CDN_URL: &str = "https://cdn.example.com/uploaded.jpg";

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Mount a POST /api/attachments mock that always succeeds
#[allow(dead_code)]
pub async fn mount_upload_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/attachments"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(r#"{{"id":"att-1","url":"{CDN_URL}"}}"#),
            "application/json",
        ))
        .mount(server)
        .await;
}

/// Mount a POST /api/records mock that always succeeds
#[allow(dead_code)]
pub async fn mount_record_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/records"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"id":"record-1","status":"accepted"}"#,
            "application/json",
        ))
        .mount(server)
        .await;
}

/// Retry timing shrunk so tests complete quickly
pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        attachment_retry_ms: 25,
        backoff_base_ms: 25,
        backoff_cap_ms: 200,
    }
}

/// Spawn a manager backed by the given store and mock server
pub fn spawn_manager(server: &MockServer, store: Arc<TaskStore>) -> ManagerHandle {
    spawn_manager_with_timing(server, store, fast_timing())
}

/// Spawn a manager with explicit retry timing
#[allow(dead_code)]
pub fn spawn_manager_with_timing(
    server: &MockServer,
    store: Arc<TaskStore>,
    timing: TimingConfig,
) -> ManagerHandle {
    let client = SyncClient::new(&server.uri(), Arc::new(StaticTokenProvider::new("token")))
        .expect("client init");
    TaskManager::spawn(
        store,
        client,
        timing,
        Arc::new(LogNotifier),
        "project-1",
        "device-9",
    )
}

/// Task input with one attachment per given uri, fields keyed photo-0..n
pub fn new_task(uris: &[&str]) -> NewTask {
    NewTask {
        fields: FieldValues::from([("species".to_string(), serde_json::json!("eucalyptus"))]),
        geometry: None,
        collected_at: Utc::now(),
        is_mocked: false,
        attachments: uris
            .iter()
            .enumerate()
            .map(|(i, uri)| NewAttachment {
                field_id: format!("photo-{i}"),
                uri: uri.to_string(),
                content_type: "image/jpeg".to_string(),
                file_name: format!("photo-{i}.jpg"),
            })
            .collect(),
    }
}

/// Write a small file and return its path as a string
#[allow(dead_code)]
pub fn write_file(dir: &Path, name: &str) -> String {
    let file_path = dir.join(name);
    std::fs::write(&file_path, b"pixels").expect("write test file");
    file_path.to_str().expect("utf-8 path").to_string()
}

/// Block until the given task reports done on the snapshot stream
pub async fn wait_for_done(rx: &mut broadcast::Receiver<Task>, task_id: &str) -> Task {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(task) if task.id == task_id && task.is_done() => return task,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("snapshot stream closed"),
            }
        }
    })
    .await
    .expect("task did not complete in time")
}
