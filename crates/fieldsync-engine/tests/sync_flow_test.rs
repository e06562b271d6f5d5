/*
[INPUT]:  Mock backend endpoints and synthetic collected tasks
[OUTPUT]: Verified end-to-end sequencing of uploads and record submission
[POS]:    Integration tests - full task pipeline against a mock server
[UPDATE]: When upload gating, merging or backoff behavior changes
*/

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use fieldsync_engine::{AttachmentError, TaskStore, TimingConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_attachments_upload_before_record() {
    let server = setup_mock_server().await;
    mount_upload_ok(&server).await;
    mount_record_ok(&server).await;

    let data_dir = tempfile::tempdir().expect("tempdir");
    let files_dir = tempfile::tempdir().expect("tempdir");
    let file_a = write_file(files_dir.path(), "a.jpg");
    let file_b = write_file(files_dir.path(), "b.jpg");

    let store = Arc::new(TaskStore::open(data_dir.path()).await.expect("open"));
    let manager = spawn_manager(&server, store);
    let mut snapshots = manager.subscribe();
    manager.start();

    let task_id = manager.create_task(new_task(&[&file_a, &file_b]));
    let done = wait_for_done(&mut snapshots, &task_id).await;

    // Upload results replaced the device paths in the record fields.
    assert_eq!(done.fields["photo-0"], CDN_URL);
    assert_eq!(done.fields["photo-1"], CDN_URL);
    assert_eq!(done.fields["species"], "eucalyptus");

    // Every attachment request hit the wire before the record did.
    let requests = server.received_requests().await.expect("requests");
    let record_index = requests
        .iter()
        .position(|r| r.url.path() == "/api/records")
        .expect("record submitted");
    let upload_count = requests
        .iter()
        .take(record_index)
        .filter(|r| r.url.path() == "/api/attachments")
        .count();
    assert_eq!(upload_count, 2);
    assert_eq!(
        requests
            .iter()
            .filter(|r| r.url.path() == "/api/records")
            .count(),
        1
    );

    manager.shutdown();
}

#[tokio::test]
async fn test_missing_attachment_omits_field_but_record_ships() {
    let server = setup_mock_server().await;
    mount_upload_ok(&server).await;
    mount_record_ok(&server).await;

    let data_dir = tempfile::tempdir().expect("tempdir");
    let files_dir = tempfile::tempdir().expect("tempdir");
    let file_a = write_file(files_dir.path(), "a.jpg");

    let store = Arc::new(TaskStore::open(data_dir.path()).await.expect("open"));
    let manager = spawn_manager(&server, store);
    let mut snapshots = manager.subscribe();
    manager.start();

    let task_id = manager.create_task(new_task(&[&file_a, "/nonexistent/gone.jpg"]));
    let done = wait_for_done(&mut snapshots, &task_id).await;

    // The uploaded file landed in the record; the vanished one was dropped.
    assert_eq!(done.fields["photo-0"], CDN_URL);
    assert!(!done.fields.contains_key("photo-1"));

    // The failure stays visible on the task for the UI.
    let failed = done
        .attachments
        .values()
        .find(|a| a.field_id == "photo-1")
        .expect("attachment kept");
    assert_eq!(failed.error, Some(AttachmentError::NotFound));

    manager.shutdown();
}

#[tokio::test]
async fn test_record_submission_backs_off_and_recovers() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/api/records"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_record_ok(&server).await;

    let data_dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(TaskStore::open(data_dir.path()).await.expect("open"));
    let manager = spawn_manager(&server, store);
    let mut snapshots = manager.subscribe();
    manager.start();

    let task_id = manager.create_task(new_task(&[]));
    let done = wait_for_done(&mut snapshots, &task_id).await;

    assert_eq!(done.retries, 2);
    assert!(done.error.is_none());
    assert!(done.result.is_some());

    manager.shutdown();
}

#[tokio::test]
async fn test_manual_retry_short_circuits_submission_backoff() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/api/records"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_record_ok(&server).await;

    let data_dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(TaskStore::open(data_dir.path()).await.expect("open"));

    // Backoff far longer than the completion timeout below: the task can
    // only finish in time if the explicit retry cuts the delay short.
    let timing = TimingConfig {
        attachment_retry_ms: 25,
        backoff_base_ms: 60_000,
        backoff_cap_ms: 60_000,
    };
    let manager = spawn_manager_with_timing(&server, store, timing);
    let mut snapshots = manager.subscribe();
    manager.start();

    let task_id = manager.create_task(new_task(&[]));

    // Wait for the failed first submission to land the task in backoff.
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let task = snapshots.recv().await.expect("snapshot");
            if task.id == task_id && task.retries >= 1 {
                return;
            }
        }
    })
    .await
    .expect("submission never failed");

    manager
        .task_handle(&task_id)
        .expect("live task handle")
        .retry();

    let done = wait_for_done(&mut snapshots, &task_id).await;
    assert_eq!(done.retries, 1);
    assert!(done.result.is_some());

    manager.shutdown();
}

#[tokio::test]
async fn test_already_remote_attachment_skips_upload() {
    let server = setup_mock_server().await;
    // No attachment mock mounted: any upload attempt would fail the record
    // expectation below by keeping the task pending.
    mount_record_ok(&server).await;

    let data_dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(TaskStore::open(data_dir.path()).await.expect("open"));
    let manager = spawn_manager(&server, store);
    let mut snapshots = manager.subscribe();
    manager.start();

    let task_id = manager.create_task(new_task(&["https://cdn.example.com/prior.jpg"]));
    let done = wait_for_done(&mut snapshots, &task_id).await;

    assert_eq!(done.fields["photo-0"], "https://cdn.example.com/prior.jpg");
    let requests = server.received_requests().await.expect("requests");
    assert!(requests.iter().all(|r| r.url.path() != "/api/attachments"));

    manager.shutdown();
}

#[tokio::test]
async fn test_manual_attachment_retry_after_file_restored() {
    let server = setup_mock_server().await;
    // Uploads fail for a while so the queue stays open long enough for the
    // manual retry to land before the gate closes.
    Mock::given(method("POST"))
        .and(path("/api/attachments"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(20)
        .mount(&server)
        .await;
    mount_upload_ok(&server).await;
    mount_record_ok(&server).await;

    let data_dir = tempfile::tempdir().expect("tempdir");
    let files_dir = tempfile::tempdir().expect("tempdir");
    let file_a = write_file(files_dir.path(), "a.jpg");
    let late_path = files_dir.path().join("late.jpg");
    let late = late_path.to_str().expect("utf-8 path").to_string();

    let store = Arc::new(TaskStore::open(data_dir.path()).await.expect("open"));
    let manager = spawn_manager(&server, store);
    let mut snapshots = manager.subscribe();
    manager.start();

    let task_id = manager.create_task(new_task(&[&file_a, &late]));

    // Wait until the missing file is reported unrecoverable.
    let failed_id = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let task = snapshots.recv().await.expect("snapshot");
            if task.id != task_id {
                continue;
            }
            if let Some(attachment) = task
                .attachments
                .values()
                .find(|a| a.error == Some(AttachmentError::NotFound))
            {
                return attachment.id.clone();
            }
        }
    })
    .await
    .expect("missing file never reported");

    // The file shows up after all; ask for a retry.
    std::fs::write(&late_path, b"pixels").expect("write late file");
    manager
        .task_handle(&task_id)
        .expect("live task handle")
        .retry_attachment(&failed_id);

    let done = wait_for_done(&mut snapshots, &task_id).await;
    assert_eq!(done.fields["photo-0"], CDN_URL);
    assert_eq!(done.fields["photo-1"], CDN_URL);
    assert!(done.attachments.values().all(|a| a.is_done()));

    manager.shutdown();
}
