/*
[INPUT]:  One task, retry signals, queue notices, submission responses
[OUTPUT]: Task snapshots to the manager, the record submitted to the backend
[POS]:    Execution layer - per-task submission state machine
[UPDATE]: When task sequencing, merging or backoff rules change
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fieldsync_api::{SubmitRecordRequest, SyncClient};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::TimingConfig;
use crate::model::{Attachment, Task, TaskState};
use crate::queue::{QueueNotice, UploadQueue};
use crate::store::TaskStore;

/// Signals accepted by a submission machine
#[derive(Debug, Clone)]
pub enum SubmissionEvent {
    /// Skip the current backoff delay and re-submit now
    Retry,
    /// Re-start one attachment upload (after a permanent failure)
    RetryAttachment { attachment_id: String },
}

/// Notices a machine reports to the task manager
#[derive(Debug, Clone)]
pub enum ManagerNotice {
    /// Record submission began
    TaskStarted(Box<Task>),
    /// Attachment progress or a retryable failure changed the snapshot
    TaskProgress(Box<Task>),
    /// The record is durable server-side; the machine is exiting
    TaskDone(Box<Task>),
}

/// Caller-facing address of a running submission machine
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub(crate) events: mpsc::UnboundedSender<SubmissionEvent>,
}

impl TaskHandle {
    /// Cut the current submission backoff short.
    pub fn retry(&self) {
        let _ = self.events.send(SubmissionEvent::Retry);
    }

    /// Re-attempt one attachment that failed permanently.
    pub fn retry_attachment(&self, attachment_id: &str) {
        let _ = self.events.send(SubmissionEvent::RetryAttachment {
            attachment_id: attachment_id.to_string(),
        });
    }
}

/// Manager-facing handle: the event sender plus the machine's kill switch.
#[derive(Debug, Clone)]
pub(crate) struct MachineHandle {
    pub(crate) events: mpsc::UnboundedSender<SubmissionEvent>,
    pub(crate) shutdown: CancellationToken,
}

/// Exponential submission backoff: base * 2^retries, capped.
pub fn backoff_delay(base_ms: u64, cap_ms: u64, retries: u32) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << retries.min(31));
    Duration::from_millis(exp.min(cap_ms))
}

/// Drives one task from pending through attachment uploads to submission.
///
/// The machine is strictly sequential: the upload queue must report every
/// attachment settled before the structured record leaves the device. Upload
/// results are merged into the record's fields first, so the backend sees
/// remote references instead of device paths.
pub struct SubmissionMachine {
    task: Task,
    client: SyncClient,
    store: Arc<TaskStore>,
    timing: TimingConfig,
    events: mpsc::UnboundedReceiver<SubmissionEvent>,
    notices: mpsc::UnboundedSender<ManagerNotice>,
    shutdown: CancellationToken,
}

impl SubmissionMachine {
    pub(crate) fn spawn(
        task: Task,
        client: SyncClient,
        store: Arc<TaskStore>,
        timing: TimingConfig,
        notices: mpsc::UnboundedSender<ManagerNotice>,
        shutdown: CancellationToken,
    ) -> MachineHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let machine = Self {
            task,
            client,
            store,
            timing,
            events: rx,
            notices,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(machine.run());
        MachineHandle {
            events: tx,
            shutdown,
        }
    }

    async fn run(mut self) {
        if self.task.is_done() {
            // Restored completed task: report and exit without re-submitting.
            self.notify(ManagerNotice::TaskDone(Box::new(self.task.clone())));
            return;
        }

        tracing::info!(
            task_id = %self.task.id,
            attachments = self.task.attachments.len(),
            "submission machine started"
        );

        self.task.state = TaskState::Pending;
        self.persist().await;
        self.notify(ManagerNotice::TaskProgress(Box::new(self.task.clone())));

        let Some(settled) = self.drive_uploads().await else {
            return; // shut down mid-upload
        };
        self.merge_upload_results(settled);
        self.persist().await;

        self.submit_record().await;
    }

    /// Run the upload queue to completion, relaying progress upward.
    ///
    /// Returns the settled attachment map, or None on shutdown.
    async fn drive_uploads(&mut self) -> Option<HashMap<String, Attachment>> {
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
        let queue = UploadQueue::spawn(
            self.task.id.clone(),
            self.task.attachments.clone(),
            self.client.clone(),
            self.timing.attachment_retry(),
            queue_tx,
            self.shutdown.child_token(),
        );
        queue.start();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                event = self.events.recv() => {
                    match event {
                        Some(SubmissionEvent::RetryAttachment { attachment_id }) => {
                            queue.retry(&attachment_id);
                        }
                        Some(SubmissionEvent::Retry) => {}
                        None => return None,
                    }
                }
                notice = queue_rx.recv() => {
                    match notice {
                        Some(QueueNotice::AttachmentUpdate { attachment }) => {
                            let state_changed = self
                                .task
                                .attachments
                                .get(&attachment.id)
                                .map(|prev| prev.state != attachment.state)
                                .unwrap_or(true);
                            self.task
                                .attachments
                                .insert(attachment.id.clone(), attachment);
                            if state_changed {
                                self.persist().await;
                            }
                            self.notify(ManagerNotice::TaskProgress(Box::new(self.task.clone())));
                        }
                        Some(QueueNotice::Completed { attachments }) => {
                            self.task.attachments = attachments.clone();
                            return Some(attachments);
                        }
                        None => return None,
                    }
                }
            }
        }
    }

    /// Replace device file paths in the record's fields with remote
    /// references. Attachments whose local file vanished are dropped from
    /// the record but stay visible on the task.
    fn merge_upload_results(&mut self, settled: HashMap<String, Attachment>) {
        for attachment in settled.values() {
            if let Some(remote_ref) = &attachment.result {
                self.task.fields.insert(
                    attachment.field_id.clone(),
                    serde_json::Value::String(remote_ref.clone()),
                );
            } else {
                tracing::warn!(
                    task_id = %self.task.id,
                    attachment_id = %attachment.id,
                    field_id = %attachment.field_id,
                    "attachment unrecoverable; omitting field from record"
                );
                self.task.fields.remove(&attachment.field_id);
            }
        }
    }

    /// Submit the structured record, backing off exponentially on failure.
    async fn submit_record(&mut self) {
        loop {
            self.task.state = TaskState::Uploading;
            self.task.error = None;
            self.persist().await;
            self.notify(ManagerNotice::TaskStarted(Box::new(self.task.clone())));

            let request = SubmitRecordRequest::new(
                self.task.project_id.clone(),
                self.task.client_id.clone(),
                self.task.is_mocked,
                self.task.collected_at,
                self.task.geometry.as_ref(),
                self.task.fields.clone(),
            );

            match self.client.submit_record(&request).await {
                Ok(response) => {
                    tracing::info!(
                        task_id = %self.task.id,
                        record_id = %response.id,
                        retries = self.task.retries,
                        "record submitted"
                    );
                    self.task.state = TaskState::Done;
                    self.task.result = serde_json::to_value(&response).ok();
                    self.task.error = None;
                    self.persist().await;
                    self.notify(ManagerNotice::TaskDone(Box::new(self.task.clone())));
                    return;
                }
                Err(err) => {
                    // Delay derives from the pre-increment retry count.
                    let delay = backoff_delay(
                        self.timing.backoff_base_ms,
                        self.timing.backoff_cap_ms,
                        self.task.retries,
                    );
                    self.task.retries += 1;
                    self.task.state = TaskState::Pending;
                    self.task.error = Some(err.to_string());
                    tracing::warn!(
                        task_id = %self.task.id,
                        retries = self.task.retries,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "record submission failed; backing off"
                    );
                    self.persist().await;
                    self.notify(ManagerNotice::TaskProgress(Box::new(self.task.clone())));

                    tokio::select! {
                        _ = self.shutdown.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                        event = self.events.recv() => {
                            match event {
                                Some(SubmissionEvent::Retry) => {
                                    tracing::debug!(task_id = %self.task.id, "manual retry");
                                }
                                Some(SubmissionEvent::RetryAttachment { .. }) => {}
                                None => return,
                            }
                        }
                    }
                }
            }
        }
    }

    /// Checkpoint the task. A failed write is logged, never fatal; the next
    /// transition writes again.
    async fn persist(&self) {
        if let Err(err) = self.store.upsert(self.task.clone()).await {
            tracing::warn!(
                task_id = %self.task.id,
                error = %err,
                "failed to persist task"
            );
        }
    }

    fn notify(&self, notice: ManagerNotice) {
        let _ = self.notices.send(notice);
    }
}
