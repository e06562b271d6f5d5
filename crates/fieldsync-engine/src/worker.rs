/*
[INPUT]:  One attachment snapshot, start/retry signals from the queue
[OUTPUT]: Started/Progress/Error/Done notices, uploaded file on the backend
[POS]:    Execution layer - per-attachment upload worker actor
[UPDATE]: When upload retry semantics or progress reporting change
*/

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use fieldsync_api::{SyncClient, UploadFileRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::model::{Attachment, AttachmentError, AttachmentState};

/// Signals accepted by an upload worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Begin (or immediately re-attempt) the upload
    Start,
}

/// Notices a worker reports to its owning queue
#[derive(Debug, Clone)]
pub enum WorkerNotice {
    Started { attachment_id: String },
    Progress { attachment_id: String, percent: u8 },
    Failed { attachment_id: String, error: AttachmentError },
    Done { attachment_id: String, remote_ref: String },
}

/// Cloneable address of a running worker
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHandle {
    pub fn start(&self) {
        let _ = self.events.send(WorkerEvent::Start);
    }
}

/// Uploads one attachment, retrying forever on transport errors.
///
/// Lifecycle: idle until the first Start, then uploading; a transport error
/// re-enters uploading after a fixed delay (a Start signal short-circuits
/// it); a missing local file is permanent and waits for an explicit Start;
/// uploaded is terminal for the worker's lifetime.
pub struct UploadWorker {
    attachment: Attachment,
    client: SyncClient,
    retry_delay: Duration,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    notices: mpsc::UnboundedSender<WorkerNotice>,
    shutdown: CancellationToken,
}

impl UploadWorker {
    pub fn spawn(
        attachment: Attachment,
        client: SyncClient,
        retry_delay: Duration,
        notices: mpsc::UnboundedSender<WorkerNotice>,
        shutdown: CancellationToken,
    ) -> WorkerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self {
            attachment,
            client,
            retry_delay,
            events: rx,
            notices,
            shutdown,
        };
        tokio::spawn(worker.run());
        WorkerHandle { events: tx }
    }

    async fn run(mut self) {
        let attachment_id = self.attachment.id.clone();

        loop {
            // idle: wait for a start signal
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                event = self.events.recv() => {
                    if event.is_none() {
                        return;
                    }
                }
            }

            // uploading, with automatic retry on transport errors
            loop {
                // Restored attachments that already finished route straight
                // to uploaded without touching disk or network.
                if self.attachment.state == AttachmentState::Done {
                    if let Some(result) = self.attachment.result.clone() {
                        self.notify_progress(100);
                        self.notify_done(result);
                        return self.absorb_remaining().await;
                    }
                }

                self.notify(WorkerNotice::Started {
                    attachment_id: attachment_id.clone(),
                });

                match self.attempt().await {
                    Ok(remote_ref) => {
                        tracing::info!(
                            attachment_id = %attachment_id,
                            task_id = %self.attachment.task_id,
                            "attachment uploaded"
                        );
                        self.notify_done(remote_ref);
                        return self.absorb_remaining().await;
                    }
                    Err(error) if error.is_permanent() => {
                        tracing::warn!(
                            attachment_id = %attachment_id,
                            task_id = %self.attachment.task_id,
                            uri = %self.attachment.uri,
                            "local file missing; upload cannot recover"
                        );
                        self.notify(WorkerNotice::Failed {
                            attachment_id: attachment_id.clone(),
                            error,
                        });
                        // no automatic retry; back to idle for explicit starts
                        break;
                    }
                    Err(error) => {
                        tracing::warn!(
                            attachment_id = %attachment_id,
                            task_id = %self.attachment.task_id,
                            error = %error,
                            retry_in_ms = self.retry_delay.as_millis() as u64,
                            "attachment upload failed; will retry"
                        );
                        self.notify(WorkerNotice::Failed {
                            attachment_id: attachment_id.clone(),
                            error,
                        });

                        tokio::select! {
                            _ = self.shutdown.cancelled() => return,
                            _ = tokio::time::sleep(self.retry_delay) => {}
                            event = self.events.recv() => {
                                if event.is_none() {
                                    return;
                                }
                                // explicit start short-circuits the delay
                            }
                        }
                    }
                }
            }
        }
    }

    /// One upload attempt, from scratch (no partial-byte resume).
    async fn attempt(&self) -> Result<String, AttachmentError> {
        // Already-remote URLs were uploaded in a prior session and only need
        // to be carried through.
        if self.attachment.is_remote() {
            self.notify_progress(100);
            return Ok(self.attachment.uri.clone());
        }

        let path = Path::new(&self.attachment.uri);
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(AttachmentError::NotFound);
        }

        let request = UploadFileRequest {
            file_path: PathBuf::from(&self.attachment.uri),
            file_name: self.attachment.file_name.clone(),
            content_type: self.attachment.content_type.clone(),
            project_id: self.attachment.project_id.clone(),
            client_id: self.attachment.client_id.clone(),
        };

        // Monotone progress gate: uploads restart from zero on retry, so only
        // forward increases within one attempt.
        let notices = self.notices.clone();
        let attachment_id = self.attachment.id.clone();
        let highest = Arc::new(AtomicU8::new(0));
        let progress = move |percent: u8| {
            let previous = highest.fetch_max(percent, Ordering::Relaxed);
            if percent > previous {
                let _ = notices.send(WorkerNotice::Progress {
                    attachment_id: attachment_id.clone(),
                    percent,
                });
            }
        };

        let response = self
            .client
            .upload_attachment(&request, progress)
            .await
            .map_err(|err| AttachmentError::Transport(err.to_string()))?;

        // The file is durable server-side now; removal is best-effort.
        if let Err(err) = tokio::fs::remove_file(path).await {
            tracing::warn!(
                attachment_id = %self.attachment.id,
                uri = %self.attachment.uri,
                error = %err,
                "failed to remove uploaded file"
            );
        }

        Ok(response.url)
    }

    /// Terminal: keep answering start signals without re-uploading.
    async fn absorb_remaining(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                event = self.events.recv() => {
                    if event.is_none() {
                        return;
                    }
                    tracing::debug!(
                        attachment_id = %self.attachment.id,
                        "start signal after upload completed; ignoring"
                    );
                }
            }
        }
    }

    fn notify_progress(&self, percent: u8) {
        self.notify(WorkerNotice::Progress {
            attachment_id: self.attachment.id.clone(),
            percent,
        });
    }

    fn notify_done(&self, remote_ref: String) {
        self.notify(WorkerNotice::Done {
            attachment_id: self.attachment.id.clone(),
            remote_ref,
        });
    }

    fn notify(&self, notice: WorkerNotice) {
        let _ = self.notices.send(notice);
    }
}
