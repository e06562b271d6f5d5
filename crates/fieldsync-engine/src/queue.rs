/*
[INPUT]:  A task's attachment set, start/retry signals, worker notices
[OUTPUT]: Per-attachment snapshots and a completion notice once all settle
[POS]:    Execution layer - upload queue gating data submission
[UPDATE]: When the completion gate or fan-out semantics change
*/

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use fieldsync_api::SyncClient;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::model::{Attachment, AttachmentState};
use crate::worker::{UploadWorker, WorkerHandle, WorkerNotice};

/// Signals accepted by an upload queue
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// Spawn workers for every attachment and start them
    Start,
    /// Re-start one attachment's worker (after a permanent failure)
    Retry { attachment_id: String },
}

/// Notices a queue reports to its owning submission machine
#[derive(Debug, Clone)]
pub enum QueueNotice {
    /// One attachment changed (state, progress, error or result)
    AttachmentUpdate { attachment: Attachment },
    /// Every attachment settled; the final map is the merge input
    Completed {
        attachments: HashMap<String, Attachment>,
    },
}

/// Cloneable address of a running queue
#[derive(Debug, Clone)]
pub struct QueueHandle {
    events: mpsc::UnboundedSender<QueueEvent>,
}

impl QueueHandle {
    pub fn start(&self) {
        let _ = self.events.send(QueueEvent::Start);
    }

    pub fn retry(&self, attachment_id: &str) {
        let _ = self.events.send(QueueEvent::Retry {
            attachment_id: attachment_id.to_string(),
        });
    }
}

/// Fans one task's attachments out to upload workers and holds the gate.
///
/// An attachment is settled when it is uploaded or when its failure is
/// permanent (the local file vanished). Only once every attachment settles
/// does the queue emit Completed, which is what clears the submission
/// machine to send structured data.
pub struct UploadQueue {
    task_id: String,
    attachments: HashMap<String, Attachment>,
    client: SyncClient,
    retry_delay: Duration,
    events: mpsc::UnboundedReceiver<QueueEvent>,
    notices: mpsc::UnboundedSender<QueueNotice>,
    shutdown: CancellationToken,
}

impl UploadQueue {
    pub fn spawn(
        task_id: String,
        attachments: HashMap<String, Attachment>,
        client: SyncClient,
        retry_delay: Duration,
        notices: mpsc::UnboundedSender<QueueNotice>,
        shutdown: CancellationToken,
    ) -> QueueHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            task_id,
            attachments,
            client,
            retry_delay,
            events: rx,
            notices,
            shutdown,
        };
        tokio::spawn(queue.run());
        QueueHandle { events: tx }
    }

    async fn run(mut self) {
        // idle until the machine starts us
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                event = self.events.recv() => {
                    match event {
                        Some(QueueEvent::Start) => break,
                        Some(QueueEvent::Retry { .. }) => continue,
                        None => return,
                    }
                }
            }
        }

        let total = self.attachments.len();
        if total == 0 {
            let _ = self.notices.send(QueueNotice::Completed {
                attachments: HashMap::new(),
            });
            return;
        }

        let (worker_tx, mut worker_rx) = mpsc::unbounded_channel();
        let mut workers: HashMap<String, WorkerHandle> = HashMap::new();
        for attachment in self.attachments.values() {
            let handle = UploadWorker::spawn(
                attachment.clone(),
                self.client.clone(),
                self.retry_delay,
                worker_tx.clone(),
                self.shutdown.child_token(),
            );
            handle.start();
            workers.insert(attachment.id.clone(), handle);
        }

        tracing::debug!(
            task_id = %self.task_id,
            attachments = total,
            "upload queue started"
        );

        let mut done: HashSet<String> = HashSet::new();
        let mut permanent: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                event = self.events.recv() => {
                    match event {
                        Some(QueueEvent::Start) => {}
                        Some(QueueEvent::Retry { attachment_id }) => {
                            if let Some(handle) = workers.get(&attachment_id) {
                                permanent.remove(&attachment_id);
                                handle.start();
                            }
                        }
                        None => return,
                    }
                }
                notice = worker_rx.recv() => {
                    let Some(notice) = notice else { return };
                    self.apply(notice, &mut done, &mut permanent);

                    if done.len() + permanent.len() >= total {
                        tracing::debug!(
                            task_id = %self.task_id,
                            uploaded = done.len(),
                            unrecoverable = permanent.len(),
                            "all attachments settled"
                        );
                        let _ = self.notices.send(QueueNotice::Completed {
                            attachments: self.attachments.clone(),
                        });
                        return;
                    }
                }
            }
        }
    }

    /// Fold one worker notice into the attachment snapshot and relay it.
    fn apply(
        &mut self,
        notice: WorkerNotice,
        done: &mut HashSet<String>,
        permanent: &mut HashSet<String>,
    ) {
        let attachment_id = match &notice {
            WorkerNotice::Started { attachment_id }
            | WorkerNotice::Progress { attachment_id, .. }
            | WorkerNotice::Failed { attachment_id, .. }
            | WorkerNotice::Done { attachment_id, .. } => attachment_id.clone(),
        };
        let Some(attachment) = self.attachments.get_mut(&attachment_id) else {
            return;
        };

        match notice {
            WorkerNotice::Started { .. } => {
                attachment.state = AttachmentState::Uploading;
                attachment.error = None;
            }
            WorkerNotice::Progress { percent, .. } => {
                attachment.progress = attachment.progress.max(percent);
            }
            WorkerNotice::Failed { error, .. } => {
                if error.is_permanent() {
                    permanent.insert(attachment_id);
                }
                attachment.state = AttachmentState::Pending;
                attachment.error = Some(error);
            }
            WorkerNotice::Done { remote_ref, .. } => {
                attachment.state = AttachmentState::Done;
                attachment.progress = 100;
                attachment.result = Some(remote_ref);
                attachment.error = None;
                done.insert(attachment_id);
            }
        }

        let _ = self.notices.send(QueueNotice::AttachmentUpdate {
            attachment: attachment.clone(),
        });
    }
}
