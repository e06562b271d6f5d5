/*
[INPUT]:  Collected form data, attachment metadata, upload outcomes
[OUTPUT]: Task and Attachment records with lifecycle states
[POS]:    Domain model - the unit of persistence and reporting
[UPDATE]: When task/attachment lifecycle or persisted shape changes
*/

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use fieldsync_api::{FieldValues, Geometry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Task lifecycle state as persisted and reported to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Uploading,
    Done,
}

/// Attachment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentState {
    Pending,
    Uploading,
    Done,
}

/// Per-attachment upload failure.
///
/// `NotFound` is permanent: the local file is gone and no retry can recover
/// it. Everything else is a transport failure and retried on a timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AttachmentError {
    NotFound,
    Transport(String),
}

impl AttachmentError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, AttachmentError::NotFound)
    }
}

impl std::fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachmentError::NotFound => write!(f, "local file not found"),
            AttachmentError::Transport(message) => write!(f, "upload failed: {message}"),
        }
    }
}

/// Attachment input at task-creation time, straight from the form engine.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    /// Form field the file answers
    pub field_id: String,
    /// Local file path, or a remote URL for files uploaded in a prior session
    pub uri: String,
    pub content_type: String,
    pub file_name: String,
}

/// One file (photo/audio) belonging to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub task_id: String,
    pub project_id: String,
    pub client_id: String,
    pub field_id: String,
    pub uri: String,
    pub content_type: String,
    pub file_name: String,
    pub progress: u8,
    pub state: AttachmentState,
    /// Remote reference once uploaded; Some iff state is Done
    pub result: Option<String>,
    pub error: Option<AttachmentError>,
}

impl Attachment {
    pub fn new(task_id: &str, project_id: &str, client_id: &str, input: NewAttachment) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            project_id: project_id.to_string(),
            client_id: client_id.to_string(),
            field_id: input.field_id,
            uri: input.uri,
            content_type: input.content_type,
            file_name: input.file_name,
            progress: 0,
            state: AttachmentState::Pending,
            result: None,
            error: None,
        }
    }

    /// Whether the uri already points at the backend rather than local disk.
    pub fn is_remote(&self) -> bool {
        self.uri.starts_with("http://") || self.uri.starts_with("https://")
    }

    pub fn is_done(&self) -> bool {
        self.state == AttachmentState::Done
    }
}

/// Task input at creation time.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub fields: FieldValues,
    pub geometry: Option<Geometry>,
    pub collected_at: DateTime<Utc>,
    pub is_mocked: bool,
    pub attachments: Vec<NewAttachment>,
}

/// One user-submitted field record awaiting or completing upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub client_id: String,
    pub fields: FieldValues,
    pub geometry: Option<Geometry>,
    pub collected_at: DateTime<Utc>,
    pub is_mocked: bool,
    /// Attachments keyed by attachment id
    pub attachments: HashMap<String, Attachment>,
    pub state: TaskState,
    pub retries: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(project_id: &str, client_id: &str, input: NewTask) -> Self {
        let id = Uuid::new_v4().to_string();
        let attachments = input
            .attachments
            .into_iter()
            .map(|a| Attachment::new(&id, project_id, client_id, a))
            .map(|a| (a.id.clone(), a))
            .collect();

        let now = Utc::now();
        Self {
            id,
            project_id: project_id.to_string(),
            client_id: client_id.to_string(),
            fields: input.fields,
            geometry: input.geometry,
            collected_at: input.collected_at,
            is_mocked: input.is_mocked,
            attachments,
            state: TaskState::Pending,
            retries: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(anyhow!("Task ID cannot be empty"));
        }
        if self.project_id.is_empty() {
            return Err(anyhow!("Project ID cannot be empty"));
        }
        if self.client_id.is_empty() {
            return Err(anyhow!("Client ID cannot be empty"));
        }
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.state == TaskState::Done
    }
}
