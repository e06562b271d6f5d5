/*
[INPUT]:  JSON response bodies from the backend
[OUTPUT]: Typed upload and submission results
[POS]:    Types layer - inbound payloads
[UPDATE]: When backend response formats change
*/

use serde::{Deserialize, Serialize};

/// Result of a successful attachment upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Server-side identifier for the stored file.
    pub id: String,
    /// Durable remote reference written into the record's field values.
    pub url: String,
}

/// Result of a successful record submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRecordResponse {
    /// Server-side record identifier.
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}
