/*
[INPUT]:  Local file path, attachment metadata, progress callback
[OUTPUT]: Streamed multipart upload with percent progress notifications
[POS]:    HTTP layer - attachment upload endpoint (requires bearer auth)
[UPDATE]: When the attachment endpoint or multipart layout changes
*/

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method, StatusCode};
use tokio_util::io::ReaderStream;

use crate::http::{Result, SyncClient};
use crate::types::{UploadFileRequest, UploadResponse};

impl SyncClient {
    /// Upload one attachment file as streamed multipart form data.
    ///
    /// POST /api/attachments
    ///
    /// `progress` receives a percent (0-100) as bytes leave the file; the
    /// values are non-decreasing because the byte counter only grows. A 401
    /// refreshes the token once and rebuilds the whole request - streaming
    /// bodies cannot be cloned, so the file is re-read from the start.
    pub async fn upload_attachment<F>(
        &self,
        request: &UploadFileRequest,
        progress: F,
    ) -> Result<UploadResponse>
    where
        F: Fn(u8) + Clone + Send + Sync + 'static,
    {
        let token = self.token_provider().bearer_token().await?;
        let response = self.send_upload(request, progress.clone(), &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(
                file_name = %request.file_name,
                "upload rejected with 401; refreshing token and re-streaming"
            );
            let token = self.token_provider().refresh_token().await?;
            let response = self.send_upload(request, progress, &token).await?;
            return Self::parse_json(response).await;
        }

        Self::parse_json(response).await
    }

    async fn send_upload<F>(
        &self,
        request: &UploadFileRequest,
        progress: F,
        token: &str,
    ) -> Result<reqwest::Response>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let file = tokio::fs::File::open(&request.file_path).await?;
        let total = file.metadata().await?.len().max(1);

        let mut sent: u64 = 0;
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                let percent = ((sent * 100) / total).min(100) as u8;
                progress(percent);
            }
            chunk
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(request.file_name.clone())
            .mime_str(&request.content_type)?;

        let form = Form::new()
            .text("projectId", request.project_id.clone())
            .text("clientId", request.client_id.clone())
            .text("filename", request.file_name.clone())
            .part("file", part);

        let builder = self.request(Method::POST, "/api/attachments")?;
        Ok(builder.bearer_auth(token).multipart(form).send().await?)
    }
}
