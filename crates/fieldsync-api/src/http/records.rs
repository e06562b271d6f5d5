/*
[INPUT]:  Structured record payload (fields, geometry, collection metadata)
[OUTPUT]: Submitted record acknowledgement
[POS]:    HTTP layer - record submission endpoint (requires bearer auth)
[UPDATE]: When the record endpoint or submission body changes
*/

use reqwest::Method;

use crate::http::{Result, SyncClient};
use crate::types::{SubmitRecordRequest, SubmitRecordResponse};

impl SyncClient {
    /// Submit one record's structured data.
    ///
    /// POST /api/records
    ///
    /// The request body already carries geometry in wire (lng, lat) order;
    /// callers build it through `SubmitRecordRequest::new`.
    pub async fn submit_record(
        &self,
        request: &SubmitRecordRequest,
    ) -> Result<SubmitRecordResponse> {
        let builder = self.request(Method::POST, "/api/records")?.json(request);
        self.send_json(builder).await
    }
}
