/*
[INPUT]:  Wire format definitions for the fieldsync backend
[OUTPUT]: Typed requests, responses, and shared domain models
[POS]:    Types layer - serde definitions for all API payloads
[UPDATE]: When the backend wire format changes
*/

pub mod models;
pub mod requests;
pub mod responses;

pub use models::{Coordinate, FieldValues, Geometry};
pub use requests::{GeometryWire, SubmitRecordRequest, UploadFileRequest};
pub use responses::{SubmitRecordResponse, UploadResponse};
