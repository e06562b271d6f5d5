/*
[INPUT]:  Internal domain models (geometry, field values, file metadata)
[OUTPUT]: Serialized request bodies in the backend's wire format
[POS]:    Types layer - outbound payloads
[UPDATE]: When upload or record-submission request formats change
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::models::{FieldValues, Geometry};

/// Metadata for one attachment upload.
#[derive(Debug, Clone)]
pub struct UploadFileRequest {
    pub file_path: PathBuf,
    pub file_name: String,
    pub content_type: String,
    pub project_id: String,
    pub client_id: String,
}

/// GeoJSON-style geometry in wire order: every position is [lng, lat].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum GeometryWire {
    Point([f64; 2]),
    LineString(Vec<[f64; 2]>),
    /// Single outer ring.
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl From<&Geometry> for GeometryWire {
    fn from(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point(c) => GeometryWire::Point([c.lng, c.lat]),
            Geometry::Line(coords) => {
                GeometryWire::LineString(coords.iter().map(|c| [c.lng, c.lat]).collect())
            }
            Geometry::Polygon(coords) => {
                GeometryWire::Polygon(vec![coords.iter().map(|c| [c.lng, c.lat]).collect()])
            }
        }
    }
}

/// Structured record submission body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRecordRequest {
    #[serde(rename = "projectId")]
    pub project_id: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(rename = "isMocked")]
    pub is_mocked: bool,
    #[serde(rename = "collectedAt")]
    pub collected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<GeometryWire>,
    pub fields: FieldValues,
}

impl SubmitRecordRequest {
    /// Build a submission body, swapping geometry into wire (lng, lat) order.
    pub fn new(
        project_id: impl Into<String>,
        client_id: impl Into<String>,
        is_mocked: bool,
        collected_at: DateTime<Utc>,
        geometry: Option<&Geometry>,
        fields: FieldValues,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            client_id: client_id.into(),
            is_mocked,
            collected_at,
            geometry: geometry.map(GeometryWire::from),
            fields,
        }
    }
}
