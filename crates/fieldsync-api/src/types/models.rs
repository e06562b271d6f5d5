/*
[INPUT]:  Collected field data (coordinates, form values)
[OUTPUT]: Shared domain models used by the engine and the wire layer
[POS]:    Types layer - internal representations
[UPDATE]: When collected-data shapes change
*/

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Structured form values keyed by field id.
///
/// Values are scalars or collections straight from the form engine; the
/// orchestrator treats them as opaque JSON.
pub type FieldValues = HashMap<String, serde_json::Value>;

/// A single geographic coordinate, stored internally in (lat, lng) order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

/// Geometry captured for one record.
///
/// Internal representation keeps (lat, lng) order; the swap to wire order
/// happens only when building a `GeometryWire` at the network boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "coordinates", rename_all = "snake_case")]
pub enum Geometry {
    Point(Coordinate),
    Line(Vec<Coordinate>),
    Polygon(Vec<Coordinate>),
}
