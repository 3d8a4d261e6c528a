//! Domain records for the collected reference data.
//!
//! Serialized field names follow the wire format the map page already
//! consumes, so the generated files drop in as replacements.

use serde::{Deserialize, Serialize};

/// Stable identifier of a transit route; the sole join key between the stops
/// map and the shapes map.
pub type RouteId = String;

/// Mode tag attached to every collected stop. This pipeline only collects
/// bus service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopKind {
    Bus,
}

/// A physical stop served by a route.
///
/// `coords` is `[latitude, longitude]` on the wire; the mode tag serializes
/// as `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    pub name: String,
    pub coords: (f64, f64),
    #[serde(rename = "type")]
    pub kind: StopKind,
    #[serde(rename = "stopId")]
    pub stop_id: String,
}

/// A route geometry, kept as the encoded polyline string the API returns.
/// Decoding is the consumer's job (Leaflet reads the encoded form directly).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub shape_id: String,
    pub polyline: String,
}
