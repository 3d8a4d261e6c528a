//! Dual-format persistence for the collected dataset.
//!
//! The canonical JSON file is the machine-readable source of truth and what
//! repair runs load. The embedded JS file carries the same two payloads as
//! literal assignments for the map page to include directly; it is written
//! on every run but only parsed as a fallback for datasets that predate the
//! canonical file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::dataset::Dataset;
use crate::model::{RouteId, ShapeRecord, StopRecord};

/// Output file names, shared by `generate` and `repair`.
pub const CANONICAL_FILE: &str = "mbta-bus-data.json";
pub const EMBEDDED_FILE: &str = "mbta-bus-data.js";

// The embedded format is located by these exact literals, so they are part
// of the wire format. JSON string escaping keeps raw newlines out of the
// payloads, which is what makes the terminator unambiguous.
const STOPS_ASSIGN: &str = "const mbtaBusData = ";
const SHAPES_ASSIGN: &str = "const busRouteShapes = ";
const TERMINATOR: &str = ";\n\n";

#[derive(Deserialize)]
struct CanonicalParts {
    #[serde(rename = "mbtaBusData")]
    stops_by_route: BTreeMap<RouteId, Vec<StopRecord>>,
    #[serde(rename = "busRouteShapes")]
    shapes_by_route: BTreeMap<RouteId, Vec<ShapeRecord>>,
}

/// Serializes the dataset as a single JSON document with two named
/// top-level maps, 2-space indented, non-ASCII preserved.
pub fn to_canonical_json(dataset: &Dataset) -> Result<String> {
    Ok(serde_json::to_string_pretty(dataset)?)
}

pub fn from_canonical_json(text: &str) -> Result<Dataset> {
    let parts: CanonicalParts =
        serde_json::from_str(text).context("canonical file is not valid dataset JSON")?;
    Ok(Dataset::from_parts(parts.stops_by_route, parts.shapes_by_route))
}

/// Serializes the dataset as two consecutive JS assignment statements with
/// identical JSON payloads to the canonical form.
pub fn to_embedded(dataset: &Dataset) -> Result<String> {
    let stops = serde_json::to_string_pretty(dataset.stops_map())?;
    let shapes = serde_json::to_string_pretty(dataset.shapes_map())?;

    let mut out = String::with_capacity(
        STOPS_ASSIGN.len() + SHAPES_ASSIGN.len() + stops.len() + shapes.len() + 2 * TERMINATOR.len(),
    );
    out.push_str(STOPS_ASSIGN);
    out.push_str(&stops);
    out.push_str(TERMINATOR);
    out.push_str(SHAPES_ASSIGN);
    out.push_str(&shapes);
    out.push_str(TERMINATOR);
    Ok(out)
}

/// Recovers a dataset from the embedded JS form.
///
/// Each payload is located by its assignment prefix and ends at the first
/// `;\n\n` after it. Guaranteed to invert [`to_embedded`] for every dataset,
/// including empty maps and values containing `;`, quotes, or newlines.
pub fn from_embedded(text: &str) -> Result<Dataset> {
    // The shapes assignment is only searched for after the stops payload
    // ends, so payload *contents* can never be mistaken for the second
    // assignment's prefix.
    let (stops_json, stops_end) = extract_assignment(text, STOPS_ASSIGN)?;
    let (shapes_json, _) = extract_assignment(&text[stops_end..], SHAPES_ASSIGN)?;

    let stops_by_route = serde_json::from_str(stops_json)
        .context("embedded stops payload is not valid JSON")?;
    let shapes_by_route = serde_json::from_str(shapes_json)
        .context("embedded shapes payload is not valid JSON")?;
    Ok(Dataset::from_parts(stops_by_route, shapes_by_route))
}

/// Returns the JSON payload between `assign` and the next terminator, plus
/// the offset just past that terminator.
fn extract_assignment<'a>(text: &'a str, assign: &str) -> Result<(&'a str, usize)> {
    let name = assign.trim_end_matches(" = ");
    let start = text
        .find(assign)
        .with_context(|| format!("could not find `{name}` assignment in embedded file"))?
        + assign.len();
    let end = text[start..]
        .find(TERMINATOR)
        .with_context(|| format!("could not find end of `{name}` assignment"))?
        + start;
    Ok((&text[start..end], end + TERMINATOR.len()))
}

pub fn write_canonical(dataset: &Dataset, path: &Path) -> Result<()> {
    fs::write(path, to_canonical_json(dataset)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn read_canonical(path: &Path) -> Result<Dataset> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    from_canonical_json(&text).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn write_embedded(dataset: &Dataset, path: &Path) -> Result<()> {
    fs::write(path, to_embedded(dataset)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn read_embedded(path: &Path) -> Result<Dataset> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    from_embedded(&text).with_context(|| format!("failed to parse {}", path.display()))
}
