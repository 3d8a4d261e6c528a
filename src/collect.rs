//! Collectors for the three API resources: routes, stops, and shapes.
//!
//! Each collector owns its raw-entity to record mapping and its
//! required-field filter. An entity missing a required field is malformed
//! rather than missing: it is dropped and never retried, since retrying
//! cannot make a structurally absent field appear.

use anyhow::{Context, Result};
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::fetch::{self, HttpClient, RetryPolicy};
use crate::model::{ShapeRecord, StopKind, StopRecord};

// Page-size caps per resource type.
const ROUTE_PAGE_LIMIT: &str = "1000";
const STOP_PAGE_LIMIT: &str = "1000";
const SHAPE_PAGE_LIMIT: &str = "100";

/// GTFS route type 3 is bus service.
const BUS_ROUTE_TYPE: &str = "3";

/// Where the V3 API lives. Base URL is validated once at construction so the
/// collectors can build resource URLs infallibly.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    base_url: Url,
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid API base URL: {base_url}"))?;
        Ok(Self { base_url })
    }

    fn resource_url(&self, resource: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(resource);
        url.query_pairs_mut().extend_pairs(params.iter().copied());
        url
    }
}

/// Identity and display name of one route, as listed by the API. The name is
/// only used for progress reporting, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub id: String,
    pub long_name: String,
}

/// Lists every bus route. An empty result means either an empty system or a
/// fetch failure; the caller treats both as "nothing to do".
pub async fn bus_routes<C: HttpClient>(client: &C, cfg: &ApiConfig) -> Vec<RouteInfo> {
    let url = cfg.resource_url(
        "routes",
        &[
            ("filter[type]", BUS_ROUTE_TYPE),
            ("page[limit]", ROUTE_PAGE_LIMIT),
        ],
    );
    let entities = fetch::fetch_entities(client, url, RetryPolicy::FIRST_PASS).await;
    entities.iter().filter_map(route_from_entity).collect()
}

/// Fetches the stops of one route, keeping only entities with numeric
/// coordinates and preserving API order.
pub async fn route_stops<C: HttpClient>(
    client: &C,
    cfg: &ApiConfig,
    route_id: &str,
    policy: RetryPolicy,
) -> Vec<StopRecord> {
    let url = cfg.resource_url(
        "stops",
        &[("filter[route]", route_id), ("page[limit]", STOP_PAGE_LIMIT)],
    );
    let entities = fetch::fetch_entities(client, url, policy).await;
    entities.iter().filter_map(stop_from_entity).collect()
}

/// Fetches the shape geometries of one route, keeping only entities that
/// carry a polyline and preserving API order.
pub async fn route_shapes<C: HttpClient>(
    client: &C,
    cfg: &ApiConfig,
    route_id: &str,
    policy: RetryPolicy,
) -> Vec<ShapeRecord> {
    let url = cfg.resource_url(
        "shapes",
        &[
            ("filter[route]", route_id),
            ("page[limit]", SHAPE_PAGE_LIMIT),
        ],
    );
    let entities = fetch::fetch_entities(client, url, policy).await;
    entities.iter().filter_map(shape_from_entity).collect()
}

fn route_from_entity(entity: &Value) -> Option<RouteInfo> {
    let id = entity["id"].as_str()?.to_string();
    let long_name = entity["attributes"]["long_name"]
        .as_str()
        .unwrap_or("Unknown")
        .to_string();
    Some(RouteInfo { id, long_name })
}

fn stop_from_entity(entity: &Value) -> Option<StopRecord> {
    let attributes = &entity["attributes"];
    let (Some(latitude), Some(longitude)) = (
        attributes["latitude"].as_f64(),
        attributes["longitude"].as_f64(),
    ) else {
        debug!(entity = %entity["id"], "Dropping stop entity without numeric coordinates");
        return None;
    };

    Some(StopRecord {
        name: attributes["name"].as_str().unwrap_or("Unknown").to_string(),
        coords: (latitude, longitude),
        kind: StopKind::Bus,
        stop_id: entity["id"].as_str()?.to_string(),
    })
}

fn shape_from_entity(entity: &Value) -> Option<ShapeRecord> {
    let polyline = entity["attributes"]["polyline"].as_str()?;
    Some(ShapeRecord {
        shape_id: entity["id"].as_str()?.to_string(),
        polyline: polyline.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_url_carries_filter_and_limit() {
        let cfg = ApiConfig::new("https://api-v3.mbta.com").unwrap();
        let url = cfg.resource_url("stops", &[("filter[route]", "66"), ("page[limit]", "1000")]);

        assert_eq!(url.path(), "/stops");
        assert!(url.query_pairs().any(|(k, v)| k == "filter[route]" && v == "66"));
        assert!(url.query_pairs().any(|(k, v)| k == "page[limit]" && v == "1000"));
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(ApiConfig::new("not a url").is_err());
    }

    #[test]
    fn test_stop_requires_numeric_coordinates() {
        // Name but no coordinates: malformed, dropped.
        let malformed = json!({"id": "s1", "attributes": {"name": "X"}});
        assert!(stop_from_entity(&malformed).is_none());

        // String coordinates are not numeric.
        let stringly = json!({
            "id": "s2",
            "attributes": {"name": "Y", "latitude": "42.0", "longitude": "-71.0"}
        });
        assert!(stop_from_entity(&stringly).is_none());

        let good = json!({
            "id": "s3",
            "attributes": {"name": "Z", "latitude": 42.33, "longitude": -71.08}
        });
        let record = stop_from_entity(&good).unwrap();
        assert_eq!(record.coords, (42.33, -71.08));
        assert_eq!(record.kind, StopKind::Bus);
        assert_eq!(record.stop_id, "s3");
    }

    #[test]
    fn test_stop_name_defaults_to_unknown() {
        let entity = json!({
            "id": "s4",
            "attributes": {"latitude": 1.0, "longitude": 2.0}
        });
        assert_eq!(stop_from_entity(&entity).unwrap().name, "Unknown");
    }

    #[test]
    fn test_shape_requires_polyline() {
        let bare = json!({"id": "sh1", "attributes": {}});
        assert!(shape_from_entity(&bare).is_none());

        let good = json!({"id": "sh2", "attributes": {"polyline": "}~taG|aspL"}});
        let record = shape_from_entity(&good).unwrap();
        assert_eq!(record.shape_id, "sh2");
        assert_eq!(record.polyline, "}~taG|aspL");
    }

    #[test]
    fn test_route_long_name_defaults_to_unknown() {
        let entity = json!({"id": "1", "attributes": {}});
        let info = route_from_entity(&entity).unwrap();
        assert_eq!(info.id, "1");
        assert_eq!(info.long_name, "Unknown");

        let named = json!({"id": "1", "attributes": {"long_name": "Harvard - Nubian"}});
        assert_eq!(route_from_entity(&named).unwrap().long_name, "Harvard - Nubian");
    }
}
