//! Full-collection pass and the end-of-run reconciliation summary.

use std::time::Duration;

use anyhow::{Result, bail};
use tracing::info;

use crate::collect::{self, ApiConfig};
use crate::dataset::Dataset;
use crate::fetch::{HttpClient, RetryPolicy};

/// Pause after every resource fetch during full collection, to stay under
/// the upstream rate limit. Calls are strictly sequential; this is the only
/// throttle besides the retry backoff.
pub const COLLECTION_PACING: Duration = Duration::from_millis(500);

/// Collects stops and shapes for every bus route, one route at a time.
///
/// Fetch failures for individual routes are not fatal: the route is simply
/// left out of the affected map and picked up by a later repair run. The one
/// fatal precondition is an empty route list: with nothing to iterate there
/// is nothing to collect, and no output should be written.
pub async fn collect_all<C: HttpClient>(client: &C, cfg: &ApiConfig) -> Result<Dataset> {
    info!("Fetching bus routes");
    let routes = collect::bus_routes(client, cfg).await;
    if routes.is_empty() {
        bail!("route listing returned no routes, nothing to collect");
    }
    info!(routes = routes.len(), "Found bus routes");

    let mut dataset = Dataset::new();

    for (index, route) in routes.iter().enumerate() {
        info!(
            route = %route.id,
            name = %route.long_name,
            index = index + 1,
            total = routes.len(),
            "Processing route"
        );

        let stops = collect::route_stops(client, cfg, &route.id, RetryPolicy::FIRST_PASS).await;
        tokio::time::sleep(COLLECTION_PACING).await;

        let shapes = collect::route_shapes(client, cfg, &route.id, RetryPolicy::FIRST_PASS).await;
        tokio::time::sleep(COLLECTION_PACING).await;

        info!(
            route = %route.id,
            stops = stops.len(),
            shapes = shapes.len(),
            "Collected route data"
        );

        dataset.upsert_stops(&route.id, stops);
        dataset.upsert_shapes(&route.id, shapes);
    }

    info!(
        stop_routes = dataset.stop_route_count(),
        shape_routes = dataset.shape_route_count(),
        "Collection pass finished"
    );

    Ok(dataset)
}

/// Reconciliation counts reported at the end of every run. A non-zero
/// `stops_only` or `shapes_only` is the operator's cue to run `repair`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub known_routes: usize,
    pub complete: usize,
    pub stops_only: usize,
    pub shapes_only: usize,
}

impl Summary {
    pub fn of(dataset: &Dataset) -> Self {
        Self {
            known_routes: dataset.known_route_ids().len(),
            complete: dataset.fully_reconciled_route_ids().len(),
            stops_only: dataset.stops_only_route_ids().len(),
            shapes_only: dataset.shapes_only_route_ids().len(),
        }
    }

    pub fn log(&self) {
        info!(
            known_routes = self.known_routes,
            complete = self.complete,
            stops_only = self.stops_only,
            shapes_only = self.shapes_only,
            "Reconciliation summary"
        );
    }
}
