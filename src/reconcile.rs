//! Targeted re-fetch of the missing half of partially collected routes.
//!
//! A repair run never touches a populated entry: a route with stops but no
//! shapes gets exactly one shapes fetch, and vice versa. Routes whose
//! missing half keeps failing stay incomplete and are simply reported again.

use std::time::Duration;

use tracing::info;

use crate::collect::{self, ApiConfig};
use crate::dataset::Dataset;
use crate::fetch::{HttpClient, RetryPolicy};
use crate::model::RouteId;

/// Pause between route fetches during repair. Longer than the first-pass
/// pacing because a repair run is aimed at an upstream that was already
/// throttling us.
pub const REPAIR_PACING: Duration = Duration::from_millis(1000);

/// Which half of a route's data is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingHalf {
    Stops,
    Shapes,
}

/// One targeted fetch per incomplete route, sorted by route id so repair
/// order is reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairPlan {
    entries: Vec<(RouteId, MissingHalf)>,
}

impl RepairPlan {
    pub fn for_dataset(dataset: &Dataset) -> Self {
        let mut entries: Vec<(RouteId, MissingHalf)> = Vec::new();
        for id in dataset.shapes_only_route_ids() {
            entries.push((id, MissingHalf::Stops));
        }
        for id in dataset.stops_only_route_ids() {
            entries.push((id, MissingHalf::Shapes));
        }
        // Each route appears at most once (the two source sets are disjoint).
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self { entries }
    }

    pub fn entries(&self) -> &[(RouteId, MissingHalf)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome counts for one repair pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    pub attempted: usize,
    pub recovered_stops: usize,
    pub recovered_shapes: usize,
}

impl RepairReport {
    pub fn recovered(&self) -> usize {
        self.recovered_stops + self.recovered_shapes
    }
}

/// Walks the repair plan for `dataset`, fetching only the missing half of
/// each incomplete route with the patient [`RetryPolicy::REPAIR`] schedule
/// and merging whatever arrives. Existing entries are never overwritten, so
/// the set of fully reconciled routes can only grow.
pub async fn repair<C: HttpClient>(
    client: &C,
    cfg: &ApiConfig,
    dataset: &mut Dataset,
) -> RepairReport {
    let plan = RepairPlan::for_dataset(dataset);
    let mut report = RepairReport::default();

    if plan.is_empty() {
        info!("No routes to retry, every known route has both stops and shapes");
        return report;
    }

    info!(routes = plan.len(), "Retrying routes with missing data");

    for (route_id, half) in plan.entries() {
        report.attempted += 1;
        match half {
            MissingHalf::Stops => {
                info!(route = %route_id, "Fetching missing stops");
                let stops = collect::route_stops(client, cfg, route_id, RetryPolicy::REPAIR).await;
                let count = stops.len();
                if dataset.upsert_stops(route_id, stops) {
                    info!(route = %route_id, stops = count, "Recovered stops");
                    report.recovered_stops += 1;
                } else {
                    info!(route = %route_id, "Still no stops for route");
                }
            }
            MissingHalf::Shapes => {
                info!(route = %route_id, "Fetching missing shapes");
                let shapes =
                    collect::route_shapes(client, cfg, route_id, RetryPolicy::REPAIR).await;
                let count = shapes.len();
                if dataset.upsert_shapes(route_id, shapes) {
                    info!(route = %route_id, shapes = count, "Recovered shapes");
                    report.recovered_shapes += 1;
                } else {
                    info!(route = %route_id, "Still no shapes for route");
                }
            }
        }
        tokio::time::sleep(REPAIR_PACING).await;
    }

    report
}
