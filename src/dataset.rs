//! In-memory store for collected stops and shapes, keyed by route.
//!
//! The two maps are deliberately independent: a route appears in a map only
//! if at least one record was collected for it, so "missing" is always an
//! absent key, never an empty value. The difference between the two key sets
//! is exactly what a repair run has to re-fetch.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{RouteId, ShapeRecord, StopRecord};

/// How much of a route's data has been collected so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    Unknown,
    StopsOnly,
    ShapesOnly,
    Complete,
}

/// Stops and shapes per route. Serializes directly as the canonical JSON
/// document (top-level keys `mbtaBusData` and `busRouteShapes`).
///
/// `BTreeMap` keeps iteration and serialization sorted by route id, so runs
/// are reproducible.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Dataset {
    #[serde(rename = "mbtaBusData")]
    stops_by_route: BTreeMap<RouteId, Vec<StopRecord>>,
    #[serde(rename = "busRouteShapes")]
    shapes_by_route: BTreeMap<RouteId, Vec<ShapeRecord>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a dataset from two deserialized maps, dropping any empty
    /// entries so the absent-key invariant holds even for files written by
    /// other tools.
    pub fn from_parts(
        mut stops_by_route: BTreeMap<RouteId, Vec<StopRecord>>,
        mut shapes_by_route: BTreeMap<RouteId, Vec<ShapeRecord>>,
    ) -> Self {
        stops_by_route.retain(|_, records| !records.is_empty());
        shapes_by_route.retain(|_, records| !records.is_empty());
        Self {
            stops_by_route,
            shapes_by_route,
        }
    }

    /// Stores `records` for `route_id` unless the route already has stops or
    /// `records` is empty. Returns whether anything was inserted; an existing
    /// entry is never overwritten.
    pub fn upsert_stops(&mut self, route_id: &str, records: Vec<StopRecord>) -> bool {
        Self::upsert(&mut self.stops_by_route, route_id, records)
    }

    /// Same policy as [`Dataset::upsert_stops`], independent map.
    pub fn upsert_shapes(&mut self, route_id: &str, records: Vec<ShapeRecord>) -> bool {
        Self::upsert(&mut self.shapes_by_route, route_id, records)
    }

    fn upsert<T>(map: &mut BTreeMap<RouteId, Vec<T>>, route_id: &str, records: Vec<T>) -> bool {
        if records.is_empty() || map.contains_key(route_id) {
            return false;
        }
        map.insert(route_id.to_string(), records);
        true
    }

    pub fn stops(&self, route_id: &str) -> Option<&[StopRecord]> {
        self.stops_by_route.get(route_id).map(Vec::as_slice)
    }

    pub fn shapes(&self, route_id: &str) -> Option<&[ShapeRecord]> {
        self.shapes_by_route.get(route_id).map(Vec::as_slice)
    }

    pub fn stops_map(&self) -> &BTreeMap<RouteId, Vec<StopRecord>> {
        &self.stops_by_route
    }

    pub fn shapes_map(&self) -> &BTreeMap<RouteId, Vec<ShapeRecord>> {
        &self.shapes_by_route
    }

    /// Union of both key sets: every route we know anything about.
    pub fn known_route_ids(&self) -> Vec<RouteId> {
        let mut ids: Vec<RouteId> = self
            .stops_by_route
            .keys()
            .chain(self.shapes_by_route.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Intersection of both key sets: routes with stops and shapes.
    pub fn fully_reconciled_route_ids(&self) -> Vec<RouteId> {
        self.stops_by_route
            .keys()
            .filter(|id| self.shapes_by_route.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Routes that have stops but no shapes yet.
    pub fn stops_only_route_ids(&self) -> Vec<RouteId> {
        self.stops_by_route
            .keys()
            .filter(|id| !self.shapes_by_route.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Routes that have shapes but no stops yet.
    pub fn shapes_only_route_ids(&self) -> Vec<RouteId> {
        self.shapes_by_route
            .keys()
            .filter(|id| !self.stops_by_route.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn completeness(&self, route_id: &str) -> Completeness {
        match (
            self.stops_by_route.contains_key(route_id),
            self.shapes_by_route.contains_key(route_id),
        ) {
            (true, true) => Completeness::Complete,
            (true, false) => Completeness::StopsOnly,
            (false, true) => Completeness::ShapesOnly,
            (false, false) => Completeness::Unknown,
        }
    }

    pub fn stop_route_count(&self) -> usize {
        self.stops_by_route.len()
    }

    pub fn shape_route_count(&self) -> usize {
        self.shapes_by_route.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops_by_route.is_empty() && self.shapes_by_route.is_empty()
    }
}
