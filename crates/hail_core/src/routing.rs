//! Routing engine: snap-and-route queries plus dynamic edge-weight updates.
//!
//! Wraps a [`RoadGraph`] behind a read-write lock so route queries (matcher
//! workers, public API) and weight updates (closures, congestion) can be
//! issued concurrently from any thread. Three update entry points:
//!
//! - **by id**: direct update of the first record carrying the id
//! - **by endpoints**: first directed edge matching a `(from, to)` pair
//! - **by coordinate**: nearest edge(s) by perpendicular distance, with an
//!   optional compass-direction filter
//!
//! The [`TravelCost`] trait is the seam the matching engine scores
//! candidates through; [`GreatCircleCost`] is the routerless fallback.

use std::sync::{PoisonError, RwLock};

use crate::astar;
use crate::graph::{EdgeId, NodeIndex, RoadGraph};
use crate::spatial::{distance_m, EARTH_RADIUS_M};

/// Edges whose point-to-segment distance is within this of the minimum are
/// all updated by the coordinate overload. Covers the exactly-equal case of
/// the two directed records of a bidirectional road.
pub const EDGE_TIE_TOLERANCE_M: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Direction filter
// ---------------------------------------------------------------------------

/// Compass filter for coordinate-based edge updates, evaluated against the
/// edge's `from → to` delta. `Both` and `None` disable filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
    Both,
    None,
}

impl Direction {
    /// Parse a compass token (`"N"`, `"sw"`, `"BOTH"`, ...). Unknown input
    /// falls back to `Both`, the unfiltered default.
    pub fn parse(input: &str) -> Self {
        match input.to_ascii_uppercase().as_str() {
            "N" => Self::North,
            "S" => Self::South,
            "E" => Self::East,
            "W" => Self::West,
            "NE" => Self::NorthEast,
            "NW" => Self::NorthWest,
            "SE" => Self::SouthEast,
            "SW" => Self::SouthWest,
            "NONE" => Self::None,
            _ => Self::Both,
        }
    }

    /// Whether an edge with the given latitude/longitude delta points this
    /// way. Zero-length deltas match no specific direction.
    pub fn matches(self, dlat: f64, dlon: f64) -> bool {
        match self {
            Self::Both | Self::None => true,
            Self::North => dlat > 0.0,
            Self::South => dlat < 0.0,
            Self::East => dlon > 0.0,
            Self::West => dlon < 0.0,
            Self::NorthEast => dlat > 0.0 && dlon > 0.0,
            Self::NorthWest => dlat > 0.0 && dlon < 0.0,
            Self::SouthEast => dlat < 0.0 && dlon > 0.0,
            Self::SouthWest => dlat < 0.0 && dlon < 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Planar helpers
// ---------------------------------------------------------------------------

/// Project onto a local equirectangular plane centered on `ref_lat`.
fn to_xy(lat: f64, lon: f64, ref_lat: f64) -> (f64, f64) {
    let x = lon.to_radians() * EARTH_RADIUS_M * ref_lat.to_radians().cos();
    let y = lat.to_radians() * EARTH_RADIUS_M;
    (x, y)
}

/// Perpendicular distance from point P to segment AB, in meters, in the
/// equirectangular plane centered on P's latitude.
pub(crate) fn point_to_segment_m(
    plat: f64,
    plon: f64,
    alat: f64,
    alon: f64,
    blat: f64,
    blon: f64,
) -> f64 {
    let (px, py) = to_xy(plat, plon, plat);
    let (ax, ay) = to_xy(alat, alon, plat);
    let (bx, by) = to_xy(blat, blon, plat);

    let (abx, aby) = (bx - ax, by - ay);
    let (apx, apy) = (px - ax, py - ay);

    let ab2 = abx * abx + aby * aby;
    if ab2 == 0.0 {
        return (apx * apx + apy * apy).sqrt();
    }

    let t = ((apx * abx + apy * aby) / ab2).clamp(0.0, 1.0);
    let (cx, cy) = (ax + t * abx, ay + t * aby);
    let (dx, dy) = (px - cx, py - cy);
    (dx * dx + dy * dy).sqrt()
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RoutingEngine {
    graph: RwLock<RoadGraph>,
}

impl RoutingEngine {
    pub fn new(graph: RoadGraph) -> Self {
        Self {
            graph: RwLock::new(graph),
        }
    }

    /// Travel time in seconds between two free-form coordinates, snapping
    /// each to its nearest graph node. Returns `-1.0` when either endpoint
    /// cannot snap (empty graph) and `f64::INFINITY` when the snapped pair
    /// is directionally unreachable.
    pub fn route(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);

        let (Some(start), Some(goal)) = (
            find_nearest_node(&graph, lat1, lon1),
            find_nearest_node(&graph, lat2, lon2),
        ) else {
            return -1.0;
        };

        astar::shortest_path(&graph, start, goal).total_cost
    }

    /// Update the first edge record carrying `id`. No-op for unknown ids.
    pub fn update_edge_by_id(&self, id: EdgeId, weight: f64) {
        let mut graph = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        graph.update_edge_weight(id, weight);
    }

    /// Update the first directed edge from `from` to `to`. The update goes
    /// through the edge's id, so a colliding id on an earlier record wins.
    pub fn update_edge_between(&self, from: NodeIndex, to: NodeIndex, weight: f64) {
        let mut graph = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        let id = graph
            .edges()
            .iter()
            .find(|e| e.from == from && e.to == to)
            .map(|e| e.id);
        if let Some(id) = id {
            graph.update_edge_weight(id, weight);
        }
    }

    /// Update the edge(s) nearest to a coordinate, filtered by direction.
    /// Every edge within [`EDGE_TIE_TOLERANCE_M`] of the minimum distance is
    /// updated, so both directions of a two-way road change together.
    pub fn update_edge_near(&self, lat: f64, lon: f64, weight: f64, dir: Direction) {
        let mut graph = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        for slot in find_nearest_edges(&graph, lat, lon, dir) {
            graph.update_edge_slot(slot, weight);
        }
    }

    /// Run a closure against the current graph (read lock held for its
    /// duration). Used by harnesses that need node coordinates or counts.
    pub fn with_graph<R>(&self, f: impl FnOnce(&RoadGraph) -> R) -> R {
        let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);
        f(&graph)
    }

    pub fn num_nodes(&self) -> usize {
        self.with_graph(|g| g.num_nodes())
    }

    pub fn num_edges(&self) -> usize {
        self.with_graph(|g| g.num_edges())
    }
}

fn find_nearest_node(graph: &RoadGraph, lat: f64, lon: f64) -> Option<NodeIndex> {
    let mut best = f64::MAX;
    let mut best_idx = None;
    for (idx, node) in graph.nodes().iter().enumerate() {
        let d = distance_m(lat, lon, node.lat, node.lon);
        if d < best {
            best = d;
            best_idx = Some(idx);
        }
    }
    best_idx
}

/// Slots of the edge(s) closest to the coordinate that pass the direction
/// filter. Linear scan; fine at the documented graph scale.
fn find_nearest_edges(graph: &RoadGraph, lat: f64, lon: f64, dir: Direction) -> Vec<usize> {
    let mut best = f64::MAX;
    let mut distances = Vec::with_capacity(graph.num_edges());

    for edge in graph.edges() {
        let from = graph.node(edge.from);
        let to = graph.node(edge.to);
        if !dir.matches(to.lat - from.lat, to.lon - from.lon) {
            distances.push(f64::MAX);
            continue;
        }
        let d = point_to_segment_m(lat, lon, from.lat, from.lon, to.lat, to.lon);
        distances.push(d);
        if d < best {
            best = d;
        }
    }

    if best == f64::MAX {
        return Vec::new();
    }

    distances
        .iter()
        .enumerate()
        .filter(|(_, &d)| d <= best + EDGE_TIE_TOLERANCE_M)
        .map(|(slot, _)| slot)
        .collect()
}

// ---------------------------------------------------------------------------
// Cost seam for the matching engine
// ---------------------------------------------------------------------------

/// Travel-cost oracle used to score driver→rider candidates. Implementations
/// must be `Send + Sync` so the matcher's workers can share one instance.
pub trait TravelCost: Send + Sync {
    /// Expected travel time in seconds, or `None` when no usable estimate
    /// exists (snap failure, unreachable pair).
    fn travel_secs(&self, from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> Option<f64>;
}

impl TravelCost for RoutingEngine {
    fn travel_secs(&self, from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> Option<f64> {
        let cost = self.route(from_lat, from_lon, to_lat, to_lon);
        (cost >= 0.0 && cost.is_finite()).then_some(cost)
    }
}

/// Average city speed assumed when no road network is available.
pub const CRUISE_SPEED_KMH: f64 = 40.0;

/// Great-circle fallback: haversine distance at a constant cruise speed.
#[derive(Debug, Clone, Copy)]
pub struct GreatCircleCost {
    pub cruise_speed_mps: f64,
}

impl Default for GreatCircleCost {
    fn default() -> Self {
        Self {
            cruise_speed_mps: CRUISE_SPEED_KMH / 3.6,
        }
    }
}

impl TravelCost for GreatCircleCost {
    fn travel_secs(&self, from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> Option<f64> {
        Some(distance_m(from_lat, from_lon, to_lat, to_lon) / self.cruise_speed_mps)
    }
}
