#![allow(dead_code)]

use std::time::{Duration, Instant};

use hail_core::config::EngineConfig;
use hail_core::graph::RoadGraph;
use hail_core::matching::MatchingEngine;
use hail_core::spatial::distance_m;

/// Downtown Toronto, the anchor for every scenario coordinate.
pub const BASE_LAT: f64 = 43.690;
pub const BASE_LON: f64 = -79.320;

/// Grid spacing in degrees; ~222m of latitude per step.
pub const GRID_STEP_DEG: f64 = 0.002;

/// Assumed grid road speed (50 km/h) in m/s.
const GRID_SPEED_MPS: f64 = 50.0 / 3.6;

/// Engine config for tests: fast reap scans, everything else stock.
pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_reap_interval_ms(50)
}

pub fn test_engine() -> MatchingEngine {
    MatchingEngine::new(test_config())
}

/// Poll `cond` every 10ms until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// `rows` × `cols` lattice of bidirectional roads anchored at
/// (`BASE_LAT`, `BASE_LON`). Node index is `row * cols + col`; both
/// directions of a segment share one edge id, as the graph builder emits.
pub fn grid_graph(rows: usize, cols: usize) -> RoadGraph {
    let mut graph = RoadGraph::new();
    for row in 0..rows {
        for col in 0..cols {
            graph.add_node(
                BASE_LAT + row as f64 * GRID_STEP_DEG,
                BASE_LON + col as f64 * GRID_STEP_DEG,
            );
        }
    }

    let mut edge_id = 0i64;
    let mut connect = |graph: &mut RoadGraph, a: usize, b: usize| {
        let (na, nb) = (graph.node(a), graph.node(b));
        let secs = distance_m(na.lat, na.lon, nb.lat, nb.lon) / GRID_SPEED_MPS;
        graph.add_edge(edge_id, a, b, secs);
        graph.add_edge(edge_id, b, a, secs);
        edge_id += 1;
    };

    for row in 0..rows {
        for col in 0..cols {
            let here = row * cols + col;
            if col + 1 < cols {
                connect(&mut graph, here, here + 1);
            }
            if row + 1 < rows {
                connect(&mut graph, here, here + cols);
            }
        }
    }
    graph
}

/// Coordinates of a grid node, mirroring `grid_graph`'s layout.
pub fn grid_coord(row: usize, col: usize) -> (f64, f64) {
    (
        BASE_LAT + row as f64 * GRID_STEP_DEG,
        BASE_LON + col as f64 * GRID_STEP_DEG,
    )
}
