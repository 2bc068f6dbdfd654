//! Performance benchmarks for hail_core using Criterion.rs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hail_core::astar;
use hail_core::graph::RoadGraph;
use hail_core::routing::{Direction, RoutingEngine};
use hail_core::spatial::distance_m;

const BASE_LAT: f64 = 43.690;
const BASE_LON: f64 = -79.320;
const STEP_DEG: f64 = 0.002;
const SPEED_MPS: f64 = 50.0 / 3.6;

/// Square lattice of bidirectional roads, matching the shape the OSM
/// builder produces for a dense urban extract.
fn grid(rows: usize, cols: usize) -> RoadGraph {
    let mut graph = RoadGraph::new();
    for row in 0..rows {
        for col in 0..cols {
            graph.add_node(
                BASE_LAT + row as f64 * STEP_DEG,
                BASE_LON + col as f64 * STEP_DEG,
            );
        }
    }
    let mut edge_id = 0i64;
    let mut connect = |graph: &mut RoadGraph, a: usize, b: usize| {
        let (na, nb) = (graph.node(a), graph.node(b));
        let secs = distance_m(na.lat, na.lon, nb.lat, nb.lon) / SPEED_MPS;
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

fn bench_shortest_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("shortest_path");
    for size in [10usize, 20, 40] {
        let graph = grid(size, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &graph, |b, graph| {
            let goal = graph.num_nodes() - 1;
            b.iter(|| black_box(astar::shortest_path(graph, black_box(0), black_box(goal))));
        });
    }
    group.finish();
}

fn bench_route_with_snapping(c: &mut Criterion) {
    let engine = RoutingEngine::new(grid(30, 30));
    let far_lat = BASE_LAT + 29.0 * STEP_DEG;
    let far_lon = BASE_LON + 29.0 * STEP_DEG;
    c.bench_function("route_snap_30x30", |b| {
        b.iter(|| {
            black_box(engine.route(
                black_box(BASE_LAT),
                black_box(BASE_LON),
                black_box(far_lat),
                black_box(far_lon),
            ))
        });
    });
}

fn bench_nearest_edge_update(c: &mut Criterion) {
    let engine = RoutingEngine::new(grid(30, 30));
    let mid_lat = BASE_LAT + 15.0 * STEP_DEG;
    let mid_lon = BASE_LON + 15.0 * STEP_DEG;
    c.bench_function("update_edge_near_30x30", |b| {
        b.iter(|| {
            engine.update_edge_near(
                black_box(mid_lat),
                black_box(mid_lon),
                black_box(500.0),
                Direction::Both,
            )
        });
    });
}

criterion_group!(
    benches,
    bench_shortest_path,
    bench_route_with_snapping,
    bench_nearest_edge_update
);
criterion_main!(benches);
