//! CLI harness: load an OSM extract, build the road graph, and exercise the
//! routing and matching engines in one of five modes.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hail_core::config::EngineConfig;
use hail_core::graph::RoadGraph;
use hail_core::graph_build::GraphBuilder;
use hail_core::matching::{MatchingEngine, Rejection};
use hail_core::osm::load_extract;
use hail_core::routing::{Direction, RoutingEngine, TravelCost};
use hail_core::spatial::distance_m;
use hail_core::telemetry::EngineSnapshot;

#[derive(Parser)]
#[command(
    name = "hail",
    about = "Spot matching engine over an OSM road network"
)]
struct Cli {
    /// OSM PBF extract to route over
    osm_file: PathBuf,
    /// Harness mode
    #[arg(value_enum, default_value = "basic")]
    mode: Mode,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Routing smoke test plus a scripted matching walkthrough
    Basic,
    /// Routing smoke test only
    Simple,
    /// Scripted walkthrough followed by a JSON state dump
    Diagnostic,
    /// Command REPL against a live engine
    Interactive,
    /// Bulk post/accept timing run
    Performance,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let extract = load_extract(&cli.osm_file)
        .with_context(|| format!("failed to load '{}'", cli.osm_file.display()))?;
    println!(
        "Loaded {} nodes and {} ways.",
        extract.nodes.len(),
        extract.ways.len()
    );

    let graph = GraphBuilder::new(extract).build();
    println!(
        "Built graph with {} nodes and {} edges.",
        graph.num_nodes(),
        graph.num_edges()
    );
    anyhow::ensure!(graph.num_nodes() > 0, "graph has no routable nodes");

    let (a, b) = smoke_endpoints(&graph);
    let router = Arc::new(RoutingEngine::new(graph));

    match cli.mode {
        Mode::Simple => routing_smoke(&router, a, b),
        Mode::Basic => {
            routing_smoke(&router, a, b);
            matching_walkthrough(&router, false)?;
        }
        Mode::Diagnostic => {
            routing_smoke(&router, a, b);
            matching_walkthrough(&router, true)?;
        }
        Mode::Interactive => interactive(&router)?,
        Mode::Performance => performance(&router, a),
    }
    Ok(())
}

/// Node 0 and the node farthest from it: a pair guaranteed to exercise a
/// real route on whatever extract was loaded.
fn smoke_endpoints(graph: &RoadGraph) -> ((f64, f64), (f64, f64)) {
    let origin = graph.node(0);
    let far = graph
        .nodes()
        .iter()
        .max_by(|x, y| {
            distance_m(origin.lat, origin.lon, x.lat, x.lon)
                .total_cmp(&distance_m(origin.lat, origin.lon, y.lat, y.lon))
        })
        .unwrap_or(origin);
    ((origin.lat, origin.lon), (far.lat, far.lon))
}

fn routing_smoke(router: &RoutingEngine, a: (f64, f64), b: (f64, f64)) {
    println!("\n=== Routing Smoke Test ===");

    let d0 = router.route(a.0, a.1, b.0, b.1);
    println!(
        "Route ({:.4}, {:.4}) -> ({:.4}, {:.4}): {d0:.1} seconds",
        a.0, a.1, b.0, b.1
    );

    let mid = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
    router.update_edge_near(mid.0, mid.1, 999.0, Direction::Both);
    let d1 = router.route(a.0, a.1, b.0, b.1);
    println!("After blocking the edge nearest the midpoint: {d1:.1} seconds");

    if d1 > d0 {
        println!("Rerouted around the blocked edge.");
    }
}

fn engine_on(router: &Arc<RoutingEngine>, config: EngineConfig) -> MatchingEngine {
    let cost: Arc<dyn TravelCost> = Arc::clone(router) as Arc<dyn TravelCost>;
    MatchingEngine::with_cost_model(config, cost)
}

fn matching_walkthrough(router: &Arc<RoutingEngine>, dump_json: bool) -> anyhow::Result<()> {
    println!("\n=== Matching Walkthrough ===");
    let mut engine = engine_on(router, EngineConfig::default());
    engine.start(4);

    println!("\n--- Adding drivers ---");
    report("add driver 1", engine.add_driver(1, 10.0, 43.6900, -79.3200));
    report("add driver 2", engine.add_driver(2, 15.0, 43.6910, -79.3210));
    report("add driver 3", engine.add_driver(3, 8.0, 43.6905, -79.3195));
    report("add driver 4", engine.add_driver(4, 12.0, 43.6895, -79.3205));
    report("add driver 5", engine.add_driver(5, 25.0, 43.6915, -79.3190));

    println!("\n--- Adding riders ---");
    report("add rider 101", engine.add_rider(101, 30.0, 43.6900, -79.3200));
    report("add rider 102", engine.add_rider(102, 12.0, 43.6905, -79.3205));
    report("add rider 103", engine.add_rider(103, 5.0, 43.6910, -79.3200));

    thread::sleep(Duration::from_millis(500));
    print_state(&engine.snapshot());

    println!("\n--- Acceptances ---");
    report_accept(&engine, 3, 101);
    report_accept(&engine, 1, 102);
    report_accept(&engine, 2, 103);

    println!("\n--- Cancelling driver 4 ---");
    report("cancel driver 4", engine.driver_cancel(4));

    println!("\n--- Second wave ---");
    report("add driver 6", engine.add_driver(6, 7.0, 43.6910, -79.3205));
    report("add driver 7", engine.add_driver(7, 40.0, 43.6895, -79.3195));
    report("add rider 105", engine.add_rider(105, 10.0, 43.6900, -79.3210));
    report("add rider 106", engine.add_rider(106, 50.0, 43.6905, -79.3190));

    thread::sleep(Duration::from_millis(500));
    report_accept(&engine, 6, 105);
    report_accept(&engine, 7, 105);
    report_accept(&engine, 7, 106);

    thread::sleep(Duration::from_millis(200));
    print_state(&engine.snapshot());

    let telemetry = engine.telemetry();
    println!(
        "\nMatches: {}  offers sent: {}  cancellations: {}/{} (riders/drivers)",
        telemetry.matches.len(),
        telemetry.offers_sent_total,
        telemetry.riders_cancelled_total,
        telemetry.drivers_cancelled_total,
    );

    if dump_json {
        println!("\n--- Diagnostic dump ---");
        println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);
        println!("{}", serde_json::to_string_pretty(&telemetry)?);
    }

    engine.stop();
    println!("\n=== Walkthrough complete ===");
    Ok(())
}

fn interactive(router: &Arc<RoutingEngine>) -> anyhow::Result<()> {
    println!("\n=== Interactive Mode ===");
    print_help();

    let mut engine = engine_on(router, EngineConfig::default());
    engine.start(2);

    let stdin = io::stdin();
    prompt()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let args: Vec<&str> = line.split_whitespace().collect();
        match args.split_first() {
            None => {}
            Some((&"quit", _)) | Some((&"exit", _)) => break,
            Some((&"driver", rest)) => match parse_post(rest) {
                Some((id, ask, lat, lon)) => {
                    report("add driver", engine.add_driver(id, ask, lat, lon))
                }
                None => println!("Usage: driver ID ASK LAT LON"),
            },
            Some((&"rider", rest)) => match parse_post(rest) {
                Some((id, bid, lat, lon)) => {
                    report("add rider", engine.add_rider(id, bid, lat, lon))
                }
                None => println!("Usage: rider ID BID LAT LON"),
            },
            Some((&"accept", rest)) => match parse_ids::<2>(rest) {
                Some([driver_id, rider_id]) => report_accept(&engine, driver_id, rider_id),
                None => println!("Usage: accept DRIVER_ID RIDER_ID"),
            },
            Some((&"cancel-driver", rest)) => match parse_ids::<1>(rest) {
                Some([id]) => report("cancel driver", engine.driver_cancel(id)),
                None => println!("Usage: cancel-driver ID"),
            },
            Some((&"cancel-rider", rest)) => match parse_ids::<1>(rest) {
                Some([id]) => report("cancel rider", engine.rider_cancel(id)),
                None => println!("Usage: cancel-rider ID"),
            },
            Some((&"state", _)) => print_state(&engine.snapshot()),
            Some((&"wait", rest)) => match rest.first().and_then(|s| s.parse::<f64>().ok()) {
                Some(secs) if secs >= 0.0 => thread::sleep(Duration::from_secs_f64(secs)),
                _ => println!("Usage: wait SECS"),
            },
            Some((&"help", _)) => print_help(),
            Some((other, _)) => println!("Unknown command '{other}'; type 'help'"),
        }
        prompt()?;
    }

    engine.stop();
    println!("Interactive session closed.");
    Ok(())
}

fn performance(router: &Arc<RoutingEngine>, center: (f64, f64)) {
    println!("\n=== Performance Test ===");
    let mut engine = engine_on(router, EngineConfig::default());
    engine.start(8);

    let mut rng = StdRng::seed_from_u64(42);
    let mut jitter = |rng: &mut StdRng| {
        (
            center.0 + rng.gen_range(-0.004..=0.004),
            center.1 + rng.gen_range(-0.004..=0.004),
        )
    };

    let started = Instant::now();
    for i in 1u64..=100 {
        let (lat, lon) = jitter(&mut rng);
        let _ = engine.add_driver(i, 10.0 + (i % 20) as f64, lat, lon);
    }
    for i in 101u64..=150 {
        let (lat, lon) = jitter(&mut rng);
        let _ = engine.add_rider(i, 20.0 + (i % 15) as f64, lat, lon);
    }
    for i in 1u64..=20 {
        let _ = engine.driver_accept(i, 100 + (i % 50) + 1);
    }
    let post_elapsed = started.elapsed();

    thread::sleep(Duration::from_secs(2));
    let telemetry = engine.telemetry();
    println!(
        "Posted 100 drivers + 50 riders and attempted 20 accepts in {post_elapsed:?}"
    );
    println!(
        "Matches: {}  offers sent: {}",
        telemetry.matches.len(),
        telemetry.offers_sent_total
    );

    engine.stop();
}

fn prompt() -> io::Result<()> {
    print!("> ");
    io::stdout().flush()
}

fn print_help() {
    println!("Commands:");
    println!("  driver ID ASK LAT LON  - add a driver");
    println!("  rider ID BID LAT LON   - add a rider");
    println!("  accept DRIVER RIDER    - driver accepts rider");
    println!("  cancel-driver ID       - cancel a driver");
    println!("  cancel-rider ID        - cancel a rider");
    println!("  state                  - show engine state");
    println!("  wait SECS              - pause (lets fan-out settle)");
    println!("  quit                   - exit");
}

fn print_state(snapshot: &EngineSnapshot) {
    println!("--- Engine State ---");
    println!("Open riders: {}", snapshot.riders.len());
    for rider in &snapshot.riders {
        println!(
            "  rider {:>4}  bid {:>7.2}  pending drivers {:?}",
            rider.id, rider.bid, rider.pending_drivers
        );
    }
    println!("Open drivers: {}", snapshot.drivers.len());
    for driver in &snapshot.drivers {
        println!(
            "  driver {:>3}  ask {:>7.2}  inbox {:?}",
            driver.id, driver.ask, driver.inbox
        );
    }
    println!(
        "Indexed drivers: {}  queued riders: {}",
        snapshot.indexed_drivers, snapshot.queue_depth
    );
}

fn report(label: &str, result: Result<(), Rejection>) {
    match result {
        Ok(()) => println!("{label}: ok"),
        Err(rejection) => println!("{label}: rejected ({rejection})"),
    }
}

fn report_accept(engine: &MatchingEngine, driver_id: u64, rider_id: u64) {
    match engine.driver_accept(driver_id, rider_id) {
        Ok(record) => println!(
            "driver {driver_id} + rider {rider_id}: matched (ask {:.2} <= bid {:.2}, waited {}ms)",
            record.ask, record.bid, record.waited_ms
        ),
        Err(rejection) => println!("driver {driver_id} + rider {rider_id}: rejected ({rejection})"),
    }
}

fn parse_post(args: &[&str]) -> Option<(u64, f64, f64, f64)> {
    let [id, price, lat, lon] = args else {
        return None;
    };
    Some((
        id.parse().ok()?,
        price.parse().ok()?,
        lat.parse().ok()?,
        lon.parse().ok()?,
    ))
}

fn parse_ids<const N: usize>(args: &[&str]) -> Option<[u64; N]> {
    if args.len() != N {
        return None;
    }
    let mut out = [0u64; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg.parse().ok()?;
    }
    Some(out)
}
