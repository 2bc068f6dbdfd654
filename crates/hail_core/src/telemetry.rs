//! Telemetry: match records, lifecycle counters, and state snapshots.

use serde::Serialize;

/// One concluded match, recorded at the instant of the accept transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub rider_id: u64,
    pub driver_id: u64,
    pub bid: f64,
    pub ask: f64,
    /// Milliseconds between the rider's post and the accept.
    pub waited_ms: u64,
}

/// Accumulated engine telemetry. Snapshot-cloned on read.
#[derive(Debug, Default, Clone, Serialize)]
pub struct MatchTelemetry {
    pub matches: Vec<MatchRecord>,
    pub offers_sent_total: u64,
    pub riders_timed_out_total: u64,
    pub riders_cancelled_total: u64,
    pub drivers_cancelled_total: u64,
}

/// A live rider as seen from outside the engine.
#[derive(Debug, Clone, Serialize)]
pub struct RiderView {
    pub id: u64,
    pub bid: f64,
    pub lat: f64,
    pub lon: f64,
    /// Drivers currently holding an offer from this rider, sorted by id.
    pub pending_drivers: Vec<u64>,
}

/// A live driver as seen from outside the engine.
#[derive(Debug, Clone, Serialize)]
pub struct DriverView {
    pub id: u64,
    pub ask: f64,
    pub lat: f64,
    pub lon: f64,
    /// Riders with a live offer in this driver's inbox, sorted by id.
    pub inbox: Vec<u64>,
}

/// Point-in-time view of the engine's open principals. Terminal principals
/// are removed from the registries, so everything listed here is open.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub riders: Vec<RiderView>,
    pub drivers: Vec<DriverView>,
    /// Drivers currently present in the spatial index.
    pub indexed_drivers: usize,
    /// Riders still waiting to be processed by a matching worker.
    pub queue_depth: usize,
}
