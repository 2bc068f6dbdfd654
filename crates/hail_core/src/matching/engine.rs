//! The matching engine: registries, offer fan-out, and the two-party accept.
//!
//! Concurrency layout (coarse-lock design):
//!
//! - one mutex guards the rider registry, driver registry, driver index, and
//!   telemetry; every cross-entity transition happens inside it
//! - the rider queue has its own mutex + condvar ([`RiderQueue`])
//! - candidate scoring runs outside the state lock on an id/coordinate
//!   snapshot, and offers are revalidated before placement
//!
//! Public entry points execute on the caller's thread and return promptly;
//! matching workers and the timeout reaper own all queue- and clock-driven
//! mutation.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use h3o::{CellIndex, Resolution};
use lru::LruCache;

use super::queue::RiderQueue;
use super::types::{
    Driver, DriverId, DriverState, Rejection, Rider, RiderId, RiderState,
};
use crate::config::EngineConfig;
use crate::routing::{GreatCircleCost, TravelCost};
use crate::spatial::{DriverIndex, GeoIndex};
use crate::telemetry::{DriverView, EngineSnapshot, MatchRecord, MatchTelemetry, RiderView};

#[derive(Default)]
struct MarketState {
    riders: HashMap<RiderId, Rider>,
    drivers: HashMap<DriverId, Driver>,
    index: DriverIndex,
    telemetry: MatchTelemetry,
}

struct EngineShared {
    config: EngineConfig,
    geo: GeoIndex,
    cost: Arc<dyn TravelCost>,
    state: Mutex<MarketState>,
    queue: RiderQueue,
    running: AtomicBool,
    /// Reaper sleep gate: flag flips on stop, condvar cuts the 1s naps short.
    reaper_gate: (Mutex<bool>, Condvar),
    cost_cache: Mutex<LruCache<(CellIndex, CellIndex), f64>>,
}

/// Spot market between riders and drivers. See the module docs for the
/// locking discipline; see [`EngineConfig`] for tuning.
pub struct MatchingEngine {
    shared: Arc<EngineShared>,
    workers: Vec<JoinHandle<()>>,
    reaper: Option<JoinHandle<()>>,
}

impl MatchingEngine {
    /// Engine with no road network: candidates are scored by great-circle
    /// distance at cruise speed.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_cost_model(config, Arc::new(GreatCircleCost::default()))
    }

    /// Engine scoring candidates through the given travel-cost oracle
    /// (typically a shared [`crate::routing::RoutingEngine`]).
    pub fn with_cost_model(config: EngineConfig, cost: Arc<dyn TravelCost>) -> Self {
        let resolution =
            Resolution::try_from(config.resolution).unwrap_or(Resolution::Nine);
        let cache_capacity =
            NonZeroUsize::new(config.cost_cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            shared: Arc::new(EngineShared {
                config,
                geo: GeoIndex::new(resolution),
                cost,
                state: Mutex::new(MarketState::default()),
                queue: RiderQueue::new(),
                running: AtomicBool::new(false),
                reaper_gate: (Mutex::new(false), Condvar::new()),
                cost_cache: Mutex::new(LruCache::new(cache_capacity)),
            }),
            workers: Vec::new(),
            reaper: None,
        }
    }

    /// Spawn `num_workers` matching workers (0 → the configured default) and
    /// the timeout reaper. Idempotent while running.
    pub fn start(&mut self, num_workers: usize) {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let num_workers = if num_workers == 0 {
            self.shared.config.matching_workers
        } else {
            num_workers
        };

        for _ in 0..num_workers.max(1) {
            let shared = Arc::clone(&self.shared);
            self.workers.push(thread::spawn(move || {
                while shared.running.load(Ordering::Acquire) {
                    match shared.queue.pop() {
                        Some(rider_id) => shared.process_rider(rider_id),
                        None => break,
                    }
                }
            }));
        }

        let shared = Arc::clone(&self.shared);
        self.reaper = Some(thread::spawn(move || {
            let interval = Duration::from_millis(shared.config.reap_interval_ms.max(1));
            loop {
                let stop_requested = {
                    let (lock, cvar) = &shared.reaper_gate;
                    let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                    let (guard, _) = cvar
                        .wait_timeout(guard, interval)
                        .unwrap_or_else(PoisonError::into_inner);
                    *guard
                };
                if stop_requested {
                    break;
                }
                shared.reap_timed_out();
            }
        }));
    }

    /// Stop accepting work, wake every waiter, and join all threads. Riders
    /// still queued are abandoned. State stays readable afterwards.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.queue.close();
        {
            let (lock, cvar) = &self.shared.reaper_gate;
            *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
            cvar.notify_all();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        if let Some(reaper) = self.reaper.take() {
            let _ = reaper.join();
        }
    }

    /// Register a rider and enqueue it for matching.
    pub fn add_rider(&self, id: RiderId, bid: f64, lat: f64, lon: f64) -> Result<(), Rejection> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(Rejection::EngineStopped);
        }
        let cell = self
            .shared
            .geo
            .cell_of(lat, lon)
            .ok_or(Rejection::InvalidLocation { lat, lon })?;

        {
            let mut state = self.shared.lock_state();
            if state.riders.contains_key(&id) {
                return Err(Rejection::DuplicateRider(id));
            }
            state.riders.insert(
                id,
                Rider {
                    id,
                    bid,
                    lat,
                    lon,
                    cell,
                    state: RiderState::Open,
                    posted_at: Instant::now(),
                    pending_drivers: Default::default(),
                },
            );
        }

        self.shared.queue.push(id);
        Ok(())
    }

    /// Register a driver and index it spatially.
    pub fn add_driver(&self, id: DriverId, ask: f64, lat: f64, lon: f64) -> Result<(), Rejection> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(Rejection::EngineStopped);
        }
        let cell = self
            .shared
            .geo
            .cell_of(lat, lon)
            .ok_or(Rejection::InvalidLocation { lat, lon })?;

        let mut state = self.shared.lock_state();
        if state.drivers.contains_key(&id) {
            return Err(Rejection::DuplicateDriver(id));
        }
        state.drivers.insert(
            id,
            Driver {
                id,
                ask,
                lat,
                lon,
                cell,
                state: DriverState::Open,
                inbox: Default::default(),
            },
        );
        state.index.insert(id, cell);
        Ok(())
    }

    /// Attempt the two-party match. The whole transition (verification, both
    /// state flips, index removal, dangling-offer cleanup) is one critical
    /// section: no observer sees only one side matched.
    pub fn driver_accept(
        &self,
        driver_id: DriverId,
        rider_id: RiderId,
    ) -> Result<MatchRecord, Rejection> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(Rejection::EngineStopped);
        }

        let mut guard = self.shared.lock_state();
        let state = &mut *guard;

        {
            let driver = state
                .drivers
                .get(&driver_id)
                .ok_or(Rejection::UnknownDriver(driver_id))?;
            let rider = state
                .riders
                .get(&rider_id)
                .ok_or(Rejection::UnknownRider(rider_id))?;

            if !driver.inbox.contains(&rider_id) {
                return Err(Rejection::NotOffered {
                    driver: driver_id,
                    rider: rider_id,
                });
            }
            if driver.state != DriverState::Open {
                return Err(Rejection::DriverNotOpen(driver_id));
            }
            if rider.state != RiderState::Open {
                return Err(Rejection::RiderNotOpen(rider_id));
            }
            if driver.ask > rider.bid {
                return Err(Rejection::PriceMismatch {
                    ask: driver.ask,
                    bid: rider.bid,
                });
            }
        }

        let Some(mut driver) = state.drivers.remove(&driver_id) else {
            return Err(Rejection::UnknownDriver(driver_id));
        };
        let Some(mut rider) = state.riders.remove(&rider_id) else {
            return Err(Rejection::UnknownRider(rider_id));
        };
        driver.state = DriverState::Matched;
        rider.state = RiderState::Matched;

        state.index.remove(driver_id);
        for other in &rider.pending_drivers {
            if *other == driver_id {
                continue;
            }
            if let Some(other_driver) = state.drivers.get_mut(other) {
                other_driver.inbox.remove(&rider_id);
            }
        }

        let record = MatchRecord {
            rider_id,
            driver_id,
            bid: rider.bid,
            ask: driver.ask,
            waited_ms: rider.posted_at.elapsed().as_millis() as u64,
        };
        state.telemetry.matches.push(record.clone());
        Ok(record)
    }

    /// Cancel an open driver. Riders still listing it among their pending
    /// drivers are repaired lazily during match cleanup.
    pub fn driver_cancel(&self, driver_id: DriverId) -> Result<(), Rejection> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(Rejection::EngineStopped);
        }
        let mut state = self.shared.lock_state();
        match state.drivers.get(&driver_id) {
            None => return Err(Rejection::UnknownDriver(driver_id)),
            Some(driver) if driver.state != DriverState::Open => {
                return Err(Rejection::DriverNotOpen(driver_id))
            }
            Some(_) => {}
        }
        state.drivers.remove(&driver_id);
        state.index.remove(driver_id);
        state.telemetry.drivers_cancelled_total =
            state.telemetry.drivers_cancelled_total.saturating_add(1);
        Ok(())
    }

    /// Cancel an open rider and scrub its offers from driver inboxes.
    pub fn rider_cancel(&self, rider_id: RiderId) -> Result<(), Rejection> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(Rejection::EngineStopped);
        }
        let mut guard = self.shared.lock_state();
        let state = &mut *guard;
        match state.riders.get(&rider_id) {
            None => return Err(Rejection::UnknownRider(rider_id)),
            Some(rider) if rider.state != RiderState::Open => {
                return Err(Rejection::RiderNotOpen(rider_id))
            }
            Some(_) => {}
        }
        let Some(rider) = state.riders.remove(&rider_id) else {
            return Err(Rejection::UnknownRider(rider_id));
        };
        for driver_id in &rider.pending_drivers {
            if let Some(driver) = state.drivers.get_mut(driver_id) {
                driver.inbox.remove(&rider_id);
            }
        }
        state.telemetry.riders_cancelled_total =
            state.telemetry.riders_cancelled_total.saturating_add(1);
        Ok(())
    }

    /// Point-in-time view of open principals, sorted by id.
    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.shared.lock_state();
        let mut riders: Vec<RiderView> = state
            .riders
            .values()
            .map(|r| {
                let mut pending_drivers: Vec<DriverId> =
                    r.pending_drivers.iter().copied().collect();
                pending_drivers.sort_unstable();
                RiderView {
                    id: r.id,
                    bid: r.bid,
                    lat: r.lat,
                    lon: r.lon,
                    pending_drivers,
                }
            })
            .collect();
        riders.sort_unstable_by_key(|r| r.id);

        let mut drivers: Vec<DriverView> = state
            .drivers
            .values()
            .map(|d| {
                let mut inbox: Vec<RiderId> = d.inbox.iter().copied().collect();
                inbox.sort_unstable();
                DriverView {
                    id: d.id,
                    ask: d.ask,
                    lat: d.lat,
                    lon: d.lon,
                    inbox,
                }
            })
            .collect();
        drivers.sort_unstable_by_key(|d| d.id);

        EngineSnapshot {
            riders,
            drivers,
            indexed_drivers: state.index.len(),
            queue_depth: self.shared.queue.len(),
        }
    }

    /// Clone of the accumulated telemetry.
    pub fn telemetry(&self) -> MatchTelemetry {
        self.shared.lock_state().telemetry.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

impl Drop for MatchingEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl EngineShared {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, MarketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One pass of the matching worker protocol for a dequeued rider.
    fn process_rider(&self, rider_id: RiderId) {
        // Phase 1: snapshot the rider and its eligible neighborhood.
        let (rider_bid, rider_lat, rider_lon, rider_cell, candidates) = {
            let state = self.lock_state();
            let Some(rider) = state.riders.get(&rider_id) else {
                return;
            };
            if rider.state != RiderState::Open {
                return;
            }
            let cells = self.geo.grid_disk(rider.cell, self.config.search_ring);
            let mut candidates = Vec::new();
            for driver_id in state.index.drivers_in(&cells) {
                let Some(driver) = state.drivers.get(&driver_id) else {
                    continue;
                };
                if driver.state != DriverState::Open || driver.ask > rider.bid {
                    continue;
                }
                candidates.push((driver_id, driver.lat, driver.lon, driver.cell));
            }
            (rider.bid, rider.lat, rider.lon, rider.cell, candidates)
        };

        // Phase 2: score driver → rider travel outside the lock.
        let mut scored: Vec<(f64, DriverId)> = candidates
            .into_iter()
            .filter_map(|(driver_id, lat, lon, cell)| {
                self.travel_secs_cached(lat, lon, cell, rider_lat, rider_lon, rider_cell)
                    .map(|cost| (cost, driver_id))
            })
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(self.config.offers_per_rider);

        if scored.is_empty() {
            return;
        }

        // Phase 3: place offers, revalidating everything under the lock.
        let mut guard = self.lock_state();
        let state = &mut *guard;
        match state.riders.get(&rider_id) {
            Some(rider) if rider.state == RiderState::Open => {}
            _ => return,
        }

        let mut offered = Vec::with_capacity(scored.len());
        for (_cost, driver_id) in &scored {
            let Some(driver) = state.drivers.get_mut(driver_id) else {
                continue;
            };
            if driver.state != DriverState::Open || driver.ask > rider_bid {
                continue;
            }
            if driver.inbox.insert(rider_id) {
                offered.push(*driver_id);
            }
        }
        if offered.is_empty() {
            return;
        }

        state.telemetry.offers_sent_total = state
            .telemetry
            .offers_sent_total
            .saturating_add(offered.len() as u64);
        if let Some(rider) = state.riders.get_mut(&rider_id) {
            rider.pending_drivers.extend(offered);
        }
    }

    /// Travel seconds with an LRU cache keyed by cell pair. Used for ranking
    /// only, so staleness after edge-weight updates is acceptable. Failures
    /// are not cached.
    fn travel_secs_cached(
        &self,
        from_lat: f64,
        from_lon: f64,
        from_cell: CellIndex,
        to_lat: f64,
        to_lon: f64,
        to_cell: CellIndex,
    ) -> Option<f64> {
        let key = (from_cell, to_cell);
        {
            let mut cache = self.cost_cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(&cost) = cache.get(&key) {
                return Some(cost);
            }
        }

        let cost = self.cost.travel_secs(from_lat, from_lon, to_lat, to_lon)?;
        if !cost.is_finite() || cost < 0.0 {
            return None;
        }

        self.cost_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, cost);
        Some(cost)
    }

    /// Expire riders older than the configured timeout, with the same inbox
    /// scrub as a cancel.
    fn reap_timed_out(&self) {
        let timeout = Duration::from_secs(self.config.rider_timeout_secs);
        let mut guard = self.lock_state();
        let state = &mut *guard;

        let expired: Vec<RiderId> = state
            .riders
            .values()
            .filter(|r| r.state == RiderState::Open && r.posted_at.elapsed() >= timeout)
            .map(|r| r.id)
            .collect();

        for rider_id in expired {
            let Some(rider) = state.riders.remove(&rider_id) else {
                continue;
            };
            for driver_id in &rider.pending_drivers {
                if let Some(driver) = state.drivers.get_mut(driver_id) {
                    driver.inbox.remove(&rider_id);
                }
            }
            state.telemetry.riders_timed_out_total =
                state.telemetry.riders_timed_out_total.saturating_add(1);
        }
    }
}
