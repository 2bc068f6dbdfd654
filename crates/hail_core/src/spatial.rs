//! Spatial operations: H3-based geographic indexing and distance calculations.
//!
//! This module provides:
//!
//! - **GeoIndex**: Wrapper for H3 resolution configuration
//! - **Grid disk queries**: Find cells within K grid distance
//! - **distance_m**: Haversine distance between coordinates
//! - **DriverIndex**: H3 cell → driver-id mappings for candidate search
//!
//! Default resolution is 9 (~240m cell size), suitable for city-scale fleets.

use std::collections::HashMap;

use h3o::{CellIndex, LatLng, Resolution};

/// Earth radius used by every great-circle computation, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy)]
pub struct GeoIndex {
    resolution: Resolution,
}

impl GeoIndex {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Snap a coordinate to its containing cell. `None` when the coordinate
    /// is not a valid latitude/longitude pair.
    pub fn cell_of(&self, lat: f64, lon: f64) -> Option<CellIndex> {
        LatLng::new(lat, lon).ok().map(|ll| ll.to_cell(self.resolution))
    }

    pub fn grid_disk(&self, origin: CellIndex, k: u32) -> Vec<CellIndex> {
        debug_assert_eq!(
            origin.resolution(),
            self.resolution,
            "origin resolution must match GeoIndex resolution"
        );
        origin.grid_disk::<Vec<_>>(k)
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self {
            resolution: Resolution::Nine,
        }
    }
}

/// Haversine great-circle distance between two coordinates, in meters.
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());
    let (lat2, lon2) = (lat2.to_radians(), lon2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Spatial index over open drivers.
///
/// Maintains mappings from H3 cells to driver ids so candidate search is a
/// handful of cell lookups instead of a scan over the whole registry. Mutated
/// only under the matching engine's state lock, in the same critical section
/// as the driver registry it mirrors.
#[derive(Debug, Default)]
pub struct DriverIndex {
    drivers_by_cell: HashMap<CellIndex, Vec<u64>>,
    driver_to_cell: HashMap<u64, CellIndex>,
}

impl DriverIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a driver at the given cell.
    pub fn insert(&mut self, driver_id: u64, cell: CellIndex) {
        self.drivers_by_cell.entry(cell).or_default().push(driver_id);
        self.driver_to_cell.insert(driver_id, cell);
    }

    /// Remove a driver from the index.
    pub fn remove(&mut self, driver_id: u64) {
        if let Some(cell) = self.driver_to_cell.remove(&driver_id) {
            if let Some(ids) = self.drivers_by_cell.get_mut(&cell) {
                ids.retain(|&id| id != driver_id);
                if ids.is_empty() {
                    self.drivers_by_cell.remove(&cell);
                }
            }
        }
    }

    /// All driver ids in the given cells.
    pub fn drivers_in(&self, cells: &[CellIndex]) -> Vec<u64> {
        let mut result = Vec::new();
        for cell in cells {
            if let Some(ids) = self.drivers_by_cell.get(cell) {
                result.extend(ids.iter().copied());
            }
        }
        result
    }

    /// The cell a driver was indexed at.
    pub fn cell_of(&self, driver_id: u64) -> Option<CellIndex> {
        self.driver_to_cell.get(&driver_id).copied()
    }

    pub fn len(&self) -> usize {
        self.driver_to_cell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.driver_to_cell.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_disk_returns_neighbors_within_k() {
        let geo = GeoIndex::default();
        let origin = geo.cell_of(43.69, -79.32).expect("valid cell");
        let cells = geo.grid_disk(origin, 1);

        assert!(cells.contains(&origin));
        assert_eq!(cells.len(), 7);
        for cell in cells {
            let distance = origin.grid_distance(cell).expect("grid distance");
            assert!(distance <= 1);
        }
    }

    #[test]
    fn cell_of_rejects_invalid_coordinates() {
        let geo = GeoIndex::default();
        assert!(geo.cell_of(91.0, 0.0).is_none());
        assert!(geo.cell_of(43.69, -79.32).is_some());
    }

    #[test]
    fn distance_between_toronto_landmarks_is_plausible() {
        // CN Tower to Union Station is roughly half a kilometer.
        let d = distance_m(43.6426, -79.3871, 43.6453, -79.3806);
        assert!(d > 400.0 && d < 800.0, "got {d}");
    }

    #[test]
    fn index_insert_remove_roundtrip() {
        let geo = GeoIndex::default();
        let cell = geo.cell_of(43.69, -79.32).expect("valid cell");
        let mut index = DriverIndex::new();

        index.insert(7, cell);
        index.insert(8, cell);
        assert_eq!(index.len(), 2);
        assert_eq!(index.cell_of(7), Some(cell));

        let mut found = index.drivers_in(&[cell]);
        found.sort_unstable();
        assert_eq!(found, vec![7, 8]);

        index.remove(7);
        assert_eq!(index.drivers_in(&[cell]), vec![8]);

        index.remove(8);
        assert!(index.is_empty());
        assert!(index.drivers_in(&[cell]).is_empty());
    }

    #[test]
    fn removing_unknown_driver_is_a_noop() {
        let mut index = DriverIndex::new();
        index.remove(42);
        assert!(index.is_empty());
    }
}
