use serde::{Deserialize, Serialize};

/// Matching worker threads started by default.
pub const DEFAULT_MATCHING_WORKERS: usize = 4;

/// Maximum simultaneous offers fanned out per rider.
pub const DEFAULT_OFFERS_PER_RIDER: usize = 5;

/// Hex-grid rings searched around the rider's cell for candidates.
pub const DEFAULT_SEARCH_RING: u32 = 1;

/// Seconds an unmatched rider stays open before timing out.
pub const DEFAULT_RIDER_TIMEOUT_SECS: u64 = 300;

/// Interval between timeout scans, in milliseconds.
pub const DEFAULT_REAP_INTERVAL_MS: u64 = 1000;

/// H3 resolution for the driver index (~240m cells).
pub const DEFAULT_RESOLUTION: u8 = 9;

/// Entries in the travel-cost LRU cache.
pub const DEFAULT_COST_CACHE_CAPACITY: usize = 20_000;

/// Tuning knobs for the matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker threads consuming the rider queue.
    pub matching_workers: usize,
    /// Fan-out cap K: offers placed per rider.
    pub offers_per_rider: usize,
    /// Candidate search radius in hex rings around the rider's cell.
    pub search_ring: u32,
    /// Rider time-to-live while unmatched, in seconds.
    pub rider_timeout_secs: u64,
    /// Timeout-scan period, in milliseconds.
    pub reap_interval_ms: u64,
    /// H3 resolution (0..=15) of the driver index.
    pub resolution: u8,
    /// Capacity of the candidate travel-cost cache.
    pub cost_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matching_workers: DEFAULT_MATCHING_WORKERS,
            offers_per_rider: DEFAULT_OFFERS_PER_RIDER,
            search_ring: DEFAULT_SEARCH_RING,
            rider_timeout_secs: DEFAULT_RIDER_TIMEOUT_SECS,
            reap_interval_ms: DEFAULT_REAP_INTERVAL_MS,
            resolution: DEFAULT_RESOLUTION,
            cost_cache_capacity: DEFAULT_COST_CACHE_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn with_rider_timeout_secs(mut self, secs: u64) -> Self {
        self.rider_timeout_secs = secs;
        self
    }

    pub fn with_reap_interval_ms(mut self, ms: u64) -> Self {
        self.reap_interval_ms = ms;
        self
    }

    pub fn with_offers_per_rider(mut self, k: usize) -> Self {
        self.offers_per_rider = k;
        self
    }

    pub fn with_search_ring(mut self, ring: u32) -> Self {
        self.search_ring = ring;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tuning() {
        let config = EngineConfig::default();
        assert_eq!(config.matching_workers, 4);
        assert_eq!(config.offers_per_rider, 5);
        assert_eq!(config.search_ring, 1);
        assert_eq!(config.rider_timeout_secs, 300);
        assert_eq!(config.reap_interval_ms, 1000);
        assert_eq!(config.resolution, 9);
    }

    #[test]
    fn builder_helpers_override_fields() {
        let config = EngineConfig::default()
            .with_rider_timeout_secs(2)
            .with_offers_per_rider(3)
            .with_search_ring(2);
        assert_eq!(config.rider_timeout_secs, 2);
        assert_eq!(config.offers_per_rider, 3);
        assert_eq!(config.search_ring, 2);
    }
}
