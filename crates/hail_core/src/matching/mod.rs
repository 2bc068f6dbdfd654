pub mod engine;
pub mod queue;
pub mod types;

pub use engine::MatchingEngine;
pub use queue::RiderQueue;
pub use types::{Driver, DriverId, DriverState, Rejection, Rider, RiderId, RiderState};
