use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use h3o::CellIndex;

pub type RiderId = u64;
pub type DriverId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiderState {
    Open,
    Matched,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Open,
    Matched,
    Cancelled,
}

/// A posted rider. Lives in the registry only while open; any terminal
/// transition removes it in the same critical section.
#[derive(Debug)]
pub struct Rider {
    pub id: RiderId,
    pub bid: f64,
    pub lat: f64,
    pub lon: f64,
    pub cell: CellIndex,
    pub state: RiderState,
    pub posted_at: Instant,
    /// Drivers currently holding an unexpired offer for this rider.
    pub pending_drivers: HashSet<DriverId>,
}

/// A posted driver. Location is fixed for the driver's lifecycle.
#[derive(Debug)]
pub struct Driver {
    pub id: DriverId,
    pub ask: f64,
    pub lat: f64,
    pub lon: f64,
    pub cell: CellIndex,
    pub state: DriverState,
    /// Riders with a live offer to this driver.
    pub inbox: HashSet<RiderId>,
}

/// Client-visible rejections. None of these change engine state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    DuplicateRider(RiderId),
    DuplicateDriver(DriverId),
    UnknownRider(RiderId),
    UnknownDriver(DriverId),
    RiderNotOpen(RiderId),
    DriverNotOpen(DriverId),
    /// The rider is not in the driver's inbox.
    NotOffered { driver: DriverId, rider: RiderId },
    /// The driver's ask exceeds the rider's bid.
    PriceMismatch { ask: f64, bid: f64 },
    InvalidLocation { lat: f64, lon: f64 },
    EngineStopped,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::DuplicateRider(id) => write!(f, "rider {id} already posted"),
            Rejection::DuplicateDriver(id) => write!(f, "driver {id} already posted"),
            Rejection::UnknownRider(id) => write!(f, "no such rider {id}"),
            Rejection::UnknownDriver(id) => write!(f, "no such driver {id}"),
            Rejection::RiderNotOpen(id) => write!(f, "rider {id} is no longer open"),
            Rejection::DriverNotOpen(id) => write!(f, "driver {id} is no longer open"),
            Rejection::NotOffered { driver, rider } => {
                write!(f, "rider {rider} has no live offer to driver {driver}")
            }
            Rejection::PriceMismatch { ask, bid } => {
                write!(f, "ask {ask:.2} exceeds bid {bid:.2}")
            }
            Rejection::InvalidLocation { lat, lon } => {
                write!(f, "({lat}, {lon}) is not a valid coordinate")
            }
            Rejection::EngineStopped => write!(f, "engine is stopped"),
        }
    }
}

impl std::error::Error for Rejection {}
