pub mod select;
pub mod transform;

use crate::stations::StationRecord;
use chrono::{DateTime, Local, TimeDelta};
use serde::Serialize;
use std::fmt;

pub use select::{required_direction, resolve_stations, select_arrivals};
pub use transform::{transform, TransformError};

/// Travel direction along the line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Northbound,
    Southbound,
}

impl Direction {
    /// Marker used in direction tags (`"NB"` / `"SB"`)
    pub fn marker(&self) -> &'static str {
        match self {
            Direction::Northbound => "NB",
            Direction::Southbound => "SB",
        }
    }

    /// Read a direction tag such as `"NB"`. Anything not marked northbound
    /// is southbound.
    pub fn from_tag(tag: &str) -> Self {
        if tag.contains(Direction::Northbound.marker()) {
            Direction::Northbound
        } else {
            Direction::Southbound
        }
    }

    /// The stop id a train in this direction calls at for `station`
    pub fn stop_id(&self, station: &StationRecord) -> u32 {
        match self {
            Direction::Northbound => station.stop_id_northbound,
            Direction::Southbound => station.stop_id_southbound,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// One upcoming stop of one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleCall {
    pub stop_name: String,
    pub stop_id: u32,
    pub aimed_arrival_time: DateTime<Local>,
    pub expected_arrival_time: DateTime<Local>,
    pub origin: String,
    pub origin_id: String,
    /// Feed direction with a `B` appended, e.g. `"NB"`
    pub direction: String,
    /// Published line name, e.g. `"Baby Bullet"`
    pub line_type: String,
    pub destination: String,
    /// 0 for the monitored call, then 1.. along the onward calls
    pub stops_away: usize,
}

/// A vehicle call joined with the station it stops at
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalRow {
    pub call: VehicleCall,
    pub station: StationRecord,
    /// Expected arrival minus the poll time. Negative once the train is due.
    pub eta: TimeDelta,
}

impl ArrivalRow {
    pub fn expected_arrival_time(&self) -> DateTime<Local> {
        self.call.expected_arrival_time
    }

    pub fn direction(&self) -> Direction {
        Direction::from_tag(&self.call.direction)
    }
}
