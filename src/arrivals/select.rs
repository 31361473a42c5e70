use super::{ArrivalRow, Direction};
use crate::stations::{StationRecord, StationTable};

/// Most arrivals shown for one selection
pub const MAX_ROWS: usize = 5;

/// Direction a train must travel to get from `origin` to `destination`.
///
/// Compares northbound stop ids: the reference table numbers stations so that
/// a higher id lies further north along the line.
pub fn required_direction(origin: &StationRecord, destination: &StationRecord) -> Direction {
    if origin.stop_id_northbound > destination.stop_id_northbound {
        Direction::Northbound
    } else {
        Direction::Southbound
    }
}

/// Look up both ends of a selection. `None` if either name is unknown.
pub fn resolve_stations<'a>(
    stations: &'a StationTable,
    origin: &str,
    destination: &str,
) -> Option<(&'a StationRecord, &'a StationRecord)> {
    Some((stations.find(origin)?, stations.find(destination)?))
}

/// The next arrivals at `origin` heading towards `destination`, soonest
/// first, at most [`MAX_ROWS`].
pub fn select_arrivals(
    rows: Vec<ArrivalRow>,
    origin: &StationRecord,
    destination: &StationRecord,
) -> Vec<ArrivalRow> {
    let direction = required_direction(origin, destination);
    let stop_id = direction.stop_id(origin);

    let mut selected: Vec<ArrivalRow> = rows
        .into_iter()
        .filter(|row| row.call.direction.contains(direction.marker()))
        .filter(|row| row.call.stop_id == stop_id)
        .collect();

    selected.sort_by_key(ArrivalRow::expected_arrival_time);
    selected.truncate(MAX_ROWS);
    selected
}
