use super::{ArrivalRow, VehicleCall};
use crate::feed::{Call, MonitoredVehicleJourney, VehicleActivity};
use crate::stations::{StationRecord, StationTable};
use chrono::{DateTime, Local};
use tracing::debug;

/// Expand the feed into arrival rows joined against the station table.
///
/// Journeys without onward calls are skipped. Rows are matched once against
/// the southbound stop ids and once against the northbound ones, and the two
/// match sets are concatenated in that order. Any malformed call aborts the
/// whole batch.
pub fn transform(
    activities: &[VehicleActivity],
    stations: &StationTable,
    now: DateTime<Local>,
) -> Result<Vec<ArrivalRow>, TransformError> {
    let mut calls = Vec::new();
    for activity in activities {
        calls.extend(expand_journey(&activity.monitored_vehicle_journey)?);
    }

    let southbound = join(&calls, stations, now, |s| s.stop_id_southbound);
    let northbound = join(&calls, stations, now, |s| s.stop_id_northbound);

    let rows: Vec<ArrivalRow> = southbound.chain(northbound).collect();

    debug!(
        vehicles = activities.len(),
        calls = calls.len(),
        rows = rows.len(),
        "Transformed vehicle activity"
    );

    Ok(rows)
}

/// Rows for one journey: the monitored call followed by every onward call.
/// Empty when the journey has no onward calls.
pub fn expand_journey(
    journey: &MonitoredVehicleJourney,
) -> Result<Vec<VehicleCall>, TransformError> {
    let onward = match &journey.onward_calls {
        Some(onward) if !onward.onward_call.is_empty() => &onward.onward_call,
        _ => return Ok(Vec::new()),
    };

    let monitored = journey
        .monitored_call
        .as_ref()
        .ok_or(TransformError::MissingField("MonitoredCall"))?;

    let origin = required(&journey.origin_name, "OriginName")?;
    let origin_id = required(&journey.origin_ref, "OriginRef")?;
    let direction = format!("{}B", required(&journey.direction_ref, "DirectionRef")?);
    let line_type = required(&journey.published_line_name, "PublishedLineName")?;
    let destination = required(&journey.destination_name, "DestinationName")?;

    std::iter::once(monitored)
        .chain(onward)
        .enumerate()
        .map(|(stops_away, call)| -> Result<VehicleCall, TransformError> {
            let (stop_name, stop_id, aimed, expected) = parse_call(call)?;
            Ok(VehicleCall {
                stop_name,
                stop_id,
                aimed_arrival_time: aimed,
                expected_arrival_time: expected,
                origin: origin.to_string(),
                origin_id: origin_id.to_string(),
                direction: direction.clone(),
                line_type: line_type.to_string(),
                destination: destination.to_string(),
                stops_away,
            })
        })
        .collect()
}

fn parse_call(
    call: &Call,
) -> Result<(String, u32, DateTime<Local>, DateTime<Local>), TransformError> {
    let stop_name = required(&call.stop_point_name, "StopPointName")?.to_string();
    let stop_ref = required(&call.stop_point_ref, "StopPointRef")?;
    let stop_id = stop_ref
        .trim()
        .parse()
        .map_err(|source| TransformError::InvalidStopRef {
            value: stop_ref.to_string(),
            source,
        })?;
    let aimed = parse_time(required(&call.aimed_arrival_time, "AimedArrivalTime")?)?;
    let expected = parse_time(required(&call.expected_arrival_time, "ExpectedArrivalTime")?)?;

    Ok((stop_name, stop_id, aimed, expected))
}

fn required<'a>(
    value: &'a Option<String>,
    field: &'static str,
) -> Result<&'a str, TransformError> {
    value.as_deref().ok_or(TransformError::MissingField(field))
}

fn parse_time(value: &str) -> Result<DateTime<Local>, TransformError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Local))
        .map_err(|source| TransformError::InvalidTimestamp {
            value: value.to_string(),
            source,
        })
}

fn join<'a, F>(
    calls: &'a [VehicleCall],
    stations: &'a StationTable,
    now: DateTime<Local>,
    key: F,
) -> impl Iterator<Item = ArrivalRow> + 'a
where
    F: Fn(&StationRecord) -> u32 + Copy + 'a,
{
    calls.iter().flat_map(move |call| {
        stations
            .iter()
            .filter(move |station| key(*station) == call.stop_id)
            .map(move |station| ArrivalRow {
                call: call.clone(),
                station: station.clone(),
                eta: call.expected_arrival_time - now,
            })
    })
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Vehicle journey is missing {0}")]
    MissingField(&'static str),
    #[error("Invalid arrival time {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },
    #[error("Invalid stop ref {value:?}: {source}")]
    InvalidStopRef {
        value: String,
        source: std::num::ParseIntError,
    },
}
