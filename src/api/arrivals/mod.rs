use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use crate::api::{unavailable, ErrorResponse};
use crate::display::Snapshot;
use crate::tracker::SnapshotReceiver;

/// Current arrivals for the selected origin and destination
pub async fn current_arrivals(
    State(snapshots): State<SnapshotReceiver>,
) -> Result<Json<Snapshot>, (StatusCode, Json<ErrorResponse>)> {
    let current = snapshots.borrow().clone();
    match current {
        Some(snapshot) => Ok(Json(Snapshot::clone(&snapshot))),
        None => Err(unavailable("Arrivals not yet available")),
    }
}

pub fn router(snapshots: SnapshotReceiver) -> Router {
    Router::new()
        .route("/", get(current_arrivals))
        .with_state(snapshots)
}
