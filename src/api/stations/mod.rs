use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::stations::{StationRecord, StationTable};

#[derive(Debug, Serialize)]
pub struct StationListResponse {
    pub stations: Vec<StationRecord>,
    pub count: usize,
}

/// List the reference stations in table order
pub async fn list_stations(State(stations): State<Arc<StationTable>>) -> Json<StationListResponse> {
    let stations: Vec<StationRecord> = stations.iter().cloned().collect();
    let count = stations.len();
    Json(StationListResponse { stations, count })
}

pub fn router(stations: Arc<StationTable>) -> Router {
    Router::new()
        .route("/", get(list_stations))
        .with_state(stations)
}
