pub mod arrivals;
pub mod error;
pub mod stations;

pub use error::{unavailable, ErrorResponse};

use crate::stations::StationTable;
use crate::tracker::SnapshotReceiver;
use axum::http::{header, Method};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

pub fn router(stations: Arc<StationTable>, snapshots: SnapshotReceiver) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/stations", stations::router(stations))
        .nest("/arrivals", arrivals::router(snapshots))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve the JSON API until the process exits
pub async fn run_server(
    addr: &str,
    stations: Arc<StationTable>,
    snapshots: SnapshotReceiver,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Serving arrivals API");

    axum::serve(listener, router(stations, snapshots)).await
}
