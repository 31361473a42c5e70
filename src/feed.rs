/// 511.org SIRI Vehicle Monitoring feed
///
/// One GET per poll against `https://api.511.org/transit/VehicleMonitoring`,
/// authenticated with an `api_key` query parameter and scoped by `agency`
/// (`CT` for Caltrain).
///
/// ## Response Structure
/// ```text
/// Siri
/// └─ ServiceDelivery
///    └─ VehicleMonitoringDelivery
///       └─ VehicleActivity[]
///          └─ MonitoredVehicleJourney
///             ├─ OriginName / OriginRef
///             ├─ DirectionRef            "N" or "S"
///             ├─ PublishedLineName       "Local", "Limited", "Baby Bullet", ...
///             ├─ DestinationName
///             ├─ MonitoredCall           next stop
///             └─ OnwardCalls.OnwardCall[] stops after that
/// ```
/// Each call carries `StopPointName`, `StopPointRef` (numeric stop id as a
/// string), `AimedArrivalTime` and `ExpectedArrivalTime` (ISO 8601, UTC).
///
/// ## Notes
/// - The body is UTF-8 and is usually prefixed with a byte-order mark.
/// - `VehicleActivity` is omitted entirely when no trains are running.
use crate::config::FeedConfig;
use serde::Deserialize;
use std::future::Future;
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SiriResponse {
    pub siri: Siri,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Siri {
    pub service_delivery: ServiceDelivery,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDelivery {
    pub vehicle_monitoring_delivery: VehicleMonitoringDelivery,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleMonitoringDelivery {
    #[serde(default)]
    pub vehicle_activity: Option<Vec<VehicleActivity>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleActivity {
    pub monitored_vehicle_journey: MonitoredVehicleJourney,
}

/// Journey fields are optional here; the arrival transformer decides which
/// ones a usable journey must have.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredVehicleJourney {
    pub origin_name: Option<String>,
    pub origin_ref: Option<String>,
    pub direction_ref: Option<String>,
    pub published_line_name: Option<String>,
    pub destination_name: Option<String>,
    pub monitored_call: Option<Call>,
    pub onward_calls: Option<OnwardCalls>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OnwardCalls {
    #[serde(default)]
    pub onward_call: Vec<Call>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Call {
    pub stop_point_name: Option<String>,
    pub stop_point_ref: Option<String>,
    pub aimed_arrival_time: Option<String>,
    pub expected_arrival_time: Option<String>,
}

/// Source of vehicle activity for the tracker.
///
/// `Ok(None)` means no vehicles are currently active (or the feed is
/// unavailable this tick).
pub trait VehicleFeed: Send + Sync {
    fn fetch(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<VehicleActivity>>, FeedError>> + Send;
}

#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    config: FeedConfig,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(FeedError::from)?;

        Ok(Self { client, config })
    }
}

impl VehicleFeed for FeedClient {
    async fn fetch(&self) -> Result<Option<Vec<VehicleActivity>>, FeedError> {
        debug!(
            endpoint = %self.config.endpoint,
            agency = %self.config.agency,
            "Fetching vehicle activity"
        );

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("api_key", self.config.api_key.as_str()),
                ("agency", self.config.agency.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Vehicle monitoring request was not successful");
            return Ok(None);
        }

        let bytes = response.bytes().await?;
        parse_feed(&bytes)
    }
}

/// Decode a raw response body into the active vehicles, if any.
pub fn parse_feed(body: &[u8]) -> Result<Option<Vec<VehicleActivity>>, FeedError> {
    let text = std::str::from_utf8(body)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let response: SiriResponse = serde_json::from_str(text)?;

    let activity = response
        .siri
        .service_delivery
        .vehicle_monitoring_delivery
        .vehicle_activity
        .filter(|vehicles| !vehicles.is_empty());

    debug!(
        vehicles = activity.as_ref().map_or(0, Vec::len),
        "Parsed vehicle monitoring feed"
    );

    Ok(activity)
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
    #[error("Feed body is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("Unexpected feed shape: {0}")]
    Parse(#[from] serde_json::Error),
}

// The request URL carries the API key, so it is stripped before the error
// can reach a log line.
impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Http(err.without_url())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    pub(crate) fn call(name: &str, stop_ref: &str, expected: &str) -> Value {
        json!({
            "StopPointName": name,
            "StopPointRef": stop_ref,
            "AimedArrivalTime": expected,
            "ExpectedArrivalTime": expected,
        })
    }

    pub(crate) fn journey(direction: &str, line: &str, calls: &[Value]) -> Value {
        let (monitored, onward) = calls.split_first().expect("at least one call");
        let mut journey = json!({
            "OriginName": "San Jose Diridon",
            "OriginRef": "70261",
            "DirectionRef": direction,
            "PublishedLineName": line,
            "DestinationName": "San Francisco",
            "MonitoredCall": monitored,
        });
        if !onward.is_empty() {
            journey["OnwardCalls"] = json!({ "OnwardCall": onward });
        }
        json!({ "MonitoredVehicleJourney": journey })
    }

    pub(crate) fn feed(vehicles: &[Value]) -> Value {
        json!({
            "Siri": {
                "ServiceDelivery": {
                    "ResponseTimestamp": "2024-03-01T17:00:00Z",
                    "VehicleMonitoringDelivery": {
                        "version": "1.4",
                        "VehicleActivity": vehicles,
                    }
                }
            }
        })
    }

    pub(crate) fn activities(vehicles: &[Value]) -> Vec<VehicleActivity> {
        parse_feed(feed(vehicles).to_string().as_bytes())
            .unwrap()
            .unwrap_or_default()
    }

    #[test]
    fn byte_order_mark_is_stripped() {
        let body = feed(&[journey(
            "N",
            "Local",
            &[
                call("Palo Alto", "70171", "2024-03-01T17:05:00Z"),
                call("Menlo Park", "70161", "2024-03-01T17:08:00Z"),
            ],
        )]);
        let mut bytes = "\u{feff}".as_bytes().to_vec();
        bytes.extend_from_slice(body.to_string().as_bytes());

        let vehicles = parse_feed(&bytes).unwrap().unwrap();
        assert_eq!(vehicles.len(), 1);

        let journey = &vehicles[0].monitored_vehicle_journey;
        assert_eq!(journey.direction_ref.as_deref(), Some("N"));
        assert_eq!(
            journey.monitored_call.as_ref().unwrap().stop_point_ref.as_deref(),
            Some("70171")
        );
        assert_eq!(journey.onward_calls.as_ref().unwrap().onward_call.len(), 1);
    }

    #[test]
    fn empty_vehicle_activity_means_no_data() {
        let body = feed(&[]).to_string();
        assert!(parse_feed(body.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn missing_vehicle_activity_means_no_data() {
        let body = json!({
            "Siri": { "ServiceDelivery": { "VehicleMonitoringDelivery": { "version": "1.4" } } }
        })
        .to_string();
        assert!(parse_feed(body.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn unexpected_shape_is_a_parse_error() {
        let body = json!({ "Siri": { "Error": "bad key" } }).to_string();
        assert!(matches!(parse_feed(body.as_bytes()), Err(FeedError::Parse(_))));
    }

    #[test]
    fn invalid_utf8_is_an_encoding_error() {
        assert!(matches!(
            parse_feed(&[0xff, 0xfe, 0x00]),
            Err(FeedError::Encoding(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_http_error() {
        let client = FeedClient::new(FeedConfig {
            endpoint: "http://127.0.0.1:9/transit/VehicleMonitoring".to_string(),
            api_key: "secret-key".to_string(),
            timeout_secs: 2,
            ..FeedConfig::default()
        })
        .unwrap();

        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, FeedError::Http(_)));
        assert!(!err.to_string().contains("secret-key"));
    }

    const PATH: &str = "/transit/VehicleMonitoring";

    /// Serve `router` on an ephemeral local port and return a client for it
    async fn local_client(router: Router) -> FeedClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        FeedClient::new(FeedConfig {
            endpoint: format!("http://{addr}{PATH}"),
            api_key: "secret-key".to_string(),
            timeout_secs: 5,
            ..FeedConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn non_success_status_means_no_data() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::INTERNAL_SERVER_ERROR] {
            let handler = move || async move { (status, "denied") };
            let client = local_client(Router::new().route(PATH, get(handler))).await;

            assert!(client.fetch().await.unwrap().is_none(), "{status}");
        }
    }

    #[tokio::test]
    async fn fetch_authenticates_by_query_and_parses_body() {
        let seen = Arc::new(Mutex::new(HashMap::new()));
        let recorded = seen.clone();
        let router = Router::new().route(
            PATH,
            get(move |Query(params): Query<HashMap<String, String>>| {
                *recorded.lock().unwrap() = params;
                let body = feed(&[journey(
                    "S",
                    "Limited",
                    &[
                        call("Millbrae", "70062", "2024-03-01T17:02:00Z"),
                        call("Palo Alto", "70172", "2024-03-01T17:15:00Z"),
                    ],
                )]);
                async move { format!("\u{feff}{body}") }
            }),
        );
        let client = local_client(router).await;

        let vehicles = client.fetch().await.unwrap().unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(
            vehicles[0].monitored_vehicle_journey.published_line_name.as_deref(),
            Some("Limited")
        );

        let params = seen.lock().unwrap().clone();
        assert_eq!(params.get("api_key").map(String::as_str), Some("secret-key"));
        assert_eq!(params.get("agency").map(String::as_str), Some("CT"));
    }
}
