use crate::alert::AlertPolicy;
use crate::arrivals::{self, TransformError};
use crate::display::{DisplayRow, Snapshot};
use crate::feed::{FeedError, VehicleFeed};
use crate::stations::StationTable;
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Stations and alert preference chosen by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub origin: String,
    pub destination: String,
    pub sound: bool,
}

impl Selection {
    fn stations(&self) -> (&str, &str) {
        (&self.origin, &self.destination)
    }
}

/// Latest published snapshot; `None` until the first successful poll
pub type SnapshotReceiver = watch::Receiver<Option<Arc<Snapshot>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A snapshot with this many rows was published
    Published(usize),
    /// The feed had no active vehicles; the previous snapshot stands
    NoData,
}

/// Polls the feed and publishes arrival snapshots for the current selection
pub struct Tracker<F> {
    feed: F,
    stations: Arc<StationTable>,
    alert_policy: AlertPolicy,
    poll_interval: Duration,
    selection: watch::Receiver<Selection>,
    snapshots: watch::Sender<Option<Arc<Snapshot>>>,
    running: Arc<AtomicBool>,
    last_stations: (String, String),
}

impl<F: VehicleFeed> Tracker<F> {
    pub fn new(
        feed: F,
        stations: Arc<StationTable>,
        alert_policy: AlertPolicy,
        poll_interval: Duration,
        selection: watch::Receiver<Selection>,
        snapshots: watch::Sender<Option<Arc<Snapshot>>>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let last_stations = {
            let current = selection.borrow();
            (current.origin.clone(), current.destination.clone())
        };

        Self {
            feed,
            stations,
            alert_policy,
            poll_interval,
            selection,
            snapshots,
            running,
            last_stations,
        }
    }

    /// Poll until the run flag is cleared or the selection channel closes.
    ///
    /// Ticks every `poll_interval`; a change of origin or destination clears
    /// the table and ticks immediately. Tick failures are logged and retried
    /// on the next interval.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            stations = self.stations.len(),
            "Starting tracker"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running.load(Ordering::Relaxed) {
            tokio::select! {
                _ = interval.tick() => {}
                changed = self.selection.changed() => {
                    if changed.is_err() {
                        info!("Selection channel closed, stopping tracker");
                        break;
                    }
                    if !self.take_station_change() {
                        continue;
                    }
                    interval.reset();
                }
            }

            if !self.running.load(Ordering::Relaxed) {
                break;
            }

            match self.tick(Local::now()).await {
                Ok(TickOutcome::Published(rows)) => debug!(rows, "Published arrivals"),
                Ok(TickOutcome::NoData) => debug!("No active vehicles, keeping previous arrivals"),
                Err(e) => error!(error = %e, "Failed to update arrivals, retrying next interval"),
            }
        }

        info!("Tracker stopped");
    }

    /// Run one fetch → transform → select → publish cycle
    pub async fn tick(&mut self, now: DateTime<Local>) -> Result<TickOutcome, TrackerError> {
        let Some(activities) = self.feed.fetch().await? else {
            return Ok(TickOutcome::NoData);
        };

        let rows = arrivals::transform(&activities, &self.stations, now)?;

        let selection = self.selection.borrow().clone();
        let mut snapshot = self.build_snapshot(&selection, rows, now);

        snapshot.alert = self
            .alert_policy
            .should_alert(&snapshot.rows, selection.sound, now);
        if snapshot.alert {
            info!(origin = %selection.origin, "Train approaching, sounding alert");
        }

        let count = snapshot.rows.len();
        self.snapshots.send_replace(Some(Arc::new(snapshot)));

        Ok(TickOutcome::Published(count))
    }

    fn build_snapshot(
        &self,
        selection: &Selection,
        rows: Vec<arrivals::ArrivalRow>,
        now: DateTime<Local>,
    ) -> Snapshot {
        let Some((origin, destination)) =
            arrivals::resolve_stations(&self.stations, &selection.origin, &selection.destination)
        else {
            warn!(
                origin = %selection.origin,
                destination = %selection.destination,
                "Selected station not in reference table"
            );
            return Snapshot::empty(selection, now);
        };

        let direction = arrivals::required_direction(origin, destination);
        let selected = arrivals::select_arrivals(rows, origin, destination);

        Snapshot {
            origin: origin.name.clone(),
            destination: destination.name.clone(),
            direction: Some(direction),
            rows: selected.iter().map(DisplayRow::from_arrival).collect(),
            updated_at: now,
            alert: false,
        }
    }

    /// Mark the selection as seen. If the stations changed, clear the
    /// published table and return true.
    fn take_station_change(&mut self) -> bool {
        let selection = self.selection.borrow_and_update().clone();
        let (origin, destination) = selection.stations();
        let (last_origin, last_destination) = &self.last_stations;
        if origin == last_origin.as_str() && destination == last_destination.as_str() {
            return false;
        }

        info!(%origin, %destination, "Selection changed, refreshing");
        self.last_stations = (origin.to_string(), destination.to_string());
        self.snapshots
            .send_replace(Some(Arc::new(Snapshot::empty(&selection, Local::now()))));
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
}
