pub mod commands;
pub mod terminal;

use crate::alert::BELL;
use crate::arrivals::{ArrivalRow, Direction};
use crate::stations::StationTable;
use crate::tracker::{Selection, SnapshotReceiver};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Display tier of an arrival, derived only from its ETA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Under 10 minutes
    Urgent,
    /// 10 to 19 minutes
    Normal,
    /// 20 minutes or more
    Relaxed,
}

impl Urgency {
    pub fn from_minutes(minutes: i64) -> Self {
        if minutes < 10 {
            Urgency::Urgent
        } else if minutes < 20 {
            Urgency::Normal
        } else {
            Urgency::Relaxed
        }
    }

    /// Row background as RGB
    pub fn background(&self) -> (u8, u8, u8) {
        match self {
            Urgency::Urgent => (0xFF, 0xE5, 0xE5),
            Urgency::Normal => (0xFF, 0xF8, 0xE5),
            Urgency::Relaxed => (0xE5, 0xFF, 0xE5),
        }
    }
}

/// Service pattern, read from the published line name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrainType {
    #[serde(rename = "BB")]
    BabyBullet,
    #[serde(rename = "LIM")]
    Limited,
    #[serde(rename = "LOC")]
    Local,
}

impl TrainType {
    pub fn from_line_name(line_name: &str) -> Self {
        let line_name = line_name.to_uppercase();
        if line_name.contains("BABY BULLET") {
            TrainType::BabyBullet
        } else if line_name.contains("LIMITED") {
            TrainType::Limited
        } else {
            TrainType::Local
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TrainType::BabyBullet => "BB",
            TrainType::Limited => "LIM",
            TrainType::Local => "LOC",
        }
    }
}

/// One rendered line of the arrivals table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    pub arrival_time: DateTime<Local>,
    /// Seconds until arrival, never negative
    pub eta_seconds: i64,
    pub direction: Direction,
    pub train_type: TrainType,
    pub urgency: Urgency,
}

impl DisplayRow {
    pub fn from_arrival(row: &ArrivalRow) -> Self {
        let eta_seconds = row.eta.num_seconds().max(0);
        Self {
            arrival_time: row.call.expected_arrival_time,
            eta_seconds,
            direction: row.direction(),
            train_type: TrainType::from_line_name(&row.call.line_type),
            urgency: Urgency::from_minutes(eta_seconds / 60),
        }
    }

    pub fn eta_minutes(&self) -> i64 {
        self.eta_seconds / 60
    }

    /// ETA as `mm:ss`
    pub fn eta_label(&self) -> String {
        format!("{:02}:{:02}", self.eta_seconds / 60, self.eta_seconds % 60)
    }

    /// Arrival as a 12-hour clock time, e.g. `05:42:10 PM`
    pub fn time_label(&self) -> String {
        self.arrival_time.format("%I:%M:%S %p").to_string()
    }
}

/// Result of one successful poll for one selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub origin: String,
    pub destination: String,
    /// `None` when either station is not in the reference table
    pub direction: Option<Direction>,
    pub rows: Vec<DisplayRow>,
    pub updated_at: DateTime<Local>,
    /// Set when this poll decided the user should be alerted
    pub alert: bool,
}

impl Snapshot {
    pub fn empty(selection: &Selection, now: DateTime<Local>) -> Self {
        Self {
            origin: selection.origin.clone(),
            destination: selection.destination.clone(),
            direction: None,
            rows: Vec::new(),
            updated_at: now,
            alert: false,
        }
    }
}

/// Lines typed on stdin. The reader runs on its own detached thread so a
/// pending read never holds up runtime shutdown.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();

    let spawned = std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start stdin reader");
    }

    rx
}

/// Drive the terminal: redraw on every new snapshot and apply commands from
/// `input`. Returns when the user quits or the tracker goes away.
pub async fn run_display<W: Write>(
    stations: Arc<StationTable>,
    mut snapshots: SnapshotReceiver,
    selection: watch::Sender<Selection>,
    mut input: mpsc::UnboundedReceiver<io::Result<String>>,
    mut out: W,
    color: bool,
) {
    let mut current = snapshots.borrow_and_update().clone();
    let mut ring = current.as_ref().is_some_and(|s| s.alert);
    let mut input_open = true;
    let mut message = Some(commands::HELP.to_string());

    loop {
        let frame = Frame {
            snapshot: current.as_deref(),
            message: message.as_deref(),
            ring,
            color,
        };
        frame.write(&mut out, &selection.borrow());
        ring = false;

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    info!("Tracker stopped, closing display");
                    break;
                }
                current = snapshots.borrow_and_update().clone();
                ring = current.as_ref().is_some_and(|s| s.alert);
            }
            line = input.recv(), if input_open => match line {
                Some(Ok(line)) => match commands::parse(&line) {
                    Ok(command) => match commands::apply(command, &stations, &selection) {
                        commands::Outcome::Message(text) => message = Some(text),
                        commands::Outcome::Quit => break,
                    },
                    Err(commands::CommandError::Empty) => {}
                    Err(e) => message = Some(format!("{e}\n{}", commands::HELP)),
                },
                Some(Err(e)) => {
                    warn!(error = %e, "Failed to read from stdin, station selection is fixed");
                    input_open = false;
                }
                None => {
                    info!("stdin closed, station selection is fixed");
                    input_open = false;
                }
            }
        }
    }
}

struct Frame<'a> {
    snapshot: Option<&'a Snapshot>,
    message: Option<&'a str>,
    ring: bool,
    color: bool,
}

impl Frame<'_> {
    fn write<W: Write>(&self, out: &mut W, selection: &Selection) {
        let mut text = String::new();
        if self.ring {
            text.push_str(BELL);
        }
        if self.color {
            text.push_str("\x1b[2J\x1b[H");
        }
        text.push_str(&terminal::render_table(self.snapshot, selection, self.color));
        if let Some(message) = self.message {
            text.push('\n');
            text.push_str(message);
            text.push('\n');
        }

        if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            warn!(error = %e, "Failed to write arrivals table");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrivals::VehicleCall;
    use crate::stations::StationRecord;
    use chrono::TimeDelta;

    fn row(line_type: &str, direction: &str, eta: TimeDelta) -> ArrivalRow {
        let now = DateTime::parse_from_rfc3339("2024-03-01T17:00:00Z")
            .unwrap()
            .with_timezone(&Local);
        ArrivalRow {
            call: VehicleCall {
                stop_name: "Palo Alto".to_string(),
                stop_id: 70171,
                aimed_arrival_time: now + eta,
                expected_arrival_time: now + eta,
                origin: "San Jose Diridon".to_string(),
                origin_id: "70261".to_string(),
                direction: direction.to_string(),
                line_type: line_type.to_string(),
                destination: "San Francisco".to_string(),
                stops_away: 3,
            },
            station: StationRecord {
                name: "Palo Alto".to_string(),
                stop_id_southbound: 70172,
                stop_id_northbound: 70171,
            },
            eta,
        }
    }

    #[test]
    fn urgency_tiers() {
        for minutes in 0..10 {
            assert_eq!(Urgency::from_minutes(minutes), Urgency::Urgent);
        }
        for minutes in 10..20 {
            assert_eq!(Urgency::from_minutes(minutes), Urgency::Normal);
        }
        for minutes in [20, 21, 45, 180] {
            assert_eq!(Urgency::from_minutes(minutes), Urgency::Relaxed);
        }
    }

    #[test]
    fn baby_bullet_wins_over_limited() {
        assert_eq!(TrainType::from_line_name("Baby Bullet"), TrainType::BabyBullet);
        assert_eq!(
            TrainType::from_line_name("limited baby bullet"),
            TrainType::BabyBullet
        );
        assert_eq!(TrainType::from_line_name("Limited"), TrainType::Limited);
        assert_eq!(TrainType::from_line_name("Local Weekday"), TrainType::Local);
        assert_eq!(TrainType::from_line_name(""), TrainType::Local);
        assert_eq!(TrainType::BabyBullet.code(), "BB");
    }

    #[test]
    fn eta_is_clamped_at_zero() {
        let display = DisplayRow::from_arrival(&row("Local", "NB", TimeDelta::seconds(-95)));
        assert_eq!(display.eta_seconds, 0);
        assert_eq!(display.eta_label(), "00:00");
        assert_eq!(display.urgency, Urgency::Urgent);
    }

    #[test]
    fn eta_label_is_minutes_and_seconds() {
        let display = DisplayRow::from_arrival(&row("Limited", "SB", TimeDelta::seconds(754)));
        assert_eq!(display.eta_label(), "12:34");
        assert_eq!(display.eta_minutes(), 12);
        assert_eq!(display.urgency, Urgency::Normal);
        assert_eq!(display.direction, Direction::Southbound);
        assert_eq!(display.train_type, TrainType::Limited);
    }

    #[test]
    fn time_label_uses_local_clock() {
        let display = DisplayRow::from_arrival(&row("Local", "NB", TimeDelta::minutes(30)));
        let expected = display.arrival_time.format("%I:%M:%S %p").to_string();
        assert_eq!(display.time_label(), expected);
        assert!(expected.ends_with("AM") || expected.ends_with("PM"));
    }

    #[test]
    fn snapshot_serializes_codes() {
        let arrival = row("Baby Bullet", "NB", TimeDelta::minutes(25));
        let display = DisplayRow::from_arrival(&arrival);
        let value = serde_json::to_value(&display).unwrap();
        assert_eq!(value["train_type"], "BB");
        assert_eq!(value["direction"], "northbound");
        assert_eq!(value["urgency"], "relaxed");
        assert_eq!(value["eta_seconds"], 1500);
    }

    fn display_parts() -> (Arc<StationTable>, watch::Sender<Selection>) {
        let stations = StationTable::from_reader(std::io::Cursor::new(
            "stopname,stop1,stop2\n\
             San Francisco,70011,70012\n\
             Millbrae,70061,70062\n\
             Palo Alto,70171,70172\n",
        ))
        .unwrap();
        let (selection, _) = watch::channel(Selection {
            origin: "Palo Alto".to_string(),
            destination: "San Francisco".to_string(),
            sound: true,
        });
        (Arc::new(stations), selection)
    }

    #[tokio::test]
    async fn commands_update_selection_until_quit() {
        let (stations, selection) = display_parts();
        let (_snapshot_tx, snapshots) = watch::channel(None);
        let (input_tx, input) = mpsc::unbounded_channel();
        for line in ["from millbrae", "", "depart now", "quit"] {
            input_tx.send(Ok(line.to_string())).unwrap();
        }

        let mut out = Vec::new();
        let commands = selection.clone();
        run_display(stations, snapshots, commands, input, &mut out, false).await;

        assert_eq!(selection.borrow().origin, "Millbrae");
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("From: Millbrae"));
        assert!(text.contains("Unknown command: depart"));
        assert!(!text.contains(BELL));
    }

    #[tokio::test]
    async fn closes_with_tracker_while_stdin_is_still_open() {
        let (stations, selection) = display_parts();
        let (snapshot_tx, snapshots) = watch::channel(None);
        let (_input_tx, input) = mpsc::unbounded_channel();
        drop(snapshot_tx);

        let mut out = Vec::new();
        run_display(stations, snapshots, selection, input, &mut out, false).await;

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("(no arrivals yet)"));
    }

    #[tokio::test]
    async fn bell_rings_once_per_alerting_snapshot() {
        let (stations, selection) = display_parts();
        let (snapshot_tx, snapshots) = watch::channel(None);
        let (input_tx, input) = mpsc::unbounded_channel();
        let now = Local::now();

        let mut alerting = Snapshot::empty(&selection.borrow(), now);
        alerting.alert = true;
        snapshot_tx.send_replace(Some(Arc::new(alerting)));
        // Redraws for commands must not ring again.
        input_tx.send(Ok("sound off".to_string())).unwrap();
        input_tx.send(Ok("quit".to_string())).unwrap();

        let mut out = Vec::new();
        run_display(stations, snapshots, selection, input, &mut out, false).await;

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches(BELL).count(), 1);
        assert!(text.contains("Sound alert off"));
        drop(snapshot_tx);
    }
}
