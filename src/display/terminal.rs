use super::{DisplayRow, Snapshot};
use crate::tracker::Selection;
use std::fmt::Write;

const RESET: &str = "\x1b[0m";

/// Render the arrivals table as plain text, with ANSI row backgrounds when
/// `color` is set.
pub fn render_table(snapshot: Option<&Snapshot>, selection: &Selection, color: bool) -> String {
    let mut out = String::new();

    let direction = snapshot
        .filter(|s| s.origin == selection.origin && s.destination == selection.destination)
        .and_then(|s| s.direction)
        .map(|d| format!(" ({d})"))
        .unwrap_or_default();

    let _ = writeln!(
        out,
        "Caltrain Tracker  {} -> {}{}  [sound {}]",
        selection.origin,
        selection.destination,
        direction,
        if selection.sound { "on" } else { "off" }
    );
    let _ = writeln!(out, "Upcoming Arrivals");
    let _ = writeln!(
        out,
        "{:<12} {:<12} {:<4} {:<4}",
        "Time", "ETA (mm:ss)", "Dir", "Type"
    );

    let rows = snapshot.map(|s| s.rows.as_slice()).unwrap_or_default();
    if rows.is_empty() {
        let _ = writeln!(out, "(no arrivals yet)");
    }

    for row in rows {
        let line = format_row(row);
        if color {
            let (r, g, b) = row.urgency.background();
            let _ = writeln!(out, "\x1b[48;2;{r};{g};{b}m\x1b[30m{line}{RESET}");
        } else {
            let _ = writeln!(out, "{line}");
        }
    }

    if let Some(snapshot) = snapshot {
        let _ = writeln!(out, "Updated {}", snapshot.updated_at.format("%I:%M:%S %p"));
    }

    out
}

fn format_row(row: &DisplayRow) -> String {
    format!(
        "{:<12} {:<12} {:<4} {:<4}",
        row.time_label(),
        row.eta_label(),
        row.direction.marker(),
        row.train_type.code()
    )
}
