use crate::stations::StationTable;
use crate::tracker::Selection;
use tokio::sync::watch;
use tracing::info;

pub const HELP: &str =
    "Commands: from <station> | to <station> | swap | sound on|off | stations | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    From(String),
    To(String),
    Swap,
    Sound(bool),
    Stations,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Message(String),
    Quit,
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb.to_ascii_lowercase().as_str() {
        "" => Err(CommandError::Empty),
        "from" if rest.is_empty() => Err(CommandError::MissingArgument("from")),
        "from" => Ok(Command::From(rest.to_string())),
        "to" if rest.is_empty() => Err(CommandError::MissingArgument("to")),
        "to" => Ok(Command::To(rest.to_string())),
        "swap" => Ok(Command::Swap),
        "sound" => match rest.to_ascii_lowercase().as_str() {
            "on" => Ok(Command::Sound(true)),
            "off" => Ok(Command::Sound(false)),
            other => Err(CommandError::InvalidSound(other.to_string())),
        },
        "stations" => Ok(Command::Stations),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Apply a command to the shared selection
pub fn apply(
    command: Command,
    stations: &StationTable,
    selection: &watch::Sender<Selection>,
) -> Outcome {
    match command {
        Command::From(name) | Command::To(name) if stations.find_ignore_case(&name).is_none() => {
            Outcome::Message(format!("Unknown station: {name}"))
        }
        Command::From(name) => {
            let name = canonical(stations, &name);
            info!(origin = %name, "Origin changed");
            selection.send_modify(|s| s.origin = name.clone());
            Outcome::Message(format!("From: {name}"))
        }
        Command::To(name) => {
            let name = canonical(stations, &name);
            info!(destination = %name, "Destination changed");
            selection.send_modify(|s| s.destination = name.clone());
            Outcome::Message(format!("To: {name}"))
        }
        Command::Swap => {
            selection.send_modify(|s| std::mem::swap(&mut s.origin, &mut s.destination));
            let s = selection.borrow();
            Outcome::Message(format!("From: {}  To: {}", s.origin, s.destination))
        }
        Command::Sound(enabled) => {
            selection.send_modify(|s| s.sound = enabled);
            Outcome::Message(format!("Sound alert {}", if enabled { "on" } else { "off" }))
        }
        Command::Stations => Outcome::Message(stations.names().collect::<Vec<_>>().join(", ")),
        Command::Help => Outcome::Message(HELP.to_string()),
        Command::Quit => Outcome::Quit,
    }
}

fn canonical(stations: &StationTable, name: &str) -> String {
    stations
        .find_ignore_case(name)
        .map(|s| s.name.clone())
        .unwrap_or_else(|| name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("`{0}` needs a station name")]
    MissingArgument(&'static str),
    #[error("Expected `sound on` or `sound off`, got {0:?}")]
    InvalidSound(String),
}
