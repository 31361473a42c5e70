use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

/// A station and the stop ids of its two platforms.
///
/// The reference CSV names the columns `stopname`, `stop1` and `stop2`.
/// `stop1` is the northbound platform and `stop2` the southbound one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRecord {
    #[serde(rename(deserialize = "stopname"))]
    pub name: String,
    #[serde(rename(deserialize = "stop2"))]
    pub stop_id_southbound: u32,
    #[serde(rename(deserialize = "stop1"))]
    pub stop_id_northbound: u32,
}

/// Static station reference data, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct StationTable {
    records: Vec<StationRecord>,
}

impl StationTable {
    #[cfg(test)]
    pub fn new(records: Vec<StationRecord>) -> Self {
        Self { records }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StationError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| StationError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

        let table = Self::from_reader(file).map_err(|e| match e {
            StationError::Parse { source, .. } => StationError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        info!(
            path = %path.display(),
            station_count = table.len(),
            "Loaded station table"
        );

        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, StationError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let records = reader
            .deserialize()
            .collect::<Result<Vec<StationRecord>, _>>()
            .map_err(|e| StationError::Parse {
                path: PathBuf::new(),
                source: e,
            })?;

        if records.is_empty() {
            return Err(StationError::Empty);
        }

        Ok(Self { records })
    }

    /// First station with exactly this name
    pub fn find(&self, name: &str) -> Option<&StationRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Case-insensitive lookup, for names typed by the user
    pub fn find_ignore_case(&self, name: &str) -> Option<&StationRecord> {
        let name = name.trim();
        self.find(name)
            .or_else(|| self.records.iter().find(|r| r.name.eq_ignore_ascii_case(name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &StationRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StationError {
    #[error("Failed to open station table {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse station table {}: {source}", path.display())]
    Parse { path: PathBuf, source: csv::Error },
    #[error("Station table contains no stations")]
    Empty,
}
