use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the 511.org API key
pub const API_KEY_VAR: &str = "CALTRAIN_API_KEY";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    /// CSV mapping station names to their directional stop ids
    pub stations_path: PathBuf,
    pub origin: String,
    pub destination: String,
    /// Whether the arrival alert starts enabled
    pub sound: bool,
    pub poll_interval_secs: u64,
    pub alert: AlertConfig,
    /// Address for the JSON API. No server is started when unset.
    pub listen: Option<String>,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub endpoint: String,
    pub agency: String,
    /// Only ever taken from the environment, never from the config file.
    #[serde(skip)]
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Alert when a displayed train is fewer than this many minutes away
    pub threshold_minutes: i64,
    /// Minimum time between two alerts
    pub cooldown_minutes: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            stations_path: PathBuf::from("data/stop_ids.csv"),
            origin: "Palo Alto".to_string(),
            destination: "San Francisco".to_string(),
            sound: false,
            poll_interval_secs: 5,
            alert: AlertConfig::default(),
            listen: None,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.511.org/transit/VehicleMonitoring".to_string(),
            agency: "CT".to_string(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            threshold_minutes: 8,
            cooldown_minutes: 8,
        }
    }
}

// Keeps the key out of debug logs.
impl std::fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConfig")
            .field("endpoint", &self.endpoint)
            .field("agency", &self.agency)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Fill in the API key using `lookup` (normally `std::env::var`),
    /// falling back to the variables read from a `.env` file.
    pub fn resolve_api_key<F>(
        &mut self,
        lookup: F,
        env_file: &HashMap<String, String>,
    ) -> Result<(), ConfigError>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env_file.get(API_KEY_VAR).cloned())
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        self.feed.api_key = key.trim().to_string();
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Variables from the nearest `.env` file in the working directory or one of
/// its parents. No file means no variables. The process environment is not
/// modified.
pub fn load_env_file() -> Result<HashMap<String, String>, ConfigError> {
    match dotenvy::dotenv_iter() {
        Ok(iter) => collect_env(iter),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(ConfigError::EnvFile(e.to_string())),
    }
}

fn collect_env<I>(iter: I) -> Result<HashMap<String, String>, ConfigError>
where
    I: Iterator<Item = dotenvy::Result<(String, String)>>,
{
    iter.collect::<Result<_, _>>()
        .map_err(|e| ConfigError::EnvFile(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Failed to read .env file: {0}")]
    EnvFile(String),
    #[error("CALTRAIN_API_KEY not found in environment variables")]
    MissingApiKey,
}
