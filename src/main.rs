mod alert;
mod api;
mod arrivals;
mod config;
mod display;
mod feed;
mod stations;
mod tracker;

use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alert::AlertPolicy;
use config::Config;
use feed::FeedClient;
use stations::StationTable;
use tracker::{Selection, Tracker};

#[derive(Parser)]
#[command(name = "caltrain-tracker")]
#[command(about = "Live Caltrain arrivals for an origin/destination pair")]
struct Args {
    /// YAML config file
    #[arg(short, long, env = "CALTRAIN_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    /// Origin station, as named in the station table
    #[arg(long)]
    from: Option<String>,

    /// Destination station
    #[arg(long)]
    to: Option<String>,

    /// Start with the arrival alert enabled
    #[arg(long)]
    sound: bool,

    /// Seconds between polls
    #[arg(long)]
    interval: Option<u64>,

    /// Station reference CSV
    #[arg(long)]
    stations: Option<PathBuf>,

    /// Serve the current arrivals as JSON on this address, e.g. 127.0.0.1:3000
    #[arg(long, env = "CALTRAIN_TRACKER_LISTEN")]
    listen: Option<String>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(from) = self.from {
            config.origin = from;
        }
        if let Some(to) = self.to {
            config.destination = to;
        }
        if self.sound {
            config.sound = true;
        }
        if let Some(interval) = self.interval {
            config.poll_interval_secs = interval;
        }
        if let Some(stations) = self.stations {
            config.stations_path = stations;
        }
        if self.listen.is_some() {
            config.listen = self.listen;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout belongs to the arrivals table.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caltrain_tracker=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let color = !args.no_color;

    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading config");
            Config::load(path)?
        }
        None => Config::default(),
    };
    args.apply(&mut config);

    let env_file = config::load_env_file().unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring environment file");
        HashMap::new()
    });

    if let Err(e) = config.resolve_api_key(|name| std::env::var(name).ok(), &env_file) {
        eprintln!("Error: {e}");
        eprintln!("Please create a .env file with your 511.org API key");
        eprintln!("Example: {}=your_api_key_here", config::API_KEY_VAR);
        std::process::exit(1);
    }

    let stations = Arc::new(StationTable::load(&config.stations_path)?);
    for name in [&config.origin, &config.destination] {
        if stations.find(name).is_none() {
            warn!(station = %name, "Configured station not in reference table");
        }
    }

    info!(
        origin = %config.origin,
        destination = %config.destination,
        sound = config.sound,
        "Starting Caltrain tracker"
    );

    let (selection_tx, selection_rx) = watch::channel(Selection {
        origin: config.origin.clone(),
        destination: config.destination.clone(),
        sound: config.sound,
    });
    let (snapshot_tx, snapshot_rx) = watch::channel(None);
    let running = Arc::new(AtomicBool::new(true));

    let tracker = Tracker::new(
        FeedClient::new(config.feed.clone())?,
        stations.clone(),
        AlertPolicy::new(config.alert),
        config.poll_interval(),
        selection_rx,
        snapshot_tx,
        running.clone(),
    );
    let tracker_handle = tokio::spawn(tracker.run());

    if let Some(addr) = config.listen.clone() {
        let api_stations = stations.clone();
        let api_snapshots = snapshot_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = api::run_server(&addr, api_stations, api_snapshots).await {
                error!(error = %e, addr = %addr, "Arrivals API stopped");
            }
        });
    }

    let mut display_handle = tokio::spawn(display::run_display(
        stations,
        snapshot_rx,
        selection_tx,
        display::spawn_stdin_reader(),
        std::io::stdout(),
        color,
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            display_handle.abort();
        }
        _ = &mut display_handle => info!("Display closed, shutting down"),
    }

    // stdin is read on a detached thread, so nothing left here blocks
    // runtime shutdown beyond an in-flight fetch. A second Ctrl-C skips that.
    running.store(false, Ordering::Relaxed);
    tokio::select! {
        joined = tracker_handle => {
            if let Err(e) = joined {
                error!(error = %e, "Tracker task failed");
            }
        }
        _ = tokio::signal::ctrl_c() => warn!("Interrupted again, not waiting for the tracker"),
    }

    Ok(())
}
