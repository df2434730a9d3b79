// src/main.rs
//! Location Spoofer - drive a simulated device from the command line
//!
//! The device used here is a simulator whose bridge writes every location it
//! receives as a JSON line to stdout. Logs go to stderr.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use location_spoofer::device::SimulatorBridge;
use location_spoofer::discovery::{EventFeed, RawDeviceEvent, SimulatorEventSource};
use location_spoofer::{
    logging, ConnectionKind, Coordinate, Device, DeviceDiscovery, DeviceEvent, LocationSpoofer,
    MoveState, MoveType, SpoofConfig, SpooferDelegate, SpooferState,
};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const COMMIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "location-spoofer", version, about = "Simulate and animate a GPS position")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Jump to a coordinate
    Teleport {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Start at a coordinate and keep moving along a heading
    Walk {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Degrees, 0 is north
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        heading: f64,
        /// walk, cycle or car
        #[arg(long)]
        move_type: Option<MoveType>,
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
    },
    /// Start at a coordinate and follow a route
    Navigate {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Waypoint as `lat,lon`; repeat for every waypoint
        #[arg(long = "to", required = true, value_parser = parse_coordinate, allow_hyphen_values = true)]
        to: Vec<Coordinate>,
        #[arg(long)]
        move_type: Option<MoveType>,
    },
    /// Print the effective configuration
    Config {
        /// Write the configuration back to the config file
        #[arg(long)]
        save: bool,
    },
}

fn parse_coordinate(value: &str) -> Result<Coordinate, String> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| format!("expected `lat,lon`, got `{}`", value))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("invalid latitude: {}", e))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("invalid longitude: {}", e))?;
    let coordinate = Coordinate::new(lat, lon);
    if !coordinate.is_valid() {
        return Err(format!("coordinate out of range: {}", coordinate));
    }
    Ok(coordinate)
}

#[derive(Serialize)]
struct LocationRecord {
    timestamp: DateTime<Utc>,
    device: String,
    #[serde(flatten)]
    location: Option<Coordinate>,
}

/// Simulator bridge that prints every location as a JSON line.
struct StdoutBridge {
    device: String,
}

impl StdoutBridge {
    fn emit(&self, location: Option<Coordinate>) -> bool {
        let record = LocationRecord {
            timestamp: Utc::now(),
            device: self.device.clone(),
            location,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Could not serialize location");
                return false;
            }
        };
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line).is_ok()
    }
}

impl SimulatorBridge for StdoutBridge {
    fn set_location(&self, latitude: f64, longitude: f64) -> bool {
        self.emit(Some(Coordinate::new(latitude, longitude)))
    }

    fn clear_location(&self) -> bool {
        self.emit(None)
    }
}

/// Logs state changes of the spoofer.
struct LogDelegate;

impl SpooferDelegate for LogDelegate {
    fn did_change_move_state(&self, _state: &SpooferState, move_state: &MoveState) {
        info!(state = move_state.name(), "Move state changed");
    }

    fn did_change_move_type(&self, state: &SpooferState, move_type: MoveType) {
        info!(%move_type, speed = state.speed, "Move type changed");
    }

    fn error_changing_location(&self, _state: &SpooferState, to: Option<Coordinate>) {
        warn!(location = ?to, "Device rejected location");
    }

    fn did_pause_navigation(&self, _state: &SpooferState) {
        info!("Navigation paused");
    }
}

/// Register one simulator through discovery and return its device.
async fn connect_simulator(discovery: &DeviceDiscovery, feed: &EventFeed) -> anyhow::Result<Device> {
    let mut events = discovery.subscribe();
    if !discovery.start() {
        bail!("Device discovery could not be started");
    }

    feed.publish(
        RawDeviceEvent::added("SIM-CLI", ConnectionKind::UNKNOWN).with_name("Command line simulator"),
    );

    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(DeviceEvent::Connected(snapshot))) => {
                info!(device = %snapshot.device, "Simulator connected");
                return Ok(snapshot.device);
            }
            Ok(Ok(_)) => continue,
            Ok(Err(e)) => bail!("Device discovery failed: {}", e),
            Err(_) => bail!("No simulator showed up"),
        }
    }
}

/// Wait for `predicate` or Ctrl-C. Returns the matching state, `None` on Ctrl-C.
async fn wait_until(
    spoofer: &LocationSpoofer,
    predicate: impl Fn(&SpooferState) -> bool,
) -> anyhow::Result<Option<SpooferState>> {
    let mut state = spoofer.subscribe();
    tokio::select! {
        result = state.wait_for(|s| predicate(s)) => {
            let state = result.context("Location spoofer stopped unexpectedly")?;
            Ok(Some(state.clone()))
        }
        _ = tokio::signal::ctrl_c() => Ok(None),
    }
}

async fn teleport(spoofer: &LocationSpoofer, target: Coordinate) -> anyhow::Result<()> {
    spoofer.set_location(target)?;
    let arrived = wait_until(spoofer, |s| {
        s.pending_tasks == 0 && s.current_location == Some(target)
    });

    match tokio::time::timeout(COMMIT_TIMEOUT, arrived).await {
        Ok(result) => result.map(|_| ()),
        Err(_) => bail!("Device did not accept location {}", target),
    }
}

async fn walk(
    spoofer: &LocationSpoofer,
    start: Coordinate,
    heading: f64,
    seconds: f64,
) -> anyhow::Result<()> {
    teleport(spoofer, start).await?;
    spoofer.set_heading(heading)?;
    spoofer.toggle_automove_state()?;

    let duration = Duration::try_from_secs_f64(seconds).context("Invalid duration")?;
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    spoofer.switch_to_manual()?;
    wait_until(spoofer, |s| s.move_state.is_manual() && s.pending_tasks == 0).await?;
    Ok(())
}

async fn navigate(
    spoofer: &LocationSpoofer,
    start: Coordinate,
    route: Vec<Coordinate>,
) -> anyhow::Result<()> {
    let Some(&destination) = route.last() else {
        bail!("Route is empty");
    };

    teleport(spoofer, start).await?;
    spoofer.navigate(route)?;

    let done = wait_until(spoofer, |s| {
        s.pending_tasks == 0 && (s.current_location == Some(destination) || s.navigation_paused)
    })
    .await?;

    match done {
        Some(state) if state.navigation_paused => bail!("Navigation stopped before the destination"),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(logging::DEFAULT_FILTER);

    let config = match &cli.config {
        Some(path) => SpoofConfig::load_from(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => SpoofConfig::load().unwrap_or_default(),
    };

    let (start, move_type) = match &cli.command {
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if *save {
                match &cli.config {
                    Some(path) => config.save_to(path)?,
                    None => config.save()?,
                }
                info!("Configuration saved");
            }
            return Ok(());
        }
        Commands::Teleport { lat, lon } => (Coordinate::new(*lat, *lon), None),
        Commands::Walk {
            lat, lon, move_type, ..
        }
        | Commands::Navigate {
            lat, lon, move_type, ..
        } => (Coordinate::new(*lat, *lon), *move_type),
    };

    if !start.is_valid() {
        bail!("Coordinate out of range: {}", start);
    }

    let feed = Arc::new(EventFeed::new());
    let source = SimulatorEventSource::new(Arc::clone(&feed), |id| {
        Arc::new(StdoutBridge {
            device: id.to_string(),
        }) as Arc<dyn SimulatorBridge>
    });
    let discovery = DeviceDiscovery::new(Arc::new(source), config.detect_network_devices);
    let device = connect_simulator(&discovery, &feed).await?;

    let spoofer = LocationSpoofer::with_config(device, &config);
    spoofer.set_delegate(Some(Arc::new(LogDelegate)))?;
    spoofer.pair().await?;
    if let Some(move_type) = move_type {
        spoofer.set_move_type(move_type)?;
    }

    let result = match cli.command {
        Commands::Teleport { .. } => teleport(&spoofer, start).await,
        Commands::Walk {
            heading, seconds, ..
        } => walk(&spoofer, start, heading, seconds).await,
        Commands::Navigate { to, .. } => navigate(&spoofer, start, to).await,
        Commands::Config { .. } => Ok(()),
    };

    let state = spoofer.snapshot();
    info!(
        location = ?state.current_location,
        distance_m = state.total_distance,
        "Done"
    );

    spoofer.shutdown().await?;
    discovery.stop();
    result
}
