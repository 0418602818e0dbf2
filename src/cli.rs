use crate::app::SortField;
use crate::config::{Config, EnrichmentMode, Endpoints};
use crate::enrich::{DEFAULT_GEOCODE_URL, DEFAULT_WEATHER_URL};
use crate::locate::DEFAULT_LOCATE_URL;
use crate::map::DEFAULT_ZOOM;
use crate::types::{Coords, WorkoutKind};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_DB: &str = "workmap.sqlite3";

#[derive(Parser, Debug)]
#[command(
    name = "workmap",
    about = "Log running and cycling workouts on a map"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Cmd>,

    /// SQLite file holding the saved workouts.
    #[arg(long, env = "WORKMAP_DB", default_value = DEFAULT_DB, global = true)]
    pub db: PathBuf,

    /// Your position as `LAT,LON`. Skips the IP lookup.
    #[arg(long, value_parser = parse_coords, allow_hyphen_values = true, global = true)]
    pub home: Option<Coords>,

    /// Map zoom level used when centering.
    #[arg(long, default_value_t = DEFAULT_ZOOM, global = true)]
    pub zoom: u8,

    /// No network: no IP lookup, no reverse geocoding, no weather.
    #[arg(long, global = true)]
    pub offline: bool,

    /// Do not wait for place and weather lookups before saving a workout.
    #[arg(long, global = true)]
    pub no_wait: bool,

    #[arg(long, env = "WORKMAP_LOCATE_URL", default_value = DEFAULT_LOCATE_URL, hide = true)]
    pub locate_url: String,

    #[arg(long, env = "WORKMAP_GEOCODE_URL", default_value = DEFAULT_GEOCODE_URL, hide = true)]
    pub geocode_url: String,

    #[arg(long, env = "WORKMAP_WEATHER_URL", default_value = DEFAULT_WEATHER_URL, hide = true)]
    pub weather_url: String,

    /// OpenWeatherMap API key. Weather is skipped without one.
    #[arg(long, env = "WORKMAP_WEATHER_KEY", hide_env_values = true)]
    pub weather_key: Option<String>,

    /// Increase log verbosity (-v, -vv). Defaults to INFO.
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Decrease log verbosity (-q, -qq). Defaults to INFO.
    #[arg(short = 'q', long, action = ArgAction::Count, global = true)]
    pub quiet: u8,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Log a workout at a map position (defaults to your position).
    Add {
        #[arg(long = "type", value_enum, default_value_t = WorkoutKind::Running)]
        kind: WorkoutKind,

        /// Kilometres.
        #[arg(long, allow_hyphen_values = true)]
        distance: Option<String>,

        /// Minutes.
        #[arg(long, allow_hyphen_values = true)]
        duration: Option<String>,

        /// Steps per minute (running).
        #[arg(long, allow_hyphen_values = true)]
        cadence: Option<String>,

        /// Metres climbed (cycling).
        #[arg(long, allow_hyphen_values = true)]
        elevation: Option<String>,

        /// Where on the map, as `LAT,LON`.
        #[arg(long, value_parser = parse_coords, allow_hyphen_values = true)]
        at: Option<Coords>,
    },
    /// Print saved workouts, as the list shows them.
    List {
        /// Tab-separated details instead of the description only.
        #[arg(long)]
        details: bool,
    },
    /// Center the map on a workout.
    Show { id: String },
    /// Delete one workout.
    Delete { id: String },
    /// Sort the saved workouts.
    Sort {
        #[arg(value_enum)]
        field: SortField,
    },
    /// Delete every workout.
    Reset,
    /// Write the map markers as GeoJSON.
    Export {
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

impl Cli {
    pub fn config(&self) -> Config {
        Config {
            zoom: self.zoom,
            enrichment: if self.no_wait {
                EnrichmentMode::Stale
            } else {
                EnrichmentMode::Await
            },
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            home: self.home,
            offline: self.offline,
            locate_url: self.locate_url.clone(),
            geocode_url: self.geocode_url.clone(),
            weather_url: self.weather_url.clone(),
            weather_key: self.weather_key.clone(),
        }
    }
}

pub fn parse_coords(s: &str) -> Result<Coords, String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got {s:?}"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|e| format!("bad latitude {lat:?}: {e}"))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|e| format!("bad longitude {lon:?}: {e}"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("position out of range: {s}"));
    }
    Ok(Coords::new(lat, lon))
}
