#![deny(
    warnings,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo
)]
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use workmap::app::{App, Notice};
use workmap::cli::{Cli, Cmd};
use workmap::database::{SqliteStore, clear_workouts};
use workmap::form::{FormInput, InputError};
use workmap::map::FeatureMap;
use workmap::types::Details;
use workmap::{dlog, utils};

type CliApp = App<FeatureMap, SqliteStore>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::init_logging(cli.verbose, cli.quiet);

    let mut store = SqliteStore::open(&cli.db)?;
    if matches!(cli.cmd, Some(Cmd::Reset)) {
        // Also recovers from a stored list that no longer loads.
        clear_workouts(&mut store)?;
    }
    let services = cli.endpoints().services();
    let mut app = App::new(cli.config(), services, FeatureMap::new(), store)?;
    app.start()?;

    let result = run(&mut app, cli.cmd);
    report_notices(&mut app);

    if let Err(e) = &result
        && e.downcast_ref::<InputError>().is_some()
    {
        // Already shown as an alert.
        std::process::exit(2);
    }
    result
}

fn run(app: &mut CliApp, cmd: Option<Cmd>) -> Result<()> {
    match cmd.unwrap_or(Cmd::List { details: false }) {
        Cmd::Add {
            kind,
            distance,
            duration,
            cadence,
            elevation,
            at,
        } => {
            require_map(app)?;
            let at = at
                .or_else(|| app.home())
                .context("no position to log the workout at")?;
            dlog!("mode=add kind={kind} at={at}");

            app.map_click(at)?;
            let input = FormInput {
                kind,
                distance: distance.unwrap_or_default(),
                duration: duration.unwrap_or_default(),
                cadence: cadence.unwrap_or_default(),
                elevation: elevation.unwrap_or_default(),
            };
            let w = app.submit(&input)?;
            println!("{}\t{}", w.id(), w.description());
        }
        Cmd::List { details } => print_list(app, details),
        Cmd::Show { id } => {
            require_map(app)?;
            if !app.move_to(&id)? {
                bail!("No workout with id {id}");
            }
            if let Some((center, zoom)) = app.map().view() {
                println!("{center}\tzoom={zoom}");
            }
        }
        Cmd::Delete { id } => {
            if !app.delete(&id)? {
                bail!("No workout with id {id}");
            }
        }
        Cmd::Sort { field } => {
            app.sort(field)?;
            print_list(app, false);
        }
        Cmd::Reset => app.reset()?,
        Cmd::Export { out } => {
            require_map(app)?;
            app.fit_all()?;
            let fc = app.map().to_feature_collection();
            let json = serde_json::to_string_pretty(&fc).context("Serializing GeoJSON")?;
            match out {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(path = %path.display(), markers = app.map().marker_count(), "exported");
                }
                None => println!("{json}"),
            }
        }
    }
    Ok(())
}

fn require_map(app: &CliApp) -> Result<()> {
    if app.map_ready() {
        return Ok(());
    }
    bail!("The map is unavailable without your position (try --home LAT,LON)")
}

fn print_list(app: &CliApp, details: bool) {
    if app.list().is_empty() {
        println!("No workouts yet.");
        return;
    }

    for (i, node) in app.list().nodes().iter().enumerate() {
        let Some(w) = app.workout(&node.id) else {
            continue;
        };
        if !details {
            println!("{} {}", w.kind().emoji(), w.description());
            continue;
        }

        let (rate, unit, extra) = match *w.details() {
            Details::Running { cadence, pace } => (pace, "min/km", format!("{cadence} spm")),
            Details::Cycling {
                elevation_gain,
                speed,
            } => (speed, "km/h", format!("{elevation_gain} m")),
        };
        println!(
            "{}\t{}\t{}\t{} km\t{}\t{rate:.1} {unit}\t{extra}\t{}",
            i + 1,
            w.id(),
            w.kind(),
            w.distance(),
            utils::format_minutes(w.duration()),
            w.description()
        );
    }
}

fn report_notices(app: &mut CliApp) {
    for notice in app.take_notices() {
        match notice {
            Notice::Alert(msg) => eprintln!("⚠ {msg}"),
            Notice::Message(msg) => eprintln!("{msg}"),
        }
    }
}
